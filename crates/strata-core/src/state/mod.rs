//! Deployment state snapshots
//!
//! A [`Deployment`] is the versioned envelope around a stack's snapshot
//! body. [`StateCodec`] converts it to and from its transportable JSON form;
//! the helpers in `snapshot` read and write the well-known body fields.

mod codec;
mod deployment;
mod snapshot;

pub use codec::{StateCodec, CURRENT_VERSION, MIN_SUPPORTED_VERSION};
pub use deployment::Deployment;
pub use snapshot::SnapshotManifest;
