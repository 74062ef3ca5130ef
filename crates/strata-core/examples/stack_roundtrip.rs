//! Quick walk through stack config and state round-tripping
//!
//! Run with: cargo run --example stack_roundtrip

use strata_core::{ConfigValue, RemoveOptions, WorkspaceManager, WorkspaceOptions};

fn main() -> strata_core::Result<()> {
    println!("=== Stack Round-trip ===\n");

    let dir = tempfile::TempDir::new()?;
    let mut options = WorkspaceOptions::new(dir.path().join("project"))
        .with_project("demo")
        .with_passphrase("example passphrase");
    options.backend.url = Some(format!("file://{}", dir.path().join("state").display()));
    std::fs::create_dir_all(&options.work_dir)?;

    let manager = WorkspaceManager::open(options)?;

    println!("Creating stack 'dev'...");
    let dev = manager.create_stack("dev")?;
    println!("  Created: {} (current: {})\n", dev.name, dev.current);

    manager.set_config("dev", "region", ConfigValue::new("us-west-2"), false)?;
    manager.set_config("dev", "db.password", ConfigValue::secret("s3cr3t"), true)?;
    manager.set_tag("dev", "owner", "platform")?;

    println!("Config for 'dev':");
    for (key, value) in manager.get_all_config("dev")? {
        println!("  {} = {:?}", key, value);
    }
    println!();

    println!("Exporting 'dev' and importing into 'dev2'...");
    let state = manager.export_stack("dev")?;
    manager.create_stack("dev2")?;
    manager.import_stack("dev2", &state)?;

    let region = manager.get_config("dev2", "region", false)?;
    println!("  dev2 region = {}\n", region.value);

    println!("Stacks:");
    for stack in manager.list_stacks(false)? {
        println!(
            "  - {} [{}]",
            stack.name,
            if stack.current { "CURRENT" } else { "-" }
        );
    }
    println!();

    println!("Cleaning up...");
    for name in ["dev", "dev2"] {
        manager.remove_stack(
            name,
            RemoveOptions {
                force: true,
                preserve_config: false,
            },
        )?;
    }

    println!("\n=== Round-trip Complete ===");
    Ok(())
}
