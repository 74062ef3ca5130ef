//! Strata Server Binary
//!
//! Serves the workspace in the current directory.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let cwd = std::env::current_dir()?;
    let options = strata_core::load_options(&cwd)?;
    let manager = strata_core::WorkspaceManager::open(options)?;

    strata_server::run_server(manager, port).await
}
