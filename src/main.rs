//! Strata - stack configuration and deployment state
//!
//! Entry point for the `strata` command. Every subcommand opens the
//! workspace in `--cwd` (default: current directory) and drives it through
//! [`WorkspaceManager`].

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use strata_core::{
    load_options, ConfigMap, ConfigValue, RemoveOptions, StateCodec, WorkspaceManager,
};

#[derive(Parser)]
#[command(name = "strata", version, about = "Stack configuration and deployment state")]
struct Cli {
    /// Work dir holding Strata.toml
    #[arg(long, global = true)]
    cwd: Option<PathBuf>,

    /// Stack to operate on (default: the selected stack)
    #[arg(long, short = 's', global = true)]
    stack: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage stacks
    #[command(subcommand)]
    Stack(StackCommand),

    /// Manage stack configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Manage stack tags
    #[command(subcommand)]
    Tag(TagCommand),

    /// Import and export deployment state
    #[command(subcommand)]
    State(StateCommand),

    /// Print a sample .strata.toml
    SampleConfig,

    /// Serve the workspace over HTTP
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum StackCommand {
    /// Create a stack and select it
    Init { name: String },
    /// Select a stack
    Select { name: String },
    /// Remove a stack
    Rm {
        name: String,
        /// Remove even with unapplied edits or recorded resources
        #[arg(long, short = 'f')]
        force: bool,
        /// Keep the stack's settings file
        #[arg(long)]
        preserve_config: bool,
    },
    /// List stacks
    Ls {
        /// Include stacks from every project in the backend
        #[arg(long, short = 'a')]
        all: bool,
    },
    /// Show the stack's outputs
    Output {
        #[arg(long)]
        show_secrets: bool,
    },
}

#[derive(Args)]
struct PathFlag {
    /// Treat the key as a path into a structured value
    #[arg(long)]
    path: bool,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print one value
    Get {
        key: String,
        #[command(flatten)]
        path: PathFlag,
    },
    /// Set one value
    Set {
        key: String,
        value: String,
        /// Encrypt the value
        #[arg(long)]
        secret: bool,
        #[command(flatten)]
        path: PathFlag,
    },
    /// Set several `key=value` pairs at once
    SetAll {
        pairs: Vec<String>,
        #[command(flatten)]
        path: PathFlag,
    },
    /// Remove one or more keys
    Rm {
        keys: Vec<String>,
        #[command(flatten)]
        path: PathFlag,
    },
    /// List the working config
    Ls {
        #[arg(long)]
        show_secrets: bool,
    },
    /// Discard local edits in favour of the last applied config
    Refresh,
}

#[derive(Subcommand)]
enum TagCommand {
    Get { key: String },
    Set { key: String, value: String },
    Rm { key: String },
    Ls,
}

#[derive(Subcommand)]
enum StateCommand {
    /// Write the stack's deployment to a file (default: stdout)
    Export {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Replace the stack's deployment with a file (`-` for stdin)
    Import {
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::SampleConfig = cli.command {
        print!("{}", strata_core::config::sample_config());
        return Ok(());
    }

    let work_dir = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let options = load_options(&work_dir)
        .with_context(|| format!("loading options for {}", work_dir.display()))?;
    let manager = WorkspaceManager::open(options)?;

    match cli.command {
        Command::Stack(cmd) => run_stack(&manager, cli.stack, cmd),
        Command::Config(cmd) => run_config(&manager, &current_stack(&manager, cli.stack)?, cmd),
        Command::Tag(cmd) => run_tag(&manager, &current_stack(&manager, cli.stack)?, cmd),
        Command::State(cmd) => run_state(&manager, &current_stack(&manager, cli.stack)?, cmd),
        Command::SampleConfig => Ok(()),
        #[cfg(feature = "web")]
        Command::Serve { port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(strata_server::run_server(manager, port))
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "strata_core=debug" } else { "strata_core=warn" };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// `--stack`, or the selected stack
fn current_stack(manager: &WorkspaceManager, stack: Option<String>) -> Result<String> {
    if let Some(stack) = stack {
        return Ok(stack);
    }
    match manager.stack()? {
        Some(summary) => Ok(summary.name),
        None => bail!("no stack selected; run `strata stack select <name>` or pass --stack"),
    }
}

// ========== Stack ==========

fn run_stack(manager: &WorkspaceManager, stack: Option<String>, cmd: StackCommand) -> Result<()> {
    match cmd {
        StackCommand::Init { name } => {
            manager.create_stack(&name)?;
            println!("Created stack '{}'", name);
        }
        StackCommand::Select { name } => manager.select_stack(&name)?,
        StackCommand::Rm {
            name,
            force,
            preserve_config,
        } => {
            manager.remove_stack(
                &name,
                RemoveOptions {
                    force,
                    preserve_config,
                },
            )?;
            println!("Removed stack '{}'", name);
        }
        StackCommand::Ls { all } => {
            for summary in manager.list_stacks(all)? {
                let marker = if summary.current { "*" } else { " " };
                let resources = summary
                    .resource_count
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{} {:<30} {:>6}", marker, summary.name, resources);
            }
        }
        StackCommand::Output { show_secrets } => {
            let stack = current_stack(manager, stack)?;
            for (name, output) in manager.stack_outputs(&stack)? {
                if output.secret && !show_secrets {
                    println!("{:<30} [secret]", name);
                } else {
                    println!("{:<30} {}", name, output.value);
                }
            }
        }
    }
    Ok(())
}

// ========== Config ==========

fn run_config(manager: &WorkspaceManager, stack: &str, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Get { key, path } => {
            println!("{}", manager.get_config(stack, &key, path.path)?.value);
        }
        ConfigCommand::Set {
            key,
            value,
            secret,
            path,
        } => {
            let value = if secret {
                ConfigValue::secret(value)
            } else {
                ConfigValue::new(value)
            };
            manager.set_config(stack, &key, value, path.path)?;
        }
        ConfigCommand::SetAll { pairs, path } => {
            let mut values = ConfigMap::new();
            for pair in pairs {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("expected key=value, got '{}'", pair);
                };
                values.insert(key.to_string(), ConfigValue::new(value));
            }
            manager.set_all_config(stack, &values, path.path)?;
        }
        ConfigCommand::Rm { keys, path } => match keys.as_slice() {
            [key] => manager.remove_config(stack, key, path.path)?,
            _ => manager.remove_all_config(stack, &keys, path.path)?,
        },
        ConfigCommand::Ls { show_secrets } => {
            print_config(&manager.get_all_config(stack)?, show_secrets);
        }
        ConfigCommand::Refresh => {
            print_config(&manager.refresh_config(stack)?, false);
        }
    }
    Ok(())
}

fn print_config(config: &ConfigMap, show_secrets: bool) {
    for (key, value) in config {
        if value.secret && !show_secrets {
            println!("{:<30} [secret]", key);
        } else {
            println!("{:<30} {}", key, value.value);
        }
    }
}

// ========== Tags ==========

fn run_tag(manager: &WorkspaceManager, stack: &str, cmd: TagCommand) -> Result<()> {
    match cmd {
        TagCommand::Get { key } => println!("{}", manager.get_tag(stack, &key)?),
        TagCommand::Set { key, value } => manager.set_tag(stack, &key, &value)?,
        TagCommand::Rm { key } => manager.remove_tag(stack, &key)?,
        TagCommand::Ls => {
            for (key, value) in manager.list_tags(stack)? {
                println!("{:<30} {}", key, value);
            }
        }
    }
    Ok(())
}

// ========== State ==========

fn run_state(manager: &WorkspaceManager, stack: &str, cmd: StateCommand) -> Result<()> {
    match cmd {
        StateCommand::Export { file } => {
            let bytes = StateCodec::encode(&manager.export_stack(stack)?)?;
            match file {
                Some(file) => std::fs::write(&file, &bytes)
                    .with_context(|| format!("writing {}", file.display()))?,
                None => println!("{}", String::from_utf8_lossy(&bytes)),
            }
        }
        StateCommand::Import { file } => {
            let bytes = if file.as_os_str() == "-" {
                let mut buf = Vec::new();
                std::io::stdin().read_to_end(&mut buf)?;
                buf
            } else {
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?
            };
            manager.import_stack_document(stack, &bytes)?;
            println!("Imported state into '{}'", stack);
        }
    }
    Ok(())
}
