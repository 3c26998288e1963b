use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kfn_core::definition::canonical_key_path;
use kfn_core::resolver::IDENTITY_PROMPT;
use kfn_core::{DefinitionResolver, DefinitionStore, KfnConfig, SinkRegistry, SourceArtifact, UserInterface};
use kfn_lifecycle::{CALL_DATA_PROMPT, Commands, LifecycleManager};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

mod terminal;

use terminal::{TerminalInterface, TerminalWriter};

#[derive(Parser)]
#[command(name = "kfn", about = "kfn: deploy, invoke and tail Kubeless functions from source files")]
struct Cli {
    /// Config file (default: ./kfn.toml, then ~/.config/kfn/kfn.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project root holding the function store (default: current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Target {
    /// Source file of the function
    file: PathBuf,

    /// Language tag, when the extension does not tell
    #[arg(long)]
    language: Option<String>,

    /// Function name, used instead of prompting
    #[arg(long)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy (or update) the function behind a source file
    Deploy(Target),
    /// Call the function behind a source file
    Invoke {
        #[command(flatten)]
        target: Target,
        /// Call data or a file containing it, used instead of prompting
        #[arg(long)]
        data: Option<String>,
    },
    /// Follow the function's logs until Ctrl+C
    Logs(Target),
    /// Remove the function from the platform, keeping the local record
    Delete(Target),
    /// List recorded functions
    List,
    /// Drop the local record for a source file
    Forget {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Sinks own stdout
    fmt()
        .with_env_filter(EnvFilter::from_env("KFN_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let project_root = match cli.project {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let (config, config_path) = KfnConfig::discover(cli.config.as_deref(), &project_root)?;
    tracing::debug!(
        project = %project_root.display(),
        config = ?config_path,
        provider = ?config.platform.provider,
        "Configuration loaded"
    );

    let store = Arc::new(DefinitionStore::in_project(&project_root, &config.store.dir));

    match cli.command {
        Command::List => list(&store).await,
        Command::Forget { file } => forget(&store, file).await,
        Command::Deploy(target) => run(config, store, target, None, Op::Deploy).await,
        Command::Invoke { target, data } => run(config, store, target, data, Op::Invoke).await,
        Command::Logs(target) => run(config, store, target, None, Op::Logs).await,
        Command::Delete(target) => run(config, store, target, None, Op::Delete).await,
    }
}

enum Op {
    Deploy,
    Invoke,
    Logs,
    Delete,
}

async fn run(
    config: KfnConfig,
    store: Arc<DefinitionStore>,
    target: Target,
    data: Option<String>,
    op: Op,
) -> Result<ExitCode> {
    let ui = Arc::new(TerminalInterface::new([
        (IDENTITY_PROMPT, target.name),
        (CALL_DATA_PROMPT, data),
    ]));

    let artifact = match SourceArtifact::load(&target.file, target.language.as_deref()).await {
        Ok(artifact) => artifact,
        Err(e) => {
            ui.show_error(&e.to_string());
            return Ok(ExitCode::FAILURE);
        }
    };

    let platform = kfn_platform::build_platform(&config.platform)?;
    let sinks = Arc::new(SinkRegistry::with_writer(Arc::new(TerminalWriter::default())));
    let resolver = DefinitionResolver::new(store, ui.clone(), config.platform.clone());
    let lifecycle = LifecycleManager::new(platform, sinks, ui.clone(), config.platform.namespace.clone());
    let commands = Commands::new(resolver, lifecycle, ui.clone());

    match op {
        Op::Deploy => commands.resolve_and_deploy(&artifact).await,
        Op::Invoke => commands.resolve_and_invoke(&artifact).await,
        Op::Delete => commands.resolve_and_delete(&artifact).await,
        Op::Logs => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::debug!("Interrupted, stopping log tail");
                    on_interrupt.cancel();
                }
            });
            commands.resolve_and_fetch_logs(&artifact, cancel).await;
        }
    }

    Ok(if ui.had_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn list(store: &DefinitionStore) -> Result<ExitCode> {
    let defs = store.list().await?;
    if defs.is_empty() {
        eprintln!("No functions recorded in {}", store.path().display());
    }
    for def in defs {
        let id = if def.is_identified() { def.id.as_str() } else { "-" };
        println!("{id}\t{}\t{}", def.runtime, def.source_artifact_key);
    }
    Ok(ExitCode::SUCCESS)
}

async fn forget(store: &DefinitionStore, file: PathBuf) -> Result<ExitCode> {
    // Same key as `SourceArtifact::load`; a file that no longer exists can
    // only be matched by its absolute spelling.
    let path = match canonical_key_path(&file).await {
        Ok(path) => path,
        Err(_) => std::path::absolute(&file).with_context(|| format!("invalid path {}", file.display()))?,
    };
    let key = path.to_string_lossy();
    if store.remove(&key).await? {
        eprintln!("Forgot {key}");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("error: no function recorded for {key}");
        Ok(ExitCode::FAILURE)
    }
}
