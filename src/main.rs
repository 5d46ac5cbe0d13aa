use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use cohost::chat::{ChatSource, LineChatSource, SilentChatSource};
use cohost::cli::{Cli, Commands, ConfigAction, FactsAction};
use cohost::config::Config;
use cohost::error::CohostError;
use cohost::engine::Engine;
use cohost::memory::FactStore;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Run {
            url,
            stdin_chat,
            cooldown,
            restart_backoff,
            dry_run,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(url) = url {
                config.stream.url = url;
            }
            if let Some(secs) = cooldown {
                config.conversation.cooldown_secs = secs;
            }
            if let Some(secs) = restart_backoff {
                config.stream.restart_backoff_secs = secs;
            }
            if dry_run {
                config.stream.disable_notifications = true;
            }
            run(config, stdin_chat).await?;
        }
        Commands::Facts { action } => {
            let config = load_config(cli.config.as_deref())?;
            handle_facts_command(action, &config)?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "cohost", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Initialise the `log` backend. `RUST_LOG` wins over the flags.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

async fn run(config: Config, stdin_chat: bool) -> Result<()> {
    let chat: Arc<dyn ChatSource> = if stdin_chat {
        Arc::new(LineChatSource::stdin())
    } else {
        Arc::new(SilentChatSource)
    };

    let engine = Engine::from_config(&config, chat).context("Failed to start")?;
    info!("cohost {} starting", cohost::version_string());

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
            }
            shutdown.cancel();
        });
    }

    engine.run(shutdown).await;
    Ok(())
}

fn handle_facts_command(action: FactsAction, config: &Config) -> Result<()> {
    let store = FactStore::open(config.memory.facts_path.clone())
        .with_context(|| format!("Failed to open {}", config.memory.facts_path.display()))?;

    match action {
        FactsAction::List => {
            print!("{}", store.format());
        }
        FactsAction::Add { facts } => {
            let added = store.add(&facts)?;
            println!("Added {} fact(s), {} total", added, store.len());
        }
        FactsAction::Remove { positions } => {
            let indices = positions
                .iter()
                .map(|&p| usize::try_from(p - 1))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let removed = store.remove_by_index(&indices)?;
            for fact in removed {
                println!("Removed: {}", fact);
            }
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<PathBuf>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path.as_deref())?;
            print!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        ConfigAction::Path => {
            let path = custom_path.unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Load config from the given path, or the default path if it exists.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        if !path.exists() {
            return Err(CohostError::ConfigFileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}
