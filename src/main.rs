//! Binary entrypoint for the questline CLI.
//!
//! Commands:
//! - `run` - run the engine loop: static event schedule, autosave, backups
//! - `init` - create a starter `questline.toml` and an example package
//! - `check` - load every package and report what compiled
//! - `talk <conversation>` - walk a conversation graph from the terminal
//! - `backup <create|list|prune>` - manage database snapshots
//!
//! See the library crate docs for module-level details: `questline::`.
use std::path::Path;

use anyhow::Result;
use chrono::Timelike;
use clap::{Parser, Subcommand};
use log::{info, warn};

use questline::config::Config;
use questline::quest::backup::{BackupManager, SnapshotKind};
use questline::quest::{ConsoleServer, Happening, QuestEngine, QuestStore};

#[derive(Parser)]
#[command(name = "questline")]
#[command(about = "A rule-driven quest engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "questline.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine loop
    Run,
    /// Initialize a new configuration and example package
    Init,
    /// Load all packages and report diagnostics
    Check,
    /// Walk a conversation from the terminal
    Talk {
        /// Qualified conversation id, e.g. default.innkeeper
        conversation: String,
        /// Player name to converse as
        #[arg(short, long, default_value = "console")]
        player: String,
    },
    /// Manage database snapshots
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Create a manual snapshot
    Create,
    /// List snapshots, newest first
    List,
    /// Delete automatic snapshots beyond the retention count
    Prune,
    /// Restore a snapshot into a directory
    Restore {
        id: String,
        #[arg(short, long)]
        target: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Run => {
            let config = resolve_config(pre_config, &cli.config).await?;
            info!("Starting questline v{}", env!("CARGO_PKG_VERSION"));
            run_engine(config).await?;
        }
        Commands::Init => {
            info!("Initializing new questline configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            let config = Config::load(&cli.config).await?;
            write_example_package(&config.engine.packages_dir).await?;
            info!(
                "Example package created under {}/default",
                config.engine.packages_dir
            );
        }
        Commands::Check => {
            let config = resolve_config(pre_config, &cli.config).await?;
            let mut engine = open_engine(&config)?;
            engine.load_packs(Path::new(&config.engine.packages_dir))?;
            for pack in engine.packs().packages() {
                println!(
                    "{}: {} conditions, {} events, {} objectives, {} conversations",
                    pack.name,
                    pack.conditions.len(),
                    pack.events.len(),
                    pack.objectives.len(),
                    pack.conversations.len()
                );
            }
        }
        Commands::Talk {
            conversation,
            player,
        } => {
            let config = resolve_config(pre_config, &cli.config).await?;
            let mut engine = open_engine(&config)?;
            engine.load_packs(Path::new(&config.engine.packages_dir))?;
            engine.player_join(&player)?;
            talk(&mut engine, &player, &conversation)?;
            engine.player_leave(&player)?;
        }
        Commands::Backup { action } => {
            let config = resolve_config(pre_config, &cli.config).await?;
            let mut manager = BackupManager::new(
                config.storage.data_dir.clone().into(),
                config.storage.backup_dir.clone().into(),
                config.storage.backup_keep,
            )?;
            match action {
                BackupAction::Create => {
                    let snapshot = manager.create(SnapshotKind::Manual)?;
                    println!("Created {} ({} bytes)", snapshot.id, snapshot.size_bytes);
                }
                BackupAction::List => {
                    for snapshot in manager.list() {
                        println!(
                            "{}  {:?}  {}  {} bytes",
                            snapshot.id,
                            snapshot.kind,
                            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                            snapshot.size_bytes
                        );
                    }
                }
                BackupAction::Prune => {
                    let pruned = manager.prune()?;
                    println!("Pruned {} snapshots", pruned.len());
                }
                BackupAction::Restore { id, target } => {
                    manager.restore(&id, Path::new(&target))?;
                    println!("Restored {} to {}", id, target);
                }
            }
        }
    }

    Ok(())
}

/// Reuse the config already loaded for logging setup; read the file only
/// when that load did not happen.
async fn resolve_config(pre: Option<Config>, path: &str) -> Result<Config> {
    match pre {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

fn open_engine(config: &Config) -> Result<QuestEngine> {
    let store = QuestStore::open(&config.storage.data_dir)?;
    Ok(QuestEngine::new(Box::new(ConsoleServer), store))
}

/// The standalone engine loop: a minute tick drives delay objectives and
/// the hourly static event schedule; autosave and backups run on their
/// configured cadence. Ctrl-C saves everyone and exits.
async fn run_engine(config: Config) -> Result<()> {
    use tokio::time::{interval, Duration};

    let mut engine = open_engine(&config)?;
    engine.load_packs(Path::new(&config.engine.packages_dir))?;

    let mut backups = if config.storage.backup_interval_hours > 0 {
        Some(BackupManager::new(
            config.storage.data_dir.clone().into(),
            config.storage.backup_dir.clone().into(),
            config.storage.backup_keep,
        )?)
    } else {
        None
    };

    let mut minute = interval(Duration::from_secs(60));
    let mut autosave = interval(Duration::from_secs(
        60 * u64::from(config.engine.autosave_minutes.max(1)),
    ));
    let mut backup_tick = interval(Duration::from_secs(
        3600 * u64::from(config.storage.backup_interval_hours.max(1)),
    ));
    // The first tick of a tokio interval fires immediately; swallow it so
    // startup does not immediately snapshot and save.
    minute.tick().await;
    autosave.tick().await;
    backup_tick.tick().await;

    let mut last_hour: Option<u8> = None;
    loop {
        tokio::select! {
            _ = minute.tick() => {
                let now = chrono::Utc::now();
                let ids: Vec<String> = engine.store().list_player_ids()?;
                for id in ids {
                    if engine.player_record(&id).is_some() {
                        engine.handle_happening(&id, &Happening::Tick { now });
                    }
                }
                let hour = now.hour() as u8;
                if last_hour != Some(hour) {
                    last_hour = Some(hour);
                    engine.run_static_events(hour);
                }
            }
            _ = autosave.tick() => {
                if config.engine.autosave_minutes > 0 {
                    if let Err(e) = engine.save_all() {
                        warn!("Autosave failed: {}", e);
                    }
                }
            }
            _ = backup_tick.tick() => {
                if let Some(manager) = backups.as_mut() {
                    match manager.create(SnapshotKind::Automatic) {
                        Ok(_) => {
                            if let Err(e) = manager.prune() {
                                warn!("Snapshot pruning failed: {}", e);
                            }
                        }
                        Err(e) => warn!("Scheduled backup failed: {}", e),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down, saving players");
                engine.save_all()?;
                break;
            }
        }
    }
    Ok(())
}

/// Interactive conversation loop. The engine prints NPC lines and the
/// numbered menu through [`ConsoleServer`]; we read choices from stdin.
fn talk(engine: &mut QuestEngine, player: &str, conversation: &str) -> Result<()> {
    use std::io::{BufRead, Write};

    let turn = engine.start_conversation(player, conversation)?;
    if turn.is_none() {
        println!("(nothing to talk about)");
        return Ok(());
    }
    let stdin = std::io::stdin();
    while engine.in_conversation(player) {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            engine.cancel_conversation(player);
            break;
        }
        let input = line.trim();
        if input.eq_ignore_ascii_case("quit") {
            engine.cancel_conversation(player);
            break;
        }
        let Ok(choice) = input.parse::<usize>() else {
            println!("Enter a menu number, or quit.");
            continue;
        };
        match engine.select_option(player, choice) {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}

async fn write_example_package(packages_dir: &str) -> Result<()> {
    let dir = Path::new(packages_dir).join("default");
    tokio::fs::create_dir_all(dir.join("conversations")).await?;
    tokio::fs::write(
        dir.join("conditions.toml"),
        concat!(
            "has_axe = 'item axe'\n",
            "started_wood = 'tag wood_started'\n",
        ),
    )
    .await?;
    tokio::fs::write(
        dir.join("events.toml"),
        concat!(
            "start_wood = 'folder give_axe,mark_started,wood_objective'\n",
            "give_axe = 'give axe:1'\n",
            "mark_started = 'tag add wood_started'\n",
            "wood_objective = 'objective block LOG:-10 events:wood_done label:wood'\n",
            "wood_done = 'folder reward,mark_done'\n",
            "reward = 'give emerald:5'\n",
            "mark_done = 'tag del wood_started'\n",
        ),
    )
    .await?;
    tokio::fs::write(dir.join("main.toml"), "[objectives]\n").await?;
    tokio::fs::write(
        dir.join("conversations").join("woodcutter.json"),
        serde_json::to_string_pretty(&serde_json::json!({
            "quester": "Woodcutter",
            "first": "busy,greet",
            "npc_options": {
                "busy": {
                    "text": "Those logs will not cut themselves. Off you go!",
                    "conditions": "started_wood"
                },
                "greet": {
                    "text": "I could use a hand cutting wood. Interested?",
                    "pointers": "accept,decline"
                },
                "thanks": {
                    "text": "Take this axe. Ten logs should do."
                }
            },
            "player_options": {
                "accept": {
                    "text": "Sure, I can help.",
                    "events": "start_wood",
                    "pointers": "thanks"
                },
                "decline": {
                    "text": "Not today."
                }
            }
        }))?,
    )
    .await?;
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => match config.as_ref().map(|c| c.logging.level.as_str()) {
            Some("error") => log::LevelFilter::Error,
            Some("warn") => log::LevelFilter::Warn,
            Some("debug") => log::LevelFilter::Debug,
            Some("trace") => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        },
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    if let Some(file) = config.as_ref().and_then(|c| c.logging.file.clone()) {
        if let Ok(f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
        {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // When stdout is a terminal, echo log lines there as well.
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
            let _ = builder.try_init();
            return;
        }
    }
    builder.format(|fmt, record| {
        writeln!(
            fmt,
            "{} [{}] {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            record.level(),
            record.args()
        )
    });
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preloaded_config_is_not_read_again() {
        // With a config in hand the path is never touched, so a missing
        // file cannot fail the command.
        let config = resolve_config(Some(Config::default()), "/nonexistent/questline.toml")
            .await
            .unwrap();
        assert_eq!(config.engine.packages_dir, "./packages");
    }

    #[tokio::test]
    async fn missing_config_still_errors_when_needed() {
        assert!(resolve_config(None, "/nonexistent/questline.toml")
            .await
            .is_err());
    }
}
