//! Binary entrypoint for the Lodestone CLI.
//!
//! Commands:
//! - `init` - create a starter `lodestone.toml`
//! - `validate` - load the config, build the registry, report issues
//! - `progress <player> [--resource <key>]` - show progress and level status
//! - `set <player> <resource> <value>` - administrative counter overwrite
//! - `reset <player> [--resource <key>]` - clear progress and claims
//! - `claim <player> <resource> <level>` - claim a reached level
//! - `export <player>` - dump a player's state record as JSON
//!
//! See the library crate docs for module-level details: `lodestone::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::warn;

use lodestone::config::Config;
use lodestone::milestone::{ClaimOutcome, LevelStatus, MilestoneEngine, MilestoneRegistry};
use lodestone::storage::SledGateway;

#[derive(Parser)]
#[command(name = "lodestone")]
#[command(about = "Milestone progress and claim engine for resource-gathering game servers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "lodestone.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter configuration file
    Init,
    /// Load the configuration and report milestone registry issues
    Validate,
    /// Show a player's progress and level statuses
    Progress {
        player: String,
        /// Limit output to one resource
        #[arg(short, long)]
        resource: Option<String>,
    },
    /// Administratively overwrite one raw counter
    Set {
        player: String,
        resource: String,
        value: u64,
    },
    /// Clear a player's progress and claims (one resource, or everything)
    Reset {
        player: String,
        #[arg(short, long)]
        resource: Option<String>,
    },
    /// Claim a reached milestone level on behalf of a player
    Claim {
        player: String,
        resource: String,
        level: u32,
    },
    /// Dump a player's state record as JSON
    Export { player: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (except for Init, which writes
    // the starter file later).
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    if let Commands::Init = cli.command {
        Config::create_default(&cli.config).await?;
        println!("Wrote starter configuration to {}", cli.config);
        println!("Edit the [milestones] sections, then run `lodestone validate`.");
        return Ok(());
    }

    // Re-load on miss so the user sees the real load error, not the cached
    // silence from the logging bootstrap.
    let config = match pre_config {
        Some(config) => config,
        None => Config::load(&cli.config).await?,
    };

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Validate => {
            let (registry, issues) = MilestoneRegistry::load(&config);
            let resources = registry.resources();
            println!(
                "{} tracked resource(s): {}",
                resources.len(),
                resources.join(", ")
            );
            for resource in &resources {
                if let Some(group) = registry.group_name(resource) {
                    println!("  {resource} -> group {group}");
                }
            }
            if issues.is_empty() {
                println!("Configuration OK");
            } else {
                println!("{} issue(s):", issues.len());
                for issue in &issues {
                    println!("  - {issue}");
                }
            }
        }
        Commands::Progress { player, resource } => {
            let engine = open_engine(&config)?;
            show_progress(&engine, &player, resource.as_deref()).await?;
        }
        Commands::Set {
            player,
            resource,
            value,
        } => {
            let engine = open_engine(&config)?;
            match engine.set_progress(&player, &resource, value).await? {
                Some(receipt) => {
                    println!(
                        "Set {resource} for {player} to {value} (aggregate {})",
                        receipt.new_aggregate
                    );
                    for crossed in &receipt.crossed {
                        println!(
                            "  crossed {} level {} (threshold {}); on-cross actions suppressed for admin set",
                            crossed.resource, crossed.level, crossed.threshold
                        );
                    }
                }
                None => println!("{resource} is not a tracked resource; nothing set"),
            }
        }
        Commands::Reset { player, resource } => {
            let engine = open_engine(&config)?;
            match resource {
                Some(resource) => {
                    engine.reset_resource(&player, &resource).await?;
                    println!("Reset {resource} progress and claims for {player}");
                }
                None => {
                    engine.reset_player(&player).await?;
                    println!("Reset all milestone progress and claims for {player}");
                }
            }
        }
        Commands::Claim {
            player,
            resource,
            level,
        } => {
            let engine = open_engine(&config)?;
            match engine.claim(&player, &resource, level).await? {
                ClaimOutcome::Success(claimed) => println!(
                    "Claimed {} level {} for {player} (aggregate {})",
                    claimed.resource, claimed.level, claimed.aggregate
                ),
                ClaimOutcome::AlreadyClaimed => {
                    println!("Level already claimed; nothing to do")
                }
                ClaimOutcome::NotReached {
                    aggregate,
                    threshold,
                } => println!("Not reached yet: {aggregate}/{threshold}"),
                ClaimOutcome::PersistFailed => {
                    println!("Something went wrong saving the claim; try again")
                }
            }
        }
        Commands::Export { player } => {
            let engine = open_engine(&config)?;
            let state = engine.state(&player).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

fn open_engine(config: &Config) -> Result<MilestoneEngine> {
    let (registry, issues) = MilestoneRegistry::load(config);
    if !issues.is_empty() {
        warn!(
            "{} milestone config issue(s); run `lodestone validate` for details",
            issues.len()
        );
    }
    let gateway = Arc::new(SledGateway::open(&config.storage.data_dir)?);
    Ok(MilestoneEngine::new(registry, gateway)
        .with_announcements(config.engine.announce_crossings))
}

async fn show_progress(
    engine: &MilestoneEngine,
    player: &str,
    resource: Option<&str>,
) -> Result<()> {
    let registry = engine.registry();
    let resources: Vec<String> = match resource {
        Some(resource) => vec![resource.to_string()],
        None => registry
            .resources()
            .iter()
            .map(|r| r.to_string())
            .collect(),
    };
    for resource in &resources {
        let raw = engine.raw(player, resource).await?;
        let aggregate = engine.aggregate(player, resource).await?;
        let group = registry
            .group_name(resource)
            .map(|g| format!(" (group: {g})"))
            .unwrap_or_default();
        println!("{resource}{group}: raw {raw}, aggregate {aggregate}");
        for (level, status) in engine.level_statuses(player, resource).await? {
            let marker = match status {
                LevelStatus::Claimed => "[x]",
                LevelStatus::Reached => "[~]",
                LevelStatus::NotReached => "[ ]",
            };
            let name = level
                .display
                .clone()
                .unwrap_or_else(|| format!("level {}", level.level));
            println!("  {marker} {name} @ {}", level.threshold);
        }
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
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
            let sink = std::sync::Arc::new(std::sync::Mutex::new(f));
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = sink.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                writeln!(fmt, "{}", line)
            });
        }
    }
    let _ = builder.try_init();
}
