//! Binary entrypoint for the mudcore CLI.
//!
//! Commands:
//! - `start` - open the world, run the tick and accept TCP sessions
//! - `init` - write a starter `config.toml` and seed the world store
//! - `status` - print world, character and metric summaries
//! - `simulate [--ticks N] [--seed S]` - run the world tick headless
//!
//! See the library crate docs for module-level details: `mudcore::`.
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use mudcore::config::Config;
use mudcore::mud::room::lock_room;
use mudcore::mud::seed::import_creatures;
use mudcore::mud::{
    run_tick_loop, run_world_tick, GameContext, MessageLog, MudStore, RandRoller, Roller, World,
};
use mudcore::server::{MudServer, SessionHub};

#[derive(Parser)]
#[command(name = "mudcore")]
#[command(about = "Combat and world-tick engine for a text MUD")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the game server
    Start {
        /// Override the configured bind address
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration and seed the world store
    Init,
    /// Show world and character statistics
    Status,
    /// Run the world tick without any sessions attached
    Simulate {
        /// Number of ticks to run
        #[arg(short, long, default_value_t = 10)]
        ticks: u32,
        /// Seed the dice for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
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
        Commands::Start { bind } => {
            let mut config = load_config(pre_config, &cli.config).await?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            info!("Starting mudcore v{}", env!("CARGO_PKG_VERSION"));

            let store = Arc::new(open_store(&config)?);
            let world = Arc::new(World::from_store(&store, Instant::now())?);
            let hub = Arc::new(SessionHub::new());
            let ctx = Arc::new(GameContext::new(
                world,
                store,
                hub.clone(),
                Box::new(RandRoller::from_entropy()),
                config.game.clone(),
            ));

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let tick = tokio::spawn(run_tick_loop(ctx.clone(), shutdown_rx.clone()));
            let server = MudServer::bind(ctx.clone(), hub, config.server.clone()).await?;
            let serving = tokio::spawn(server.run(shutdown_rx));

            tokio::signal::ctrl_c().await?;
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            if let Err(e) = tick.await {
                warn!("World tick task ended abnormally: {}", e);
            }
            match serving.await {
                Ok(Err(e)) => warn!("Server stopped with error: {}", e),
                Err(e) => warn!("Server task ended abnormally: {}", e),
                Ok(Ok(())) => {}
            }
            let saved = ctx.save_all();
            info!("Saved {} character(s); goodbye", saved);
        }
        Commands::Init => {
            info!("Initializing new mudcore configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            let cfg = Config::load(&cli.config).await?;

            let store = open_store(&cfg)?;
            let rooms = store.list_rooms()?.len();
            let templates = store.list_creature_templates()?.len();
            info!(
                "World store ready at {} ({} rooms, {} creature templates)",
                cfg.storage.world_path().display(),
                rooms,
                templates
            );
        }
        Commands::Status => {
            let config = load_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let rooms = store.list_rooms()?;
            let characters = store.list_character_names()?;
            println!("mudcore v{}", env!("CARGO_PKG_VERSION"));
            println!("Store: {}", config.storage.world_path().display());
            println!("Rooms: {}", rooms.len());
            for room in &rooms {
                let spawns: u32 = room.spawns.iter().map(|s| s.count).sum();
                let tag = if room.safe { " (safe)" } else { "" };
                println!("  {:<16} {}{} - {} spawn(s)", room.id, room.name, tag, spawns);
            }
            println!("Creature templates: {}", store.list_creature_templates()?.len());
            println!("Characters: {}", characters.len());
            for name in &characters {
                if let Ok(record) = store.get_character(name) {
                    println!(
                        "  {:<16} level {:>3} {:?} in {} ({} kills, {} deaths)",
                        record.display_name,
                        record.level,
                        record.class,
                        record.current_room,
                        record.kills.total(),
                        record.kills.deaths
                    );
                }
            }
        }
        Commands::Simulate { ticks, seed } => {
            let config = load_config(pre_config, &cli.config).await?;
            config.validate()?;
            let store = Arc::new(open_store(&config)?);
            let started = Instant::now();
            let world = Arc::new(World::from_store(&store, started)?);
            let dice: Box<dyn Roller> = match seed {
                Some(seed) => Box::new(RandRoller::seeded(seed)),
                None => Box::new(RandRoller::from_entropy()),
            };
            let log = Arc::new(MessageLog::new());
            let ctx = GameContext::new(world, store, log.clone(), dice, config.game.clone());

            // Simulated time advances one tick interval per pass.
            let step = config.game.tick_interval().max(Duration::from_millis(1));
            for n in 0..ticks {
                let now = started + step * n;
                let report = run_world_tick(&ctx, now);
                println!(
                    "tick {:>4}: rooms {} engagements {} attacks {} kills {} spawned {}",
                    n + 1,
                    report.rooms_visited,
                    report.engagements,
                    report.attacks,
                    report.kills,
                    report.spawned
                );
            }
            for handle in ctx.world().rooms() {
                let room = lock_room(&handle);
                println!("{}: {} creature(s)", room.id, room.creatures().count());
            }
            let snapshot = mudcore::metrics::snapshot();
            println!(
                "attacks {} hits {} misses {} kills {} flights {} (messages {})",
                snapshot.attacks,
                snapshot.hits,
                snapshot.misses,
                snapshot.creature_kills,
                snapshot.flights,
                log.deliveries().len()
            );
        }
    }

    Ok(())
}

async fn load_config(pre: Option<Config>, path: &str) -> Result<Config> {
    match pre {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

fn open_store(config: &Config) -> Result<MudStore> {
    let store = MudStore::open(config.storage.world_path())
        .map_err(|e| anyhow!("Failed to open world store: {}", e))?;
    if let Some(seed_file) = &config.storage.seed_file {
        import_creatures(&store, seed_file)?;
    }
    Ok(store)
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when attached to a terminal.
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
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
