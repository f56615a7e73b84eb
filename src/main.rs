use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use pelotrs::config::AppConfig;
use pelotrs::course::ElevationProfile;
use pelotrs::database::RaceStore;
use pelotrs::display;
use pelotrs::driver::ReplayDriver;
use pelotrs::error::PelotrsError;
use pelotrs::import::ImportManager;
use pelotrs::logging::init_logging;
use pelotrs::models::{RaceRecord, RiderId};
use pelotrs::playback::PlaybackSpeed;
use pelotrs::session::{Metric, PlaybackCommand, PlaybackSession};
use pelotrs::units::{format_clock, parse_clock};
use pelotrs::StorageError;

/// pelotrs - Race Replay CLI
///
/// Replays recorded group rides and races: standings, group splits and
/// time gaps at any moment of the race.
#[derive(Parser)]
#[command(name = "pelotrs")]
#[command(author = "pelotrs contributors")]
#[command(version)]
#[command(about = "Cycling race replay CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Race database (overrides storage.database_path)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Where a race comes from: a file on disk or the race store
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct RaceSource {
    /// Race file (JSON or CSV)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Stored event id
    #[arg(short, long)]
    event: Option<String>,
}

/// Viewer selection shared by the inspection commands
#[derive(Args, Debug)]
struct ViewArgs {
    /// Race time (M:SS, H:MM:SS or seconds); defaults to the finish
    #[arg(short = 't', long)]
    at: Option<String>,

    /// Rider id to watch (defaults to the local user)
    #[arg(short, long)]
    watch: Option<RiderId>,

    /// Compare the watched rider against another rider
    #[arg(long, conflicts_with = "compare_group")]
    compare_rider: Option<RiderId>,

    /// Compare the watched rider against a group (1 = lead group)
    #[arg(long)]
    compare_group: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a race file into the race store
    Import {
        /// Input file path (JSON, CSV)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List stored races
    Races {
        /// Delete a stored race instead of listing
        #[arg(long, value_name = "EVENT")]
        delete: Option<String>,
    },

    /// Standings at a race time
    Standings {
        #[command(flatten)]
        source: RaceSource,

        #[command(flatten)]
        view: ViewArgs,

        /// Number of riders to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Groups on the road at a race time
    Groups {
        #[command(flatten)]
        source: RaceSource,

        #[command(flatten)]
        view: ViewArgs,

        /// Group numbers to list members for (1 = lead group)
        #[arg(short = 'x', long, value_delimiter = ',')]
        expand: Vec<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Gaps for the watched rider
    Gap {
        #[command(flatten)]
        source: RaceSource,

        #[command(flatten)]
        view: ViewArgs,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Telemetry of the watched rider and compare target up to a race time
    Chart {
        #[command(flatten)]
        source: RaceSource,

        #[command(flatten)]
        view: ViewArgs,

        /// Metric to chart (power, heart_rate, elevation, distance)
        #[arg(short, long, default_value = "power")]
        metric: Metric,

        /// Seconds between table rows
        #[arg(long, default_value = "60")]
        step: f64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Replay a race in the terminal
    Replay {
        #[command(flatten)]
        source: RaceSource,

        /// Playback speed (0.5, 1, 2, 5, 10, 30, 60)
        #[arg(short, long)]
        speed: Option<PlaybackSpeed>,

        /// Start time (M:SS, H:MM:SS or seconds)
        #[arg(long)]
        from: Option<String>,

        /// Rider id to watch (defaults to the local user)
        #[arg(short, long)]
        watch: Option<RiderId>,

        /// Print a full frame every N frames (0 = progress only)
        #[arg(long)]
        frames: Option<u32>,

        /// Standings rows per printed frame
        #[arg(long, default_value = "10")]
        top: usize,

        /// Reload the stored race while replaying (acquisition in progress)
        #[arg(long, requires = "event")]
        follow: bool,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let mut config = if config_path.exists() {
        AppConfig::load_from_file(&config_path)?
    } else if cli.config.is_some() {
        AppConfig::default()
    } else {
        AppConfig::load_or_default()
    };

    // Set up logging based on verbosity
    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    init_logging(&log_config)?;

    if cli.verbose > 0 {
        eprintln!("{}", format!("Log level: {}", log_config.level.to_filter()).dimmed());
    }

    if let Some(db) = &cli.db {
        config.storage.database_path = db.clone();
    }

    if let Err(err) = run(cli.command, &mut config, &config_path) {
        if let Some(pelotrs_error) = err.downcast_ref::<PelotrsError>() {
            let level = pelotrs_error.severity().to_tracing_level();
            debug!(?level, error = %pelotrs_error, "Command failed");
            eprintln!("{} {}", "Error:".red().bold(), pelotrs_error.user_message());
            std::process::exit(1);
        }
        return Err(err);
    }

    Ok(())
}

fn run(command: Commands, config: &mut AppConfig, config_path: &Path) -> Result<()> {
    match command {
        Commands::Import { file } => import_race(&file, config),

        Commands::Races { delete } => {
            let mut store = open_store(config)?;
            if let Some(event_id) = delete {
                if store.delete_race(&event_id).map_err(PelotrsError::from)? {
                    println!("{}", format!("✓ Deleted race {}", event_id).green());
                } else {
                    return Err(PelotrsError::from(StorageError::NotFound(event_id)).into());
                }
                return Ok(());
            }
            let races = store.list_races().map_err(PelotrsError::from)?;
            if races.is_empty() {
                println!("{}", "No stored races. Use `pelotrs import` first.".dimmed());
            } else {
                println!("{}", display::races_table(&races));
            }
            Ok(())
        }

        Commands::Standings {
            source,
            view,
            limit,
            json,
        } => {
            let race = load_race(&source, config)?;
            let session = build_session(&race, &view, config)?;
            let frame = session.view(&race);
            if json {
                println!("{}", serde_json::to_string_pretty(&frame.snapshot)?);
            } else {
                println!("{}", display::status_line(&frame));
                if let Some(summary) = display::watched_summary(&frame) {
                    println!("{}", summary);
                }
                println!("{}", display::standings_table(&frame, limit));
            }
            Ok(())
        }

        Commands::Groups {
            source,
            view,
            expand,
            json,
        } => {
            let race = load_race(&source, config)?;
            let mut session = build_session(&race, &view, config)?;
            for number in expand {
                session.toggle_group_expanded(group_index(number)?);
            }
            let frame = session.view(&race);
            if json {
                println!("{}", serde_json::to_string_pretty(&frame.groups)?);
            } else {
                println!("{}", display::status_line(&frame));
                println!("{}", display::groups_table(&frame));
            }
            Ok(())
        }

        Commands::Gap { source, view, json } => {
            let race = load_race(&source, config)?;
            let session = build_session(&race, &view, config)?;
            let frame = session.view(&race);
            if session.watched().is_none() {
                return Err(PelotrsError::Playback("No rider to watch: pass --watch <RIDER_ID>".to_string()).into());
            }
            if json {
                let body = serde_json::json!({
                    "time_seconds": frame.snapshot.time_seconds,
                    "watched": frame.watched,
                    "rank": frame.watched_rank,
                    "group": frame.watched_group.map(|g| g + 1),
                    "gaps": frame.watched_gaps,
                    "compare": frame.compare,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{}", display::status_line(&frame));
                match display::watched_summary(&frame) {
                    Some(summary) => println!("{}", summary),
                    None => println!("{}", "Watched rider has no data yet".dimmed()),
                }
            }
            Ok(())
        }

        Commands::Chart {
            source,
            view,
            metric,
            step,
            json,
        } => {
            let race = load_race(&source, config)?;
            let session = build_session(&race, &view, config)?;
            let series = session.chart_series(&race, metric);
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
                return Ok(());
            }
            if series.is_empty() {
                println!("{}", "Nothing to chart: pass --watch <RIDER_ID>".dimmed());
                return Ok(());
            }
            if metric == Metric::Elevation {
                if let Some(profile) = ElevationProfile::from_riders(&race.riders) {
                    println!("{}", display::profile_summary(&profile));
                }
            }
            println!("{}", display::chart_table(&series, step));
            Ok(())
        }

        Commands::Replay {
            source,
            speed,
            from,
            watch,
            frames,
            top,
            follow,
        } => {
            let race = load_race(&source, config)?;
            let options = ReplayOptions {
                speed: speed.unwrap_or(config.playback.default_speed),
                from: from.as_deref().map(parse_time).transpose()?,
                watch,
                render_every: frames.unwrap_or(config.playback.render_every_frames),
                top,
                follow: if follow { source.event.clone() } else { None },
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            let result = runtime.block_on(replay(race, options, config));
            // The stdin reader may still be parked on a blocking read
            runtime.shutdown_background();
            result
        }

        Commands::Config { list, set, get } => {
            if list {
                println!("{}", format!("Configuration ({})", config_path.display()).bold());
                for (key, value) in config.entries() {
                    println!("  {} = {}", key.cyan(), value);
                }
            } else if let Some(key_value) = set {
                let (key, value) = key_value.split_once('=').ok_or_else(|| {
                    PelotrsError::Configuration(format!("Expected key=value, got: {}", key_value))
                })?;
                config
                    .set_value(key.trim(), value)
                    .map_err(|e| PelotrsError::Configuration(e.to_string()))?;
                config.save_to_file(config_path)?;
                println!("{}", format!("✓ {} = {}", key.trim(), value.trim()).green());
            } else if let Some(key) = get {
                let value = config
                    .get_value(&key)
                    .ok_or_else(|| PelotrsError::Configuration(format!("Unknown configuration key: {}", key)))?;
                println!("{}", value);
            } else {
                println!("Use --list, --get <KEY> or --set <KEY=VALUE>");
            }
            Ok(())
        }
    }
}

fn open_store(config: &AppConfig) -> Result<RaceStore> {
    RaceStore::open(&config.storage.database_path)
        .map_err(PelotrsError::from)
        .with_context(|| {
            format!(
                "Failed to open race database: {}",
                config.storage.database_path.display()
            )
        })
}

fn import_race(file: &Path, config: &AppConfig) -> Result<()> {
    println!("{}", "Importing race data...".green().bold());
    println!("  File: {}", file.display());

    let race = ImportManager::new().import_file(file)?;
    let mut store = open_store(config)?;
    store.save_race(&race).map_err(PelotrsError::from)?;

    println!(
        "  Event: {} ({}), {} riders, {}",
        race.event_name,
        race.event_id,
        race.riders.len(),
        format_clock(race.max_time_seconds())
    );
    println!("{}", "✓ Import completed successfully".green());
    Ok(())
}

fn load_race(source: &RaceSource, config: &AppConfig) -> Result<RaceRecord> {
    if let Some(file) = &source.file {
        return Ok(ImportManager::new().import_file(file)?);
    }
    let event_id = source
        .event
        .as_deref()
        .ok_or_else(|| anyhow!("Pass --file or --event"))?;
    let store = open_store(config)?;
    let race = store
        .load_race(event_id)
        .map_err(PelotrsError::from)?
        .ok_or_else(|| PelotrsError::from(StorageError::NotFound(event_id.to_string())))?;
    Ok(race)
}

fn parse_time(input: &str) -> pelotrs::Result<f64> {
    parse_clock(input).map_err(PelotrsError::Playback)
}

fn build_session(race: &RaceRecord, view: &ViewArgs, config: &AppConfig) -> Result<PlaybackSession> {
    let mut session = PlaybackSession::new(race, config.engine.clone());
    let at = match &view.at {
        Some(at) => parse_time(at)?,
        None => race.max_time_seconds(),
    };
    session.apply(PlaybackCommand::Scrub(at));

    if let Some(id) = view.watch {
        if race.rider(id).is_none() {
            return Err(PelotrsError::Playback(format!("Rider {} is not in this race", id)).into());
        }
        session.apply(PlaybackCommand::Watch(id));
    }
    if let Some(id) = view.compare_rider {
        session.apply(PlaybackCommand::CompareRider(id));
    }
    if let Some(number) = view.compare_group {
        session.apply(PlaybackCommand::CompareGroup(group_index(number)?));
    }
    Ok(session)
}

struct ReplayOptions {
    speed: PlaybackSpeed,
    from: Option<f64>,
    watch: Option<RiderId>,
    render_every: u32,
    top: usize,
    follow: Option<String>,
}

async fn replay(race: RaceRecord, options: ReplayOptions, config: &AppConfig) -> Result<()> {
    let mut session = PlaybackSession::new(&race, config.engine.clone());
    session.apply(PlaybackCommand::SetSpeed(options.speed));
    if let Some(from) = options.from {
        session.apply(PlaybackCommand::Scrub(from));
    }
    if let Some(id) = options.watch {
        session.apply(PlaybackCommand::Watch(id));
    }

    let max_time = race.max_time_seconds();
    let (race_tx, race_rx) = watch::channel(race);
    let poller = options
        .follow
        .map(|event_id| spawn_store_poller(config, event_id, race_tx))
        .transpose()?;

    let (command_tx, mut commands) = mpsc::unbounded_channel();
    let input = tokio::spawn(read_commands(command_tx));

    let pb = ProgressBar::new(max_time.ceil() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")?
            .progress_chars("#>-"),
    );

    eprintln!(
        "{}",
        "Commands: p play/pause, + / - speed, r reset, s <time> scrub, w <id> watch, c <id> compare rider, g <n> compare group, x clear, e <n> expand group, q quit"
            .dimmed()
    );

    let driver = ReplayDriver::new(config.playback.frame_interval());
    let mut frame_count: u64 = 0;
    let mut last_frame = String::new();
    session.apply(PlaybackCommand::Play);

    loop {
        let summary = driver
            .run(&mut session, race_rx.clone(), &mut commands, |view| {
                frame_count += 1;
                pb.set_length(view.playback.max_time_seconds.ceil() as u64);
                pb.set_position(view.playback.cursor_seconds as u64);
                pb.set_message(format!(
                    "{} / {} {}  {}",
                    format_clock(view.playback.cursor_seconds),
                    format_clock(view.playback.max_time_seconds),
                    view.playback.speed,
                    display::watched_summary(view).unwrap_or_default()
                ));
                last_frame = display::render_frame(view, options.top);
                if options.render_every > 0 && frame_count % options.render_every as u64 == 0 {
                    pb.suspend(|| println!("{}\n", last_frame));
                }
            })
            .await;
        debug!(frames = summary.frames, cursor = summary.final_cursor_seconds, "Replay segment ended");

        if summary.reached_end {
            break;
        }
        // Paused: wait for the viewer to resume or quit
        match commands.recv().await {
            Some(command) => {
                if let Some(frame) = apply_paused(&mut session, &race_rx.borrow(), command, options.top) {
                    pb.suspend(|| println!("{}\n", frame));
                    last_frame = frame;
                }
            }
            None => break,
        }
    }

    pb.finish_and_clear();
    input.abort();
    if let Some(poller) = poller {
        poller.abort();
    }

    if last_frame.is_empty() {
        last_frame = display::render_frame(&session.view(&race_rx.borrow()), options.top);
    }
    println!("{}", last_frame);
    info!(frames = frame_count, "Replay finished");
    Ok(())
}

/// Reload an in-progress race from the store and publish every change
fn spawn_store_poller(
    config: &AppConfig,
    event_id: String,
    race_tx: watch::Sender<RaceRecord>,
) -> Result<tokio::task::JoinHandle<()>> {
    let store = open_store(config)?;
    Ok(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        loop {
            interval.tick().await;
            match store.load_race(&event_id) {
                Ok(Some(race)) => {
                    let changed = race != *race_tx.borrow();
                    if changed && race_tx.send(race).is_err() {
                        break;
                    }
                }
                Ok(None) => warn!(event = %event_id, "Followed race disappeared from store"),
                Err(e) => warn!(event = %event_id, error = %e, "Failed to reload race"),
            }
        }
    }))
}

async fn read_commands(commands: mpsc::UnboundedSender<PlaybackCommand>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line == "q" {
            let _ = commands.send(PlaybackCommand::Pause);
            break;
        }
        match parse_command(line) {
            Ok(command) => {
                if commands.send(command).is_err() {
                    break;
                }
            }
            Err(e) => eprintln!("{}", e.user_message().yellow()),
        }
    }
}

fn parse_command(line: &str) -> pelotrs::Result<PlaybackCommand> {
    let (verb, argument) = match line.split_once(char::is_whitespace) {
        Some((verb, argument)) => (verb, argument.trim()),
        None => (line, ""),
    };
    let rider = |arg: &str| {
        arg.parse::<RiderId>()
            .map_err(|_| PelotrsError::Playback(format!("Invalid rider id: {}", arg)))
    };
    let group = |arg: &str| {
        arg.parse::<usize>()
            .map_err(|_| PelotrsError::Playback(format!("Invalid group number: {}", arg)))
            .and_then(group_index)
    };

    match verb {
        "p" | "space" => Ok(PlaybackCommand::Toggle),
        "+" => Ok(PlaybackCommand::Faster),
        "-" => Ok(PlaybackCommand::Slower),
        "r" => Ok(PlaybackCommand::Reset),
        "s" => parse_time(argument).map(PlaybackCommand::Scrub),
        "v" => argument
            .parse::<PlaybackSpeed>()
            .map(PlaybackCommand::SetSpeed)
            .map_err(PelotrsError::Playback),
        "w" => rider(argument).map(PlaybackCommand::Watch),
        "c" => rider(argument).map(PlaybackCommand::CompareRider),
        "g" => group(argument).map(PlaybackCommand::CompareGroup),
        "x" => Ok(PlaybackCommand::ClearCompare),
        "e" => group(argument).map(PlaybackCommand::ToggleGroup),
        _ => Err(PelotrsError::Playback(format!("Unknown command: {}", line))),
    }
}

/// Groups are numbered from 1 for the viewer
fn group_index(number: usize) -> pelotrs::Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| PelotrsError::Playback("Group numbers start at 1".to_string()))
}

/// Apply a command received while paused; returns the frame to show
/// when playback stays paused and the view changed.
fn apply_paused(
    session: &mut PlaybackSession,
    race: &RaceRecord,
    command: PlaybackCommand,
    top: usize,
) -> Option<String> {
    let redraw = !matches!(
        command,
        PlaybackCommand::Play | PlaybackCommand::Pause | PlaybackCommand::Toggle
    );
    session.apply(command);
    if redraw && !session.clock().is_playing() {
        Some(display::render_frame(&session.view(race), top))
    } else {
        None
    }
}
