//! Learning Coach Agent CLI
//!
//! Webcam engagement monitor and study analytics.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use learning_coach_agent::{
    capture::{FileFrameSource, FrameSource, NoopFrameSource},
    classifier::{ClassifierConfig, HttpClassifier},
    config::Config,
    core::{
        build_report, heatmap, AnalyticsReport, Dismissal, ExternalCounts, GatePolicy,
        InterventionGate, InterventionState, JsonFileStore, ObservationStore, ReportOptions,
        SharedGate, SharedObservationStore, DEFAULT_STORE_KEY, MAX_HEATMAP_DAYS,
    },
    sampling::{SamplingController, SamplingLoop},
    stats::{create_shared_stats_with_persistence, PersistedStats, STATS_FILE_NAME},
    PRIVACY_DECLARATION, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coach-agent")]
#[command(version = VERSION)]
#[command(about = "Webcam engagement monitor and study analytics", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start sampling the webcam
    Start {
        /// Image file or directory of images to read frames from
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Classifier endpoint (defaults to the configured one)
        #[arg(long)]
        endpoint: Option<String>,

        /// Sampling interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Pause capture on a running agent
    Pause,

    /// Resume capture on a running agent
    Resume,

    /// Show current status
    Status,

    /// Display privacy declaration
    Privacy,

    /// Print KPIs, the session log and daily summaries
    Report {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,

        /// Completed tasks to show next to the computed figures
        #[arg(long, default_value = "0")]
        tasks_completed: u32,

        /// Current habit streak in days
        #[arg(long, default_value = "0")]
        habit_streak: u32,
    },

    /// Show the rolling activity heatmap
    Heatmap {
        /// Number of days to show (defaults to the configured window)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Delete all stored observations
    Clear,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Start {
            frames,
            endpoint,
            interval,
        } => cmd_start(frames, endpoint, interval).await,
        Commands::Pause => cmd_set_paused(true),
        Commands::Resume => cmd_set_paused(false),
        Commands::Status => cmd_status().await,
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
        Commands::Report {
            format,
            tasks_completed,
            habit_streak,
        } => cmd_report(
            &format,
            ExternalCounts {
                tasks_completed,
                habit_streak_days: habit_streak,
            },
        ),
        Commands::Heatmap { days } => cmd_heatmap(days),
        Commands::Clear => cmd_clear(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn open_store(config: &Config) -> ObservationStore {
    ObservationStore::open(
        Arc::new(JsonFileStore::new(config.data_path.clone())),
        DEFAULT_STORE_KEY,
    )
}

async fn cmd_start(
    frames: Option<PathBuf>,
    endpoint: Option<String>,
    interval: Option<u64>,
) -> Result<()> {
    println!("Learning Coach Agent v{VERSION}");
    println!();

    let mut config = Config::load().context("loading configuration")?;
    if let Some(endpoint) = endpoint {
        config.classifier.endpoint = endpoint;
    }
    if let Some(secs) = interval {
        config.sampling_interval = Duration::from_secs(secs);
    }
    config.validate()?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let classifier = HttpClassifier::new(ClassifierConfig::from_settings(&config.classifier))?;

    let source: Box<dyn FrameSource> = match frames {
        Some(path) => Box::new(FileFrameSource::new(path)),
        None => {
            eprintln!("Warning: no --frames source given; ticks will be skipped");
            Box::new(NoopFrameSource::new())
        }
    };

    println!("Starting sampling...");
    println!("  Frame source: {}", source.describe());
    println!("  Classifier: {}", config.classifier.endpoint);
    println!("  Interval: {}s", config.sampling_interval.as_secs());
    println!(
        "  Intervention cool-down: {}s",
        config.intervention_cooldown.as_secs()
    );

    match classifier.test_connection().await {
        Ok(true) => println!("  Classifier connection: OK"),
        Ok(false) => eprintln!("Warning: Classifier health check failed"),
        Err(e) => eprintln!("Warning: Could not reach classifier: {e}"),
    }

    let store = SharedObservationStore::new(open_store(&config));
    println!("  Stored observations: {}", store.len());

    let gate = SharedGate::new(InterventionGate::new(GatePolicy {
        cooldown: chrono::Duration::from_std(config.intervention_cooldown)
            .context("intervention cool-down out of range")?,
        confused_routing: config.confused_routing,
        sleep_detection: config.sleep_detection,
    }));

    let stats =
        create_shared_stats_with_persistence(config.data_path.join(STATS_FILE_NAME));

    let sampling_loop = SamplingLoop::new(
        source,
        Arc::new(classifier),
        store.clone(),
        gate.clone(),
        stats.clone(),
        config.sampling_interval,
    );
    let mut controller = SamplingController::new(sampling_loop);

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    ctrlc::set_handler(move || token.cancel()).context("setting Ctrl+C handler")?;

    let presenter = tokio::spawn(present_interventions(gate.clone(), shutdown.clone()));

    // Support pause/resume from another process by polling the config file.
    let mut paused = config.paused;
    if paused {
        println!("Capture is currently paused.");
        println!("Run `coach-agent resume` to start sampling.");
        println!();
    } else {
        controller.start()?;
    }

    let mut config_check = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = config_check.tick() => {}
        }

        let Ok(cfg) = Config::load() else {
            continue;
        };
        if cfg.paused == paused {
            continue;
        }

        paused = cfg.paused;
        if paused {
            println!("Pausing capture...");
            controller.stop().await?;
        } else {
            println!("Resuming capture...");
            controller.start()?;
        }
    }

    println!();
    println!("Stopping sampling...");
    controller.stop().await?;
    let _ = presenter.await;

    if let Err(e) = store.flush().await {
        eprintln!("Warning: Could not save observation log: {e}");
    }
    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save pipeline stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

/// Print each new suggestion and acknowledge it.
///
/// A terminal has no modal to click, so every suggestion is answered with
/// `Continue` as soon as it is shown.
async fn present_interventions(gate: SharedGate, shutdown: CancellationToken) {
    let mut updates = gate.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let view = updates.borrow_and_update().clone();
        let Some(intervention) = view.active else {
            continue;
        };

        let headline = match intervention.kind {
            InterventionState::BreakSuggested => "Time for a break?",
            InterventionState::QuizSuggested => "Try a quick quiz?",
            InterventionState::SleepSuggested => "You look like you need some rest.",
            InterventionState::Idle => continue,
        };

        println!(
            "[{}] {headline}",
            intervention.triggered_at.format("%H:%M:%S")
        );
        if let Some(message) = &intervention.message {
            println!("        {message}");
        }
        if let Some(resource) = &intervention.resource {
            println!("        See: {resource}");
        }

        gate.dismiss(Dismissal::Continue);
    }
}

fn cmd_set_paused(paused: bool) -> Result<()> {
    let mut config = Config::load().unwrap_or_default();
    config.paused = paused;
    config.save().context("saving configuration")?;

    if paused {
        println!("Capture paused. Use 'coach-agent resume' to continue.");
    } else {
        println!("Capture resumed.");
    }
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Learning Coach Agent Status");
    println!("===========================");
    println!();

    println!("Configuration:");
    println!("  Classifier: {}", config.classifier.endpoint);
    println!("  Interval: {}s", config.sampling_interval.as_secs());
    println!("  Time zone: {}", config.timezone);
    println!("  Paused: {}", config.paused);
    println!();

    let store = open_store(&config);
    println!("Stored observations: {}", store.len());
    println!();

    let stats_path = config.data_path.join(STATS_FILE_NAME);
    match std::fs::read_to_string(&stats_path)
        .ok()
        .and_then(|content| serde_json::from_str::<PersistedStats>(&content).ok())
    {
        Some(stats) => {
            println!("Cumulative Statistics:");
            println!("  Ticks attempted: {}", stats.ticks_attempted);
            println!("  Capture unavailable: {}", stats.capture_unavailable);
            println!("  Classifier failures: {}", stats.classifier_failures);
            println!("  Observations recorded: {}", stats.observations_recorded);
            println!("  Interventions triggered: {}", stats.interventions_triggered);
            println!("  Last updated: {}", stats.last_updated.to_rfc3339());
        }
        None => println!("No previous session data found."),
    }
    println!();

    let reachable = match HttpClassifier::new(ClassifierConfig::from_settings(&config.classifier))
    {
        Ok(client) => client.test_connection().await.unwrap_or(false),
        Err(_) => false,
    };
    println!(
        "Classifier: {}",
        if reachable { "reachable ✓" } else { "unreachable ✗" }
    );
    Ok(())
}

fn cmd_report(format: &str, external: ExternalCounts) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    let tz = config.tz()?;
    let snapshot = open_store(&config).snapshot();

    let options = ReportOptions {
        bucket_width: chrono::Duration::from_std(config.bucket_width)
            .context("bucket width out of range")?,
        tz,
        today: Utc::now().with_timezone(&tz).date_naive(),
        heatmap_days: config.heatmap_window_days,
    };
    let report = build_report(&snapshot, &options, external);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, tz);
    }
    Ok(())
}

fn print_report(report: &AnalyticsReport, tz: chrono_tz::Tz) {
    let kpis = &report.kpis;
    println!("Learning Dashboard");
    println!("==================");
    println!();
    println!(
        "  Average focus score: {:.2} / 6 ({}%)",
        kpis.average_focus_score, kpis.average_focus_score_percent
    );
    println!(
        "  Total study time: {} min ({} s)",
        kpis.total_study_minutes, kpis.total_focus_seconds
    );
    println!("  Distraction alerts: {}", kpis.distraction_alerts);
    println!("  Confusion alerts: {}", kpis.confusion_alerts);
    println!("  Tasks completed: {}", kpis.tasks_completed);
    println!("  Habit streak: {} days", kpis.habit_streak_days);
    println!();

    println!("Weekly Progress:");
    for day in &report.weekdays {
        println!(
            "  {}: {:>4} min, {:>4} distractions",
            day.weekday, day.study_minutes, day.distractions
        );
    }
    println!();

    if report.buckets.is_empty() {
        println!("No session logs available.");
        return;
    }

    println!("Session Log:");
    println!(
        "  {:<17} {:>6} {:>10}  {:<12} {:<12}",
        "Time", "Count", "Avg focus", "Emotion", "State"
    );
    for bucket in &report.buckets {
        println!(
            "  {:<17} {:>6} {:>10.2}  {:<12} {:<12}",
            bucket
                .interval_start
                .with_timezone(&tz)
                .format("%Y-%m-%d %H:%M"),
            bucket.observation_count,
            bucket.average_score,
            bucket.modal_emotion,
            bucket.modal_state
        );
    }
    println!();

    println!("Daily Summary:");
    for day in &report.days {
        println!(
            "  {}: {:>6} observations, avg {:.2}",
            day.date,
            day.count,
            day.average_score()
        );
    }
}

fn cmd_heatmap(days: Option<u32>) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    let tz = config.tz()?;
    let window = days
        .unwrap_or(config.heatmap_window_days)
        .clamp(1, MAX_HEATMAP_DAYS);
    if days.is_some_and(|d| d > MAX_HEATMAP_DAYS) {
        eprintln!("Warning: showing the last {MAX_HEATMAP_DAYS} days only");
    }
    let snapshot = open_store(&config).snapshot();

    let today = Utc::now().with_timezone(&tz).date_naive();
    let cells = heatmap(&snapshot, tz, today, window);

    println!(
        "Activity, {} to {} (one row per week, oldest first)",
        cells.first().map(|c| c.date.to_string()).unwrap_or_default(),
        cells.last().map(|c| c.date.to_string()).unwrap_or_default()
    );
    for week in cells.chunks(7) {
        let row: String = week
            .iter()
            .map(|cell| match cell.level {
                0 => '·',
                1 => '░',
                2 => '▒',
                3 => '▓',
                _ => '█',
            })
            .collect();
        println!("  {row}");
    }
    println!();
    println!("  · none  ░ ≤1h  ▒ ≤2h  ▓ ≤3h  █ >3h");
    Ok(())
}

fn cmd_clear() -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let mut store = open_store(&config);
    let count = store.len();
    store.clear().context("clearing observation log")?;
    println!("Cleared {count} observations.");
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
