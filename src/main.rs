// src/main.rs
//! vissy - entry point.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vissy::{
    analysis::{SpectralAnalyzer, config::DEFAULT_SAMPLE_RATE},
    config::{Config, default_log_path},
    dispatch::{ModeList, SharedConfig, VisualizationDispatcher},
    ipc::{LocalRing, ReopenPolicy, RingBufferSource, ShmOpener, ToneGenerator},
    render::SharedCanvas,
    scheduler::Engine,
    ui::{self, Preview},
};

#[derive(Parser, Debug)]
#[command(name = "vissy")]
#[command(about = "Audio visualization for small attached displays")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/vissy/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mode list, e.g. "VU,SA-ST" (VU, PK, SA, ST, SM, RN)
    #[arg(long)]
    modes: Option<String>,

    /// Average both channels where the mode supports it
    #[arg(long)]
    downmix: bool,

    /// Visualize a local sine tone instead of the player's output
    #[arg(long, value_name = "HZ", num_args = 0..=1, default_missing_value = "1000")]
    demo: Option<f32>,

    /// Show the display in the terminal
    #[arg(long)]
    preview: bool,

    /// Polling interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Log file used while the preview owns the terminal
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(modes) = &self.modes {
            config.modes.list = modes.clone();
        }
        if self.downmix {
            config.modes.downmix = true;
        }
        if let Some(poll_ms) = self.poll_ms {
            config.timers.poll_ms = poll_ms;
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let default = match cli.verbose {
        0 => "vissy=info",
        1 => "vissy=debug",
        _ => "vissy=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if cli.preview {
        let path = cli.log_file.clone().unwrap_or_else(default_log_path);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_env_filter(filter)
            .with_ansi(false)
            .init();
        eprintln!("vissy log: {}", path.display());
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    cli.apply(&mut config);

    if !config.modes.enabled {
        info!("visualization disabled in config");
        return Ok(());
    }

    let analyzer = SpectralAnalyzer::init(config.analysis).context("invalid analysis geometry")?;
    let modes = ModeList::parse(&config.modes.list).context("invalid mode list")?;
    info!(
        modes = %modes.describe(),
        downmix = config.modes.downmix,
        bars = ?analyzer.config().num_bars(),
        "visualization"
    );

    let ring_frames = analyzer.snapshot_frames() * 2;
    let shared = SharedConfig::new(modes, config.modes.downmix, true);
    let canvas = SharedCanvas::new(config.display.width, config.display.height);
    let dispatcher = VisualizationDispatcher::new(shared.clone(), analyzer, canvas.clone());
    let settings = config
        .timers
        .engine_settings()
        .context("invalid timer settings")?;

    let (mut engine, mut tone, title) = match cli.demo {
        Some(freq) => {
            let ring = LocalRing::new(ring_frames, DEFAULT_SAMPLE_RATE);
            let tone = ToneGenerator::spawn(ring.clone(), freq, (16_000.0, 11_000.0));
            let engine = Engine::spawn(ring, dispatcher, settings)?;
            (engine, Some(tone), format!("vissy: {freq} Hz demo"))
        }
        None => {
            let opener = match &config.source.segment {
                Some(name) => ShmOpener::named(name.clone()),
                None => ShmOpener::discover(config.source.interface.clone()),
            };
            let policy = ReopenPolicy::new(config.source.stale_after_secs);
            let engine = Engine::spawn(RingBufferSource::new(opener, policy), dispatcher, settings)?;
            (engine, None, "vissy".to_string())
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    if cli.preview {
        ui::run(Preview::new(canvas, shared, title), || running.load(Ordering::SeqCst))?;
    } else {
        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(200));
        }
    }

    info!("shutting down");
    engine.shutdown();
    if let Some(tone) = tone.as_mut() {
        tone.stop();
    }
    Ok(())
}
