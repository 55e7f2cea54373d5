mod buffer;
mod cancel;
mod hook;
mod output;
mod retention;
mod worker;
mod writer;

use clap::Parser;
use frame_sink_common::config::Config;
use frame_sink_common::frame::SharedFrame;
use output::FileOutput;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Save frames from a multipart MJPEG stream on stdin as timestamped
/// pictures, keeping at most a fixed number of them.
#[derive(Parser, Debug)]
#[command(name = "frame-sink", version, about)]
struct Cli {
    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder to save pictures (overrides config)
    #[arg(short, long)]
    folder: Option<String>,

    /// Delay after saving a picture, in ms (overrides config)
    #[arg(short, long)]
    delay: Option<u64>,

    /// Size of the ring buffer: max number of pictures to keep (overrides config)
    #[arg(short, long)]
    size: Option<usize>,

    /// Command to run after saving a picture; the path is appended quoted (overrides config)
    #[arg(short, long)]
    command: Option<String>,

    /// Multipart boundary line of the input stream (overrides config)
    #[arg(long)]
    boundary: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(folder) = self.folder {
            config.output.folder = folder;
        }
        if let Some(delay) = self.delay {
            config.output.delay_ms = delay;
        }
        if let Some(size) = self.size {
            config.output.ring_size = Some(size);
        }
        if let Some(command) = self.command {
            config.output.command = Some(command);
        }
        if let Some(boundary) = self.boundary {
            config.source.boundary = boundary;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    cli.apply(&mut config);

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let shared = Arc::new(SharedFrame::new());

    let mut output = match FileOutput::initialize(&config.output, Arc::clone(&shared)) {
        Ok(o) => o,
        Err(e) => {
            error!(error = %e, "failed to initialize file output");
            std::process::exit(1);
        }
    };
    if let Err(e) = output.start() {
        error!(error = %e, "failed to start file output");
        std::process::exit(1);
    }

    info!(boundary = config.source.boundary, "reading MJPEG stream from stdin");
    let boundary = config.source.boundary.clone();
    tokio::select! {
        result = frame_sink_producer::mjpeg::pump(tokio::io::stdin(), &shared, &boundary) => {
            match result {
                Ok(frames) => info!(frames, "input stream ended"),
                Err(e) => warn!(error = %e, "input stream failed"),
            }
            if !output.is_running() {
                warn!("file output worker exited before the end of input");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }

    shared.request_stop();
    let code = match tokio::task::spawn_blocking(move || output.stop()).await {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!(error = %e, "failed to stop file output");
            1
        }
        Err(e) => {
            error!(error = %e, "shutdown task failed");
            1
        }
    };

    // An interrupted stdin read stays parked in the blocking pool and would
    // keep the runtime from shutting down until the writer side closes.
    std::process::exit(code);
}
