//! reply-reader-rs: reads AI assistant responses aloud.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reply_reader::config::Config;
use reply_reader::narrator::api::start_api;
use reply_reader::narrator::detector::{HeuristicClassifier, ResponseDetector};
use reply_reader::narrator::engine::NarrationEngine;
use reply_reader::narrator::espeak::EspeakEngine;
use reply_reader::service::{NarrationHandle, NarrationService};

#[derive(Parser, Debug)]
#[command(name = "reply-reader-rs", about = "Reads AI assistant responses aloud")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Decoder internals are noisy at debug
    let filter = if args.verbose {
        EnvFilter::new("debug,symphonia=info")
    } else {
        EnvFilter::new("info,symphonia=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("reply-reader-rs starting");

    let config_path = Config::find(args.config.as_deref());
    let config = Config::load(config_path.as_deref());

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let engine: Option<Arc<dyn NarrationEngine>> = match EspeakEngine::new(&config.engine, event_tx) {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            warn!("{e}");
            info!("Continuing without voice output");
            None
        }
    };

    let detector = ResponseDetector::new(Box::new(HeuristicClassifier::new(&config.detector)));
    let service = NarrationService::new(config.clone(), config_path, engine, detector);

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let handle = NarrationHandle {
        commands: cmd_tx.clone(),
        status: service.status(),
        voices: service.voices(),
    };

    if config.api.enabled {
        start_api(handle, config.api.port).await;
    }

    if config.speech.read_clipboard {
        reply_reader::clipboard::spawn_watcher(&config.clipboard, cmd_tx.clone());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    service.run(cmd_rx, event_rx, shutdown).await;
    info!("reply-reader-rs stopped");
}
