//! Detection pipeline worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vdet_media::shared_detector;
use vdet_models::JobState;
use vdet_worker::cli::{CliArgs, USAGE};
use vdet_worker::pipeline::{run_media_job, PipelineHooks};
use vdet_worker::WorkerConfig;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vdet=info".parse().unwrap())
        .add_directive("ort=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            error!("Invalid arguments: {}", e);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // Model load failure is fatal and distinct from any per-frame error.
    let detector = match shared_detector(&config.detector_config()) {
        Ok(detector) => detector,
        Err(e) => {
            error!("Failed to load detection model: {}", e);
            std::process::exit(1);
        }
    };

    // Cooperative cancellation: Ctrl-C flips the flag, the frame loop
    // notices at its next iteration boundary.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal, cancelling job");
        cancel_tx.send(true).ok();
    });

    info!(job_id = %args.job.id, "Starting vdet-worker");

    // The frame loop is synchronous OpenCV and ONNX work; keep it off
    // the async runtime threads.
    let job = args.job;
    let detector: Arc<dyn vdet_media::ObjectDetector> = detector;
    let report = match tokio::task::spawn_blocking(move || {
        run_media_job(&job, detector, cancel_rx, PipelineHooks::default(), &config)
    })
    .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("Pipeline task panicked: {}", e);
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(summary) => println!("{}", summary),
        Err(e) => error!("Failed to serialize job report: {}", e),
    }

    match report.state {
        JobState::Completed | JobState::Cancelled => {}
        _ => std::process::exit(1),
    }
}
