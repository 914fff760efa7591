use std::io;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use cutout_rs::{protocol, Config, CutoutProcessor};

fn main() -> Result<()> {
    let config = Config::parse();

    // stdout carries the protocol; logs go to stderr.
    let log_level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    tracing::info!(pid = std::process::id(), "cutout worker starting");

    ensure!(
        config.model_path.exists(),
        "Model path does not exist: {}",
        config.model_path.display()
    );

    let processor = CutoutProcessor::with_onnx_model(&config).with_context(|| {
        format!(
            "Failed to load segmentation model: {}",
            config.model_path.display()
        )
    })?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    protocol::run(&processor, stdin.lock(), &mut stdout.lock())
        .context("Worker output closed")?;

    tracing::info!("cutout worker exiting");
    Ok(())
}
