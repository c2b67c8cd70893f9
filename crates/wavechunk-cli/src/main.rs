//! wavechunk: renders the waveform of an audio file as a row of fixed-width chunks.
//!
//! ## Modes
//! - `render`: analyze a file and draw every chunk, reporting size and coverage per chunk.
//! - `layout`: show how a timeline is cut into chunks without touching any audio.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wavechunk_cli::cli::{Args, Command};
use wavechunk_cli::config::RenderRunConfig;
use wavechunk_cli::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,wavechunk=info,wavechunk_cli=info")
        }))
        .init();

    match &args.cmd {
        Command::Render(render) => {
            let config = RenderRunConfig::from_args(render)?;
            let cancel = Arc::new(AtomicBool::new(false));
            let cancel_for_signal = cancel.clone();
            let _ = ctrlc::set_handler(move || {
                if cancel_for_signal.swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            });
            let reports = runtime::run_render(&config, &cancel)?;
            runtime::print_reports(&reports, config.json)?;
        }
        Command::Layout(layout) => runtime::run_layout(layout)?,
    }

    Ok(())
}
