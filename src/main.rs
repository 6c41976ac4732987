//! charade: record a melody, generate music from it, play it back.

mod app;
mod artifact;
mod commands;
mod config;
mod generation;
mod logging;
mod playback;
mod recording;
mod session;
mod setup;
mod ui;

#[tokio::main]
async fn main() {
    if let Err(e) = app::run().await {
        tracing::error!("Fatal error: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
