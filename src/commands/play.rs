//! Play the most recently generated audio again.

use std::io::Write;
use std::time::Duration;

use crate::artifact::last_output_path;
use crate::playback::{decode_wav, format_time, Player};

/// Plays the last generated file through the default output device.
///
/// # Errors
/// - If nothing has been generated yet
/// - If the file cannot be decoded or no output device is available
pub async fn handle_play() -> Result<(), anyhow::Error> {
    tracing::info!("=== charade Play Command ===");

    let path = last_output_path()?;
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Nothing generated yet. Record something with `charade` first."
        ));
    }

    let bytes = std::fs::read(&path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let audio = decode_wav(&bytes)?;
    let mut player = Player::new(audio)?;
    let total = player.duration();

    tracing::info!("Playing {} ({:?})", path.display(), total);
    println!("Playing {}", path.display());

    player.play();
    let mut stdout = std::io::stdout();
    while !player.take_ended() {
        print!(
            "\r{} / {}",
            format_time(Some(player.position())),
            format_time(Some(total))
        );
        stdout.flush()?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    println!("\r{} / {}", format_time(Some(total)), format_time(Some(total)));

    tracing::info!("Playback finished");
    Ok(())
}
