//! List audio input and output devices.

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait};

use crate::recording::audio::suppress_alsa_warnings;

/// Prints every input device with its index, and the default output device.
///
/// The index or name can be used as `audio.device` in charade.toml.
///
/// # Errors
/// - If the audio host cannot enumerate devices
pub fn handle_list_devices() -> Result<(), anyhow::Error> {
    let (host, inputs) = suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        let inputs: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| anyhow!("Failed to enumerate audio devices: {e}"))?
            .filter(|d| d.name().is_ok())
            .collect();
        Ok((host, inputs))
    })?;

    if inputs.is_empty() {
        println!("No audio input devices found. Recording is unavailable; `charade upload` still works.");
    } else {
        let default_input = host.default_input_device().and_then(|d| d.name().ok());

        println!("Input devices:");
        println!();
        for (index, device) in inputs.iter().enumerate() {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let marker = if default_input.as_ref() == Some(&name) {
                " [DEFAULT]"
            } else {
                ""
            };
            let config = match device.default_input_config() {
                Ok(config) => format!("{}Hz, {} channels", config.sample_rate().0, config.channels()),
                Err(_) => "configuration unavailable".to_string(),
            };
            println!("  {index}: {name}{marker} ({config})");
        }
    }

    println!();
    match host.default_output_device().and_then(|d| d.name().ok()) {
        Some(name) => println!("Playback device: {name}"),
        None => println!("Playback device: none (generated audio can still be saved)"),
    }

    Ok(())
}
