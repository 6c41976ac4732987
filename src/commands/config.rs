//! Configuration file editor command.
//!
//! Opens `charade.toml` in the user's preferred editor.

use std::process::Command;

use crate::config::{get_config_path, CharadeConfig};

/// Opens the charade configuration file in the user's preferred editor.
///
/// The edited file is loaded afterwards and any problem is reported.
///
/// # Errors
/// - If no editor can be found or executed
/// - If the editor exits unsuccessfully
pub fn handle_config() -> anyhow::Result<()> {
    let config_path = get_config_path()?;

    tracing::info!("Opening config file: {}", config_path.display());

    let editor = find_editor()?;
    tracing::debug!("Using editor: {}", editor);

    let status = Command::new(&editor)
        .arg(&config_path)
        .status()
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to open editor '{editor}': {e}. Make sure the editor is installed and accessible."
            )
        })?;

    if !status.success() {
        return Err(anyhow::anyhow!(
            "Editor exited with error code: {}",
            status.code().unwrap_or(-1)
        ));
    }

    // Report mistakes now rather than at the next recording.
    match CharadeConfig::load_from(&config_path) {
        Ok(_) => tracing::info!("Config file edited successfully"),
        Err(e) => {
            tracing::warn!("Edited config does not load: {e}");
            eprintln!("Warning: {e}");
        }
    }
    Ok(())
}

/// Finds the best available editor to use.
///
/// Tries in order: $VISUAL, $EDITOR, nano, vi
fn find_editor() -> anyhow::Result<String> {
    for var in ["VISUAL", "EDITOR"] {
        if let Ok(editor) = std::env::var(var) {
            if !editor.trim().is_empty() {
                return Ok(editor);
            }
        }
    }

    for editor in &["nano", "vi"] {
        if is_editor_available(editor) {
            return Ok(editor.to_string());
        }
    }

    Err(anyhow::anyhow!(
        "No editor found. Please set the $EDITOR environment variable."
    ))
}

/// Checks if an editor is available in the system PATH.
fn is_editor_available(editor: &str) -> bool {
    Command::new("which")
        .arg(editor)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
