//! First-run setup.
//!
//! Writes the default configuration file, stamped with the application
//! version, when it is missing or was written by an older release.

pub mod version;

use std::path::Path;

/// Embedded default configuration template.
const DEFAULT_CONFIG: &str = include_str!("../../environments/charade.toml");

/// Current application version from Cargo.toml
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Writes the default config to `config_path`, creating its directory.
///
/// An existing file is kept as `<name>.bak` before being replaced.
///
/// # Errors
/// Returns an error if any file operation fails.
pub fn run_setup(config_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if config_path.exists() {
        let backup = config_path.with_extension("toml.bak");
        std::fs::copy(config_path, &backup)?;
        tracing::info!("Previous config backed up to {}", backup.display());
    }

    std::fs::write(config_path, default_config_contents())?;
    tracing::info!("Default config written to {}", config_path.display());
    Ok(())
}

/// The default config with its version header.
pub fn default_config_contents() -> String {
    format!(
        "config_version = \"{}\"\n{}",
        CURRENT_VERSION, DEFAULT_CONFIG
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_setup_writes_versioned_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charade").join("charade.toml");

        run_setup(&path).unwrap();
        assert_eq!(version::check_setup_needed(&path).unwrap(), None);
        assert!(crate::config::CharadeConfig::load_from(&path).is_ok());

        run_setup(&path).unwrap();
        assert!(path.with_extension("toml.bak").exists());
    }
}
