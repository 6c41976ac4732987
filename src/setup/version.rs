//! Config version header parsing and comparison.
//!
//! The first line of the config file records which release wrote it:
//! `config_version = "X.Y.Z"`.

use anyhow::anyhow;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

/// Current application version from Cargo.toml
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A semantic version (major.minor.patch)
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct SemanticVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl SemanticVersion {
    fn parse(version_str: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = version_str.trim().split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(anyhow!(
                "Invalid version format: '{}'. Expected 'major.minor.patch'",
                version_str
            ));
        };

        let number = |part: &str, name: &str| {
            part.parse::<u32>()
                .map_err(|_| anyhow!("Invalid {name} version: '{part}'"))
        };

        Ok(SemanticVersion {
            major: number(*major, "major")?,
            minor: number(*minor, "minor")?,
            patch: number(*patch, "patch")?,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Reads the version from the first line of the config file.
///
/// Returns `None` if the first line is not a `config_version` assignment.
fn read_config_version(config_path: &Path) -> anyhow::Result<Option<String>> {
    let content = std::fs::read_to_string(config_path)?;
    let first_line = content.lines().next().unwrap_or_default();

    let regex = Regex::new(r#"^\s*config_version\s*=\s*"([^"]+)""#)?;
    Ok(regex
        .captures(first_line)
        .map(|caps| caps[1].to_string()))
}

/// Decides whether setup has to (re)write the config.
///
/// Returns `Some(reason)` when the file is missing, has no version header,
/// or was written by an older release; `None` when it is up to date.
pub fn check_setup_needed(config_path: &Path) -> anyhow::Result<Option<String>> {
    if !config_path.exists() {
        return Ok(Some("none (first run)".to_string()));
    }

    let Some(config_version) = read_config_version(config_path)? else {
        return Ok(Some("unknown (no version header)".to_string()));
    };

    let config_parsed = SemanticVersion::parse(&config_version)?;
    let current_parsed = SemanticVersion::parse(CURRENT_VERSION)?;

    match config_parsed.cmp(&current_parsed) {
        Ordering::Less => Ok(Some(config_parsed.to_string())),
        Ordering::Equal => Ok(None),
        Ordering::Greater => {
            tracing::warn!(
                "Config version {} is newer than app version {}",
                config_version,
                CURRENT_VERSION
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_version_parse() {
        let v = SemanticVersion::parse("0.1.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (0, 1, 3));
        assert_eq!(v.to_string(), "0.1.3");
    }

    #[test]
    fn test_semantic_version_ordering() {
        let v1 = SemanticVersion::parse("0.0.9").unwrap();
        let v2 = SemanticVersion::parse("0.1.0").unwrap();
        let v3 = SemanticVersion::parse("1.0.0").unwrap();
        assert!(v1 < v2);
        assert!(v2 < v3);
    }

    #[test]
    fn test_invalid_version_format() {
        assert!(SemanticVersion::parse("0.1").is_err());
        assert!(SemanticVersion::parse("0.1.2.3").is_err());
        assert!(SemanticVersion::parse("a.b.c").is_err());
    }

    #[test]
    fn test_check_setup_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charade.toml");
        assert!(check_setup_needed(&path).unwrap().is_some());

        std::fs::write(&path, "[audio]\ndevice = \"default\"\n").unwrap();
        assert!(check_setup_needed(&path).unwrap().is_some());

        std::fs::write(&path, "config_version = \"0.0.1\"\n").unwrap();
        assert_eq!(check_setup_needed(&path).unwrap().as_deref(), Some("0.0.1"));

        std::fs::write(&path, format!("config_version = \"{CURRENT_VERSION}\"\n")).unwrap();
        assert_eq!(check_setup_needed(&path).unwrap(), None);

        std::fs::write(&path, "config_version = \"99.0.0\"\n").unwrap();
        assert_eq!(check_setup_needed(&path).unwrap(), None);
    }
}
