//! Serializable coordinator configuration

use super::error::{OutputError, Result};
use super::severity::Severity;
use super::shutdown::signal;
use super::timestamp::Timezone;
use enumflags2::BitFlags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Settings applied to a coordinator at build time or later
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes.
///
/// # Example
///
/// ```
/// use rust_output_system::{OutputConfig, Severity};
///
/// let config = OutputConfig::from_json(r#"{
///     "timezone": "utc",
///     "timestamps": ["Info", "Error"],
///     "prefixes": { "Aux": "[sync] " },
///     "fatal_on_export_error": false
/// }"#).unwrap();
///
/// assert!(config.fatal_on_file_error);
/// assert!(!config.fatal_on_export_error);
/// assert!(config.timestamp_levels().contains(Severity::Error));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Escalate a failed file write to a fatal shutdown
    pub fatal_on_file_error: bool,
    /// Escalate a failed export to a fatal shutdown
    pub fatal_on_export_error: bool,
    /// Show flash lines, transfers and the loading indicator
    pub animations: bool,
    /// Colour prefixes on terminal output
    pub colors: bool,
    pub timezone: String,
    /// Severities shown with a timestamp
    pub timestamps: Vec<Severity>,
    /// Severities forwarded to the export sink
    pub export: Vec<Severity>,
    /// Prefix overrides per severity
    pub prefixes: HashMap<Severity, String>,
    pub handle_signals: bool,
    pub signals: Vec<i32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fatal_on_file_error: true,
            fatal_on_export_error: true,
            animations: true,
            colors: false,
            timezone: "local".to_string(),
            timestamps: Vec::new(),
            export: Severity::standard().iter().collect(),
            prefixes: HashMap::new(),
            handle_signals: true,
            signals: signal::DEFAULT_SET.to_vec(),
        }
    }
}

impl OutputConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OutputError::io_operation(
                "reading configuration",
                format!("Failed to read '{}'", path.display()),
                e,
            )
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.parsed_timezone()?;
        if self.handle_signals && self.signals.iter().any(|sig| *sig <= 0) {
            return Err(OutputError::config(
                "signals",
                "signal numbers must be positive",
            ));
        }
        Ok(())
    }

    pub fn parsed_timezone(&self) -> Result<Timezone> {
        Timezone::parse(&self.timezone)
    }

    pub fn timestamp_levels(&self) -> BitFlags<Severity> {
        self.timestamps.iter().copied().collect()
    }

    pub fn export_levels(&self) -> BitFlags<Severity> {
        self.export.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = OutputConfig::from_json("{}").unwrap();
        assert_eq!(config, OutputConfig::default());
        assert_eq!(config.export_levels(), Severity::standard());
        assert!(config.timestamp_levels().is_empty());
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let err = OutputConfig::from_json(r#"{"timezone": "Atlantis"}"#).unwrap_err();
        assert!(matches!(err, OutputError::InvalidTimezone(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = OutputConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, OutputError::JsonError(_)));
    }

    #[test]
    fn test_json_roundtrip_keeps_prefixes() {
        let mut config = OutputConfig::default();
        config.prefixes.insert(Severity::Aux2, "[db] ".to_string());
        let restored = OutputConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored.prefixes.get(&Severity::Aux2).map(String::as_str), Some("[db] "));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");
        std::fs::write(&path, r#"{"colors": true, "signals": [2, 15]}"#).unwrap();
        let config = OutputConfig::from_file(&path).unwrap();
        assert!(config.colors);
        assert_eq!(config.signals, vec![2, 15]);
    }
}
