//! Relay configuration. Static for a process lifetime; no hot-reload.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How matched documents reach the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Download the document and re-upload it under a generated filename.
    #[default]
    Reupload,
    /// Forward the original message unchanged (no download, no rename).
    Forward,
}

/// Configuration for the relay engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Source channels to poll, in cycle order.
    pub source_channels: Vec<String>,
    /// Destination channel identifier.
    pub destination: String,
    /// Target file extension, including the leading dot. Matched
    /// case-insensitively as a suffix.
    pub target_extension: String,
    /// Messages fetched per channel per cycle.
    pub messages_to_check: usize,
    /// Seconds between cycles.
    pub check_interval_secs: u64,
    /// Prefix for generated filenames.
    pub file_prefix: String,
    /// Embed the sequence number in generated filenames.
    pub show_sequence: bool,
    /// Forward vs download-rename-reupload.
    pub mode: RelayMode,
    /// Apply the filename generator in reupload mode. When off, files are
    /// re-uploaded under their sanitized original name.
    pub rename: bool,
    /// Delay after each processed candidate.
    pub inter_message_delay_secs: u64,
    /// Delay between channels within a cycle.
    pub inter_channel_delay_secs: u64,
    /// Report summary statistics every this many cycles.
    pub stats_every_cycles: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source_channels: Vec::new(),
            destination: String::new(),
            target_extension: ".npvt".into(),
            messages_to_check: 5,
            check_interval_secs: 300,
            file_prefix: "Relay_".into(),
            show_sequence: true,
            mode: RelayMode::Reupload,
            rename: true,
            inter_message_delay_secs: 3,
            inter_channel_delay_secs: 2,
            stats_every_cycles: 3,
        }
    }
}

impl RelayConfig {
    /// Validate required settings. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.source_channels.is_empty() {
            return Err(Error::config("at least one source channel is required"));
        }
        if self.destination.trim().is_empty() {
            return Err(Error::config("destination channel is required"));
        }
        if self.target_extension.trim().is_empty() {
            return Err(Error::config("target extension is required"));
        }
        if self.messages_to_check == 0 {
            return Err(Error::config("messages_to_check must be at least 1"));
        }
        if self.check_interval_secs == 0 {
            return Err(Error::config("check interval must be at least 1 second"));
        }
        Ok(())
    }

    /// Destination identifier without the `@` prefix, for filenames and
    /// captions.
    #[must_use]
    pub fn destination_id(&self) -> &str {
        self.destination.trim_start_matches('@')
    }

    /// Target extension normalized for comparison.
    #[must_use]
    pub fn normalized_extension(&self) -> String {
        self.target_extension.trim().to_lowercase()
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    #[must_use]
    pub fn inter_message_delay(&self) -> Duration {
        Duration::from_secs(self.inter_message_delay_secs)
    }

    #[must_use]
    pub fn inter_channel_delay(&self) -> Duration {
        Duration::from_secs(self.inter_channel_delay_secs)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        RelayConfig {
            source_channels: vec!["@source".into()],
            destination: "@archive".into(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        valid().validate().unwrap();
    }

    #[test]
    fn missing_sources_is_fatal() {
        let cfg = RelayConfig {
            source_channels: Vec::new(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_destination_is_fatal() {
        let cfg = RelayConfig {
            destination: "  ".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn destination_id_strips_at() {
        assert_eq!(valid().destination_id(), "archive");
    }

    #[test]
    fn extension_normalized_lowercase() {
        let cfg = RelayConfig {
            target_extension: ".NPVT ".into(),
            ..valid()
        };
        assert_eq!(cfg.normalized_extension(), ".npvt");
    }
}
