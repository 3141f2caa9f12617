//! Recorder configuration.
//!
//! A plain serde-derived struct so embedding applications can load it from
//! TOML or JSON alongside their own config. Zero-valued size parameters are
//! clamped to 1 rather than rejected: a degenerate configuration records
//! one-byte samples into a single one-sample file instead of failing the
//! real-time application at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a [`RingRecorder`](crate::RingRecorder).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Base folder for recordings. Each session creates a timestamped
    /// subdirectory inside this folder.
    pub folder: PathBuf,

    /// Size of each sample in bytes. Fixed for the lifetime of the recorder.
    pub sample_size: usize,

    /// Number of samples stored in each ring file.
    pub samples_per_file: usize,

    /// Number of ring files per session. Total capacity is
    /// `num_files * samples_per_file` samples before old data is overwritten.
    pub num_files: usize,

    /// Requested SCHED_FIFO priority for the writer thread. Best-effort;
    /// ignored when the OS refuses it.
    pub thread_priority: i32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("ringbuffers"),
            sample_size: 8,
            samples_per_file: 4096,
            num_files: 8,
            thread_priority: 0,
        }
    }
}

impl RecorderConfig {
    /// Create a config recording into `folder` with default sizing.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    /// Substitute 1 for any zero-valued size parameter.
    pub(crate) fn clamped(mut self) -> Self {
        self.sample_size = self.sample_size.max(1);
        self.samples_per_file = self.samples_per_file.max(1);
        self.num_files = self.num_files.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_substitutes_one_for_zero() {
        let config = RecorderConfig {
            sample_size: 0,
            samples_per_file: 0,
            num_files: 0,
            ..RecorderConfig::new("/tmp/rings")
        }
        .clamped();

        assert_eq!(config.sample_size, 1);
        assert_eq!(config.samples_per_file, 1);
        assert_eq!(config.num_files, 1);
    }

    #[test]
    fn test_clamped_keeps_nonzero_values() {
        let config = RecorderConfig {
            sample_size: 4,
            samples_per_file: 2,
            num_files: 3,
            ..RecorderConfig::new("/tmp/rings")
        }
        .clamped();

        assert_eq!(config.sample_size, 4);
        assert_eq!(config.samples_per_file, 2);
        assert_eq!(config.num_files, 3);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: RecorderConfig =
            serde_json::from_str(r#"{"folder": "/data/rings", "sample_size": 16}"#).unwrap();

        assert_eq!(config.folder, PathBuf::from("/data/rings"));
        assert_eq!(config.sample_size, 16);
        assert_eq!(config.samples_per_file, RecorderConfig::default().samples_per_file);
        assert_eq!(config.num_files, RecorderConfig::default().num_files);
    }
}
