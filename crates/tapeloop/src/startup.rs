//! Startup file loading.
//!
//! One-shot synchronous reader for real-time applications that need a blob
//! of configuration or calibration data available from the first cycle: the
//! file is read once at initialization, bounded to a maximum byte count, and
//! served from memory afterwards. A missing or unreadable file yields an
//! empty buffer rather than an error, so a bad path never takes down the
//! application at startup.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

/// In-memory prefix of a file, loaded once at startup.
#[derive(Debug, Default)]
pub struct StartupFile {
    buffer: Vec<u8>,
}

impl StartupFile {
    /// Read at most `max_num_bytes` from the start of `path`.
    ///
    /// Failures leave the buffer empty and are logged at debug level.
    pub fn load(path: impl AsRef<Path>, max_num_bytes: usize) -> Self {
        let path = path.as_ref();
        let mut buffer = Vec::new();
        match File::open(path) {
            Ok(file) => {
                if let Err(e) = file.take(max_num_bytes as u64).read_to_end(&mut buffer) {
                    debug!(path = %path.display(), "startup file read failed: {e}");
                    buffer.clear();
                }
            }
            Err(e) => {
                debug!(path = %path.display(), "startup file not loaded: {e}");
            }
        }
        Self { buffer }
    }

    /// The buffered prefix.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Copy the buffered bytes into `out`, bounded by both lengths.
    ///
    /// Returns the number of bytes copied.
    pub fn copy_to(&self, out: &mut [u8]) -> usize {
        let n = self.buffer.len().min(out.len());
        out[..n].copy_from_slice(&self.buffer[..n]);
        n
    }

    /// Release the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
