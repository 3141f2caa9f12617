//! Rotating multi-file session writer.
//!
//! One open session is a fixed set of `buffer<k>.dat` files inside a session
//! directory, written in file-major order: file 0 fills sample by sample,
//! then file 1, and so on, wrapping back to file 0 to overwrite the oldest
//! data. The write cursor (current file index, byte offset into that file)
//! always equals total bytes written modulo the ring capacity.
//!
//! Closing a session writes a `complete.json` marker holding the sizing and
//! the final cursor, the single source of truth for reconstructing the
//! oldest/newest sample boundary from disk alone.

use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// File name of the session completion marker.
pub const COMPLETION_MARKER: &str = "complete.json";

/// Sizing and final write cursor of a closed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub bytes_per_sample: u64,
    pub bytes_per_file: u64,
    pub files_per_ringbuffer: u64,
    pub writing_point: WritingPoint,
}

/// Position of the next write at the moment the session closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritingPoint {
    pub file_index: u64,
    pub byte_offset: u64,
}

/// Errors from opening a session.
#[derive(Debug, thiserror::Error)]
pub enum RingWriterError {
    #[error("ring writer is already open")]
    AlreadyOpen,

    #[error("failed to create session directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create ring file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writer over one session's rotating file set.
///
/// Files are plain unbuffered `File` handles, so every accepted write is
/// handed to the OS I/O layer before [`RingWriter::write`] returns.
#[derive(Debug, Default)]
pub struct RingWriter {
    sample_size: usize,
    file_size: usize,
    current_file: usize,
    offset: usize,
    files: Vec<File>,
    directory: PathBuf,
}

impl RingWriter {
    /// Create a closed writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session of `num_files` ring files under `directory`.
    ///
    /// The directory is created if missing. Files are truncated on creation,
    /// so reopening a directory destroys that slot's prior contents. On any
    /// failure every file opened so far is dropped and the writer stays
    /// closed; no completion marker is written for a failed open.
    pub fn open(
        &mut self,
        directory: &Path,
        sample_size: usize,
        samples_per_file: usize,
        num_files: usize,
    ) -> Result<(), RingWriterError> {
        if !self.files.is_empty() {
            return Err(RingWriterError::AlreadyOpen);
        }
        let sample_size = sample_size.max(1);
        let samples_per_file = samples_per_file.max(1);
        let num_files = num_files.max(1);

        fs::create_dir_all(directory).map_err(|source| RingWriterError::CreateDir {
            path: directory.to_path_buf(),
            source,
        })?;

        let mut files = Vec::with_capacity(num_files);
        for k in 0..num_files {
            let path = directory.join(format!("buffer{k}.dat"));
            let file = File::create(&path)
                .map_err(|source| RingWriterError::CreateFile { path, source })?;
            files.push(file);
        }

        self.sample_size = sample_size;
        self.file_size = samples_per_file * sample_size;
        self.current_file = 0;
        self.offset = 0;
        self.files = files;
        self.directory = directory.to_path_buf();

        debug!(
            directory = %self.directory.display(),
            sample_size,
            file_size = self.file_size,
            num_files,
            "opened ring file set"
        );
        Ok(())
    }

    /// Write one sample at the current cursor and advance it.
    ///
    /// Silently drops the sample if the writer is closed. `sample` must be
    /// exactly the configured sample size. On wraparound to a file boundary
    /// the file's write position rewinds to its start (the next pass
    /// overwrites its oldest content) and the cursor moves to the next file.
    pub fn write(&mut self, sample: &[u8]) {
        if self.files.is_empty() {
            return;
        }
        debug_assert_eq!(sample.len(), self.sample_size);

        let file = &mut self.files[self.current_file];
        if let Err(e) = file.write_all(sample) {
            warn!(
                file_index = self.current_file,
                byte_offset = self.offset,
                "sample write failed: {e}"
            );
        }

        // Keep the cursor consistent with total-bytes-modulo-capacity even
        // when an individual write fails.
        self.offset = (self.offset + self.sample_size) % self.file_size;
        if self.offset == 0 {
            if let Err(e) = file.seek(SeekFrom::Start(0)) {
                warn!(file_index = self.current_file, "rewind failed: {e}");
            }
            self.current_file = (self.current_file + 1) % self.files.len();
        }
    }

    /// Close the session, writing the completion marker first. No-op if
    /// already closed.
    pub fn close(&mut self) {
        if !self.files.is_empty() {
            self.write_completion_marker();
            debug!(
                directory = %self.directory.display(),
                file_index = self.current_file,
                byte_offset = self.offset,
                "closed ring file set"
            );
        }
        self.sample_size = 0;
        self.file_size = 0;
        self.current_file = 0;
        self.offset = 0;
        self.files.clear();
        self.directory = PathBuf::new();
    }

    /// Whether a session is open. Advisory only; not synchronized against a
    /// concurrently writing owner.
    pub fn is_open(&self) -> bool {
        !self.files.is_empty()
    }

    fn write_completion_marker(&self) {
        let marker = CompletionMarker {
            bytes_per_sample: self.sample_size as u64,
            bytes_per_file: self.file_size as u64,
            files_per_ringbuffer: self.files.len() as u64,
            writing_point: WritingPoint {
                file_index: self.current_file as u64,
                byte_offset: self.offset as u64,
            },
        };
        let path = self.directory.join(COMPLETION_MARKER);
        match serde_json::to_string_pretty(&marker) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!(path = %path.display(), "failed to write completion marker: {e}");
                }
            }
            Err(e) => warn!("failed to serialize completion marker: {e}"),
        }
    }
}

impl Drop for RingWriter {
    fn drop(&mut self) {
        self.close();
    }
}
