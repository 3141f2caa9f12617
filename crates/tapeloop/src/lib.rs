//! Tapeloop: non-blocking ring buffer recording for real-time sample streams.
//!
//! A real-time control loop produces one fixed-size binary sample per cycle
//! and must never wait on disk. Tapeloop decouples the two: the producer
//! hands each sample to [`RingRecorder::add_sample`], which copies it into a
//! pending queue under a short lock and wakes a dedicated writer thread. The
//! writer drains the queue and streams samples into a bounded, rotating set
//! of files, so storage never grows without limit.
//!
//! ```text
//! control loop ──▶ add_sample ──▶ pending queue ──▶ writer thread
//!   (RT cycle)      (memcpy +       (mutex)             │
//!                    notify)                            ▼
//!                                          <base>/<UTC>_ring<N>/
//!                                          ├── buffer0.dat
//!                                          ├── buffer1.dat
//!                                          ├── ...
//!                                          └── complete.json  (on close)
//! ```
//!
//! Each recording session lives in its own UTC-timestamped directory and
//! wraps around its file set file-major: file 0 fills, then file 1, then
//! back to file 0 overwriting the oldest samples. Closing a session writes a
//! `complete.json` marker with the sizing and the final write cursor, which
//! is everything needed to locate the oldest and newest sample on disk.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tapeloop::{RecorderConfig, RingRecorder};
//!
//! let mut recorder = RingRecorder::new();
//! recorder.initialize(RecorderConfig {
//!     sample_size: 64,
//!     samples_per_file: 10_000,
//!     num_files: 8,
//!     ..RecorderConfig::new("/data/rings")
//! })?;
//!
//! // once per control cycle:
//! let pending = recorder.add_sample(&[0u8; 64], false);
//!
//! // at shutdown (also runs on drop):
//! recorder.terminate();
//! # Ok::<(), tapeloop::RecorderError>(())
//! ```

pub mod config;
pub mod recorder;
pub mod ring_writer;
pub mod startup;
pub mod worker;

pub use config::RecorderConfig;
pub use recorder::{RecorderError, RingRecorder};
pub use ring_writer::{
    CompletionMarker, RingWriter, RingWriterError, WritingPoint, COMPLETION_MARKER,
};
pub use startup::StartupFile;
pub use worker::{NotifyWorker, WorkerError};
