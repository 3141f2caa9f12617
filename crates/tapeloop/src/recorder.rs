//! Ring buffer recorder.
//!
//! The external-facing lifecycle around the pending-sample queue, the
//! notification worker, and the rotating file writer:
//!
//! ```text
//! real-time producer            writer thread
//!        │                            │
//!        ▼                            ▼
//!   add_sample() ──lock──▶ pending ──swap──▶ local chunks
//!        │                  queue             │
//!        └── notify ──────────────────────────┤
//!                                             ▼
//!                                     RingWriter session
//!                                  <base>/<UTC>_ring<N>/
//! ```
//!
//! The producer side never touches the filesystem: `add_sample` copies the
//! sample into the queue under a short lock and pokes the worker. All disk
//! I/O happens on the worker thread, which swaps the whole queue out under
//! the lock and drains it outside the lock, opening sessions lazily and
//! rotating when a chunk requests it.

use std::mem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::RecorderConfig;
use crate::ring_writer::RingWriter;
use crate::worker::{NotifyWorker, WorkerError};

/// Errors from recorder initialization.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to start writer thread: {0}")]
    WorkerSpawn(#[from] WorkerError),
}

/// One queued sample plus its rotation request.
struct Chunk {
    data: Vec<u8>,
    start_new_session: bool,
}

/// State touched only by whichever side is currently writing: the worker
/// thread during normal operation, `terminate` after the worker has joined.
struct WriteSide {
    writer: RingWriter,
    /// Sessions opened over the lifetime of this recorder. Incremented on
    /// every open, never reset by terminate, so session directory names stay
    /// unique even within one wall-clock second.
    ring_counter: u64,
    folder: PathBuf,
    sample_size: usize,
    samples_per_file: usize,
    num_files: usize,
}

struct Shared {
    /// Pending queue. Critical sections are O(1): push one chunk, or swap
    /// the whole queue.
    pending: Mutex<Vec<Chunk>>,
    write_side: Mutex<WriteSide>,
    /// Mirror of the writer's open flag, readable without the write lock.
    session_open: AtomicBool,
    /// Sample size, readable from the producer path without the write lock.
    sample_size: AtomicUsize,
}

/// Non-blocking recorder for fixed-size binary samples.
///
/// One instance owns one writer thread and at most one open session. The
/// handle is single-owner: construct it once, drive it with
/// [`initialize`](RingRecorder::initialize) /
/// [`add_sample`](RingRecorder::add_sample) /
/// [`terminate`](RingRecorder::terminate), and drop it exactly once
/// (dropping terminates).
pub struct RingRecorder {
    shared: Arc<Shared>,
    worker: Option<NotifyWorker>,
}

impl RingRecorder {
    /// Create a recorder with no worker running and no session open.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(Vec::new()),
                write_side: Mutex::new(WriteSide {
                    writer: RingWriter::new(),
                    ring_counter: 0,
                    folder: PathBuf::new(),
                    sample_size: 0,
                    samples_per_file: 0,
                    num_files: 0,
                }),
                session_open: AtomicBool::new(false),
                sample_size: AtomicUsize::new(0),
            }),
            worker: None,
        }
    }

    /// Start the writer thread with the given configuration.
    ///
    /// Zero-valued size parameters are clamped to 1. No file is created
    /// here; a session opens lazily on the first drained write.
    /// Re-initializing after [`terminate`](RingRecorder::terminate) is
    /// allowed and keeps the ring counter.
    pub fn initialize(&mut self, config: RecorderConfig) -> Result<(), RecorderError> {
        self.stop_worker();
        let config = config.clamped();

        {
            let mut side = self.shared.write_side.lock().unwrap();
            side.folder = config.folder.clone();
            side.sample_size = config.sample_size;
            side.samples_per_file = config.samples_per_file;
            side.num_files = config.num_files;
        }
        self.shared
            .sample_size
            .store(config.sample_size, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        let worker = NotifyWorker::spawn("tapeloop-writer", config.thread_priority, move || {
            drain(&shared)
        })?;
        self.worker = Some(worker);

        info!(
            folder = %config.folder.display(),
            sample_size = config.sample_size,
            samples_per_file = config.samples_per_file,
            num_files = config.num_files,
            "recorder initialized"
        );
        Ok(())
    }

    /// Queue one sample for writing and wake the worker.
    ///
    /// Copies exactly the configured sample size (shorter input is
    /// zero-padded, longer input truncated), appends under the queue lock,
    /// and returns the resulting queue depth. A sustained increase in the
    /// returned depth means the writer is falling behind, an operational
    /// back-pressure signal, not an error. Never performs filesystem work
    /// and never takes the writer-side lock.
    ///
    /// When `start_new_session` is set, the current session (if any) is
    /// closed and a fresh one opened before this sample is written.
    pub fn add_sample(&self, sample: &[u8], start_new_session: bool) -> usize {
        let sample_size = self.shared.sample_size.load(Ordering::Relaxed);
        let mut data = vec![0u8; sample_size];
        let n = sample.len().min(sample_size);
        data[..n].copy_from_slice(&sample[..n]);

        let depth = {
            let mut pending = self.shared.pending.lock().unwrap();
            pending.push(Chunk {
                data,
                start_new_session,
            });
            pending.len()
        };

        if let Some(worker) = &self.worker {
            worker.notify();
        }
        depth
    }

    /// Stop the writer thread, flush everything still queued, and close the
    /// session. Idempotent; also runs on drop.
    ///
    /// Every sample accepted by `add_sample` before this call begins is
    /// written through the same path the worker uses. The ring counter
    /// survives for the next initialize.
    pub fn terminate(&mut self) {
        self.stop_worker();

        let chunks = {
            let mut pending = self.shared.pending.lock().unwrap();
            mem::take(&mut *pending)
        };

        let mut side = self.shared.write_side.lock().unwrap();
        // Guarded so terminating an idle or never-initialized recorder
        // cannot open a session just to close it again.
        if !chunks.is_empty() && side.num_files != 0 {
            write_chunks(&mut side, &self.shared.session_open, chunks);
        }
        side.writer.close();
        self.shared.session_open.store(false, Ordering::Relaxed);

        side.folder = PathBuf::new();
        side.sample_size = 0;
        side.samples_per_file = 0;
        side.num_files = 0;
        self.shared.sample_size.store(0, Ordering::Relaxed);
    }

    /// Whether a session is currently open. Advisory and racy with the
    /// worker thread; suitable for monitoring, not correctness decisions.
    pub fn is_open(&self) -> bool {
        self.shared.session_open.load(Ordering::Relaxed)
    }

    fn stop_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Default for RingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RingRecorder {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Worker callback: swap the queue out under the lock, write outside it.
fn drain(shared: &Shared) {
    let chunks = {
        let mut pending = shared.pending.lock().unwrap();
        mem::take(&mut *pending)
    };
    if chunks.is_empty() {
        return;
    }

    let mut side = shared.write_side.lock().unwrap();
    write_chunks(&mut side, &shared.session_open, chunks);
}

/// Write a drained batch in FIFO order, opening and rotating sessions as
/// directed by the chunks' flags.
///
/// A failed open is not retried within this pass (short of an explicit
/// rotation request); samples written while closed are silently dropped and
/// the next drain attempts a fresh session.
fn write_chunks(side: &mut WriteSide, session_open: &AtomicBool, chunks: Vec<Chunk>) {
    if !side.writer.is_open() {
        open_session(side, session_open);
    }
    for chunk in chunks {
        if chunk.start_new_session {
            side.writer.close();
            session_open.store(false, Ordering::Relaxed);
            open_session(side, session_open);
        }
        side.writer.write(&chunk.data);
    }
}

/// Open the next session under a fresh `<UTC>_ring<N>` directory.
///
/// The ring counter advances even when the open fails, so a later retry
/// never reuses a failed session's name.
fn open_session(side: &mut WriteSide, session_open: &AtomicBool) {
    side.ring_counter += 1;
    let directory = side.folder.join(session_dir_name(side.ring_counter));
    match side.writer.open(
        &directory,
        side.sample_size,
        side.samples_per_file,
        side.num_files,
    ) {
        Ok(()) => {
            session_open.store(true, Ordering::Relaxed);
            info!(
                directory = %directory.display(),
                ring = side.ring_counter,
                "opened recording session"
            );
        }
        Err(e) => {
            warn!(
                directory = %directory.display(),
                "failed to open recording session: {e}"
            );
        }
    }
}

/// Session directory name: current UTC time plus the ring counter.
fn session_dir_name(ring_counter: u64) -> String {
    format!("{}_ring{}", Utc::now().format("%Y%m%d_%H%M%S"), ring_counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn config(temp: &TempDir, sample_size: usize, samples_per_file: usize, num_files: usize) -> RecorderConfig {
        RecorderConfig {
            folder: temp.path().to_path_buf(),
            sample_size,
            samples_per_file,
            num_files,
            thread_priority: 0,
        }
    }

    fn session_dirs(temp: &TempDir) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort_by_key(|p| ring_number(p));
        dirs
    }

    fn ring_number(dir: &std::path::Path) -> u64 {
        let name = dir.file_name().unwrap().to_str().unwrap();
        let (_, n) = name.rsplit_once("_ring").unwrap();
        n.parse().unwrap()
    }

    #[test]
    fn test_session_dir_name_format() {
        let name = session_dir_name(3);
        // YYYYMMDD_HHMMSS_ring3
        let (timestamp, ring) = name.rsplit_once("_ring").unwrap();
        assert_eq!(ring, "3");
        assert_eq!(timestamp.len(), 15);
        assert_eq!(&timestamp[8..9], "_");
    }

    #[test]
    fn test_no_files_created_before_first_sample() {
        let temp = TempDir::new().unwrap();
        let mut recorder = RingRecorder::new();
        recorder.initialize(config(&temp, 4, 2, 3)).unwrap();

        assert!(!recorder.is_open());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
        recorder.terminate();
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_samples_drain_to_disk() {
        let temp = TempDir::new().unwrap();
        let mut recorder = RingRecorder::new();
        recorder.initialize(config(&temp, 4, 2, 3)).unwrap();

        recorder.add_sample(&[7u8; 4], false);
        recorder.terminate();

        let dirs = session_dirs(&temp);
        assert_eq!(dirs.len(), 1);
        assert_eq!(fs::read(dirs[0].join("buffer0.dat")).unwrap(), vec![7; 4]);
    }

    #[test]
    fn test_is_open_tracks_session() {
        let temp = TempDir::new().unwrap();
        let mut recorder = RingRecorder::new();
        recorder.initialize(config(&temp, 4, 2, 3)).unwrap();
        assert!(!recorder.is_open());

        recorder.add_sample(&[1u8; 4], false);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !recorder.is_open() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(recorder.is_open());

        recorder.terminate();
        assert!(!recorder.is_open());
    }

    #[test]
    fn test_short_and_long_samples_normalize_to_sample_size() {
        let temp = TempDir::new().unwrap();
        let mut recorder = RingRecorder::new();
        recorder.initialize(config(&temp, 4, 4, 1)).unwrap();

        recorder.add_sample(b"ab", false); // zero-padded
        recorder.add_sample(b"cdefgh", false); // truncated
        recorder.terminate();

        let dirs = session_dirs(&temp);
        assert_eq!(
            fs::read(dirs[0].join("buffer0.dat")).unwrap(),
            b"ab\0\0cdef".to_vec()
        );
    }

    #[test]
    fn test_add_sample_does_not_block_on_stalled_writer() {
        let temp = TempDir::new().unwrap();
        let mut recorder = RingRecorder::new();
        recorder.initialize(config(&temp, 4, 20, 3)).unwrap();

        // Hold the writer-side lock, simulating a stalled disk. The
        // producer path must keep returning promptly regardless.
        let side = recorder.shared.write_side.lock().unwrap();
        let start = Instant::now();
        for i in 0..10u8 {
            let depth = recorder.add_sample(&[i; 4], false);
            assert!(depth >= 1);
        }
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "add_sample must not wait on the writer"
        );
        drop(side);

        // Nothing was lost while the writer was stalled.
        recorder.terminate();
        let dirs = session_dirs(&temp);
        assert_eq!(dirs.len(), 1);
        let expected: Vec<u8> = (0..10u8).flat_map(|i| [i; 4]).collect();
        assert_eq!(fs::read(dirs[0].join("buffer0.dat")).unwrap(), expected);
    }

    #[test]
    fn test_add_sample_before_initialize_is_harmless() {
        let recorder = RingRecorder::new();
        // Sample size is still zero; the chunk is empty but accepted.
        assert_eq!(recorder.add_sample(b"data", false), 1);
        assert_eq!(recorder.add_sample(b"data", false), 2);
        assert!(!recorder.is_open());
    }

    #[test]
    fn test_failed_session_open_drops_samples_then_recovers() {
        let temp = TempDir::new().unwrap();
        // A regular file where the base folder should go makes every
        // session open fail.
        let base = temp.path().join("base");
        fs::write(&base, b"x").unwrap();

        let mut recorder = RingRecorder::new();
        recorder
            .initialize(RecorderConfig {
                folder: base.clone(),
                sample_size: 4,
                samples_per_file: 2,
                num_files: 3,
                thread_priority: 0,
            })
            .unwrap();
        recorder.add_sample(&[1u8; 4], false);
        recorder.terminate();

        // The sample was dropped, not queued for a later session.
        assert!(base.is_file());
        assert!(!recorder.is_open());

        // Clear the blocker; a fresh cycle opens a new session and the
        // failed attempt has consumed a ring number.
        fs::remove_file(&base).unwrap();
        fs::create_dir(&base).unwrap();
        recorder
            .initialize(RecorderConfig {
                folder: base.clone(),
                sample_size: 4,
                samples_per_file: 2,
                num_files: 3,
                thread_priority: 0,
            })
            .unwrap();
        recorder.add_sample(&[2u8; 4], false);
        recorder.terminate();

        let dirs: Vec<PathBuf> = fs::read_dir(&base)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(dirs.len(), 1);
        assert_eq!(fs::read(dirs[0].join("buffer0.dat")).unwrap(), vec![2; 4]);
        assert_eq!(ring_number(&dirs[0]), 2);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut recorder = RingRecorder::new();
        recorder.initialize(config(&temp, 4, 2, 3)).unwrap();
        recorder.add_sample(&[1u8; 4], false);
        recorder.terminate();
        recorder.terminate();
        assert_eq!(session_dirs(&temp).len(), 1);
    }

    #[test]
    fn test_drop_terminates_and_flushes() {
        let temp = TempDir::new().unwrap();
        {
            let mut recorder = RingRecorder::new();
            recorder.initialize(config(&temp, 4, 2, 3)).unwrap();
            recorder.add_sample(&[9u8; 4], false);
        }
        let dirs = session_dirs(&temp);
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].join(crate::ring_writer::COMPLETION_MARKER).exists());
    }
}
