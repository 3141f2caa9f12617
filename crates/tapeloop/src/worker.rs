//! Notification worker thread.
//!
//! A reusable single-thread task abstraction: the owner spawns the thread
//! once with a callback, then pokes it with [`NotifyWorker::notify`] whenever
//! new work is available. Notifications are a single-slot flag, not a count:
//! any number of `notify` calls before the worker wakes collapse into one
//! wakeup, so the callback must fully drain whatever became available rather
//! than process "one notification's worth".
//!
//! Shutdown is cooperative: [`NotifyWorker::stop`] wakes the thread, waits
//! for it to exit, and always completes. A stop request wins over a pending
//! notification; the owner is expected to flush leftover work itself after
//! the join (see `RingRecorder::terminate`).

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;

/// Wakeup state shared between the handle and the worker thread.
#[derive(Default)]
struct Signal {
    state: Mutex<SignalState>,
    wakeup: Condvar,
}

#[derive(Default)]
struct SignalState {
    notified: bool,
    stop: bool,
}

/// Errors from spawning the worker thread.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Handle to a spawned notification worker.
///
/// Dropping the handle stops the thread.
pub struct NotifyWorker {
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl NotifyWorker {
    /// Spawn a worker thread running `callback` on every wakeup.
    ///
    /// `priority` is requested as a SCHED_FIFO real-time priority for the
    /// new thread. This is best-effort: an unprivileged process will usually
    /// be refused, which is logged at debug level and otherwise ignored.
    pub fn spawn<F>(name: &str, priority: i32, mut callback: F) -> Result<Self, WorkerError>
    where
        F: FnMut() + Send + 'static,
    {
        let signal = Arc::new(Signal::default());
        let signal_for_thread = Arc::clone(&signal);

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            loop {
                {
                    let mut state = signal_for_thread.state.lock().unwrap();
                    while !state.notified && !state.stop {
                        state = signal_for_thread.wakeup.wait(state).unwrap();
                    }
                    state.notified = false;
                    if state.stop {
                        break;
                    }
                }
                callback();
            }
        })?;

        request_realtime_priority(&handle, priority);

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Wake the worker. Callable from any thread.
    ///
    /// Sets the single pending flag; if the worker is already awake the call
    /// coalesces with whatever wakeup is in flight.
    pub fn notify(&self) {
        let mut state = self.signal.state.lock().unwrap();
        state.notified = true;
        self.signal.wakeup.notify_one();
    }

    /// Stop the worker and wait for the thread to exit. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        {
            let mut state = self.signal.state.lock().unwrap();
            state.stop = true;
            self.signal.wakeup.notify_one();
        }
        let _ = handle.join();
    }
}

impl Drop for NotifyWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Request SCHED_FIFO scheduling for the spawned thread.
#[cfg(unix)]
fn request_realtime_priority(handle: &JoinHandle<()>, priority: i32) {
    use std::os::unix::thread::JoinHandleExt;

    // sched_param has platform-specific padding on some unixes
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = priority;

    let rc = unsafe {
        libc::pthread_setschedparam(handle.as_pthread_t(), libc::SCHED_FIFO, &param)
    };
    if rc != 0 {
        debug!(priority, errno = rc, "SCHED_FIFO priority not applied");
    }
}

#[cfg(not(unix))]
fn request_realtime_priority(_handle: &JoinHandle<()>, _priority: i32) {}
