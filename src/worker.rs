//! Background loop handle with cooperative shutdown.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long `stop()` waits for a loop to exit before detaching it.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Upper bound on a single sleep inside `pause`.
pub const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// A named background thread plus its private stop flag.
///
/// Every spawn gets a fresh flag, so a loop that outlives a timed-out join
/// stays stopped even if a new worker is started afterwards.
#[derive(Debug)]
pub struct Worker {
    name: String,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body`, handing it the stop flag to poll.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(shutdown_thread))
            .with_context(|| format!("spawn {} thread", name))?;
        Ok(Self {
            name: name.to_string(),
            shutdown,
            join: Some(join),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Raise the stop flag and wait up to `timeout` for the thread to exit.
    ///
    /// Returns `true` if the thread was joined. On timeout the thread is
    /// detached and will exit on its own once it next polls the flag.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(join) = self.join.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !join.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "{} did not exit within {:?}; detaching",
                    self.name,
                    timeout
                );
                return false;
            }
            std::thread::sleep(JOIN_POLL);
        }
        if join.join().is_err() {
            log::error!("{} thread panicked", self.name);
        }
        true
    }
}

/// Sleep for `duration` in short slices, returning early once `shutdown` is
/// raised. Returns `false` if interrupted.
pub fn pause(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(PAUSE_SLICE));
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
