use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct CancelInner {
    cancelled: AtomicBool,
    // Dropping the sender disconnects every receiver clone, waking all waiters at once.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Cooperative cancellation shared by every agent loop.
///
/// Loops call [`CancelToken::wait_timeout`] instead of sleeping so a single
/// [`CancelToken::cancel`] interrupts all of their waits immediately. Code that
/// already blocks on a crossbeam channel can include [`CancelToken::signal`] in
/// a `select!` to get the same effect.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Idempotent. Returns true only for the call that flipped the token.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner
            .trigger
            .lock()
            .expect("cancel trigger mutex poisoned")
            .take();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks for up to `timeout`. Returns true if the token was cancelled
    /// before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.inner.signal.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Becomes permanently ready (disconnected) once the token is cancelled.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wait_times_out_while_active() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_wakes_waiters_on_other_threads() {
        let token = CancelToken::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let token = token.clone();
                thread::spawn(move || {
                    let start = Instant::now();
                    let cancelled = token.wait_timeout(Duration::from_secs(10));
                    (cancelled, start.elapsed())
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(token.cancel());

        for waiter in waiters {
            let (cancelled, elapsed) = waiter.join().expect("waiter panicked");
            assert!(cancelled);
            assert!(elapsed < Duration::from_secs(5));
        }
    }

    #[test]
    fn cancel_is_idempotent_and_sticky() {
        let token = CancelToken::new();
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
        assert!(token.wait_timeout(Duration::from_secs(10)));
        assert!(token.signal().try_recv().is_err());
    }
}
