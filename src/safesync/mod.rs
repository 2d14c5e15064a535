// -- portable stand-ins for the OS synchronization handles the fence layer needs

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct SEventInner {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

// -- auto-reset event: a successful wait consumes the signal
#[derive(Clone)]
pub struct SEventHandle {
    inner: Arc<SEventInner>,
}

impl SEventHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SEventInner {
                signalled: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    pub fn set(&self) {
        let mut signalled = self.inner.signalled.lock();
        *signalled = true;
        self.inner.condvar.notify_one();
    }

    pub fn is_set(&self) -> bool {
        *self.inner.signalled.lock()
    }

    // -- None waits forever. Returns false when the timeout elapsed without a signal.
    pub fn wait_for_single_object(&self, timeout: Option<Duration>) -> bool {
        let mut signalled = self.inner.signalled.lock();

        match timeout {
            None => {
                while !*signalled {
                    self.inner.condvar.wait(&mut signalled);
                }
            }
            Some(duration) => {
                let deadline = Instant::now() + duration;
                while !*signalled {
                    if self.inner.condvar.wait_until(&mut signalled, deadline).timed_out() {
                        break;
                    }
                }
                if !*signalled {
                    return false;
                }
            }
        }

        *signalled = false;
        true
    }
}

impl Default for SEventHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_then_wait() {
        let evt = SEventHandle::new();
        evt.set();
        assert!(evt.is_set());
        assert!(evt.wait_for_single_object(Some(Duration::from_millis(0))));
        // -- auto reset
        assert!(!evt.is_set());
    }

    #[test]
    fn test_timeout() {
        let evt = SEventHandle::new();
        let start = Instant::now();
        assert!(!evt.wait_for_single_object(Some(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cross_thread_wake() {
        let evt = SEventHandle::new();
        let setter = evt.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            setter.set();
        });

        assert!(evt.wait_for_single_object(None));
        handle.join().unwrap();
    }
}
