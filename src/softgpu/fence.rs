use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::SResult;
use crate::safesync::SEventHandle;
use crate::typeygpu::TFence;

struct SSoftFenceState {
    completed: u64,
    waiters: Vec<(u64, SEventHandle)>,
}

// -- clones share state, so a test thread playing the GPU can hold one
#[derive(Clone)]
pub struct SSoftFence {
    state: Arc<Mutex<SSoftFenceState>>,
}

impl SSoftFence {
    pub fn new(initial_value: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SSoftFenceState {
                completed: initial_value,
                waiters: Vec::new(),
            })),
        }
    }

    // -- GPU side: the queue reached `value`. Completed value never moves backwards.
    pub fn complete_to(&self, value: u64) {
        let mut state = self.state.lock();
        if value > state.completed {
            state.completed = value;
        }

        let completed = state.completed;
        state.waiters.retain(|(target, event)| {
            if *target <= completed {
                event.set();
                false
            } else {
                true
            }
        });
    }

    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

impl TFence for SSoftFence {
    fn get_completed_value(&self) -> u64 {
        self.state.lock().completed
    }

    fn set_event_on_completion(&self, value: u64, event: &SEventHandle) -> SResult<()> {
        let mut state = self.state.lock();
        if value <= state.completed {
            event.set();
        } else {
            state.waiters.push((value, event.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_event_fires_on_completion() {
        let fence = SSoftFence::new(0);
        let evt = SEventHandle::new();

        fence.set_event_on_completion(2, &evt).unwrap();
        assert_eq!(fence.pending_waiters(), 1);

        fence.complete_to(1);
        assert!(!evt.is_set());

        fence.complete_to(2);
        assert!(evt.wait_for_single_object(Some(Duration::from_millis(0))));
        assert_eq!(fence.pending_waiters(), 0);
    }

    #[test]
    fn test_completed_is_monotonic() {
        let fence = SSoftFence::new(0);
        fence.complete_to(5);
        fence.complete_to(3);
        assert_eq!(fence.get_completed_value(), 5);
    }

    #[test]
    fn test_already_reached_sets_immediately() {
        let fence = SSoftFence::new(4);
        let evt = SEventHandle::new();
        fence.set_event_on_completion(3, &evt).unwrap();
        assert!(evt.is_set());
    }
}
