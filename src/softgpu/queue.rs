use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::commandlist::{ESoftCommand, SSoftCommandList};
use super::fence::SSoftFence;
use crate::errors::{EGPUError, SResult};
use crate::typeygpu::*;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ERetireMode {
    // -- work completes as soon as it is submitted
    Immediate,
    // -- work waits in the queue until retire_* is called, in submission order
    Manual,
}

#[derive(Clone, Debug)]
pub struct SSoftSubmission {
    pub allocator_id: usize,
    pub commands: Vec<ESoftCommand>,
}

enum ESoftQueueOp {
    Execute,
    Signal(SSoftFence, u64),
}

struct SSoftQueueState {
    pending: VecDeque<ESoftQueueOp>,
    submissions: Vec<SSoftSubmission>,
    retired_submissions: usize,
    signalled_values: Vec<u64>,
    device_removed: bool,
}

#[derive(Clone)]
pub struct SSoftCommandQueue {
    type_: ECommandListType,
    mode: ERetireMode,
    state: Arc<Mutex<SSoftQueueState>>,
}

impl SSoftCommandQueue {
    pub fn new(type_: ECommandListType, mode: ERetireMode) -> Self {
        Self {
            type_: type_,
            mode: mode,
            state: Arc::new(Mutex::new(SSoftQueueState {
                pending: VecDeque::new(),
                submissions: Vec::new(),
                retired_submissions: 0,
                signalled_values: Vec::new(),
                device_removed: false,
            })),
        }
    }

    pub fn mode(&self) -> ERetireMode {
        self.mode
    }

    // -- every later submission or signal fails, as on a lost device
    pub fn set_device_removed(&self, removed: bool) {
        self.state.lock().device_removed = removed;
    }

    fn retire_op(state: &mut SSoftQueueState, op: ESoftQueueOp) {
        match op {
            ESoftQueueOp::Execute => state.retired_submissions += 1,
            ESoftQueueOp::Signal(fence, value) => fence.complete_to(value),
        }
    }

    // -- returns false when nothing was pending
    pub fn retire_next(&self) -> bool {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(op) => {
                Self::retire_op(&mut state, op);
                true
            }
            None => false,
        }
    }

    pub fn retire_all(&self) {
        while self.retire_next() {}
    }

    // -- retire in order up to and including the first signal of `value` or beyond
    pub fn retire_through(&self, value: u64) {
        let mut state = self.state.lock();
        while let Some(op) = state.pending.pop_front() {
            let done = match &op {
                ESoftQueueOp::Signal(_, v) => *v >= value,
                ESoftQueueOp::Execute => false,
            };
            Self::retire_op(&mut state, op);
            if done {
                break;
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn retired_submission_count(&self) -> usize {
        self.state.lock().retired_submissions
    }

    pub fn submissions(&self) -> Vec<SSoftSubmission> {
        self.state.lock().submissions.clone()
    }

    pub fn signalled_values(&self) -> Vec<u64> {
        self.state.lock().signalled_values.clone()
    }
}

impl TCommandQueue for SSoftCommandQueue {
    type Fence = SSoftFence;
    type List = SSoftCommandList;

    fn type_(&self) -> ECommandListType {
        self.type_
    }

    fn execute_command_list(&self, list: &SSoftCommandList) -> SResult<()> {
        let mut state = self.state.lock();
        if state.device_removed {
            return Err(EGPUError::Device("execute on removed device"));
        }
        if list.is_recording() {
            return Err(EGPUError::Device("executed a command list that was not closed"));
        }
        if list.type_() != self.type_ {
            return Err(EGPUError::Device("command list type does not match queue"));
        }

        state.submissions.push(SSoftSubmission {
            allocator_id: list.allocator_id(),
            commands: list.commands().to_vec(),
        });

        match self.mode {
            ERetireMode::Immediate => Self::retire_op(&mut state, ESoftQueueOp::Execute),
            ERetireMode::Manual => state.pending.push_back(ESoftQueueOp::Execute),
        }
        Ok(())
    }

    fn signal(&self, fence: &SSoftFence, value: u64) -> SResult<()> {
        let mut state = self.state.lock();
        if state.device_removed {
            return Err(EGPUError::Device("signal on removed device"));
        }

        state.signalled_values.push(value);
        let op = ESoftQueueOp::Signal(fence.clone(), value);
        match self.mode {
            ERetireMode::Immediate => Self::retire_op(&mut state, op),
            ERetireMode::Manual => state.pending.push_back(op),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softgpu::commandlist::SSoftCommandAllocator;

    #[test]
    fn test_manual_retires_in_order() {
        let queue = SSoftCommandQueue::new(ECommandListType::Direct, ERetireMode::Manual);
        let fence = SSoftFence::new(0);

        queue.signal(&fence, 1).unwrap();
        queue.signal(&fence, 2).unwrap();
        queue.signal(&fence, 3).unwrap();
        assert_eq!(fence.get_completed_value(), 0);
        assert_eq!(queue.pending_count(), 3);

        queue.retire_next();
        assert_eq!(fence.get_completed_value(), 1);

        queue.retire_through(3);
        assert_eq!(fence.get_completed_value(), 3);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.signalled_values(), vec![1, 2, 3]);
    }

    #[test]
    fn test_immediate_mode() {
        let queue = SSoftCommandQueue::new(ECommandListType::Direct, ERetireMode::Immediate);
        let fence = SSoftFence::new(0);
        queue.signal(&fence, 7).unwrap();
        assert_eq!(fence.get_completed_value(), 7);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn test_execute_requires_closed_list() {
        let queue = SSoftCommandQueue::new(ECommandListType::Direct, ERetireMode::Immediate);
        let allocator = SSoftCommandAllocator::new(0, ECommandListType::Direct);
        let mut list = SSoftCommandList::new(ECommandListType::Direct, &allocator);

        assert!(queue.execute_command_list(&list).is_err());
        list.close().unwrap();
        queue.execute_command_list(&list).unwrap();
        assert_eq!(queue.submissions().len(), 1);
        assert_eq!(queue.retired_submission_count(), 1);
    }

    #[test]
    fn test_device_removed() {
        let queue = SSoftCommandQueue::new(ECommandListType::Direct, ERetireMode::Manual);
        let fence = SSoftFence::new(0);
        queue.set_device_removed(true);
        let err = queue.signal(&fence, 1).unwrap_err();
        assert!(err.is_fatal());
    }
}
