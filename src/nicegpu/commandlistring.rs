use std::time::Duration;

use super::*;
use super::fence::{EWaitResult, SFence};

// -- N allocators sharing one command list. Each slot remembers the fence value of its last
// -- submission and is only reset once the GPU has passed it.
pub struct SCommandListRing<D: TDevice> {
    type_: ECommandListType,
    allocators: Vec<D::CommandAllocator>,
    reusefencevalues: Vec<u64>,
    list: D::CommandList,

    nextindex: usize,
    recordingindex: Option<usize>,
}

impl<D: TDevice> SCommandListRing<D> {
    pub fn create(device: &D, type_: ECommandListType, count: usize) -> SResult<Self> {
        if count == 0 {
            return Err(EGPUError::InvalidArgument("command list ring with zero allocators"));
        }

        let mut allocators = Vec::with_capacity(count);
        for _ in 0..count {
            allocators.push(device.create_command_allocator(type_).map_err(|e| {
                log::error!("SCommandListRing::create: {}", e);
                e
            })?);
        }

        let mut list = device.create_command_list(type_, &allocators[0])?;
        list.close()?;

        log::debug!("created {:?} command list ring with {} allocators", type_, count);

        Ok(Self {
            type_: type_,
            allocators: allocators,
            reusefencevalues: vec![0; count],
            list: list,
            nextindex: 0,
            recordingindex: None,
        })
    }

    pub fn count(&self) -> usize {
        self.allocators.len()
    }

    pub fn type_(&self) -> ECommandListType {
        self.type_
    }

    pub fn is_recording(&self) -> bool {
        self.recordingindex.is_some()
    }

    // -- fence value the next slot must wait on before it can be reset
    pub fn next_reuse_fence_value(&self) -> u64 {
        self.reusefencevalues[self.nextindex]
    }

    // -- Ok(None) when the next slot's previous submission is still on the GPU
    pub fn reset(&mut self, fence: &SFence<D>) -> SResult<Option<&mut D::CommandList>> {
        self.check_closed()?;

        let index = self.nextindex;
        let reuse = self.reusefencevalues[index];
        if !fence.is_complete(reuse) {
            log::debug!(
                "command list ring slot {} still in flight (waiting on {}, completed {})",
                index,
                reuse,
                fence.completed_value()
            );
            return Ok(None);
        }

        self.reset_slot(index).map(Some)
    }

    pub fn reset_blocking(
        &mut self,
        fence: &SFence<D>,
        timeout: Option<Duration>,
    ) -> SResult<Option<&mut D::CommandList>> {
        self.check_closed()?;

        let index = self.nextindex;
        match fence.wait_for_value(self.reusefencevalues[index], timeout)? {
            EWaitResult::Reached => self.reset_slot(index).map(Some),
            EWaitResult::TimedOut => Ok(None),
        }
    }

    fn check_closed(&self) -> SResult<()> {
        if let Some(index) = self.recordingindex {
            log::error!("command list ring reset while slot {} is still recording", index);
            return Err(EGPUError::InvalidArgument("command list ring reset while recording"));
        }
        Ok(())
    }

    fn reset_slot(&mut self, index: usize) -> SResult<&mut D::CommandList> {
        self.allocators[index].reset()?;
        self.list.reset(&self.allocators[index])?;

        self.nextindex = (index + 1) % self.allocators.len();
        self.recordingindex = Some(index);
        Ok(&mut self.list)
    }

    pub fn list(&mut self) -> Option<&mut D::CommandList> {
        match self.recordingindex {
            Some(_) => Some(&mut self.list),
            None => None,
        }
    }

    // -- close, submit and signal; the signalled value guards the slot's next reset
    pub fn execute(&mut self, queue: &D::CommandQueue, fence: &mut SFence<D>) -> SResult<u64> {
        let index = self
            .recordingindex
            .take()
            .ok_or(EGPUError::InvalidArgument("executing a command list ring that is not recording"))?;

        self.list.close()?;
        queue.execute_command_list(&self.list)?;
        let value = fence.signal(queue)?;

        self.reusefencevalues[index] = value;
        Ok(value)
    }

    // -- drop what was recorded. Nothing reached the GPU so the slot keeps its old reuse value.
    pub fn abort(&mut self) -> SResult<()> {
        if self.recordingindex.take().is_some() {
            self.list.close()?;
        }
        Ok(())
    }
}
