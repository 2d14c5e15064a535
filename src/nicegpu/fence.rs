use std::time::{Duration, Instant};

use super::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EWaitResult {
    Reached,
    // -- the value was not reached in time; whatever it guards is still in use by the GPU
    TimedOut,
}

pub struct SFence<D: TDevice> {
    raw: D::Fence,

    fenceevent: SEventHandle,
    nextfencevalue: u64,
}

impl<D: TDevice> SFence<D> {
    pub fn create(device: &D) -> SResult<Self> {
        let raw = device.create_fence(0).map_err(|e| {
            log::error!("SFence::create: {}", e);
            e
        })?;

        let completedvalue = raw.get_completed_value();
        if completedvalue != 0 {
            return Err(EGPUError::Device("new fence did not start at zero"));
        }

        Ok(Self {
            raw: raw,
            fenceevent: SEventHandle::new(),
            nextfencevalue: 1,
        })
    }

    pub fn raw(&self) -> &D::Fence {
        &self.raw
    }

    pub fn next_value(&self) -> u64 {
        self.nextfencevalue
    }

    pub fn last_signalled_value(&self) -> u64 {
        self.nextfencevalue - 1
    }

    pub fn completed_value(&self) -> u64 {
        self.raw.get_completed_value()
    }

    pub fn is_complete(&self, val: u64) -> bool {
        self.raw.get_completed_value() >= val
    }

    // -- enqueue the next value on `queue`; the returned value marks everything submitted so far
    pub fn signal(&mut self, queue: &D::CommandQueue) -> SResult<u64> {
        let result = self.nextfencevalue;
        queue.signal(&self.raw, result).map_err(|e| {
            log::error!("SFence::signal({}): {}", result, e);
            e
        })?;
        self.nextfencevalue += 1;
        Ok(result)
    }

    // -- None waits forever. A value of 0 was never submitted and is always reached.
    pub fn wait_for_value(&self, val: u64, timeout: Option<Duration>) -> SResult<EWaitResult> {
        if val == 0 || self.is_complete(val) {
            return Ok(EWaitResult::Reached);
        }
        if val >= self.nextfencevalue {
            return Err(EGPUError::InvalidArgument("waiting on a fence value that was never signalled"));
        }

        self.raw.set_event_on_completion(val, &self.fenceevent)?;

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let remaining = match deadline {
                None => None,
                Some(d) => Some(d.saturating_duration_since(Instant::now())),
            };

            let woke = self.fenceevent.wait_for_single_object(remaining);
            if self.is_complete(val) {
                return Ok(EWaitResult::Reached);
            }

            // -- a wake without completion is a leftover signal from an earlier timed-out wait
            if !woke || remaining == Some(Duration::from_secs(0)) {
                log::debug!(
                    "SFence: timed out waiting for {} (completed {})",
                    val,
                    self.completed_value()
                );
                return Ok(EWaitResult::TimedOut);
            }
        }
    }

    // -- signal and wait for it: keeps the CPU at most one submission ahead of the GPU
    pub fn pace(&mut self, queue: &D::CommandQueue, timeout: Option<Duration>) -> SResult<EWaitResult> {
        let val = self.signal(queue)?;
        self.wait_for_value(val, timeout)
    }

    // -- full drain: on return the GPU has finished everything submitted to `queue`
    pub fn flush_blocking(&mut self, queue: &D::CommandQueue) -> SResult<()> {
        let val = self.signal(queue)?;
        match self.wait_for_value(val, None)? {
            EWaitResult::Reached => Ok(()),
            EWaitResult::TimedOut => Err(EGPUError::Device("unbounded fence wait returned early")),
        }
    }
}
