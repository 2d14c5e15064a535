use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrayvec::ArrayVec;

use crate::errors::{EGPUError, SResult};
use crate::nicegpu::{EWaitResult, SConstantBufferArray, SDescriptorAllocator, SFence};
use crate::typeygpu::*;

use super::shaderbindings::*;

pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EFrameResourceState {
    Idle,
    Recording,
    // -- queued on the GPU; becomes Idle once the fence passes fence_value
    Submitted,
}

// -- everything one frame writes while the GPU may still be reading the others
pub struct SFrameResource<D: TDevice> {
    index: usize,
    allocator: D::CommandAllocator,

    transforms: SConstantBufferArray<D, STransform>,
    lights: SConstantBufferArray<D, SLightBuffer>,
    materials: SConstantBufferArray<D, SMaterialBuffer>,
    passes: SConstantBufferArray<D, SPassConstants>,

    fencevalue: u64,
    state: EFrameResourceState,
    writing: AtomicBool,
}

impl<D: TDevice> SFrameResource<D> {
    pub fn create(
        device: &D,
        index: usize,
        item_count: usize,
        descriptors: Option<&Arc<SDescriptorAllocator<D>>>,
    ) -> SResult<Self> {
        let allocator = device.create_command_allocator(ECommandListType::Direct)?;

        Ok(Self {
            index: index,
            allocator: allocator,
            transforms: SConstantBufferArray::create(device, item_count, descriptors)?,
            lights: SConstantBufferArray::create(device, item_count, descriptors)?,
            materials: SConstantBufferArray::create(device, item_count, descriptors)?,
            passes: SConstantBufferArray::create(device, item_count, descriptors)?,
            fencevalue: 0,
            state: EFrameResourceState::Idle,
            writing: AtomicBool::new(false),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn fence_value(&self) -> u64 {
        self.fencevalue
    }

    pub fn item_count(&self) -> usize {
        self.transforms.count()
    }

    pub fn state(&self, fence: &SFence<D>) -> EFrameResourceState {
        match self.state {
            EFrameResourceState::Submitted if fence.is_complete(self.fencevalue) => EFrameResourceState::Idle,
            s => s,
        }
    }

    pub fn transforms(&self) -> &SConstantBufferArray<D, STransform> {
        &self.transforms
    }

    pub fn lights(&self) -> &SConstantBufferArray<D, SLightBuffer> {
        &self.lights
    }

    pub fn materials(&self) -> &SConstantBufferArray<D, SMaterialBuffer> {
        &self.materials
    }

    pub fn passes(&self) -> &SConstantBufferArray<D, SPassConstants> {
        &self.passes
    }

    // -- the only way into Recording. Refuses a set the GPU may still be reading.
    fn begin_recording(&mut self, fence: &SFence<D>) -> SResult<()> {
        if !fence.is_complete(self.fencevalue) {
            log::error!(
                "frame resource {} reused at fence {} before the GPU reached it (completed {})",
                self.index,
                self.fencevalue,
                fence.completed_value()
            );
            return Err(EGPUError::ReuseInFlight(self.index));
        }

        if self
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::error!("frame resource {} is already being written", self.index);
            return Err(EGPUError::ConcurrentWrite(self.index));
        }

        self.state = EFrameResourceState::Recording;
        Ok(())
    }
}

// -- N frame resources used round-robin, sharing one direct command list
pub struct SFrameResourceRing<D: TDevice> {
    frames: ArrayVec<[SFrameResource<D>; MAX_FRAMES_IN_FLIGHT]>,
    list: D::CommandList,
    current: usize,
}

impl<D: TDevice> SFrameResourceRing<D> {
    pub fn create(
        device: &D,
        frame_count: usize,
        item_count: usize,
        descriptors: Option<&Arc<SDescriptorAllocator<D>>>,
    ) -> SResult<Self> {
        if frame_count == 0 || frame_count > MAX_FRAMES_IN_FLIGHT {
            return Err(EGPUError::InvalidArgument("frames in flight out of range"));
        }

        let mut frames: ArrayVec<[SFrameResource<D>; MAX_FRAMES_IN_FLIGHT]> = ArrayVec::new();
        for i in 0..frame_count {
            frames.push(SFrameResource::create(device, i, item_count, descriptors)?);
        }

        let mut list = device.create_command_list(ECommandListType::Direct, &frames[0].allocator)?;
        list.close()?;

        log::info!("created {} frame resources for {} render items", frame_count, item_count);

        Ok(Self {
            frames: frames,
            list: list,
            current: frame_count - 1,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn frame(&self, index: usize) -> &SFrameResource<D> {
        &self.frames[index]
    }

    pub fn fence_values(&self) -> Vec<u64> {
        self.frames.iter().map(|f| f.fencevalue).collect()
    }

    // -- wait for the next set's previous submission to retire, then hand it out for recording.
    // -- Ok(None) on timeout: the ring does not advance and the caller retries later.
    pub fn select_next(
        &mut self,
        fence: &SFence<D>,
        timeout: Option<Duration>,
    ) -> SResult<Option<SFrameRecording<'_, D>>> {
        let next = (self.current + 1) % self.frames.len();

        match fence.wait_for_value(self.frames[next].fencevalue, timeout)? {
            EWaitResult::TimedOut => {
                log::debug!(
                    "frame resource {} still in flight at fence {}",
                    next,
                    self.frames[next].fencevalue
                );
                return Ok(None);
            }
            EWaitResult::Reached => {}
        }

        self.current = next;
        let frame = &mut self.frames[next];
        frame.begin_recording(fence)?;

        let mut recording = SFrameRecording {
            frame: frame,
            list: &mut self.list,
            listopen: false,
            submitted: false,
        };
        recording.frame.allocator.reset()?;
        recording.list.reset(&recording.frame.allocator)?;
        recording.listopen = true;

        Ok(Some(recording))
    }
}

// -- a frame resource in the Recording state. Dropping it without submit closes the list and
// -- returns the set to Idle.
pub struct SFrameRecording<'a, D: TDevice> {
    frame: &'a mut SFrameResource<D>,
    list: &'a mut D::CommandList,
    listopen: bool,
    submitted: bool,
}

impl<'a, D: TDevice> SFrameRecording<'a, D> {
    pub fn frame_index(&self) -> usize {
        self.frame.index
    }

    pub fn list(&mut self) -> &mut D::CommandList {
        &mut *self.list
    }

    pub fn write_transform(&self, data_index: usize, value: &STransform) -> SResult<()> {
        self.frame.transforms.write(data_index, value)
    }

    pub fn write_light(&self, data_index: usize, value: &SLightBuffer) -> SResult<()> {
        self.frame.lights.write(data_index, value)
    }

    pub fn write_material(&self, data_index: usize, value: &SMaterialBuffer) -> SResult<()> {
        self.frame.materials.write(data_index, value)
    }

    pub fn write_pass(&self, data_index: usize, value: &SPassConstants) -> SResult<()> {
        self.frame.passes.write(data_index, value)
    }

    // -- root constant buffer views for one item, addressed by its data index
    pub fn bind_item(&mut self, data_index: usize) -> SResult<()> {
        let transform = self.frame.transforms.gpu_virtual_address(data_index)?;
        let light = self.frame.lights.gpu_virtual_address(data_index)?;
        let material = self.frame.materials.gpu_virtual_address(data_index)?;
        let pass = self.frame.passes.gpu_virtual_address(data_index)?;

        self.list.set_graphics_root_constant_buffer_view(ROOT_PARAM_TRANSFORM, transform);
        self.list.set_graphics_root_constant_buffer_view(ROOT_PARAM_LIGHT, light);
        self.list.set_graphics_root_constant_buffer_view(ROOT_PARAM_MATERIAL, material);
        self.list.set_graphics_root_constant_buffer_view(ROOT_PARAM_PASS, pass);
        Ok(())
    }

    pub fn submit(mut self, queue: &D::CommandQueue, fence: &mut SFence<D>) -> SResult<u64> {
        self.listopen = false;
        self.list.close()?;
        queue.execute_command_list(&*self.list)?;
        let value = fence.signal(queue)?;

        self.frame.fencevalue = value;
        self.frame.state = EFrameResourceState::Submitted;
        self.submitted = true;
        Ok(value)
    }
}

impl<'a, D: TDevice> Drop for SFrameRecording<'a, D> {
    fn drop(&mut self) {
        if self.listopen {
            if let Err(e) = self.list.close() {
                log::error!("closing abandoned frame {} command list: {}", self.frame.index, e);
            }
        }
        if !self.submitted {
            self.frame.state = EFrameResourceState::Idle;
        }
        self.frame.writing.store(false, Ordering::Release);
    }
}
