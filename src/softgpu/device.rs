use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use super::commandlist::{SSoftCommandAllocator, SSoftCommandList};
use super::fence::SSoftFence;
use super::queue::{ERetireMode, SSoftCommandQueue};
use crate::errors::{EGPUError, SResult};
use crate::typeygpu::*;
use crate::utils::{align_up, align_up_u64};

// -- offset between a shader-visible heap's CPU and GPU handle ranges
pub const GPU_DESCRIPTOR_OFFSET: u64 = 0x1_0000_0000;
const HEAP_PLACEMENT_ALIGNMENT: usize = 0x1000;
const BUFFER_PLACEMENT_ALIGNMENT: u64 = 0x1_0000;

bitflags! {
    pub struct SSoftFailFlags: u32 {
        const CREATE_COMMAND_QUEUE = 0x01;
        const CREATE_FENCE = 0x02;
        const CREATE_COMMAND_ALLOCATOR = 0x04;
        const CREATE_COMMAND_LIST = 0x08;
        const CREATE_DESCRIPTOR_HEAP = 0x10;
        const CREATE_UPLOAD_BUFFER = 0x20;
    }
}

#[derive(Clone, Debug)]
pub struct SSoftDeviceDesc {
    pub descriptor_increment_sizes: [usize; EDescriptorHeapType::COUNT],
    pub heap_base_address: usize,
    pub buffer_base_address: u64,
    pub retire_mode: ERetireMode,
}

impl Default for SSoftDeviceDesc {
    fn default() -> Self {
        Self {
            descriptor_increment_sizes: [32, 32, 32, 8],
            heap_base_address: 0x1000,
            buffer_base_address: 0x10_0000,
            retire_mode: ERetireMode::Immediate,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SSoftConstantBufferView {
    pub buffer_location: SGPUVirtualAddress,
    pub size_in_bytes: usize,
    pub dest_descriptor: SCPUDescriptorHandle,
}

struct SSoftDeviceState {
    next_heap_address: usize,
    next_buffer_address: u64,
    next_allocator_id: usize,
    fail: SSoftFailFlags,
    views: Vec<SSoftConstantBufferView>,
}

// -- a CPU-side device. Resources live in host memory; queues retire work immediately or on
// -- demand, which is what lets tests script exactly when the "GPU" finishes.
pub struct SSoftDevice {
    desc: SSoftDeviceDesc,
    state: Mutex<SSoftDeviceState>,
}

impl SSoftDevice {
    pub fn new(desc: SSoftDeviceDesc) -> Self {
        Self {
            state: Mutex::new(SSoftDeviceState {
                next_heap_address: desc.heap_base_address,
                next_buffer_address: desc.buffer_base_address,
                next_allocator_id: 0,
                fail: SSoftFailFlags::empty(),
                views: Vec::new(),
            }),
            desc: desc,
        }
    }

    pub fn new_manual() -> Self {
        Self::new(SSoftDeviceDesc {
            retire_mode: ERetireMode::Manual,
            ..Default::default()
        })
    }

    pub fn set_failures(&self, flags: SSoftFailFlags) {
        self.state.lock().fail = flags;
    }

    pub fn constant_buffer_views(&self) -> Vec<SSoftConstantBufferView> {
        self.state.lock().views.clone()
    }

    fn check(&self, flag: SSoftFailFlags, what: &'static str) -> SResult<()> {
        if self.state.lock().fail.contains(flag) {
            return Err(EGPUError::Device(what));
        }
        Ok(())
    }
}

impl Default for SSoftDevice {
    fn default() -> Self {
        Self::new(SSoftDeviceDesc::default())
    }
}

pub struct SSoftDescriptorHeap {
    desc: SDescriptorHeapDesc,
    cpu_start: SCPUDescriptorHandle,
    gpu_start: Option<SGPUDescriptorHandle>,
}

impl TDescriptorHeap for SSoftDescriptorHeap {
    fn desc(&self) -> &SDescriptorHeapDesc {
        &self.desc
    }

    fn cpu_descriptor_handle_for_heap_start(&self) -> SCPUDescriptorHandle {
        self.cpu_start
    }

    fn gpu_descriptor_handle_for_heap_start(&self) -> Option<SGPUDescriptorHandle> {
        self.gpu_start
    }
}

pub struct SSoftUploadBuffer {
    address: SGPUVirtualAddress,
    data: Arc<Mutex<Vec<u8>>>,
}

impl SSoftUploadBuffer {
    pub fn read(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let data = self.data.lock();
        data.get(offset..offset + len).map(|s| s.to_vec())
    }
}

impl TUploadBuffer for SSoftUploadBuffer {
    fn size(&self) -> usize {
        self.data.lock().len()
    }

    fn gpu_virtual_address(&self) -> SGPUVirtualAddress {
        self.address
    }

    fn write(&self, offset: usize, bytes: &[u8]) -> SResult<()> {
        let mut data = self.data.lock();
        let end = offset.checked_add(bytes.len())
            .ok_or(EGPUError::InvalidArgument("upload buffer write overflows"))?;
        if end > data.len() {
            return Err(EGPUError::InvalidArgument("upload buffer write out of bounds"));
        }
        data[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl TDevice for SSoftDevice {
    type Fence = SSoftFence;
    type CommandAllocator = SSoftCommandAllocator;
    type CommandList = SSoftCommandList;
    type CommandQueue = SSoftCommandQueue;
    type DescriptorHeap = SSoftDescriptorHeap;
    type UploadBuffer = SSoftUploadBuffer;

    fn create_command_queue(&self, type_: ECommandListType) -> SResult<SSoftCommandQueue> {
        self.check(SSoftFailFlags::CREATE_COMMAND_QUEUE, "create command queue")?;
        Ok(SSoftCommandQueue::new(type_, self.desc.retire_mode))
    }

    fn create_fence(&self, initial_value: u64) -> SResult<SSoftFence> {
        self.check(SSoftFailFlags::CREATE_FENCE, "create fence")?;
        Ok(SSoftFence::new(initial_value))
    }

    fn create_command_allocator(&self, type_: ECommandListType) -> SResult<SSoftCommandAllocator> {
        self.check(SSoftFailFlags::CREATE_COMMAND_ALLOCATOR, "create command allocator")?;
        let mut state = self.state.lock();
        let id = state.next_allocator_id;
        state.next_allocator_id += 1;
        Ok(SSoftCommandAllocator::new(id, type_))
    }

    fn create_command_list(
        &self,
        type_: ECommandListType,
        allocator: &SSoftCommandAllocator,
    ) -> SResult<SSoftCommandList> {
        self.check(SSoftFailFlags::CREATE_COMMAND_LIST, "create command list")?;
        if allocator.type_() != type_ {
            return Err(EGPUError::Device("create command list: allocator type mismatch"));
        }
        Ok(SSoftCommandList::new(type_, allocator))
    }

    fn create_descriptor_heap(&self, desc: &SDescriptorHeapDesc) -> SResult<SSoftDescriptorHeap> {
        self.check(SSoftFailFlags::CREATE_DESCRIPTOR_HEAP, "create descriptor heap")?;
        if desc.num_descriptors == 0 {
            return Err(EGPUError::Device("create descriptor heap: zero descriptors"));
        }
        if desc.shader_visible() && !desc.type_.can_be_shader_visible() {
            return Err(EGPUError::Device("create descriptor heap: type cannot be shader visible"));
        }

        let stride = self.get_descriptor_handle_increment_size(desc.type_);
        let mut state = self.state.lock();
        let start = state.next_heap_address;
        state.next_heap_address += align_up(stride * desc.num_descriptors as usize, HEAP_PLACEMENT_ALIGNMENT);

        Ok(SSoftDescriptorHeap {
            desc: *desc,
            cpu_start: SCPUDescriptorHandle { ptr: start },
            gpu_start: if desc.shader_visible() {
                Some(SGPUDescriptorHandle { ptr: start as u64 + GPU_DESCRIPTOR_OFFSET })
            } else {
                None
            },
        })
    }

    fn get_descriptor_handle_increment_size(&self, type_: EDescriptorHeapType) -> usize {
        self.desc.descriptor_increment_sizes[type_.index()]
    }

    fn create_upload_buffer(&self, size: usize) -> SResult<SSoftUploadBuffer> {
        self.check(SSoftFailFlags::CREATE_UPLOAD_BUFFER, "create upload buffer")?;
        if size == 0 {
            return Err(EGPUError::Device("create upload buffer: zero size"));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| EGPUError::Device("create upload buffer: out of memory"))?;
        data.resize(size, 0u8);

        let mut state = self.state.lock();
        let address = state.next_buffer_address;
        state.next_buffer_address += align_up_u64(size as u64, BUFFER_PLACEMENT_ALIGNMENT);

        Ok(SSoftUploadBuffer {
            address: address,
            data: Arc::new(Mutex::new(data)),
        })
    }

    fn create_constant_buffer_view(
        &self,
        buffer_location: SGPUVirtualAddress,
        size_in_bytes: usize,
        dest_descriptor: SCPUDescriptorHandle,
    ) {
        self.state.lock().views.push(SSoftConstantBufferView {
            buffer_location: buffer_location,
            size_in_bytes: size_in_bytes,
            dest_descriptor: dest_descriptor,
        });
    }
}
