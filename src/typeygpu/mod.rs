// -- the boundary between this crate and a GPU API. Everything here is a thin typed view of
// -- what a D3D12-class device exposes; the nice layer builds lifetimes and policy on top.

mod commandlist;
mod descriptor;

use crate::errors::SResult;
use crate::safesync::SEventHandle;

pub use self::commandlist::*;
pub use self::descriptor::*;

pub type SGPUVirtualAddress = u64;

pub trait TFence {
    fn get_completed_value(&self) -> u64;
    // -- event is set once the completed value reaches `value` (immediately if it already has)
    fn set_event_on_completion(&self, value: u64, event: &SEventHandle) -> SResult<()>;
}

pub trait TCommandAllocator {
    // -- only legal once every list recorded from this allocator has finished executing
    fn reset(&mut self) -> SResult<()>;
}

pub trait TCommandList {
    type Allocator: TCommandAllocator;

    fn type_(&self) -> ECommandListType;
    fn reset(&mut self, allocator: &Self::Allocator) -> SResult<()>;
    fn close(&mut self) -> SResult<()>;

    fn set_graphics_root_constant_buffer_view(
        &mut self,
        root_parameter_index: u32,
        buffer_location: SGPUVirtualAddress,
    );
    fn draw_indexed_instanced(
        &mut self,
        index_count_per_instance: u32,
        instance_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
        start_instance_location: u32,
    );
}

pub trait TCommandQueue {
    type Fence: TFence;
    type List: TCommandList;

    fn type_(&self) -> ECommandListType;
    fn execute_command_list(&self, list: &Self::List) -> SResult<()>;
    fn signal(&self, fence: &Self::Fence, value: u64) -> SResult<()>;
}

pub trait TDescriptorHeap {
    fn desc(&self) -> &SDescriptorHeapDesc;
    fn cpu_descriptor_handle_for_heap_start(&self) -> SCPUDescriptorHandle;
    // -- None unless the heap was created shader visible
    fn gpu_descriptor_handle_for_heap_start(&self) -> Option<SGPUDescriptorHandle>;
}

// -- persistently mapped, CPU-writable buffer the GPU reads constants from
pub trait TUploadBuffer {
    fn size(&self) -> usize;
    fn gpu_virtual_address(&self) -> SGPUVirtualAddress;
    fn write(&self, offset: usize, data: &[u8]) -> SResult<()>;
}

pub trait TDevice {
    type Fence: TFence;
    type CommandAllocator: TCommandAllocator;
    type CommandList: TCommandList<Allocator = Self::CommandAllocator>;
    type CommandQueue: TCommandQueue<Fence = Self::Fence, List = Self::CommandList>;
    type DescriptorHeap: TDescriptorHeap;
    type UploadBuffer: TUploadBuffer;

    fn create_command_queue(&self, type_: ECommandListType) -> SResult<Self::CommandQueue>;
    fn create_fence(&self, initial_value: u64) -> SResult<Self::Fence>;
    fn create_command_allocator(&self, type_: ECommandListType) -> SResult<Self::CommandAllocator>;
    // -- the list starts out recording against `allocator`
    fn create_command_list(
        &self,
        type_: ECommandListType,
        allocator: &Self::CommandAllocator,
    ) -> SResult<Self::CommandList>;
    fn create_descriptor_heap(&self, desc: &SDescriptorHeapDesc) -> SResult<Self::DescriptorHeap>;
    fn get_descriptor_handle_increment_size(&self, type_: EDescriptorHeapType) -> usize;
    fn create_upload_buffer(&self, size: usize) -> SResult<Self::UploadBuffer>;
    fn create_constant_buffer_view(
        &self,
        buffer_location: SGPUVirtualAddress,
        size_in_bytes: usize,
        dest_descriptor: SCPUDescriptorHandle,
    );
}
