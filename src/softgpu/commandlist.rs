use crate::errors::{EGPUError, SResult};
use crate::typeygpu::*;

pub struct SSoftCommandAllocator {
    pub(super) id: usize,
    type_: ECommandListType,
    resets: usize,
}

impl SSoftCommandAllocator {
    pub(super) fn new(id: usize, type_: ECommandListType) -> Self {
        Self {
            id: id,
            type_: type_,
            resets: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn type_(&self) -> ECommandListType {
        self.type_
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }
}

impl TCommandAllocator for SSoftCommandAllocator {
    fn reset(&mut self) -> SResult<()> {
        self.resets += 1;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ESoftCommand {
    SetGraphicsRootConstantBufferView {
        root_parameter_index: u32,
        buffer_location: SGPUVirtualAddress,
    },
    DrawIndexedInstanced {
        index_count_per_instance: u32,
        instance_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
        start_instance_location: u32,
    },
}

pub struct SSoftCommandList {
    type_: ECommandListType,
    allocator_id: usize,
    recording: bool,
    commands: Vec<ESoftCommand>,
}

impl SSoftCommandList {
    pub(super) fn new(type_: ECommandListType, allocator: &SSoftCommandAllocator) -> Self {
        Self {
            type_: type_,
            allocator_id: allocator.id,
            recording: true,
            commands: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn allocator_id(&self) -> usize {
        self.allocator_id
    }

    pub fn commands(&self) -> &[ESoftCommand] {
        &self.commands
    }

    fn record(&mut self, command: ESoftCommand) {
        debug_assert!(self.recording, "recording into a closed command list");
        self.commands.push(command);
    }
}

impl TCommandList for SSoftCommandList {
    type Allocator = SSoftCommandAllocator;

    fn type_(&self) -> ECommandListType {
        self.type_
    }

    fn reset(&mut self, allocator: &SSoftCommandAllocator) -> SResult<()> {
        if self.recording {
            return Err(EGPUError::Device("reset of a command list that was not closed"));
        }
        if allocator.type_ != self.type_ {
            return Err(EGPUError::Device("command allocator type does not match list"));
        }

        self.allocator_id = allocator.id;
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn close(&mut self) -> SResult<()> {
        if !self.recording {
            return Err(EGPUError::Device("close of a command list that was not recording"));
        }
        self.recording = false;
        Ok(())
    }

    fn set_graphics_root_constant_buffer_view(
        &mut self,
        root_parameter_index: u32,
        buffer_location: SGPUVirtualAddress,
    ) {
        self.record(ESoftCommand::SetGraphicsRootConstantBufferView {
            root_parameter_index: root_parameter_index,
            buffer_location: buffer_location,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count_per_instance: u32,
        instance_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
        start_instance_location: u32,
    ) {
        self.record(ESoftCommand::DrawIndexedInstanced {
            index_count_per_instance: index_count_per_instance,
            instance_count: instance_count,
            start_index_location: start_index_location,
            base_vertex_location: base_vertex_location,
            start_instance_location: start_instance_location,
        });
    }
}
