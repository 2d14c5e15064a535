use bitflags::bitflags;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EDescriptorHeapType {
    ConstantBufferShaderResourceUnorderedAccess,
    Sampler,
    RenderTarget,
    DepthStencil,
}

impl EDescriptorHeapType {
    pub const COUNT: usize = 4;
    pub const ALL: [EDescriptorHeapType; 4] = [
        EDescriptorHeapType::ConstantBufferShaderResourceUnorderedAccess,
        EDescriptorHeapType::Sampler,
        EDescriptorHeapType::RenderTarget,
        EDescriptorHeapType::DepthStencil,
    ];

    pub fn index(&self) -> usize {
        match self {
            Self::ConstantBufferShaderResourceUnorderedAccess => 0,
            Self::Sampler => 1,
            Self::RenderTarget => 2,
            Self::DepthStencil => 3,
        }
    }

    // -- render target and depth stencil heaps can never be bound to shaders
    pub fn can_be_shader_visible(&self) -> bool {
        match self {
            Self::ConstantBufferShaderResourceUnorderedAccess | Self::Sampler => true,
            Self::RenderTarget | Self::DepthStencil => false,
        }
    }
}

bitflags! {
    pub struct SDescriptorHeapFlags: u32 {
        const NONE = 0;
        const SHADER_VISIBLE = 0x1;
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SDescriptorHeapDesc {
    pub type_: EDescriptorHeapType,
    pub num_descriptors: u32,
    pub flags: SDescriptorHeapFlags,
}

impl SDescriptorHeapDesc {
    pub fn shader_visible(&self) -> bool {
        self.flags.contains(SDescriptorHeapFlags::SHADER_VISIBLE)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SCPUDescriptorHandle {
    pub ptr: usize,
}

impl SCPUDescriptorHandle {
    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }

    pub fn offset(&self, bytes: usize) -> SCPUDescriptorHandle {
        SCPUDescriptorHandle {
            ptr: self.ptr + bytes,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SGPUDescriptorHandle {
    pub ptr: u64,
}

impl SGPUDescriptorHandle {
    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }

    pub fn offset(&self, bytes: usize) -> SGPUDescriptorHandle {
        SGPUDescriptorHandle {
            ptr: self.ptr + bytes as u64,
        }
    }
}
