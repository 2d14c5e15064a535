use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::MAX_FRAMES_IN_FLIGHT;
use crate::typeygpu::{EDescriptorHeapType, SDescriptorHeapDesc, SDescriptorHeapFlags};

#[derive(Debug, Error)]
pub enum EConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SDescriptorHeapConfig {
    pub constant_buffer_shader_resource: u32,
    pub sampler: u32,
    pub render_target: u32,
    pub depth_stencil: u32,
}

impl Default for SDescriptorHeapConfig {
    fn default() -> Self {
        Self {
            constant_buffer_shader_resource: 1024,
            sampler: 16,
            render_target: 8,
            depth_stencil: 4,
        }
    }
}

impl SDescriptorHeapConfig {
    pub fn count(&self, type_: EDescriptorHeapType) -> u32 {
        match type_ {
            EDescriptorHeapType::ConstantBufferShaderResourceUnorderedAccess => self.constant_buffer_shader_resource,
            EDescriptorHeapType::Sampler => self.sampler,
            EDescriptorHeapType::RenderTarget => self.render_target,
            EDescriptorHeapType::DepthStencil => self.depth_stencil,
        }
    }

    pub fn desc(&self, type_: EDescriptorHeapType) -> SDescriptorHeapDesc {
        SDescriptorHeapDesc {
            type_: type_,
            num_descriptors: self.count(type_),
            flags: if type_.can_be_shader_visible() {
                SDescriptorHeapFlags::SHADER_VISIBLE
            } else {
                SDescriptorHeapFlags::NONE
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SRenderConfig {
    pub frames_in_flight: usize,
    // -- None waits forever
    pub frame_wait_timeout_ms: Option<u64>,
    pub command_list_ring_size: usize,
    pub width: u32,
    pub height: u32,
    pub planar_shadows: bool,
    pub frame_constant_descriptors: bool,
    pub descriptor_heaps: SDescriptorHeapConfig,
}

impl Default for SRenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            frame_wait_timeout_ms: None,
            command_list_ring_size: 2,
            width: 960,
            height: 540,
            planar_shadows: true,
            frame_constant_descriptors: true,
            descriptor_heaps: SDescriptorHeapConfig::default(),
        }
    }
}

impl SRenderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        log::info!("loading render config from {}", path.as_ref().display());
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), EConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(EConfigError::Invalid("frames_in_flight must be in 1..=4"));
        }
        if self.command_list_ring_size == 0 {
            return Err(EConfigError::Invalid("command_list_ring_size must be at least 1"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(EConfigError::Invalid("width and height must be non-zero"));
        }
        for type_ in EDescriptorHeapType::ALL.iter() {
            if self.descriptor_heaps.count(*type_) == 0 {
                return Err(EConfigError::Invalid("descriptor heap counts must be non-zero"));
            }
        }
        Ok(())
    }

    pub fn frame_wait_timeout(&self) -> Option<Duration> {
        self.frame_wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}
