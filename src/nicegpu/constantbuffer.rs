use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use super::*;
use super::descriptorallocator::{SDescriptorAllocation, SDescriptorAllocator};
use crate::utils::align_up;

// -- constant buffer views must start on, and span a multiple of, this many bytes
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

// -- `count` constant buffers of T packed into one upload buffer at an aligned stride
pub struct SConstantBufferArray<D: TDevice, T: bytemuck::Pod> {
    buffer: D::UploadBuffer,
    stride: usize,
    count: usize,

    descriptorallocator: Option<Arc<SDescriptorAllocator<D>>>,
    descriptors: Vec<SDescriptorAllocation>,

    phantom: PhantomData<T>,
}

impl<D: TDevice, T: bytemuck::Pod> SConstantBufferArray<D, T> {
    pub fn create(
        device: &D,
        count: usize,
        descriptorallocator: Option<&Arc<SDescriptorAllocator<D>>>,
    ) -> SResult<Self> {
        if count == 0 {
            return Err(EGPUError::InvalidArgument("constant buffer array with zero elements"));
        }

        let stride = align_up(size_of::<T>().max(1), CONSTANT_BUFFER_ALIGNMENT);
        let total = stride
            .checked_mul(count)
            .ok_or(EGPUError::InvalidArgument("constant buffer array too large"))?;
        let buffer = device.create_upload_buffer(total)?;

        let mut result = Self {
            buffer: buffer,
            stride: stride,
            count: count,
            descriptorallocator: descriptorallocator.cloned(),
            descriptors: Vec::new(),
            phantom: PhantomData,
        };

        if let Some(allocator) = descriptorallocator {
            result.descriptors.reserve_exact(count);
            let base = result.buffer.gpu_virtual_address();
            for i in 0..count {
                // -- on failure, Drop returns whatever was already allocated
                let allocation = allocator
                    .alloc_handle()
                    .ok_or(EGPUError::Exhausted("descriptor heap"))?;
                device.create_constant_buffer_view(
                    base + (i * stride) as u64,
                    stride,
                    allocation.cpu(),
                );
                result.descriptors.push(allocation);
            }
        }

        log::debug!(
            "created constant buffer array: {} x {} bytes (stride {}), {} descriptors",
            count,
            size_of::<T>(),
            stride,
            result.descriptors.len(),
        );

        Ok(result)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn check_index(&self, index: usize) -> SResult<()> {
        if index >= self.count {
            return Err(EGPUError::InvalidArgument("constant buffer index out of range"));
        }
        Ok(())
    }

    pub fn write(&self, index: usize, value: &T) -> SResult<()> {
        self.check_index(index)?;
        self.buffer.write(index * self.stride, bytemuck::bytes_of(value))
    }

    pub fn gpu_virtual_address(&self, index: usize) -> SResult<SGPUVirtualAddress> {
        self.check_index(index)?;
        Ok(self.buffer.gpu_virtual_address() + (index * self.stride) as u64)
    }

    // -- None when the array was created without descriptors
    pub fn descriptor(&self, index: usize) -> Option<&SDescriptorAllocation> {
        self.descriptors.get(index)
    }

    pub fn buffer(&self) -> &D::UploadBuffer {
        &self.buffer
    }
}

impl<D: TDevice, T: bytemuck::Pod> Drop for SConstantBufferArray<D, T> {
    fn drop(&mut self) {
        if let Some(allocator) = &self.descriptorallocator {
            for descriptor in self.descriptors.iter_mut() {
                allocator.free_handle(descriptor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softgpu::*;

    #[repr(C)]
    #[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct STestConstants {
        a: [f32; 4],
        b: u32,
        pad: [u32; 3],
    }

    fn cbv_allocator(device: &SSoftDevice, count: u32) -> Arc<SDescriptorAllocator<SSoftDevice>> {
        let desc = SDescriptorHeapDesc {
            type_: EDescriptorHeapType::ConstantBufferShaderResourceUnorderedAccess,
            num_descriptors: count,
            flags: SDescriptorHeapFlags::SHADER_VISIBLE,
        };
        SDescriptorAllocator::create(device, &desc).unwrap()
    }

    #[test]
    fn test_stride_and_addresses() {
        let device = SSoftDevice::default();
        let array = SConstantBufferArray::<SSoftDevice, STestConstants>::create(&device, 3, None).unwrap();
        assert_eq!(array.stride(), 256);
        assert_eq!(array.count(), 3);

        let base = array.gpu_virtual_address(0).unwrap();
        assert_eq!(base % CONSTANT_BUFFER_ALIGNMENT as u64, 0);
        assert_eq!(array.gpu_virtual_address(2).unwrap(), base + 512);
        assert!(array.gpu_virtual_address(3).is_err());
        assert!(array.descriptor(0).is_none());
    }

    #[test]
    fn test_write_lands_at_stride() {
        let device = SSoftDevice::default();
        let array = SConstantBufferArray::<SSoftDevice, STestConstants>::create(&device, 2, None).unwrap();

        let value = STestConstants {
            a: [1.0, 2.0, 3.0, 4.0],
            b: 7,
            pad: [0; 3],
        };
        array.write(1, &value).unwrap();

        let bytes = array.buffer().read(256, size_of::<STestConstants>()).unwrap();
        let read: STestConstants = *bytemuck::from_bytes(&bytes);
        assert_eq!(read, value);

        let untouched = array.buffer().read(0, size_of::<STestConstants>()).unwrap();
        assert!(untouched.iter().all(|b| *b == 0));
        assert!(array.write(2, &value).is_err());
    }

    #[test]
    fn test_descriptors_created_and_released() {
        let device = SSoftDevice::default();
        let allocator = cbv_allocator(&device, 4);
        {
            let array =
                SConstantBufferArray::<SSoftDevice, STestConstants>::create(&device, 3, Some(&allocator)).unwrap();
            assert_eq!(allocator.allocated_handle_count(), 3);

            let views = device.constant_buffer_views();
            assert_eq!(views.len(), 3);
            for (i, view) in views.iter().enumerate() {
                assert_eq!(view.buffer_location, array.gpu_virtual_address(i).unwrap());
                assert_eq!(view.size_in_bytes, 256);
                assert_eq!(view.dest_descriptor, array.descriptor(i).unwrap().cpu());
            }
        }
        assert_eq!(allocator.allocated_handle_count(), 0);
    }

    #[test]
    fn test_descriptor_exhaustion() {
        let device = SSoftDevice::default();
        let allocator = cbv_allocator(&device, 2);
        let err = SConstantBufferArray::<SSoftDevice, STestConstants>::create(&device, 3, Some(&allocator))
            .err()
            .unwrap();
        assert_eq!(err, EGPUError::Exhausted("descriptor heap"));
        assert!(!err.is_fatal());
        assert_eq!(allocator.allocated_handle_count(), 0);
    }
}
