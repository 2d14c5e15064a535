use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arrayvec::ArrayVec;

use super::*;
use crate::config::SDescriptorHeapConfig;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SDescriptorHandle {
    pub cpu: SCPUDescriptorHandle,
    pub gpu: Option<SGPUDescriptorHandle>,
}

impl SDescriptorHandle {
    pub fn has_cpu(&self) -> bool {
        !self.cpu.is_null()
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }
}

// -- 0 is never handed out, so a default allocation belongs to no allocator
static NEXT_ALLOCATOR_ID: AtomicU64 = AtomicU64::new(1);

// -- one descriptor slot owned by whoever allocated it. Deliberately not Clone: it must go back
// -- through free_handle exactly once, on the allocator that made it.
#[derive(Debug, Default, PartialEq)]
pub struct SDescriptorAllocation {
    allocator_id: u64,
    handle: SPoolHandle<u32, u64>,
    descriptor: SDescriptorHandle,
}

impl SDescriptorAllocation {
    pub fn valid(&self) -> bool {
        self.handle.valid()
    }

    pub fn slot_index(&self) -> u32 {
        self.handle.index()
    }

    pub fn descriptor(&self) -> SDescriptorHandle {
        self.descriptor
    }

    pub fn cpu(&self) -> SCPUDescriptorHandle {
        self.descriptor.cpu
    }

    pub fn gpu(&self) -> Option<SGPUDescriptorHandle> {
        self.descriptor.gpu
    }
}

// -- owns one descriptor heap; share it with Arc. The heap is released when the last owner drops
// -- its Arc.
pub struct SDescriptorAllocator<D: TDevice> {
    id: u64,
    heap: D::DescriptorHeap,
    descriptor_type: EDescriptorHeapType,
    descriptor_size: usize,
    heap_cpu_start: SCPUDescriptorHandle,
    heap_gpu_start: Option<SGPUDescriptorHandle>,
    pool: SPool<SDescriptorHandle, u32, u64>,
}

impl<D: TDevice> SDescriptorAllocator<D> {
    pub fn create(device: &D, desc: &SDescriptorHeapDesc) -> SResult<Arc<Self>> {
        if desc.num_descriptors == 0 {
            return Err(EGPUError::InvalidArgument("descriptor heap with zero descriptors"));
        }

        let heap = device.create_descriptor_heap(desc).map_err(|e| {
            log::error!("SDescriptorAllocator::create({:?}): {}", desc.type_, e);
            e
        })?;
        let pool = SPool::<SDescriptorHandle, u32, u64>::create(desc.num_descriptors)?;
        let descriptor_size = device.get_descriptor_handle_increment_size(desc.type_);

        let heap_cpu_start = heap.cpu_descriptor_handle_for_heap_start();
        let heap_gpu_start = heap.gpu_descriptor_handle_for_heap_start();

        log::info!(
            "created {:?} descriptor heap: {} descriptors, stride {}, shader visible {}",
            desc.type_,
            desc.num_descriptors,
            descriptor_size,
            heap_gpu_start.is_some(),
        );

        Ok(Arc::new(Self {
            id: NEXT_ALLOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            heap: heap,
            descriptor_type: desc.type_,
            descriptor_size: descriptor_size,
            heap_cpu_start: heap_cpu_start,
            heap_gpu_start: heap_gpu_start,
            pool: pool,
        }))
    }

    pub fn ref_count(this: &Arc<Self>) -> usize {
        Arc::strong_count(this)
    }

    pub fn alloc_handle(&self) -> Option<SDescriptorAllocation> {
        let stride = self.descriptor_size;
        let cpu_start = self.heap_cpu_start;
        let gpu_start = self.heap_gpu_start;

        let mut descriptor = SDescriptorHandle::default();
        let handle = self.pool.alloc_with(|index, slot| {
            let offset = stride * index as usize;
            *slot = SDescriptorHandle {
                cpu: cpu_start.offset(offset),
                gpu: gpu_start.map(|g| g.offset(offset)),
            };
            descriptor = *slot;
        });

        match handle {
            Some(handle) => Some(SDescriptorAllocation {
                allocator_id: self.id,
                handle: handle,
                descriptor: descriptor,
            }),
            None => {
                log::warn!(
                    "{:?} descriptor heap exhausted ({} descriptors)",
                    self.descriptor_type,
                    self.pool.size()
                );
                None
            }
        }
    }

    // -- returns the slot and resets the caller's allocation so it can't be reused. An allocation
    // -- from another allocator is left untouched.
    pub fn free_handle(&self, allocation: &mut SDescriptorAllocation) {
        if !allocation.valid() {
            return;
        }
        if allocation.allocator_id != self.id {
            log::warn!(
                "{:?} descriptor heap: ignoring free of slot {} owned by another heap",
                self.descriptor_type,
                allocation.slot_index()
            );
            return;
        }
        self.pool.free(allocation.handle);
        *allocation = SDescriptorAllocation::default();
    }

    pub fn available_handle_count(&self) -> usize {
        self.pool.available()
    }

    pub fn allocated_handle_count(&self) -> usize {
        self.pool.used()
    }

    pub fn handle_count(&self) -> usize {
        self.pool.size()
    }

    pub fn descriptor_size(&self) -> usize {
        self.descriptor_size
    }

    pub fn descriptor_type(&self) -> EDescriptorHeapType {
        self.descriptor_type
    }

    pub fn heap(&self) -> &D::DescriptorHeap {
        &self.heap
    }
}

impl<D: TDevice> Drop for SDescriptorAllocator<D> {
    fn drop(&mut self) {
        let leaked = self.pool.used();
        if leaked > 0 {
            log::warn!(
                "releasing {:?} descriptor heap with {} descriptors still allocated",
                self.descriptor_type,
                leaked
            );
        }
        log::debug!("released {:?} descriptor heap", self.descriptor_type);
    }
}

// -- one shared allocator per heap kind
pub struct SDescriptorAllocatorSet<D: TDevice> {
    allocators: ArrayVec<[Arc<SDescriptorAllocator<D>>; EDescriptorHeapType::COUNT]>,
}

impl<D: TDevice> SDescriptorAllocatorSet<D> {
    pub fn create(device: &D, config: &SDescriptorHeapConfig) -> SResult<Self> {
        let mut allocators = ArrayVec::new();
        for type_ in EDescriptorHeapType::ALL.iter() {
            allocators.push(SDescriptorAllocator::create(device, &config.desc(*type_))?);
        }
        Ok(Self {
            allocators: allocators,
        })
    }

    pub fn get(&self, type_: EDescriptorHeapType) -> &Arc<SDescriptorAllocator<D>> {
        &self.allocators[type_.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softgpu::*;

    fn cbv_desc(count: u32) -> SDescriptorHeapDesc {
        SDescriptorHeapDesc {
            type_: EDescriptorHeapType::ConstantBufferShaderResourceUnorderedAccess,
            num_descriptors: count,
            flags: SDescriptorHeapFlags::SHADER_VISIBLE,
        }
    }

    #[test]
    fn test_addresses_follow_stride() {
        let device = SSoftDevice::default();
        let allocator = SDescriptorAllocator::create(&device, &cbv_desc(4)).unwrap();
        assert_eq!(allocator.descriptor_size(), 32);

        let handles: Vec<_> = (0..4).map(|_| allocator.alloc_handle().unwrap()).collect();
        let cpu: Vec<usize> = handles.iter().map(|h| h.cpu().ptr).collect();
        assert_eq!(cpu, vec![0x1000, 0x1020, 0x1040, 0x1060]);

        for h in &handles {
            let gpu = h.gpu().unwrap();
            assert_eq!(gpu.ptr, h.cpu().ptr as u64 + GPU_DESCRIPTOR_OFFSET);
        }

        assert!(allocator.alloc_handle().is_none());
        assert_eq!(allocator.available_handle_count(), 0);
        assert_eq!(allocator.allocated_handle_count(), 4);
    }

    #[test]
    fn test_address_is_by_slot_not_order() {
        let device = SSoftDevice::default();
        let allocator = SDescriptorAllocator::create(&device, &cbv_desc(4)).unwrap();

        let _a = allocator.alloc_handle().unwrap();
        let mut b = allocator.alloc_handle().unwrap();
        let _c = allocator.alloc_handle().unwrap();

        allocator.free_handle(&mut b);
        assert!(!b.valid());
        assert_eq!(b.descriptor(), SDescriptorHandle::default());

        // -- slot 1 comes back before the untouched slot 3
        let again = allocator.alloc_handle().unwrap();
        assert_eq!(again.slot_index(), 1);
        assert_eq!(again.cpu().ptr, 0x1000 + 32);

        let last = allocator.alloc_handle().unwrap();
        assert_eq!(last.slot_index(), 3);
        assert_eq!(last.cpu().ptr, 0x1000 + 3 * 32);
    }

    #[test]
    fn test_free_is_idempotent_for_caller() {
        let device = SSoftDevice::default();
        let allocator = SDescriptorAllocator::create(&device, &cbv_desc(2)).unwrap();
        let mut h = allocator.alloc_handle().unwrap();
        allocator.free_handle(&mut h);
        allocator.free_handle(&mut h);
        assert_eq!(allocator.allocated_handle_count(), 0);
    }

    #[test]
    fn test_free_from_other_heap_is_rejected() {
        let device_a = SSoftDevice::default();
        let device_b = SSoftDevice::default();
        let a = SDescriptorAllocator::create(&device_a, &cbv_desc(2)).unwrap();
        let b = SDescriptorAllocator::create(&device_b, &cbv_desc(2)).unwrap();

        let held_a = a.alloc_handle().unwrap();
        let mut from_b = b.alloc_handle().unwrap();
        assert_eq!(held_a.slot_index(), from_b.slot_index());

        a.free_handle(&mut from_b);
        assert!(from_b.valid());
        assert_eq!(a.allocated_handle_count(), 1);
        assert_eq!(b.allocated_handle_count(), 1);

        // -- a's slot 0 is still owned by held_a
        let second = a.alloc_handle().unwrap();
        assert_ne!(second.cpu(), held_a.cpu());

        b.free_handle(&mut from_b);
        assert!(!from_b.valid());
        assert_eq!(b.allocated_handle_count(), 0);
    }

    #[test]
    fn test_non_shader_visible_has_no_gpu_handle() {
        let device = SSoftDevice::default();
        let desc = SDescriptorHeapDesc {
            type_: EDescriptorHeapType::RenderTarget,
            num_descriptors: 2,
            flags: SDescriptorHeapFlags::NONE,
        };
        let allocator = SDescriptorAllocator::create(&device, &desc).unwrap();
        let h = allocator.alloc_handle().unwrap();
        assert!(h.descriptor().has_cpu());
        assert!(!h.descriptor().has_gpu());
    }

    #[test]
    fn test_shared_lifetime() {
        let device = SSoftDevice::default();
        let allocator = SDescriptorAllocator::create(&device, &cbv_desc(2)).unwrap();
        let weak = Arc::downgrade(&allocator);

        let owner_a = allocator.clone();
        let owner_b = allocator.clone();
        assert_eq!(SDescriptorAllocator::ref_count(&allocator), 3);

        drop(allocator);
        drop(owner_a);
        assert!(weak.upgrade().is_some());

        drop(owner_b);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_create_failures_produce_nothing() {
        let device = SSoftDevice::default();
        device.set_failures(SSoftFailFlags::CREATE_DESCRIPTOR_HEAP);
        let err = SDescriptorAllocator::create(&device, &cbv_desc(4)).err().unwrap();
        assert!(err.is_fatal());

        device.set_failures(SSoftFailFlags::empty());
        assert!(SDescriptorAllocator::create(&device, &cbv_desc(0)).is_err());
    }

    #[test]
    fn test_allocator_set() {
        let device = SSoftDevice::default();
        let config = SDescriptorHeapConfig::default();
        let set = SDescriptorAllocatorSet::create(&device, &config).unwrap();

        for type_ in EDescriptorHeapType::ALL.iter() {
            let allocator = set.get(*type_);
            assert_eq!(allocator.descriptor_type(), *type_);
            assert_eq!(allocator.handle_count() as u32, config.count(*type_));
            let h = allocator.alloc_handle().unwrap();
            assert_eq!(h.gpu().is_some(), type_.can_be_shader_visible());
            let mut h = h;
            allocator.free_handle(&mut h);
        }
    }
}
