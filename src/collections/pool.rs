use std::fmt;

use parking_lot::Mutex;

use crate::errors::{EGPUError, SResult};

pub trait TIndexGen: PartialEq + PartialOrd + Copy + fmt::Debug {
    const MAX: Self;
    const ZERO: Self;
    fn to_usize(&self) -> usize;
    fn from_usize(v: usize) -> Self;
    // -- wraps, never producing MAX (reserved for invalid handles)
    fn next_generation(&self) -> Self;
}

macro_rules! impl_index_gen {
    ($t:ty) => {
        impl TIndexGen for $t {
            const MAX: $t = <$t>::MAX;
            const ZERO: $t = 0;

            fn to_usize(&self) -> usize {
                *self as usize
            }
            fn from_usize(v: usize) -> Self {
                v as Self
            }
            fn next_generation(&self) -> Self {
                let next = self.wrapping_add(1);
                if next == Self::MAX {
                    Self::ZERO
                } else {
                    next
                }
            }
        }
    };
}

impl_index_gen!(u16);
impl_index_gen!(u32);
impl_index_gen!(u64);

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SPoolHandle<I = u32, G = u64>
where I: TIndexGen, G: TIndexGen
{
    index: I,
    generation: G,
}

impl<I: TIndexGen, G: TIndexGen> Default for SPoolHandle<I, G> {
    fn default() -> Self {
        SPoolHandle {
            index: I::MAX,
            generation: G::MAX,
        }
    }
}

impl<I: TIndexGen, G: TIndexGen> SPoolHandle<I, G> {
    pub fn valid(&self) -> bool {
        self.index != I::MAX && self.generation != G::MAX
    }

    pub fn invalidate(&mut self) {
        *self = Default::default();
    }

    pub fn index(&self) -> I {
        self.index
    }

    pub fn generation(&self) -> G {
        self.generation
    }
}

// -- link cells 0 and 1 are the list anchors, real slot i lives in cell i + 2
const ACTIVE_SENTINEL: usize = 0;
const FREE_SENTINEL: usize = 1;
const SENTINEL_COUNT: usize = 2;

#[derive(Copy, Clone, Debug)]
struct SPoolLink {
    next: usize,
    // -- only meaningful while on the active list, which is doubly linked
    prev: usize,
    active: bool,
}

struct SPoolState<T, G> {
    links: Vec<SPoolLink>,
    values: Vec<T>,
    generations: Vec<G>,
    used: usize,
}

impl<T, G: TIndexGen> SPoolState<T, G> {
    fn live_slot<I: TIndexGen>(&self, handle: SPoolHandle<I, G>) -> Option<usize> {
        if !handle.valid() {
            return None;
        }
        let slot = handle.index.to_usize();
        if slot >= self.values.len() {
            return None;
        }
        if self.links[slot + SENTINEL_COUNT].active && self.generations[slot] == handle.generation {
            Some(slot)
        } else {
            None
        }
    }
}

// -- fixed-capacity pool of Ts. Every slot sits on exactly one of two intrusive lists: the
// -- free list (singly linked, LIFO) or the active list (circular, doubly linked). A slot's
// -- index is fixed at creation, so handles stay valid across unrelated allocs and frees.
pub struct SPool<T, I: TIndexGen = u32, G: TIndexGen = u64> {
    capacity: usize,
    state: Mutex<SPoolState<T, G>>,
    phantom: std::marker::PhantomData<I>,
}

impl<T: Default, I: TIndexGen, G: TIndexGen> SPool<T, I, G> {
    pub fn create(capacity: I) -> SResult<Self> {
        let capacity = capacity.to_usize();
        if capacity >= I::MAX.to_usize() {
            return Err(EGPUError::InvalidArgument("pool capacity does not fit index type"));
        }

        let mut links: Vec<SPoolLink> = Vec::new();
        let mut values: Vec<T> = Vec::new();
        let mut generations: Vec<G> = Vec::new();
        links.try_reserve_exact(capacity + SENTINEL_COUNT)
            .map_err(|_| EGPUError::OutOfMemory("pool links"))?;
        values.try_reserve_exact(capacity)
            .map_err(|_| EGPUError::OutOfMemory("pool values"))?;
        generations.try_reserve_exact(capacity)
            .map_err(|_| EGPUError::OutOfMemory("pool generations"))?;

        links.push(SPoolLink {
            next: ACTIVE_SENTINEL,
            prev: ACTIVE_SENTINEL,
            active: false,
        });
        links.push(SPoolLink {
            next: if capacity > 0 { SENTINEL_COUNT } else { FREE_SENTINEL },
            prev: FREE_SENTINEL,
            active: false,
        });

        // -- free list in index order, terminated by the free anchor
        for i in 0..capacity {
            let cell = i + SENTINEL_COUNT;
            let next = if i + 1 < capacity { cell + 1 } else { FREE_SENTINEL };
            links.push(SPoolLink {
                next: next,
                prev: FREE_SENTINEL,
                active: false,
            });
            values.push(T::default());
            generations.push(G::ZERO);
        }

        Ok(Self {
            capacity: capacity,
            state: Mutex::new(SPoolState {
                links: links,
                values: values,
                generations: generations,
                used: 0,
            }),
            phantom: std::marker::PhantomData,
        })
    }

    pub fn alloc(&self) -> Option<SPoolHandle<I, G>> {
        self.alloc_with(|_, _| {})
    }

    // -- init_func runs under the pool lock with the slot's stable index. It must not call back
    // -- into this pool.
    pub fn alloc_with<F>(&self, init_func: F) -> Option<SPoolHandle<I, G>>
    where
        F: FnOnce(I, &mut T),
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let cell = state.links[FREE_SENTINEL].next;
        if cell == FREE_SENTINEL || state.used + 1 > self.capacity {
            return None;
        }

        // -- pop free head
        state.links[FREE_SENTINEL].next = state.links[cell].next;

        // -- splice in just before the active anchor
        let tail = state.links[ACTIVE_SENTINEL].prev;
        state.links[cell].prev = tail;
        state.links[cell].next = ACTIVE_SENTINEL;
        state.links[cell].active = true;
        state.links[tail].next = cell;
        state.links[ACTIVE_SENTINEL].prev = cell;

        state.used += 1;

        let slot = cell - SENTINEL_COUNT;
        let index = I::from_usize(slot);
        state.values[slot] = T::default();
        init_func(index, &mut state.values[slot]);

        Some(SPoolHandle {
            index: index,
            generation: state.generations[slot],
        })
    }
}

impl<T, I: TIndexGen, G: TIndexGen> SPool<T, I, G> {
    pub fn free(&self, handle: SPoolHandle<I, G>) {
        if !handle.valid() {
            return;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let slot = handle.index.to_usize();
        if slot >= self.capacity {
            log::warn!("SPool::free: handle index {:?} out of range", handle.index);
            return;
        }

        let cell = slot + SENTINEL_COUNT;
        if !state.links[cell].active || state.generations[slot] != handle.generation {
            log::warn!("SPool::free: stale or double free of slot {:?}", handle.index);
            return;
        }

        // -- unsplice from active list
        let prev = state.links[cell].prev;
        let next = state.links[cell].next;
        state.links[prev].next = next;
        state.links[next].prev = prev;

        // -- push onto free head
        state.links[cell].next = state.links[FREE_SENTINEL].next;
        state.links[cell].prev = FREE_SENTINEL;
        state.links[cell].active = false;
        state.links[FREE_SENTINEL].next = cell;

        state.generations[slot] = state.generations[slot].next_generation();
        state.used -= 1;
    }

    pub fn size(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.state.lock().used
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used()
    }

    pub fn full(&self) -> bool {
        self.used() == self.capacity
    }

    pub fn is_live(&self, handle: SPoolHandle<I, G>) -> bool {
        let state = self.state.lock();
        state.live_slot(handle).is_some()
    }

    // -- the liveness check and func share one lock, so a concurrent free + alloc of the slot
    // -- can't slip in between them
    pub fn with<R, F: FnOnce(&T) -> R>(&self, handle: SPoolHandle<I, G>, func: F) -> Option<R> {
        let state = self.state.lock();
        let slot = state.live_slot(handle)?;
        Some(func(&state.values[slot]))
    }

    pub fn with_mut<R, F: FnOnce(&mut T) -> R>(&self, handle: SPoolHandle<I, G>, func: F) -> Option<R> {
        let mut state = self.state.lock();
        let slot = state.live_slot(handle)?;
        Some(func(&mut state.values[slot]))
    }

    // -- active slots, walked from the active anchor
    pub fn active_indices(&self) -> Vec<I> {
        let state = self.state.lock();
        let mut result = Vec::with_capacity(state.used);
        let mut cell = state.links[ACTIVE_SENTINEL].next;
        while cell != ACTIVE_SENTINEL {
            result.push(I::from_usize(cell - SENTINEL_COUNT));
            cell = state.links[cell].next;
        }
        result
    }

    #[cfg(test)]
    fn free_list_len(&self) -> usize {
        let state = self.state.lock();
        let mut count = 0;
        let mut cell = state.links[FREE_SENTINEL].next;
        while cell != FREE_SENTINEL {
            assert!(!state.links[cell].active);
            count += 1;
            cell = state.links[cell].next;
        }
        count
    }
}

impl<T: Copy, I: TIndexGen, G: TIndexGen> SPool<T, I, G> {
    pub fn get(&self, handle: SPoolHandle<I, G>) -> Option<T> {
        self.with(handle, |v| *v)
    }
}
