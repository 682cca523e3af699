//! Frame memory allocator.
//!
//! Sub-allocates three kinds of backing memory from large heaps reserved
//! once at initialization:
//!
//! - **Static** — an independent heap per allocation, for anything that
//!   outlives a frame (pooled texture backing, persistent caches). Freed
//!   explicitly via [`FrameAllocator::free`].
//! - **Frame transient** — bump allocation from a single device-local page,
//!   reset wholesale at the start of every frame.
//! - **Staging** — bump allocation from one host-visible page per frame in
//!   flight. A frame's page is only reset once the caller knows the GPU has
//!   finished consuming it (the frame fence contract is enforced by the
//!   caller, not here).
//!
//! Bump paths never fail the caller: when a page overflows, the request
//! falls back to a static allocation with a logged warning.
//!
//! # Thread Safety
//!
//! Per-frame state (cursors, frame index) is guarded by a mutex because
//! staging allocations may come from asynchronous loader threads outside
//! the render thread.

use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::backend::{GpuBackend, MemoryHandle};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::MemoryUsage;

/// A region inside a memory heap.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBlock {
    /// The backing heap.
    pub memory: MemoryHandle,
    /// Byte offset of this block inside the heap.
    pub offset: u64,
    /// Size of the block in bytes.
    pub size: u64,
    /// CPU write pointer for host-visible blocks.
    pub mapped_ptr: Option<NonNull<u8>>,
}

// The mapped pointer aliases a persistently mapped heap owned by the
// backend; it stays valid until the heap is freed.
unsafe impl Send for MemoryBlock {}
unsafe impl Sync for MemoryBlock {}

impl MemoryBlock {
    pub fn new(memory: MemoryHandle, offset: u64, size: u64) -> Self {
        Self {
            memory,
            offset,
            size,
            mapped_ptr: None,
        }
    }

    pub fn with_mapped_ptr(mut self, ptr: Option<NonNull<u8>>) -> Self {
        self.mapped_ptr = ptr;
        self
    }
}

/// A large backing allocation with a bump cursor.
struct LinearPage {
    memory: MemoryHandle,
    size: u64,
    cursor: u64,
    mapped_ptr: Option<NonNull<u8>>,
}

unsafe impl Send for LinearPage {}

impl LinearPage {
    /// Claim `size` bytes at the next `alignment`-aligned cursor position.
    ///
    /// Returns the aligned offset, or `None` if the page is full.
    fn try_alloc(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let aligned_offset = align_up(self.cursor, alignment);
        if aligned_offset + size > self.size {
            return None;
        }
        self.cursor = aligned_offset + size;
        Some(aligned_offset)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Heap sizes for the frame allocator.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    /// Device-local page for render targets and other frame-transient data.
    pub transient_heap_size: u64,
    /// Host-visible upload page, one per frame in flight.
    pub staging_heap_size: u64,
    pub frames_in_flight: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            transient_heap_size: 256 * 1024 * 1024,
            staging_heap_size: 64 * 1024 * 1024,
            frames_in_flight: 3,
        }
    }
}

struct AllocatorState {
    transient_page: LinearPage,
    staging_pages: Vec<LinearPage>,
    current_frame_index: u32,
}

/// Sub-allocator over pre-reserved memory heaps.
///
/// Pages are created once in [`new`](Self::new) and live until
/// [`cleanup`](Self::cleanup); only their cursors reset per frame.
pub struct FrameAllocator {
    state: Mutex<AllocatorState>,
}

impl FrameAllocator {
    /// Reserve the transient and staging heaps.
    pub fn new(backend: &mut dyn GpuBackend, config: AllocatorConfig) -> GraphicsResult<Self> {
        if config.frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let transient_memory =
            backend.allocate_memory(config.transient_heap_size, MemoryUsage::GpuOnly)?;
        let transient_page = LinearPage {
            memory: transient_memory,
            size: config.transient_heap_size,
            cursor: 0,
            mapped_ptr: None,
        };
        log::info!(
            "Transient heap initialized: {} MiB",
            config.transient_heap_size / (1024 * 1024)
        );

        let mut staging_pages = Vec::with_capacity(config.frames_in_flight as usize);
        for _ in 0..config.frames_in_flight {
            let memory = backend.allocate_memory(config.staging_heap_size, MemoryUsage::CpuToGpu)?;
            let mapped_ptr = backend.map_memory(memory);
            staging_pages.push(LinearPage {
                memory,
                size: config.staging_heap_size,
                cursor: 0,
                mapped_ptr,
            });
        }
        log::info!(
            "Staging heaps initialized: {} MiB x {}",
            config.staging_heap_size / (1024 * 1024),
            config.frames_in_flight
        );

        Ok(Self {
            state: Mutex::new(AllocatorState {
                transient_page,
                staging_pages,
                current_frame_index: 0,
            }),
        })
    }

    /// Release the reserved heaps.
    pub fn cleanup(&self, backend: &mut dyn GpuBackend) {
        let state = self.state.lock();
        backend.free_memory(state.transient_page.memory);
        for page in &state.staging_pages {
            backend.free_memory(page.memory);
        }
    }

    /// Start a new frame.
    ///
    /// Resets the transient cursor (last frame's transients are done or
    /// barrier-protected) and the staging cursor of `frame_index` only —
    /// the caller must have proven via the frame fence that the GPU
    /// finished consuming that page.
    pub fn begin_frame(&self, frame_index: u32) {
        let mut state = self.state.lock();
        state.current_frame_index = frame_index;
        state.transient_page.reset();
        let index = frame_index as usize;
        if let Some(page) = state.staging_pages.get_mut(index) {
            page.reset();
        } else {
            log::warn!(
                "begin_frame: frame index {frame_index} out of range ({} frames in flight)",
                state.staging_pages.len()
            );
        }
    }

    /// Allocate an independent block that outlives the frame.
    ///
    /// Host-visible blocks come back persistently mapped.
    pub fn alloc_static(
        &self,
        backend: &mut dyn GpuBackend,
        size: u64,
        _alignment: u64,
        usage: MemoryUsage,
    ) -> GraphicsResult<MemoryBlock> {
        let memory = backend.allocate_memory(size, usage)?;
        let mapped_ptr = match usage {
            MemoryUsage::GpuOnly => None,
            MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => backend.map_memory(memory),
        };
        Ok(MemoryBlock::new(memory, 0, size).with_mapped_ptr(mapped_ptr))
    }

    /// Bump-allocate from the device-local transient page.
    ///
    /// Overflow falls back to [`alloc_static`](Self::alloc_static).
    pub fn alloc_frame_transient(
        &self,
        backend: &mut dyn GpuBackend,
        size: u64,
        alignment: u64,
    ) -> GraphicsResult<MemoryBlock> {
        let claimed = {
            let mut state = self.state.lock();
            state
                .transient_page
                .try_alloc(size, alignment)
                .map(|offset| (state.transient_page.memory, offset))
        };

        match claimed {
            Some((memory, offset)) => Ok(MemoryBlock::new(memory, offset, size)),
            None => {
                log::warn!("Transient heap overflow ({size} bytes); falling back to static allocation");
                self.alloc_static(backend, size, alignment, MemoryUsage::GpuOnly)
            }
        }
    }

    /// Bump-allocate from the current frame's host-visible staging page.
    ///
    /// The returned block carries a CPU write pointer into the page's
    /// persistent mapping. Overflow falls back to
    /// [`alloc_static`](Self::alloc_static).
    pub fn alloc_staging(
        &self,
        backend: &mut dyn GpuBackend,
        size: u64,
        alignment: u64,
    ) -> GraphicsResult<MemoryBlock> {
        let claimed = {
            let mut state = self.state.lock();
            let index = state.current_frame_index as usize;
            state.staging_pages.get_mut(index).and_then(|page| {
                let offset = page.try_alloc(size, alignment)?;
                let mapped_ptr = page
                    .mapped_ptr
                    // Contract: offset stays inside the page mapping.
                    .map(|base| unsafe { NonNull::new_unchecked(base.as_ptr().add(offset as usize)) });
                Some((page.memory, offset, mapped_ptr))
            })
        };

        match claimed {
            Some((memory, offset, mapped_ptr)) => {
                Ok(MemoryBlock::new(memory, offset, size).with_mapped_ptr(mapped_ptr))
            }
            None => {
                log::warn!("Staging heap overflow ({size} bytes); falling back to static allocation");
                self.alloc_static(backend, size, alignment, MemoryUsage::CpuToGpu)
            }
        }
    }

    /// Free a block returned by [`alloc_static`](Self::alloc_static).
    ///
    /// Blocks that live inside a transient or staging page are ignored —
    /// their space is reclaimed by the per-frame cursor reset.
    pub fn free(&self, backend: &mut dyn GpuBackend, block: &MemoryBlock) {
        let is_page_block = {
            let state = self.state.lock();
            block.memory == state.transient_page.memory
                || state.staging_pages.iter().any(|p| p.memory == block.memory)
        };
        if !is_page_block {
            backend.free_memory(block.memory);
        }
    }
}

/// Align a value up to the given alignment.
#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn small_config() -> AllocatorConfig {
        AllocatorConfig {
            transient_heap_size: 1024,
            staging_heap_size: 512,
            frames_in_flight: 2,
        }
    }

    #[test]
    fn test_transient_bump_and_alignment() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();

        let a = allocator.alloc_frame_transient(&mut backend, 100, 64).unwrap();
        assert_eq!(a.offset, 0);

        // Cursor at 100; next allocation aligns up to 128.
        let b = allocator.alloc_frame_transient(&mut backend, 64, 64).unwrap();
        assert_eq!(b.offset, 128);
        assert_eq!(b.memory, a.memory);
        assert!(b.mapped_ptr.is_none());
    }

    #[test]
    fn test_transient_reset_on_begin_frame() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();

        allocator.alloc_frame_transient(&mut backend, 512, 256).unwrap();
        allocator.begin_frame(0);
        let block = allocator.alloc_frame_transient(&mut backend, 512, 256).unwrap();
        assert_eq!(block.offset, 0);
    }

    #[test]
    fn test_transient_overflow_falls_back_to_static() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();
        let heaps_before = backend.live_heap_count();

        let inside = allocator.alloc_frame_transient(&mut backend, 1024, 64).unwrap();
        let overflow = allocator.alloc_frame_transient(&mut backend, 64, 64).unwrap();

        // The overflow block lives in its own dedicated heap.
        assert_ne!(overflow.memory, inside.memory);
        assert_eq!(backend.live_heap_count(), heaps_before + 1);

        allocator.free(&mut backend, &overflow);
        assert_eq!(backend.live_heap_count(), heaps_before);
    }

    #[test]
    fn test_staging_is_mapped_at_offset() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();

        let a = allocator.alloc_staging(&mut backend, 100, 64).unwrap();
        let b = allocator.alloc_staging(&mut backend, 64, 64).unwrap();

        let base = a.mapped_ptr.unwrap().as_ptr() as usize;
        let second = b.mapped_ptr.unwrap().as_ptr() as usize;
        assert_eq!(second - base, 128);
        assert_eq!(b.offset, 128);
    }

    #[test]
    fn test_staging_pages_are_per_frame() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();

        allocator.begin_frame(0);
        let frame0 = allocator.alloc_staging(&mut backend, 64, 64).unwrap();

        allocator.begin_frame(1);
        let frame1 = allocator.alloc_staging(&mut backend, 64, 64).unwrap();

        // Different frames write into different pages.
        assert_ne!(frame0.memory, frame1.memory);
        assert_eq!(frame1.offset, 0);

        // Frame 0's page was not reset by frame 1's begin_frame.
        allocator.begin_frame(1);
        allocator.begin_frame(0);
        let frame0_again = allocator.alloc_staging(&mut backend, 64, 64).unwrap();
        assert_eq!(frame0_again.memory, frame0.memory);
        assert_eq!(frame0_again.offset, 0);
    }

    #[test]
    fn test_staging_overflow_falls_back_to_static() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();

        allocator.alloc_staging(&mut backend, 512, 64).unwrap();
        let overflow = allocator.alloc_staging(&mut backend, 64, 64).unwrap();

        // Fallback block is still host-visible and mapped.
        assert!(overflow.mapped_ptr.is_some());
        allocator.free(&mut backend, &overflow);
    }

    #[test]
    fn test_free_ignores_page_blocks() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();
        let heaps_before = backend.live_heap_count();

        let block = allocator.alloc_frame_transient(&mut backend, 64, 64).unwrap();
        allocator.free(&mut backend, &block);
        assert_eq!(backend.live_heap_count(), heaps_before);
    }

    #[test]
    fn test_cleanup_frees_all_pages() {
        let mut backend = DummyBackend::new();
        let allocator = FrameAllocator::new(&mut backend, small_config()).unwrap();
        assert_eq!(backend.live_heap_count(), 3); // 1 transient + 2 staging

        allocator.cleanup(&mut backend);
        assert_eq!(backend.live_heap_count(), 0);
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let mut backend = DummyBackend::new();
        let config = AllocatorConfig {
            frames_in_flight: 0,
            ..small_config()
        };
        assert!(FrameAllocator::new(&mut backend, config).is_err());
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(255, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(100, 64), 128);
    }
}
