//! Physical texture pool.
//!
//! Transient graph resources are recycled across frames instead of being
//! created and destroyed every frame. The pool keys idle textures by a
//! structural hash of their descriptor (size, format, mips, layers, type):
//! [`acquire`](ResourcePool::acquire) pops a matching idle texture or
//! creates one backed by the frame allocator's static path,
//! [`release`](ResourcePool::release) returns it to its bucket.
//!
//! # Ownership
//!
//! The pool always owns the underlying allocations. Between `acquire` and
//! `release` a texture is *lent*, identified by a generation-checked
//! [`PoolHandle`]; a stale handle resolves to `None` instead of aliasing a
//! texture that was re-lent to someone else. Textures still lent at
//! [`cleanup`](ResourcePool::cleanup) are force-destroyed and logged as
//! leaks.
//!
//! # Thread Safety
//!
//! The pool is intentionally not synchronized. It must only be used from
//! the thread driving graph compilation and execution.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::allocator::{FrameAllocator, MemoryBlock};
use crate::backend::{GpuBackend, TextureHandle, TextureViewDescriptor, TextureViewHandle};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{MemoryUsage, TextureDescriptor};

/// Frames an idle texture may sit in its bucket before
/// [`tick`](ResourcePool::tick) destroys it.
pub const MAX_IDLE_FRAMES: u32 = 240;

/// Generation-checked handle to a texture lent out by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

/// A physical texture owned by the pool.
#[derive(Debug)]
pub struct PooledTexture {
    pub texture: TextureHandle,
    /// View over the whole texture.
    pub view: TextureViewHandle,
    /// One 2D view per array layer, for rendering into a single slice.
    /// Empty for non-array textures.
    pub layer_views: Vec<TextureViewHandle>,
    pub memory: MemoryBlock,
    pub desc: TextureDescriptor,
    desc_hash: u64,
}

struct Slot {
    texture: Option<PooledTexture>,
    generation: u32,
    lent: bool,
    idle_frames: u32,
}

/// Pool of recyclable physical textures.
#[derive(Default)]
pub struct ResourcePool {
    slots: Vec<Slot>,
    /// Idle slot indices keyed by descriptor hash.
    free_lists: HashMap<u64, Vec<u32>>,
    /// Slots whose texture was destroyed, available for reuse.
    vacant: Vec<u32>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a texture matching `desc`, recycling an idle one when possible.
    ///
    /// The returned handle stays valid until [`release`](Self::release).
    pub fn acquire(
        &mut self,
        backend: &mut dyn GpuBackend,
        allocator: &FrameAllocator,
        desc: &TextureDescriptor,
    ) -> GraphicsResult<PoolHandle> {
        if desc.is_zero_sized() {
            return Err(GraphicsError::InvalidParameter(format!(
                "zero-sized texture request: {:?}",
                desc.label
            )));
        }

        let hash = hash_descriptor(desc);

        if let Some(index) = self
            .free_lists
            .get_mut(&hash)
            .and_then(|bucket| bucket.pop())
        {
            let slot = &mut self.slots[index as usize];
            slot.lent = true;
            slot.idle_frames = 0;
            return Ok(PoolHandle {
                index,
                generation: slot.generation,
            });
        }

        let texture = self.create_texture(backend, allocator, desc, hash)?;

        let index = match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.texture = Some(texture);
                slot.lent = true;
                slot.idle_frames = 0;
                index
            }
            None => {
                self.slots.push(Slot {
                    texture: Some(texture),
                    generation: 0,
                    lent: true,
                    idle_frames: 0,
                });
                (self.slots.len() - 1) as u32
            }
        };

        Ok(PoolHandle {
            index,
            generation: self.slots[index as usize].generation,
        })
    }

    /// Return a lent texture to its recycling bucket.
    ///
    /// The handle is invalidated; a texture whose stored hash is missing
    /// (defensive fallback) is destroyed instead of recycled.
    pub fn release(
        &mut self,
        backend: &mut dyn GpuBackend,
        allocator: &FrameAllocator,
        handle: PoolHandle,
    ) {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            log::warn!("release: handle index {} out of range", handle.index);
            return;
        };
        if slot.generation != handle.generation || !slot.lent {
            log::warn!("release: stale pool handle {handle:?}");
            return;
        }

        slot.lent = false;
        slot.idle_frames = 0;
        // Invalidate outstanding copies of this handle.
        slot.generation = slot.generation.wrapping_add(1);

        let hash = slot.texture.as_ref().map_or(0, |t| t.desc_hash);
        if hash != 0 {
            self.free_lists.entry(hash).or_default().push(handle.index);
        } else if let Some(texture) = slot.texture.take() {
            destroy_texture(backend, allocator, texture);
            self.vacant.push(handle.index);
        }
    }

    /// Resolve a handle to the texture it lends.
    ///
    /// Returns `None` for stale or released handles.
    pub fn get(&self, handle: PoolHandle) -> Option<&PooledTexture> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation || !slot.lent {
            return None;
        }
        slot.texture.as_ref()
    }

    /// Frame-end hook: age idle textures and destroy ones that sat unused
    /// for more than [`MAX_IDLE_FRAMES`].
    pub fn tick(&mut self, backend: &mut dyn GpuBackend, allocator: &FrameAllocator) {
        let slots = &mut self.slots;
        let vacant = &mut self.vacant;
        for bucket in self.free_lists.values_mut() {
            bucket.retain(|&index| {
                let slot = &mut slots[index as usize];
                slot.idle_frames += 1;
                if slot.idle_frames <= MAX_IDLE_FRAMES {
                    return true;
                }
                if let Some(texture) = slot.texture.take() {
                    log::debug!(
                        "Destroying pooled texture idle for {} frames: {:?}",
                        slot.idle_frames,
                        texture.desc.label
                    );
                    destroy_texture(backend, allocator, texture);
                }
                vacant.push(index);
                false
            });
        }
        self.free_lists.retain(|_, bucket| !bucket.is_empty());
    }

    /// Destroy every pooled texture. Textures still lent are leaks: they
    /// are force-destroyed and logged.
    pub fn cleanup(&mut self, backend: &mut dyn GpuBackend, allocator: &FrameAllocator) {
        for slot in &mut self.slots {
            if let Some(texture) = slot.texture.take() {
                if slot.lent {
                    log::warn!(
                        "Pooled texture leaked (never released): {:?}",
                        texture.desc.label
                    );
                }
                destroy_texture(backend, allocator, texture);
            }
            slot.lent = false;
        }
        self.slots.clear();
        self.free_lists.clear();
        self.vacant.clear();
    }

    /// Number of textures currently lent out.
    pub fn lent_count(&self) -> usize {
        self.slots.iter().filter(|s| s.lent).count()
    }

    /// Number of idle textures waiting in buckets.
    pub fn idle_count(&self) -> usize {
        self.free_lists.values().map(Vec::len).sum()
    }

    fn create_texture(
        &mut self,
        backend: &mut dyn GpuBackend,
        allocator: &FrameAllocator,
        desc: &TextureDescriptor,
        desc_hash: u64,
    ) -> GraphicsResult<PooledTexture> {
        let requirements = backend.texture_memory_requirements(desc);
        // Pooled textures outlive frames, so they take the static path.
        let memory = allocator.alloc_static(
            backend,
            requirements.size,
            requirements.alignment,
            MemoryUsage::GpuOnly,
        )?;

        let texture = backend.create_texture(desc, &memory)?;
        if let Some(label) = &desc.label {
            backend.set_debug_name(texture, label);
        }

        let view = backend.create_texture_view(texture, &TextureViewDescriptor::full(desc))?;

        let mut layer_views = Vec::new();
        if desc.array_layers > 1 {
            layer_views.reserve_exact(desc.array_layers as usize);
            for layer in 0..desc.array_layers {
                layer_views.push(
                    backend.create_texture_view(texture, &TextureViewDescriptor::layer(desc, layer))?,
                );
            }
        }

        Ok(PooledTexture {
            texture,
            view,
            layer_views,
            memory,
            desc: desc.clone(),
            desc_hash,
        })
    }
}

fn destroy_texture(
    backend: &mut dyn GpuBackend,
    allocator: &FrameAllocator,
    texture: PooledTexture,
) {
    for view in texture.layer_views {
        backend.destroy_texture_view(view);
    }
    backend.destroy_texture_view(texture.view);
    backend.destroy_texture(texture.texture);
    allocator.free(backend, &texture.memory);
}

/// Structural hash of the fields that determine physical compatibility.
/// The label is deliberately excluded.
fn hash_descriptor(desc: &TextureDescriptor) -> u64 {
    let mut hasher = DefaultHasher::new();
    desc.width.hash(&mut hasher);
    desc.height.hash(&mut hasher);
    desc.depth.hash(&mut hasher);
    desc.format.hash(&mut hasher);
    desc.mip_levels.hash(&mut hasher);
    desc.array_layers.hash(&mut hasher);
    desc.texture_type.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::AllocatorConfig;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{TextureFormat, TextureUsage};

    fn setup() -> (DummyBackend, FrameAllocator, ResourcePool) {
        let mut backend = DummyBackend::new();
        let config = AllocatorConfig {
            transient_heap_size: 16 * 1024 * 1024,
            staging_heap_size: 1024 * 1024,
            frames_in_flight: 2,
        };
        let allocator = FrameAllocator::new(&mut backend, config).unwrap();
        (backend, allocator, ResourcePool::new())
    }

    fn shadow_desc() -> TextureDescriptor {
        TextureDescriptor::new_2d_array(
            2048,
            2048,
            4,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
        )
        .with_label("shadow_map")
    }

    #[test]
    fn test_acquire_creates_views() {
        let (mut backend, allocator, mut pool) = setup();

        let handle = pool.acquire(&mut backend, &allocator, &shadow_desc()).unwrap();
        let texture = pool.get(handle).unwrap();

        // Full view plus one per cascade layer.
        assert_eq!(texture.layer_views.len(), 4);
        assert_eq!(backend.live_view_count(), 5);
        assert_eq!(pool.lent_count(), 1);
    }

    #[test]
    fn test_release_then_acquire_recycles_same_texture() {
        let (mut backend, allocator, mut pool) = setup();
        let desc = shadow_desc();

        let first = pool.acquire(&mut backend, &allocator, &desc).unwrap();
        let physical = pool.get(first).unwrap().texture;
        let views = pool.get(first).unwrap().layer_views.clone();
        pool.release(&mut backend, &allocator, first);
        assert_eq!(pool.idle_count(), 1);

        let second = pool.acquire(&mut backend, &allocator, &desc).unwrap();
        let recycled = pool.get(second).unwrap();

        // Identical physical object, views retained, nothing new created.
        assert_eq!(recycled.texture, physical);
        assert_eq!(recycled.layer_views, views);
        assert_eq!(backend.live_texture_count(), 1);
    }

    #[test]
    fn test_different_descriptors_do_not_recycle() {
        let (mut backend, allocator, mut pool) = setup();

        let a = pool.acquire(&mut backend, &allocator, &shadow_desc()).unwrap();
        pool.release(&mut backend, &allocator, a);

        let color = TextureDescriptor::new_2d(
            1920,
            1080,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_ATTACHMENT,
        );
        let b = pool.acquire(&mut backend, &allocator, &color).unwrap();

        assert_eq!(backend.live_texture_count(), 2);
        assert_eq!(pool.get(b).unwrap().desc.format, TextureFormat::Rgba16Float);
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let (mut backend, allocator, mut pool) = setup();
        let desc = shadow_desc();

        let first = pool.acquire(&mut backend, &allocator, &desc).unwrap();
        pool.release(&mut backend, &allocator, first);
        assert!(pool.get(first).is_none());

        // The slot is re-lent under a new generation; the old handle must
        // not alias the new lease.
        let second = pool.acquire(&mut backend, &allocator, &desc).unwrap();
        assert!(pool.get(first).is_none());
        assert!(pool.get(second).is_some());
    }

    #[test]
    fn test_double_release_is_ignored() {
        let (mut backend, allocator, mut pool) = setup();

        let handle = pool.acquire(&mut backend, &allocator, &shadow_desc()).unwrap();
        pool.release(&mut backend, &allocator, handle);
        pool.release(&mut backend, &allocator, handle);

        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_zero_sized_request_is_rejected() {
        let (mut backend, allocator, mut pool) = setup();
        let desc = TextureDescriptor::new_2d(0, 0, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        assert!(pool.acquire(&mut backend, &allocator, &desc).is_err());
    }

    #[test]
    fn test_cleanup_destroys_leaked_textures() {
        let (mut backend, allocator, mut pool) = setup();

        let _leaked = pool.acquire(&mut backend, &allocator, &shadow_desc()).unwrap();
        pool.cleanup(&mut backend, &allocator);

        assert_eq!(backend.live_texture_count(), 0);
        assert_eq!(backend.live_view_count(), 0);
        assert_eq!(pool.lent_count(), 0);
    }

    #[test]
    fn test_tick_destroys_long_idle_textures() {
        let (mut backend, allocator, mut pool) = setup();

        let handle = pool.acquire(&mut backend, &allocator, &shadow_desc()).unwrap();
        pool.release(&mut backend, &allocator, handle);

        for _ in 0..MAX_IDLE_FRAMES {
            pool.tick(&mut backend, &allocator);
        }
        assert_eq!(pool.idle_count(), 1);

        pool.tick(&mut backend, &allocator);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(backend.live_texture_count(), 0);
    }
}
