//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations but provides a valid
//! [`GpuBackend`] implementation without requiring GPU hardware. It records
//! every command it receives so tests can assert on barrier placement and
//! pass ordering.

use std::collections::HashMap;
use std::ptr::NonNull;

use crate::allocator::MemoryBlock;
use crate::error::GraphicsResult;
use crate::types::{MemoryUsage, ResourceState, TextureDescriptor};

use super::{
    CommandHandle, GpuBackend, MemoryHandle, MemoryRequirements, RenderPassDesc, TextureHandle,
    TextureViewHandle, TextureViewDescriptor,
};

/// A command recorded by the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Barrier {
        texture: TextureHandle,
        old_state: ResourceState,
        new_state: ResourceState,
    },
    BeginRenderPass(RenderPassDesc),
    EndRenderPass,
    CopyTexture {
        src: TextureHandle,
        dst: TextureHandle,
    },
    BeginLabel(String),
    EndLabel,
}

struct DummyHeap {
    usage: MemoryUsage,
    /// Host-visible heaps get CPU backing so mapped pointers are real.
    backing: Option<Box<[u8]>>,
}

/// Dummy GPU backend.
#[derive(Default)]
pub struct DummyBackend {
    next_id: u64,
    heaps: HashMap<MemoryHandle, DummyHeap>,
    textures: HashMap<TextureHandle, TextureDescriptor>,
    views: HashMap<TextureViewHandle, TextureHandle>,
    commands: Vec<RecordedCommand>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy"
    }

    /// All commands recorded so far, in submission order.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Forget recorded commands (e.g. between frames in a test).
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of textures currently alive.
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of texture views currently alive.
    pub fn live_view_count(&self) -> usize {
        self.views.len()
    }

    /// Number of memory heaps currently alive.
    pub fn live_heap_count(&self) -> usize {
        self.heaps.len()
    }

    fn next_id(&mut self) -> u64 {
        // Id 0 is never handed out so zeroed handles stay invalid.
        self.next_id += 1;
        self.next_id
    }
}

impl GpuBackend for DummyBackend {
    fn allocate_memory(&mut self, size: u64, usage: MemoryUsage) -> GraphicsResult<MemoryHandle> {
        let handle = MemoryHandle(self.next_id());
        let backing = match usage {
            MemoryUsage::GpuOnly => None,
            MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => {
                Some(vec![0u8; size as usize].into_boxed_slice())
            }
        };
        log::trace!("DummyBackend: allocated heap {handle:?} ({size} bytes, {usage:?})");
        self.heaps.insert(handle, DummyHeap { usage, backing });
        Ok(handle)
    }

    fn free_memory(&mut self, memory: MemoryHandle) {
        self.heaps.remove(&memory);
    }

    fn map_memory(&mut self, memory: MemoryHandle) -> Option<NonNull<u8>> {
        let heap = self.heaps.get_mut(&memory)?;
        let backing = heap.backing.as_mut()?;
        NonNull::new(backing.as_mut_ptr())
    }

    fn texture_memory_requirements(&self, desc: &TextureDescriptor) -> MemoryRequirements {
        let size = u64::from(desc.width)
            * u64::from(desc.height)
            * u64::from(desc.depth)
            * u64::from(desc.array_layers)
            * u64::from(desc.format.bytes_per_pixel());
        MemoryRequirements {
            size: size.max(1),
            alignment: 256,
        }
    }

    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        _memory: &MemoryBlock,
    ) -> GraphicsResult<TextureHandle> {
        let handle = TextureHandle(self.next_id());
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} layers)",
            desc.label,
            desc.width,
            desc.height,
            desc.array_layers
        );
        self.textures.insert(handle, desc.clone());
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        _desc: &TextureViewDescriptor,
    ) -> GraphicsResult<TextureViewHandle> {
        let handle = TextureViewHandle(self.next_id());
        self.views.insert(handle, texture);
        Ok(handle)
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.views.remove(&view);
    }

    fn resource_barrier(
        &mut self,
        _cmd: CommandHandle,
        texture: TextureHandle,
        old_state: ResourceState,
        new_state: ResourceState,
    ) {
        self.commands.push(RecordedCommand::Barrier {
            texture,
            old_state,
            new_state,
        });
    }

    fn begin_render_pass(&mut self, _cmd: CommandHandle, desc: &RenderPassDesc) {
        self.commands
            .push(RecordedCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self, _cmd: CommandHandle) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn copy_texture(&mut self, _cmd: CommandHandle, src: TextureHandle, dst: TextureHandle) {
        self.commands.push(RecordedCommand::CopyTexture { src, dst });
    }

    fn cmd_begin_debug_label(&mut self, _cmd: CommandHandle, label: &str, _color: [f32; 4]) {
        self.commands
            .push(RecordedCommand::BeginLabel(label.to_string()));
    }

    fn cmd_end_debug_label(&mut self, _cmd: CommandHandle) {
        self.commands.push(RecordedCommand::EndLabel);
    }

    fn set_debug_name(&mut self, _texture: TextureHandle, _name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureUsage;

    #[test]
    fn test_handles_are_unique_and_nonzero() {
        let mut backend = DummyBackend::new();
        let a = backend.allocate_memory(1024, MemoryUsage::GpuOnly).unwrap();
        let b = backend.allocate_memory(1024, MemoryUsage::GpuOnly).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.0, 0);
    }

    #[test]
    fn test_map_memory_only_host_visible() {
        let mut backend = DummyBackend::new();
        let gpu = backend.allocate_memory(256, MemoryUsage::GpuOnly).unwrap();
        let cpu = backend.allocate_memory(256, MemoryUsage::CpuToGpu).unwrap();

        assert!(backend.map_memory(gpu).is_none());
        assert!(backend.map_memory(cpu).is_some());
    }

    #[test]
    fn test_commands_are_recorded_in_order() {
        let mut backend = DummyBackend::new();
        let cmd = CommandHandle(1);
        let desc = TextureDescriptor::new_2d(
            64,
            64,
            crate::types::TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        );
        let reqs = backend.texture_memory_requirements(&desc);
        let memory = backend.allocate_memory(reqs.size, MemoryUsage::GpuOnly).unwrap();
        let block = MemoryBlock::new(memory, 0, reqs.size);
        let texture = backend.create_texture(&desc, &block).unwrap();

        backend.cmd_begin_debug_label(cmd, "pass", [1.0, 0.7, 0.0, 1.0]);
        backend.resource_barrier(
            cmd,
            texture,
            ResourceState::Undefined,
            ResourceState::RenderTarget,
        );
        backend.cmd_end_debug_label(cmd);

        assert_eq!(backend.commands().len(), 3);
        assert!(matches!(
            backend.commands()[1],
            RecordedCommand::Barrier {
                old_state: ResourceState::Undefined,
                new_state: ResourceState::RenderTarget,
                ..
            }
        ));
    }
}
