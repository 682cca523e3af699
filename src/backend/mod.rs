//! GPU backend abstraction layer.
//!
//! The frame graph never talks to a graphics API directly. Everything it
//! needs from the device is expressed through the [`GpuBackend`] trait:
//! placed texture creation, state-transition barriers, render pass begin/end
//! and debug labels. Concrete implementations (Vulkan, wgpu) live outside
//! this crate; [`dummy::DummyBackend`] is a recording no-op implementation
//! used by tests.
//!
//! The backend is always passed as an explicit `&mut dyn GpuBackend`
//! parameter rather than stored globally, so every call site makes the
//! device dependency visible.

pub mod dummy;

use std::ptr::NonNull;

use crate::allocator::MemoryBlock;
use crate::error::GraphicsResult;
use crate::types::{MemoryUsage, ResourceState, TextureDescriptor};

/// Handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(pub(crate) u64);

/// Handle to a device memory heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryHandle(pub(crate) u64);

/// Handle to a command stream being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle(pub u64);

/// Size and alignment a texture needs from a memory heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    pub size: u64,
    pub alignment: u64,
}

/// Describes a view over a subresource range of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureViewDescriptor {
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl TextureViewDescriptor {
    /// A view covering the whole texture.
    pub fn full(desc: &TextureDescriptor) -> Self {
        Self {
            base_mip_level: 0,
            mip_level_count: desc.mip_levels,
            base_array_layer: 0,
            array_layer_count: desc.array_layers,
        }
    }

    /// A 2D view over a single array layer, used to render into one
    /// cascade of an array target.
    pub fn layer(desc: &TextureDescriptor, layer: u32) -> Self {
        Self {
            base_mip_level: 0,
            mip_level_count: desc.mip_levels,
            base_array_layer: layer,
            array_layer_count: 1,
        }
    }
}

/// Load operation for an attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

impl Default for LoadOp {
    fn default() -> Self {
        LoadOp::Load
    }
}

/// Color attachment for a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
}

/// Depth attachment for a render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthAttachment {
    pub view: TextureViewHandle,
    pub load_op: LoadOp,
    pub clear_depth: f32,
}

/// Render pass description handed to the backend by pass work closures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassDesc {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    /// Render into a single layer of an array target (e.g. one shadow
    /// cascade) instead of the whole texture.
    pub target_array_layer: Option<u32>,
}

/// Capability interface the frame graph consumes from the graphics backend.
///
/// Draw and bind primitives are intentionally absent: they are invoked only
/// inside pass work closures through backend-specific extension traits,
/// never by the graph itself.
pub trait GpuBackend {
    // Device memory heaps

    /// Reserve a memory heap of the given size.
    fn allocate_memory(&mut self, size: u64, usage: MemoryUsage) -> GraphicsResult<MemoryHandle>;

    /// Free a heap previously returned by [`allocate_memory`](Self::allocate_memory).
    fn free_memory(&mut self, memory: MemoryHandle);

    /// Get the persistent CPU mapping of a host-visible heap.
    ///
    /// Returns `None` for device-local memory.
    fn map_memory(&mut self, memory: MemoryHandle) -> Option<NonNull<u8>>;

    // Textures

    /// Query size/alignment a texture with this descriptor needs.
    fn texture_memory_requirements(&self, desc: &TextureDescriptor) -> MemoryRequirements;

    /// Create a texture placed at the given memory block.
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        memory: &MemoryBlock,
    ) -> GraphicsResult<TextureHandle>;

    /// Destroy a texture. Its memory block is freed separately.
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> GraphicsResult<TextureViewHandle>;

    fn destroy_texture_view(&mut self, view: TextureViewHandle);

    // Command recording

    /// Record a state-transition barrier for a texture.
    fn resource_barrier(
        &mut self,
        cmd: CommandHandle,
        texture: TextureHandle,
        old_state: ResourceState,
        new_state: ResourceState,
    );

    fn begin_render_pass(&mut self, cmd: CommandHandle, desc: &RenderPassDesc);

    fn end_render_pass(&mut self, cmd: CommandHandle);

    fn copy_texture(&mut self, cmd: CommandHandle, src: TextureHandle, dst: TextureHandle);

    // Debugging

    fn cmd_begin_debug_label(&mut self, cmd: CommandHandle, label: &str, color: [f32; 4]);

    fn cmd_end_debug_label(&mut self, cmd: CommandHandle);

    fn set_debug_name(&mut self, texture: TextureHandle, name: &str);
}
