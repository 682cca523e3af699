//! # Frame Graph
//!
//! Pass graph compiler and transient GPU resource manager: the
//! frame-scheduling core of a real-time renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameGraph`] - Declarative description of render passes and their
//!   resource reads/writes, compiled into an execution order with
//!   state-transition barriers
//! - [`GpuBackend`] - Trait the graph consumes from a graphics backend
//!   implementation (Vulkan, wgpu); [`DummyBackend`] records commands for
//!   testing
//! - [`ResourcePool`] - Recycles physical textures across frames by
//!   descriptor hash
//! - [`FrameAllocator`] - Static, frame-transient and per-frame-in-flight
//!   staging memory over pre-reserved heaps
//!
//! ## Example
//!
//! ```ignore
//! use frame_graph::{FrameGraph, FrameAllocator, ResourcePool};
//!
//! allocator.begin_frame(frame_index);
//! graph.reset(&mut backend, &allocator, &mut pool);
//! // declare passes...
//! graph.compile();
//! graph.execute(&mut backend, &allocator, &mut pool, cmd, None)?;
//! pool.tick(&mut backend, &allocator);
//! ```

pub mod allocator;
pub mod backend;
pub mod error;
pub mod graph;
pub mod pool;
pub mod types;

// Re-export main types for convenience
pub use allocator::{AllocatorConfig, FrameAllocator, MemoryBlock};
pub use backend::dummy::DummyBackend;
pub use backend::{CommandHandle, GpuBackend, RenderPassDesc, TextureHandle, TextureViewHandle};
pub use error::{GraphicsError, GraphicsResult};
pub use graph::{
    Barrier, CompileDiagnostics, FrameGraph, PassBuilder, PassContext, ResourceHandle,
    TaskScheduler,
};
pub use pool::{PoolHandle, ResourcePool};
pub use types::{
    MemoryUsage, ResourceState, TextureDescriptor, TextureFormat, TextureType, TextureUsage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
