//! Declarative pass graph.
//!
//! Rendering code declares passes and the logical resources they read and
//! write; the graph derives execution order, transient resource lifetimes
//! and state-transition barriers for one frame. Nothing physical exists at
//! declaration time: transient resources are materialized from the
//! [`ResourcePool`](crate::pool::ResourcePool) during execution, external
//! resources (swapchain target, persistent caches) are imported with their
//! current state and only tracked.
//!
//! The graph is rebuilt every frame: declare, [`compile`](FrameGraph::compile),
//! [`execute`](FrameGraph::execute), [`reset`](FrameGraph::reset).
//!
//! # Example
//!
//! ```no_run
//! use frame_graph::graph::FrameGraph;
//! use frame_graph::types::{ResourceState, TextureDescriptor, TextureFormat, TextureUsage};
//!
//! let mut graph = FrameGraph::new();
//! let shadow_map = graph.create(
//!     "shadow_map",
//!     TextureDescriptor::new_2d_array(
//!         2048,
//!         2048,
//!         4,
//!         TextureFormat::Depth32Float,
//!         TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
//!     ),
//! );
//! graph.add_pass(
//!     "Shadow",
//!     |builder| builder.write(shadow_map, ResourceState::DepthWrite),
//!     move |ctx| {
//!         // record shadow draws through ctx.backend
//!         let _ = ctx.layer_view(shadow_map, 0);
//!     },
//! );
//! graph.compile();
//! ```

pub mod compile;
pub mod executor;

pub use compile::{CompileDiagnostics, CompiledPlan};
pub use executor::{PassContext, TaskScheduler};

use crate::backend::{GpuBackend, TextureHandle, TextureViewHandle};
use crate::pool::PoolHandle;
use crate::types::{ResourceState, TextureDescriptor};

/// Opaque identifier for a logical resource in the graph.
///
/// Id `0` is permanently reserved as invalid and never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceHandle(u32);

impl ResourceHandle {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    fn index(self) -> Option<usize> {
        (self.0 != 0).then(|| self.0 as usize - 1)
    }
}

/// A state transition recorded for a resource before a pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub resource: ResourceHandle,
    pub old_state: ResourceState,
    pub new_state: ResourceState,
}

/// How a logical resource maps to a physical texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceBinding {
    /// Transient, not yet materialized.
    Unbound,
    /// Transient, lent by the resource pool for this frame.
    Pooled(PoolHandle),
    /// Owned outside the graph.
    External {
        texture: TextureHandle,
        view: TextureViewHandle,
    },
}

pub(crate) struct ResourceNode {
    pub(crate) name: String,
    /// Present for transient resources; externals are only tracked.
    pub(crate) desc: Option<TextureDescriptor>,
    pub(crate) binding: ResourceBinding,
    pub(crate) is_external: bool,
    pub(crate) initial_state: ResourceState,
}

/// One declared access of a pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassAccess {
    pub(crate) handle: ResourceHandle,
    pub(crate) state: ResourceState,
}

type PassWork = Box<dyn FnMut(&mut PassContext)>;

pub(crate) struct PassNode {
    pub(crate) name: String,
    pub(crate) reads: Vec<PassAccess>,
    pub(crate) writes: Vec<PassAccess>,
    /// Writes an imported resource, so its output is observable outside
    /// the graph and it roots the dependency graph.
    pub(crate) has_side_effects: bool,
    pub(crate) barriers: Vec<Barrier>,
    pub(crate) work: Option<PassWork>,
}

impl PassNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reads: Vec::new(),
            writes: Vec::new(),
            has_side_effects: false,
            barriers: Vec::new(),
            work: None,
        }
    }
}

/// Records reads and writes for the pass currently being declared.
pub struct PassBuilder<'a> {
    graph: &'a mut FrameGraph,
    pass_index: usize,
}

impl PassBuilder<'_> {
    /// Register a transient resource. See [`FrameGraph::create`].
    pub fn create(&mut self, name: &str, desc: TextureDescriptor) -> ResourceHandle {
        self.graph.create(name, desc)
    }

    /// Declare that this pass reads `handle` in `state`.
    ///
    /// An invalid handle is recorded nowhere and returned unchanged.
    pub fn read(&mut self, handle: ResourceHandle, state: ResourceState) -> ResourceHandle {
        if self.graph.resource(handle).is_none() {
            log::warn!(
                "Pass '{}' reads an invalid resource handle",
                self.graph.passes[self.pass_index].name
            );
            return handle;
        }
        self.graph.passes[self.pass_index]
            .reads
            .push(PassAccess { handle, state });
        handle
    }

    /// Declare that this pass writes `handle` in `state`.
    ///
    /// Writing an imported resource marks the pass as having side effects.
    pub fn write(&mut self, handle: ResourceHandle, state: ResourceState) -> ResourceHandle {
        let Some(resource) = self.graph.resource(handle) else {
            log::warn!(
                "Pass '{}' writes an invalid resource handle",
                self.graph.passes[self.pass_index].name
            );
            return handle;
        };
        if resource.is_external {
            self.graph.passes[self.pass_index].has_side_effects = true;
        }
        self.graph.passes[self.pass_index]
            .writes
            .push(PassAccess { handle, state });
        handle
    }
}

/// Per-frame graph of passes and logical resources.
#[derive(Default)]
pub struct FrameGraph {
    pub(crate) passes: Vec<PassNode>,
    pub(crate) resources: Vec<ResourceNode>,
    pub(crate) plan: CompiledPlan,
    pub(crate) diagnostics: CompileDiagnostics,
}

impl FrameGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transient resource. No physical memory is allocated
    /// until the executor materializes it.
    ///
    /// A zero-sized descriptor is a caller bug: it is logged and an
    /// invalid handle is returned so the frame continues.
    pub fn create(&mut self, name: &str, desc: TextureDescriptor) -> ResourceHandle {
        if desc.is_zero_sized() {
            log::warn!("create('{name}'): zero-sized descriptor, returning invalid handle");
            return ResourceHandle::INVALID;
        }
        let desc = if desc.label.is_none() {
            desc.with_label(name)
        } else {
            desc
        };
        self.push_resource(ResourceNode {
            name: name.to_string(),
            desc: Some(desc),
            binding: ResourceBinding::Unbound,
            is_external: false,
            initial_state: ResourceState::Undefined,
        })
    }

    /// Register a resource the graph does not own, e.g. the current
    /// swapchain target. The state tracker is seeded with `initial_state`.
    pub fn import(
        &mut self,
        name: &str,
        texture: TextureHandle,
        view: TextureViewHandle,
        initial_state: ResourceState,
    ) -> ResourceHandle {
        self.push_resource(ResourceNode {
            name: name.to_string(),
            desc: None,
            binding: ResourceBinding::External { texture, view },
            is_external: true,
            initial_state,
        })
    }

    /// Declare a pass. `setup` runs immediately against a builder bound to
    /// the new pass; `work` is deferred and only invoked by the executor
    /// if the pass survives compilation.
    pub fn add_pass<T>(
        &mut self,
        name: &str,
        setup: impl FnOnce(&mut PassBuilder) -> T,
        work: impl FnMut(&mut PassContext) + 'static,
    ) -> T {
        self.passes.push(PassNode::new(name));
        let pass_index = self.passes.len() - 1;
        let result = setup(&mut PassBuilder {
            graph: self,
            pass_index,
        });
        self.passes[pass_index].work = Some(Box::new(work));
        result
    }

    /// Number of declared passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Pass names in compiled execution order. Empty before
    /// [`compile`](Self::compile).
    pub fn execution_order(&self) -> Vec<&str> {
        self.plan
            .order
            .iter()
            .map(|&i| self.passes[i].name.as_str())
            .collect()
    }

    /// Barriers computed for the named pass, in emission order.
    pub fn pass_barriers(&self, name: &str) -> Option<&[Barrier]> {
        self.passes
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.barriers.as_slice())
    }

    /// Diagnostics from the last [`compile`](Self::compile).
    pub fn diagnostics(&self) -> &CompileDiagnostics {
        &self.diagnostics
    }

    /// Return pooled transients and clear all per-frame tables, keeping
    /// the allocations alive inside the pool. Called at the start of each
    /// frame (or after discarding one).
    pub fn reset(
        &mut self,
        backend: &mut dyn GpuBackend,
        allocator: &crate::allocator::FrameAllocator,
        pool: &mut crate::pool::ResourcePool,
    ) {
        for resource in &mut self.resources {
            if let ResourceBinding::Pooled(handle) = resource.binding {
                pool.release(backend, allocator, handle);
            }
            resource.binding = ResourceBinding::Unbound;
        }
        self.passes.clear();
        self.resources.clear();
        self.plan = CompiledPlan::default();
        self.diagnostics = CompileDiagnostics::default();
    }

    pub(crate) fn resource(&self, handle: ResourceHandle) -> Option<&ResourceNode> {
        self.resources.get(handle.index()?)
    }

    pub(crate) fn resource_mut(&mut self, handle: ResourceHandle) -> Option<&mut ResourceNode> {
        let index = handle.index()?;
        self.resources.get_mut(index)
    }

    fn push_resource(&mut self, node: ResourceNode) -> ResourceHandle {
        self.resources.push(node);
        // Ids start at 1; 0 stays invalid.
        ResourceHandle(self.resources.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureFormat, TextureUsage};

    fn color_desc() -> TextureDescriptor {
        TextureDescriptor::new_2d(
            1920,
            1080,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
        )
    }

    #[test]
    fn test_invalid_handle_is_zero() {
        assert!(!ResourceHandle::INVALID.is_valid());
        assert!(!ResourceHandle::default().is_valid());

        let mut graph = FrameGraph::new();
        let handle = graph.create("color", color_desc());
        assert!(handle.is_valid());
        assert!(graph.resource(ResourceHandle::INVALID).is_none());
        assert!(graph.resource(handle).is_some());
    }

    #[test]
    fn test_zero_sized_create_returns_invalid_handle() {
        let mut graph = FrameGraph::new();
        let desc =
            TextureDescriptor::new_2d(0, 0, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        let handle = graph.create("broken", desc);
        assert!(!handle.is_valid());
        // The frame continues; the bad handle just never resolves.
        graph.add_pass(
            "Pass",
            |builder| builder.write(handle, ResourceState::RenderTarget),
            |_| {},
        );
        assert!(graph.passes[0].writes.is_empty());
    }

    #[test]
    fn test_create_inherits_name_as_label() {
        let mut graph = FrameGraph::new();
        let handle = graph.create("gbuffer_color", color_desc());
        let desc = graph.resource(handle).unwrap().desc.as_ref().unwrap();
        assert_eq!(desc.label.as_deref(), Some("gbuffer_color"));
    }

    #[test]
    fn test_write_to_imported_marks_side_effects() {
        let mut graph = FrameGraph::new();
        let backbuffer = graph.import(
            "backbuffer",
            crate::backend::TextureHandle(7),
            crate::backend::TextureViewHandle(8),
            ResourceState::Present,
        );
        let color = graph.create("color", color_desc());

        graph.add_pass(
            "Tonemap",
            |builder| {
                builder.read(color, ResourceState::ShaderResource);
                builder.write(backbuffer, ResourceState::RenderTarget);
            },
            |_| {},
        );
        graph.add_pass(
            "Gbuffer",
            |builder| {
                builder.write(color, ResourceState::RenderTarget);
            },
            |_| {},
        );

        assert!(graph.passes[0].has_side_effects);
        assert!(!graph.passes[1].has_side_effects);
    }

    #[test]
    fn test_accesses_are_order_preserved() {
        let mut graph = FrameGraph::new();
        let a = graph.create("a", color_desc());
        let b = graph.create("b", color_desc());

        graph.add_pass(
            "Pass",
            |builder| {
                builder.read(b, ResourceState::ShaderResource);
                builder.read(a, ResourceState::DepthRead);
                builder.write(a, ResourceState::RenderTarget);
            },
            |_| {},
        );

        let pass = &graph.passes[0];
        assert_eq!(pass.reads[0].handle, b);
        assert_eq!(pass.reads[1].handle, a);
        assert_eq!(pass.writes[0].handle, a);
    }

    #[test]
    fn test_setup_return_value_is_forwarded() {
        let mut graph = FrameGraph::new();
        let handle = graph.add_pass(
            "Pass",
            |builder| builder.create("inner", color_desc()),
            |_| {},
        );
        assert!(handle.is_valid());
        assert_eq!(graph.resource(handle).unwrap().name, "inner");
    }
}
