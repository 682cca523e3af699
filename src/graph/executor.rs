//! Compiled plan execution.
//!
//! The executor walks the compiled order, asks the resource pool to
//! materialize transient resources, emits the planned barriers and invokes
//! each surviving pass's recorded work. Passes dropped during compilation
//! never run.
//!
//! Pass work receives a [`PassContext`] with explicit borrows of the
//! backend and the frame's resource table; nothing is captured ambiently,
//! so the lifetime of everything a pass touches is visible at the
//! `execute` call site.

use crate::allocator::FrameAllocator;
use crate::backend::{CommandHandle, GpuBackend, TextureHandle, TextureViewHandle};
use crate::error::GraphicsResult;
use crate::pool::{PoolHandle, ResourcePool};

use super::{FrameGraph, ResourceBinding, ResourceHandle, ResourceNode};

const PASS_LABEL_COLOR: [f32; 4] = [1.0, 0.7, 0.0, 1.0];

/// Worker pool capable of recording pass command streams in parallel.
///
/// Implemented by the engine's task system, outside this crate. Parallel
/// recording additionally needs per-pass secondary command streams, which
/// the executor does not produce yet, so a supplied scheduler is currently
/// acknowledged and execution stays serial.
pub trait TaskScheduler {
    /// Number of workers available for recording.
    fn worker_count(&self) -> usize;
}

/// Everything a pass's recorded work may touch, borrowed for the duration
/// of the pass.
pub struct PassContext<'a> {
    pub backend: &'a mut dyn GpuBackend,
    pub cmd: CommandHandle,
    resources: &'a [ResourceNode],
    pool: &'a ResourcePool,
}

impl PassContext<'_> {
    /// Physical texture behind a logical handle.
    pub fn texture(&self, handle: ResourceHandle) -> Option<TextureHandle> {
        resolve_texture(self.resources, self.pool, handle)
    }

    /// View over the whole texture behind a logical handle.
    pub fn view(&self, handle: ResourceHandle) -> Option<TextureViewHandle> {
        match self.binding(handle)? {
            ResourceBinding::Pooled(pool_handle) => Some(self.pool.get(*pool_handle)?.view),
            ResourceBinding::External { view, .. } => Some(*view),
            ResourceBinding::Unbound => None,
        }
    }

    /// View over a single array layer, e.g. one shadow cascade.
    ///
    /// Only pooled array textures carry per-layer views.
    pub fn layer_view(&self, handle: ResourceHandle, layer: u32) -> Option<TextureViewHandle> {
        match self.binding(handle)? {
            ResourceBinding::Pooled(pool_handle) => self
                .pool
                .get(*pool_handle)?
                .layer_views
                .get(layer as usize)
                .copied(),
            _ => None,
        }
    }

    fn binding(&self, handle: ResourceHandle) -> Option<&ResourceBinding> {
        Some(&self.resources.get(handle.index()?)?.binding)
    }
}

fn resolve_texture(
    resources: &[ResourceNode],
    pool: &ResourcePool,
    handle: ResourceHandle,
) -> Option<TextureHandle> {
    match &resources.get(handle.index()?)?.binding {
        ResourceBinding::Pooled(pool_handle) => Some(pool.get(*pool_handle)?.texture),
        ResourceBinding::External { texture, .. } => Some(*texture),
        ResourceBinding::Unbound => None,
    }
}

impl FrameGraph {
    /// Run the compiled plan against `backend`, recording into `cmd`.
    ///
    /// Transient resources touched by surviving passes are materialized
    /// from the pool before anything is recorded; they stay bound until
    /// [`reset`](Self::reset) returns them. A creation failure is fatal
    /// and propagated.
    ///
    /// `scheduler` opts in to parallel pass recording; execution is serial
    /// either way for now, with a logged notice.
    pub fn execute(
        &mut self,
        backend: &mut dyn GpuBackend,
        allocator: &FrameAllocator,
        pool: &mut ResourcePool,
        cmd: CommandHandle,
        scheduler: Option<&dyn TaskScheduler>,
    ) -> GraphicsResult<()> {
        match scheduler {
            Some(scheduler) => log::warn!(
                "Parallel pass recording not implemented; recording serially ({} workers idle)",
                scheduler.worker_count()
            ),
            None => log::debug!("No task scheduler supplied; recording serially"),
        }

        self.materialize_transients(backend, allocator, pool)?;

        for order_index in 0..self.plan.order.len() {
            let pass_index = self.plan.order[order_index];
            backend.cmd_begin_debug_label(cmd, &self.passes[pass_index].name, PASS_LABEL_COLOR);

            for barrier_index in 0..self.passes[pass_index].barriers.len() {
                let barrier = self.passes[pass_index].barriers[barrier_index];
                match resolve_texture(&self.resources, pool, barrier.resource) {
                    Some(texture) => {
                        backend.resource_barrier(cmd, texture, barrier.old_state, barrier.new_state)
                    }
                    None => log::warn!(
                        "Pass '{}': barrier targets an unbound resource, skipping",
                        self.passes[pass_index].name
                    ),
                }
            }

            // Taken rather than borrowed so the context can borrow the
            // resource table; the graph is rebuilt next frame anyway.
            if let Some(mut work) = self.passes[pass_index].work.take() {
                let mut ctx = PassContext {
                    backend: &mut *backend,
                    cmd,
                    resources: &self.resources,
                    pool: &*pool,
                };
                work(&mut ctx);
            }

            backend.cmd_end_debug_label(cmd);
        }

        Ok(())
    }

    /// Acquire pooled textures for every transient resource a surviving
    /// pass reads or writes.
    fn materialize_transients(
        &mut self,
        backend: &mut dyn GpuBackend,
        allocator: &FrameAllocator,
        pool: &mut ResourcePool,
    ) -> GraphicsResult<()> {
        let mut touched: Vec<ResourceHandle> = Vec::new();
        for &pass_index in &self.plan.order {
            let pass = &self.passes[pass_index];
            touched.extend(pass.reads.iter().map(|a| a.handle));
            touched.extend(pass.writes.iter().map(|a| a.handle));
        }

        for handle in touched {
            let Some(resource) = self.resource(handle) else {
                continue;
            };
            if resource.is_external || resource.binding != ResourceBinding::Unbound {
                continue;
            }
            let Some(desc) = resource.desc.clone() else {
                continue;
            };

            let pool_handle: PoolHandle = pool.acquire(backend, allocator, &desc)?;
            log::trace!("Materialized transient '{}'", resource.name);
            if let Some(resource) = self.resource_mut(handle) {
                resource.binding = ResourceBinding::Pooled(pool_handle);
            }
        }

        Ok(())
    }
}
