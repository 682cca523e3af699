//! Graph compilation: dependency resolution, topological ordering and
//! barrier planning.
//!
//! Compilation runs synchronously on the thread that owns the frame and
//! never fails it. A dependency cycle degrades to the largest valid
//! partial order; the passes that could not be scheduled are dropped for
//! the frame and reported through [`CompileDiagnostics`].

use std::collections::HashMap;

use crate::types::ResourceState;

use super::{Barrier, FrameGraph, ResourceHandle};

/// Producer→consumer adjacency and the linear execution order, valid only
/// for the frame that produced it.
#[derive(Debug, Default)]
pub struct CompiledPlan {
    pub(crate) adjacency: Vec<Vec<usize>>,
    pub(crate) order: Vec<usize>,
}

/// What compilation had to drop or work around.
#[derive(Debug, Default)]
pub struct CompileDiagnostics {
    /// Names of passes inside a dependency cycle, excluded from the
    /// execution order for this frame.
    pub dropped_passes: Vec<String>,
}

impl CompileDiagnostics {
    pub fn has_cycle(&self) -> bool {
        !self.dropped_passes.is_empty()
    }
}

impl FrameGraph {
    /// Derive the execution order and per-pass barrier lists from the
    /// declared reads and writes.
    ///
    /// Returns the diagnostics for this compilation; they stay available
    /// through [`diagnostics`](Self::diagnostics) until
    /// [`reset`](Self::reset).
    pub fn compile(&mut self) -> &CompileDiagnostics {
        self.resolve_dependencies();
        self.plan_barriers();
        &self.diagnostics
    }

    /// Build the dependency DAG and topologically sort it.
    ///
    /// Edges come from handle reuse: for every read, the most recent
    /// writer of that handle becomes a producer (last-writer-wins, with a
    /// pass's own writes recorded before its reads are examined). The
    /// ready worklist is consumed LIFO, so when several passes are
    /// simultaneously ready the most recently enqueued runs first. That
    /// makes the order differ from declaration order for independent
    /// passes; downstream code must not rely on declaration order.
    fn resolve_dependencies(&mut self) {
        let pass_count = self.passes.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); pass_count];
        let mut in_degree = vec![0usize; pass_count];
        let mut last_writer: HashMap<ResourceHandle, usize> = HashMap::new();

        for (consumer, pass) in self.passes.iter().enumerate() {
            for write in &pass.writes {
                last_writer.insert(write.handle, consumer);
            }
            // A read of a handle this pass already wrote forms a self
            // edge, which drops the pass as a one-pass cycle.
            for read in &pass.reads {
                if let Some(&producer) = last_writer.get(&read.handle) {
                    adjacency[producer].push(consumer);
                    in_degree[consumer] += 1;
                }
            }
        }

        let mut worklist: Vec<usize> = (0..pass_count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(pass_count);
        while let Some(pass) = worklist.pop() {
            order.push(pass);
            for &successor in &adjacency[pass] {
                in_degree[successor] -= 1;
                if in_degree[successor] == 0 {
                    worklist.push(successor);
                }
            }
        }

        self.diagnostics = CompileDiagnostics::default();
        if order.len() < pass_count {
            let dropped: Vec<String> = self
                .passes
                .iter()
                .enumerate()
                .filter(|(i, _)| !order.contains(i))
                .map(|(_, p)| p.name.clone())
                .collect();
            log::warn!(
                "Dependency cycle detected; dropping {} of {} passes this frame: {:?}",
                dropped.len(),
                pass_count,
                dropped
            );
            self.diagnostics.dropped_passes = dropped;
        }

        self.plan = CompiledPlan { adjacency, order };
    }

    /// Compute per-pass barrier lists by simulating resource states along
    /// the compiled order.
    ///
    /// Reads are planned before writes within a pass, matching the order
    /// the GPU consumes the resources. A write forces a barrier even for
    /// an unchanged state when the tracked state is a write target, to
    /// order back-to-back writes.
    fn plan_barriers(&mut self) {
        let mut states: HashMap<ResourceHandle, ResourceState> = HashMap::new();

        for order_index in 0..self.plan.order.len() {
            let pass_index = self.plan.order[order_index];
            let mut barriers = Vec::new();

            let pass = &self.passes[pass_index];
            for read in &pass.reads {
                let old = self.tracked_state(&states, read.handle);
                if old != read.state || old == ResourceState::Undefined {
                    barriers.push(Barrier {
                        resource: read.handle,
                        old_state: old,
                        new_state: read.state,
                    });
                    states.insert(read.handle, read.state);
                }
            }
            for write in &pass.writes {
                let old = self.tracked_state(&states, write.handle);
                if old != write.state || old == ResourceState::Undefined || old.is_write_target() {
                    barriers.push(Barrier {
                        resource: write.handle,
                        old_state: old,
                        new_state: write.state,
                    });
                    states.insert(write.handle, write.state);
                }
            }

            self.passes[pass_index].barriers = barriers;
        }
    }

    fn tracked_state(
        &self,
        states: &HashMap<ResourceHandle, ResourceState>,
        handle: ResourceHandle,
    ) -> ResourceState {
        if let Some(&state) = states.get(&handle) {
            return state;
        }
        self.resource(handle)
            .map(|r| r.initial_state)
            .unwrap_or_default()
    }
}
