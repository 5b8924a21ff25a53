//! Wires host callbacks to the graph builders, owns their shared state, and
//! runs the module-path gating state machine.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::block_graph::BasicBlockGraphBuilder;
use crate::collaborators::{Executor, GuestMemory, Module, ModuleMap};
use crate::config::FlowtraceConfig;
use crate::edge_batcher::{EdgeBatch, EdgeBatcher};
use crate::identity::{HostStateId, IdentityMap};
use crate::node::{BlockNode, StateNode, SymbolicInputWitness};
use crate::prioritisation::{self, DeadStates, PrioritisationReceiver, SearcherHandoff};
use crate::state_graph::SymbolicStateGraphBuilder;
use crate::transport::{IpcReader, IpcWriter};

/// Tracked-module state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleState {
    Unloaded,
    Loaded { pid: u64 },
    Exited,
}

/// Owns the whole analysis core for one host engine instance: the two graph
/// builders, the shared `IdentityMap`, the translation cache, the edge
/// batcher, and the background prioritisation thread.
///
/// The single shared rename on fork/merge is
/// orchestrated here rather than inside either graph builder, since both
/// builders must agree on the renumbered id for the same event.
pub struct PluginBoundary {
    config: FlowtraceConfig,
    module_state: ModuleState,
    module_map: Box<dyn ModuleMap>,
    guest_memory: Box<dyn GuestMemory>,
    identity: IdentityMap,
    translation_cache: crate::translation_cache::TranslationCache,
    block_graph: BasicBlockGraphBuilder,
    state_graph: SymbolicStateGraphBuilder,
    edge_batcher: EdgeBatcher,
    /// Flushed batches the transport has not yet accepted, oldest first.
    /// Bounded by `config.max_buffered_batches`; once full, the oldest
    /// pending batch is dropped to make room for the newest.
    pending_batches: VecDeque<EdgeBatch>,
    /// Instant of the last successful flush attempt; `None` before the
    /// first `on_timer`/`on_engine_shutdown` call, which always flushes.
    last_flush: Option<Instant>,
    writer: IpcWriter,
    dead_states: DeadStates,
    executor: Arc<dyn Executor>,
    handoff: Arc<SearcherHandoff>,
    prioritisation: Option<PrioritisationReceiver>,
}

impl PluginBoundary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: FlowtraceConfig,
        module_map: Box<dyn ModuleMap>,
        guest_memory: Box<dyn GuestMemory>,
        executor: Arc<dyn Executor>,
        writer: IpcWriter,
        reader: IpcReader,
    ) -> Self {
        let dead_states = prioritisation::new_dead_states();
        let handoff = Arc::new(SearcherHandoff::new());
        let poll_interval = Duration::from_millis(config.prioritisation_poll_interval_ms);

        let prioritisation = PrioritisationReceiver::spawn(
            reader,
            Arc::clone(&dead_states),
            Arc::clone(&executor),
            Arc::clone(&handoff),
            poll_interval,
        );

        if !config.is_active() {
            tracing::warn!("module_path is unset; flowtrace core stays inactive");
        }

        Self {
            config,
            module_state: ModuleState::Unloaded,
            module_map,
            guest_memory,
            identity: IdentityMap::new(),
            translation_cache: crate::translation_cache::TranslationCache::new(),
            block_graph: BasicBlockGraphBuilder::new(),
            state_graph: SymbolicStateGraphBuilder::new(),
            edge_batcher: EdgeBatcher::new(),
            pending_batches: VecDeque::new(),
            last_flush: None,
            writer,
            dead_states,
            executor,
            handoff,
            prioritisation: Some(prioritisation),
        }
    }

    fn is_loaded(&self) -> bool {
        matches!(self.module_state, ModuleState::Loaded { .. })
    }

    fn tracks(&self, module: &dyn Module) -> bool {
        self.config.is_active() && module.path() == self.config.module_path
    }

    // ---- module/process lifecycle (state machine) -----------------------

    pub fn on_module_load(&mut self, _state: HostStateId, module: &dyn Module) {
        if !self.tracks(module) {
            return;
        }
        for section in module.sections() {
            tracing::info!(
                name = %section.name,
                native_load_base = section.native_load_base,
                size = section.size,
                "tracked module section loaded"
            );
        }
        self.module_state = ModuleState::Loaded { pid: module.pid() };
    }

    pub fn on_module_unload(&mut self, _state: HostStateId, module: &dyn Module) {
        if !self.tracks(module) {
            return;
        }
        if let ModuleState::Loaded { pid } = self.module_state {
            if pid == module.pid() {
                self.module_state = ModuleState::Unloaded;
            }
        }
    }

    pub fn on_process_unload(&mut self, pid: u64) {
        if let ModuleState::Loaded { pid: loaded_pid } = self.module_state {
            if loaded_pid == pid {
                self.module_state = ModuleState::Exited;
            }
        }
    }

    /// Reserved hook: inert until a per-instruction collaborator
    /// exists to drive it.
    pub fn on_translate_instruction_start(&mut self, _state: HostStateId, _pc: u64) {}

    /// Whether state-switch should contribute to dead-state bookkeeping is
    /// undecided upstream; this core treats it as a no-op.
    pub fn on_state_switch(&mut self, _old: HostStateId, _new: HostStateId) {}

    // ---- translation / execution -----------------------------------------

    pub fn on_translate_block_start(&mut self, state: HostStateId, pc: u64, tb_size: u64) {
        if !self.is_loaded() {
            return;
        }
        let Some(module) = self.module_map.get_module(state) else {
            return;
        };
        let Some(elf_vaddr) = module.to_native_base(pc) else {
            return;
        };

        let bytes = self.guest_memory.read(state, pc, tb_size).unwrap_or_else(|| {
            tracing::warn!(state, pc, "guest memory read failed; recording empty bytes");
            Vec::new()
        });

        self.translation_cache.record_translation(state, pc, elf_vaddr, bytes);
    }

    pub fn on_execute_block_start(&mut self, state: HostStateId, pc: u64) {
        if !self.is_loaded() {
            return;
        }
        let internal = self.identity.get_or_assign(state);
        let record = self.translation_cache.lookup(state, pc);
        let curr = BlockNode {
            state: internal,
            pc,
            generation: record.generation,
            elf_vaddr: record.elf_vaddr,
            bytes: record.bytes.clone(),
        };

        let edge = self.block_graph.on_execute_block_start(internal, curr);
        self.edge_batcher.push_block_edge(edge.from, edge.to);
    }

    // ---- fork / merge (single shared rename) -------------------------------

    pub fn on_state_fork(&mut self, parent: HostStateId, children: &[HostStateId]) {
        let parent_before = self.identity.get_or_assign(parent);
        let parent_cursor = self.block_graph.cursor_of(parent_before).cloned();

        self.identity.rename(parent);

        for &child in children {
            let child_internal = self.identity.get_or_assign(child);
            debug_assert_ne!(
                parent_before, child_internal,
                "fork parent and child must have distinct internal ids"
            );
            self.block_graph.propagate_cursor(child_internal, parent_cursor.clone());

            let edge = self.state_graph.fork_edge(
                state_node(parent_before, parent),
                state_node(child_internal, child),
            );
            self.edge_batcher.push_state_edge(edge.from, edge.to);
        }
    }

    pub fn on_state_merge(&mut self, destination: HostStateId, source: HostStateId) {
        let left = self.identity.get_or_assign(destination);
        let right = self.identity.get_or_assign(source);
        let dest_cursor = self.block_graph.cursor_of(left).cloned();

        self.identity.rename(destination);
        let to = self.identity.get_or_assign(destination);

        self.block_graph.propagate_cursor(to, dest_cursor);

        let edges = self.state_graph.merge_edges(
            state_node(left, destination),
            state_node(right, source),
            state_node(to, destination),
        );
        for edge in edges {
            self.edge_batcher.push_state_edge(edge.from, edge.to);
        }
    }

    pub fn on_state_kill(&mut self, state: HostStateId) {
        self.dead_states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(state);
    }

    // ---- periodic / lifecycle -------------------------------------------

    /// Periodic timer hook: flushes the edge batcher and, if the
    /// background thread has published a new searcher, installs it — this
    /// is the well-defined host-thread hand-off point.
    ///
    /// A flush paced slower than `config.flush_interval_secs` is a no-op;
    /// the first call always flushes. Whatever a flush produces is handed
    /// to the transport through the pending-batch queue rather than sent
    /// directly, so a disconnected or saturated viewer never loses edges
    /// outright — they stay buffered, bounded by `max_buffered_batches`,
    /// and are retried on the next tick.
    pub fn on_timer(&mut self) {
        self.install_pending_searcher();

        let interval = Duration::from_secs(self.config.flush_interval_secs);
        let due = match self.last_flush {
            Some(last) => last.elapsed() >= interval,
            None => true,
        };
        if !due {
            return;
        }
        self.last_flush = Some(Instant::now());

        let batch = self.edge_batcher.flush();
        if !batch.is_empty() {
            self.enqueue_pending(batch);
        }
        self.drain_pending();
    }

    /// Push a freshly flushed batch onto the pending queue, dropping the
    /// oldest buffered batch first if it is already at capacity.
    fn enqueue_pending(&mut self, batch: EdgeBatch) {
        if self.pending_batches.len() >= self.config.max_buffered_batches {
            tracing::warn!(
                capacity = self.config.max_buffered_batches,
                "pending batch queue full; dropping oldest batch"
            );
            self.pending_batches.pop_front();
        }
        self.pending_batches.push_back(batch);
    }

    /// Send pending batches in order, oldest first. Stops at the first
    /// send failure and leaves the rest (including the failed one)
    /// buffered for the next attempt.
    fn drain_pending(&mut self) {
        while let Some(batch) = self.pending_batches.front() {
            match self.writer.send_edge_batch(batch) {
                Ok(()) => {
                    self.pending_batches.pop_front();
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        pending = self.pending_batches.len(),
                        "failed to send edge batch; it stays buffered"
                    );
                    break;
                }
            }
        }
    }

    fn install_pending_searcher(&mut self) {
        if let Some(searcher) = self.handoff.take() {
            self.executor.set_searcher(searcher);
        }
    }

    /// Final flush and teardown. Unlike `on_timer`, the flush here always
    /// runs regardless of `flush_interval_secs` pacing, since there will be
    /// no further tick to catch up on.
    pub fn on_engine_shutdown(&mut self) {
        self.install_pending_searcher();
        let batch = self.edge_batcher.flush();
        if !batch.is_empty() {
            self.enqueue_pending(batch);
        }
        self.drain_pending();
        if let Some(mut receiver) = self.prioritisation.take() {
            receiver.shutdown();
        }
    }
}

fn state_node(internal_id: crate::identity::InternalStateId, host_id: HostStateId) -> StateNode {
    StateNode {
        internal_id,
        host_id,
        inputs: SymbolicInputWitness::default(),
    }
}
