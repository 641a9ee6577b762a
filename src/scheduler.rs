//! The dependency-driven scheduler (§4.6): walks the agent array once, interleaving stripes
//! across the four command queues while enforcing read-after-write and write-after-read ordering
//! and eliding redundant cross-queue waits.

use tracing::trace;

use crate::builders::{dma, mce, ple};
use crate::capabilities::HardwareCapabilities;
use crate::command::{CommandVariant, QueueKind};
use crate::descriptors::ple::PleKernelId;
use crate::descriptors::{AgentDescAndDeps, AgentPayload, AgentType, CounterName, Counters};
use crate::dependency::{get_first_reader_stripe_id, get_largest_needed_stripe_id, get_last_reader_of_evicted_stripe_id, Dependency};
use crate::error::Result;

/// A command list plus the running watermark of counter values this queue already knows have
/// been reached, used to elide redundant `WaitForCounter`s (§4.6).
#[derive(Debug, Default)]
struct CommandQueue {
    commands: Vec<CommandVariant>,
    last_counter_values_waited_for: Counters,
}

impl CommandQueue {
    fn push(&mut self, cmd: CommandVariant) {
        self.commands.push(cmd);
    }
}

/// The four queues the scheduler fills, in the order the packager expects them.
#[derive(Debug, Clone, Default)]
pub struct ScheduledCommands {
    pub dma_rd: Vec<CommandVariant>,
    pub dma_wr: Vec<CommandVariant>,
    pub mce: Vec<CommandVariant>,
    pub ple: Vec<CommandVariant>,
}

pub struct Scheduler<'a> {
    agents: &'a [AgentDescAndDeps],
    caps: &'a HardwareCapabilities,
    agent_progress: Vec<u32>,
    base_agent_id: usize,
    dma_rd: CommandQueue,
    dma_wr: CommandQueue,
    mce_q: CommandQueue,
    ple_q: CommandQueue,
    last_loaded_ple_kernel: Option<PleKernelId>,
    mceif_configuration: Option<PleKernelId>,
}

fn queue_for_agent_type(agent_type: AgentType) -> QueueKind {
    match agent_type {
        AgentType::IfmStreamer | AgentType::WgtStreamer => QueueKind::DmaRd,
        AgentType::OfmStreamer => QueueKind::DmaWr,
        AgentType::MceScheduler => QueueKind::Mce,
        AgentType::PleLoader | AgentType::PleScheduler => QueueKind::Ple,
    }
}

impl<'a> Scheduler<'a> {
    pub fn new(agents: &'a [AgentDescAndDeps], caps: &'a HardwareCapabilities) -> Self {
        Self {
            agents,
            caps,
            agent_progress: vec![0; agents.len()],
            base_agent_id: 0,
            dma_rd: CommandQueue::default(),
            dma_wr: CommandQueue::default(),
            mce_q: CommandQueue::default(),
            ple_q: CommandQueue::default(),
            last_loaded_ple_kernel: None,
            mceif_configuration: None,
        }
    }

    fn finished(&self) -> bool {
        self.base_agent_id >= self.agents.len()
    }

    fn log_progress(&self) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        let window_end = (self.base_agent_id + 10).min(self.agents.len());
        let progress: Vec<String> = (self.base_agent_id..window_end)
            .map(|id| format!("[{id}] = {}/{}", self.agent_progress[id], self.agents[id].agent.num_stripes_total))
            .collect();
        trace!("scheduler: {}/{} complete. in progress: {}", self.base_agent_id, self.agents.len(), progress.join(", "));
    }

    fn counter_for_agent(&self, agent_id: u32) -> CounterName {
        match self.agents[agent_id as usize].agent.agent_type() {
            AgentType::IfmStreamer | AgentType::WgtStreamer => CounterName::DmaRd,
            AgentType::OfmStreamer => CounterName::DmaWr,
            AgentType::MceScheduler => CounterName::MceStripe,
            AgentType::PleLoader => CounterName::PleCodeLoadedIntoPleSram,
            AgentType::PleScheduler => CounterName::PleStripe,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut CommandQueue {
        match kind {
            QueueKind::DmaRd => &mut self.dma_rd,
            QueueKind::DmaWr => &mut self.dma_wr,
            QueueKind::Mce => &mut self.mce_q,
            QueueKind::Ple => &mut self.ple_q,
        }
    }

    /// Pushes a `WaitForCounter`, skipping it if this queue's own watermark already guarantees
    /// the wait is satisfied (the "dedup consecutive identical waits" rule in §4.6, scoped to a
    /// per-queue running watermark rather than the full cross-queue implication table).
    fn push_wait_for_counter(&mut self, queue: QueueKind, counter_name: CounterName, value: u32) {
        let q = self.queue_mut(queue);
        if q.last_counter_values_waited_for.get(counter_name) >= value {
            return;
        }
        q.push(CommandVariant::WaitForCounter { counter_name, value });
        q.last_counter_values_waited_for.set(counter_name, value);
    }

    /// Inserts a `WaitForCounter` just before overwriting the slot `stripe_id - tile_size` would
    /// evict, for every write dependency whose last reader hasn't caught up yet. Elides the wait
    /// when the target is identical to the previous stripe's (the redundant-wait elimination in
    /// §4.6).
    fn insert_write_dependencies(&mut self, queue: QueueKind, deps: &[Dependency], stripe_id: u32, tile_size: u16) {
        if stripe_id < tile_size as u32 {
            return;
        }
        for write_dep in deps {
            if !write_dep.use_for_command_stream {
                continue;
            }
            let stripe_to_wait_for = get_last_reader_of_evicted_stripe_id(write_dep, stripe_id, tile_size as u32);
            if stripe_to_wait_for < 0 {
                continue;
            }
            let is_first_eviction = stripe_id == tile_size as u32;
            let prev = (stripe_id >= tile_size as u32 + 1)
                .then(|| get_last_reader_of_evicted_stripe_id(write_dep, stripe_id - 1, tile_size as u32));
            if is_first_eviction || prev != Some(stripe_to_wait_for) {
                let counter_name = self.counter_for_agent(write_dep.other_agent_id);
                self.push_wait_for_counter(queue, counter_name, stripe_to_wait_for as u32);
            }
        }
    }

    fn insert_read_dependencies(&mut self, queue: QueueKind, deps: &[Dependency], stripe_id: u32, agent_type_to_ignore: Option<AgentType>) {
        for read_dep in deps {
            if !read_dep.use_for_command_stream {
                continue;
            }
            let other_agent_id = read_dep.other_agent_id;
            let other_type = self.agents[other_agent_id as usize].agent.agent_type();
            if Some(other_type) == agent_type_to_ignore {
                continue;
            }
            // The hardware's own queue ordering already serialises commands the producer issued
            // earlier on this same queue; no explicit wait is needed.
            if queue_for_agent_type(other_type) == queue {
                continue;
            }
            let stripe_to_wait_for = get_largest_needed_stripe_id(read_dep, stripe_id);
            if stripe_to_wait_for < 0 {
                continue;
            }
            let prev = (stripe_id > 0).then(|| get_largest_needed_stripe_id(read_dep, stripe_id - 1));
            if stripe_id == 0 || prev != Some(stripe_to_wait_for) {
                let counter_name = self.counter_for_agent(other_agent_id);
                self.push_wait_for_counter(queue, counter_name, stripe_to_wait_for as u32);
            }
        }
    }

    fn schedule_ifm_streamer(&mut self, agent_id: u32, stripe_id: u32) -> Result<()> {
        let agent = &self.agents[agent_id as usize];
        let ifm = match &agent.agent.payload {
            AgentPayload::Ifm(d) => d.clone(),
            _ => unreachable!(),
        };
        let tile_size = ifm.fm_data.tile.num_slots;
        let deps = agent.deps.clone();
        self.insert_write_dependencies(QueueKind::DmaRd, &deps.write_dependencies, stripe_id, tile_size);
        self.insert_read_dependencies(QueueKind::DmaRd, &deps.read_dependencies, stripe_id, None);

        let num_chunks = dma::num_chunks_ifm(&ifm, stripe_id);
        for chunk_id in 0..num_chunks {
            let extra = dma::build_load_ifm_chunk(&ifm, stripe_id, chunk_id, self.caps)?;
            self.dma_rd.push(CommandVariant::LoadIfmStripe { agent_id, stripe_id, chunk_id, extra });
        }
        Ok(())
    }

    fn schedule_wgt_streamer(&mut self, agent_id: u32, stripe_id: u32) -> Result<()> {
        let agent = &self.agents[agent_id as usize];
        let wgt = match &agent.agent.payload {
            AgentPayload::Wgt(d) => d.clone(),
            _ => unreachable!(),
        };
        let tile_size = wgt.tile.num_slots;
        let deps = agent.deps.clone();
        self.insert_write_dependencies(QueueKind::DmaRd, &deps.write_dependencies, stripe_id, tile_size);
        self.insert_read_dependencies(QueueKind::DmaRd, &deps.read_dependencies, stripe_id, None);

        let extra = dma::build_load_wgt(&wgt, stripe_id, self.caps)?;
        self.dma_rd.push(CommandVariant::LoadWgtStripe { agent_id, stripe_id, extra });
        Ok(())
    }

    fn schedule_mce_scheduler(&mut self, agent_id: u32, stripe_id: u32) -> Result<()> {
        let agent = &self.agents[agent_id as usize];
        let mce_desc = match &agent.agent.payload {
            AgentPayload::Mce(d) => d.clone(),
            _ => unreachable!(),
        };
        debug_assert!(agent.deps.write_dependencies.is_empty());

        let extra = mce::build_program_mce(&mce_desc, stripe_id, self.caps)?;
        self.mce_q.push(CommandVariant::ProgramMceStripe { agent_id, stripe_id, extra });

        let deps = agent.deps.clone();
        self.insert_read_dependencies(QueueKind::Mce, &deps.read_dependencies, stripe_id, None);

        if self.mceif_configuration != Some(mce_desc.ple_kernel_id) {
            self.mce_q.push(CommandVariant::ConfigMceif { agent_id, ple_kernel_id: mce_desc.ple_kernel_id });
            self.mceif_configuration = Some(mce_desc.ple_kernel_id);
        }

        let start = mce::build_start_mce(&mce_desc, stripe_id, self.caps)?;
        self.mce_q.push(CommandVariant::StartMceStripe { agent_id, stripe_id, extra: start });
        Ok(())
    }

    fn schedule_ple_loader(&mut self, agent_id: u32, stripe_id: u32) -> Result<()> {
        const TILE_SIZE: u16 = 1;
        let agent = &self.agents[agent_id as usize];
        let ple_l = match &agent.agent.payload {
            AgentPayload::PleL(d) => *d,
            _ => unreachable!(),
        };
        let deps = agent.deps.clone();
        self.insert_write_dependencies(QueueKind::DmaRd, &deps.write_dependencies, stripe_id, TILE_SIZE);
        self.insert_read_dependencies(QueueKind::DmaRd, &deps.read_dependencies, stripe_id, None);

        if self.last_loaded_ple_kernel == Some(ple_l.ple_kernel_id) {
            // Kernel already resident in PLE SRAM from a previous load; nothing to emit.
            return Ok(());
        }

        let extra = dma::build_load_ple_code(&ple_l, ple_l.code_size, self.caps)?;
        self.dma_rd.push(CommandVariant::LoadPleCodeIntoSram { agent_id, extra });

        self.insert_read_dependencies(QueueKind::Ple, &deps.read_dependencies, stripe_id, None);
        self.ple_q.push(CommandVariant::LoadPleCodeIntoPleSram { agent_id });
        self.last_loaded_ple_kernel = Some(ple_l.ple_kernel_id);
        Ok(())
    }

    fn schedule_ple_scheduler(&mut self, agent_id: u32, stripe_id: u32) -> Result<()> {
        let agent = &self.agents[agent_id as usize];
        let ple_desc = match &agent.agent.payload {
            AgentPayload::PleS(d) => d.clone(),
            _ => unreachable!(),
        };
        debug_assert!(!agent.deps.read_dependencies.is_empty());

        let tile_size = ple_desc.ofm_tile.num_slots;
        let deps = agent.deps.clone();
        self.insert_write_dependencies(QueueKind::Ple, &deps.write_dependencies, stripe_id, tile_size);

        // MCE-PLE dependencies are hardware-managed via BUFFER_FREED and block counters; emitting
        // a wait here would deadlock the MCE, which hasn't started yet.
        self.insert_read_dependencies(QueueKind::Ple, &deps.read_dependencies, stripe_id, Some(AgentType::MceScheduler));

        let extra = ple::build_start_ple(&ple_desc, stripe_id)?;
        self.ple_q.push(CommandVariant::StartPleStripe { agent_id, stripe_id, extra });
        Ok(())
    }

    fn schedule_ofm_streamer(&mut self, agent_id: u32, stripe_id: u32) -> Result<()> {
        let agent = &self.agents[agent_id as usize];
        let ofm = match &agent.agent.payload {
            AgentPayload::Ofm(d) => d.clone(),
            _ => unreachable!(),
        };
        debug_assert!(agent.deps.write_dependencies.is_empty());

        let deps = agent.deps.clone();
        self.insert_read_dependencies(QueueKind::DmaWr, &deps.read_dependencies, stripe_id, None);

        let num_chunks = dma::num_chunks_ofm(&ofm, stripe_id);
        for chunk_id in 0..num_chunks {
            let extra = dma::build_store_ofm_chunk(&ofm, stripe_id, chunk_id, self.caps)?;
            self.dma_wr.push(CommandVariant::StoreOfmStripe { agent_id, stripe_id, chunk_id, extra });
        }
        Ok(())
    }

    fn schedule_one(&mut self, agent_id: u32) -> Result<()> {
        let stripe_id = self.agent_progress[agent_id as usize];
        match self.agents[agent_id as usize].agent.agent_type() {
            AgentType::IfmStreamer => self.schedule_ifm_streamer(agent_id, stripe_id)?,
            AgentType::WgtStreamer => self.schedule_wgt_streamer(agent_id, stripe_id)?,
            AgentType::MceScheduler => self.schedule_mce_scheduler(agent_id, stripe_id)?,
            AgentType::PleLoader => self.schedule_ple_loader(agent_id, stripe_id)?,
            AgentType::PleScheduler => self.schedule_ple_scheduler(agent_id, stripe_id)?,
            AgentType::OfmStreamer => self.schedule_ofm_streamer(agent_id, stripe_id)?,
        }
        self.agent_progress[agent_id as usize] = stripe_id + 1;
        Ok(())
    }

    /// Whether `agent_id` can run its next stripe right now: every read dependency whose distance
    /// exceeds `distance_threshold` must already have its producer far enough along.
    fn is_stripe_ready(&self, agent_id: u32, distance_threshold: u32) -> bool {
        self.agents[agent_id as usize].deps.read_dependencies.iter().all(|dep| {
            let distance = agent_id.abs_diff(dep.other_agent_id);
            if distance <= distance_threshold {
                return true;
            }
            let stripe_id = self.agent_progress[agent_id as usize];
            let other_stripe_id = self.agent_progress[dep.other_agent_id as usize] as i64;
            other_stripe_id > get_largest_needed_stripe_id(dep, stripe_id)
        })
    }

    /// Whether `agent_id`'s next stripe is actually needed yet: true if it has no schedule
    /// dependencies (nothing is gating it), or if at least one downstream agent named in a
    /// schedule dependency is ready to consume it.
    fn is_stripe_needed(&self, agent_id: u32) -> bool {
        let stripe_id = self.agent_progress[agent_id as usize];
        if stripe_id >= self.agents[agent_id as usize].agent.num_stripes_total {
            return false;
        }
        let schedule_deps = &self.agents[agent_id as usize].deps.schedule_dependencies;
        if schedule_deps.is_empty() {
            return true;
        }
        schedule_deps.iter().any(|dep| {
            let other_id = dep.other_agent_id;
            let other_stripe_id = self.agent_progress[other_id as usize];
            self.is_stripe_ready(other_id, agent_id.abs_diff(other_id)) && get_first_reader_stripe_id(dep, stripe_id) <= other_stripe_id as i64
        })
    }

    fn spin_agent(&mut self, agent_id: u32) -> Result<()> {
        while self.is_stripe_ready(agent_id, 0) && self.is_stripe_needed(agent_id) {
            self.schedule_one(agent_id)?;
        }
        Ok(())
    }

    pub fn schedule(mut self) -> Result<ScheduledCommands> {
        let mut current_agent_id: usize = 0;
        while !self.finished() {
            self.log_progress();

            if current_agent_id >= self.agents.len() {
                current_agent_id = self.base_agent_id;
                continue;
            }

            let stripe_id = self.agent_progress[current_agent_id];
            if stripe_id == self.agents[current_agent_id].agent.num_stripes_total {
                if self.base_agent_id == current_agent_id {
                    self.base_agent_id += 1;
                }
                current_agent_id += 1;
                continue;
            }

            if !self.is_stripe_ready(current_agent_id as u32, 0) && stripe_id == 0 {
                current_agent_id = self.base_agent_id;
                continue;
            }

            self.spin_agent(current_agent_id as u32)?;

            if self.base_agent_id == current_agent_id && self.agent_progress[current_agent_id] == self.agents[current_agent_id].agent.num_stripes_total {
                self.base_agent_id += 1;
            }
            current_agent_id += 1;
        }
        Ok(ScheduledCommands {
            dma_rd: self.dma_rd.commands,
            dma_wr: self.dma_wr.commands,
            mce: self.mce_q.commands,
            ple: self.ple_q.commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::DependencyRatio;
    use crate::descriptors::fm::{FmSDesc, FmsDataType, IfmSDesc, OfmSDesc, PackedBoundaryThickness};
    use crate::descriptors::{Agent, AgentDependencyInfo, SupertensorSize, TensorSize, Tile};

    fn fm_desc() -> FmSDesc {
        FmSDesc {
            buffer_id: 0,
            dram_offset: 0,
            data_type: FmsDataType::Nhwc,
            fcaf_info: None,
            tile: Tile { base_addr: 0, num_slots: 2, slot_size: 256 },
            default_stripe_size: TensorSize::new(8, 8, 8),
            edge_stripe_size: TensorSize::new(8, 8, 8),
            supertensor_size_in_cells: SupertensorSize { width: 1, channels: 1 },
            num_stripes: TensorSize::new(1, 1, 2),
            stripe_id_strides: TensorSize::new(1, 1, 1),
        }
    }

    /// Two independent streamers (no dependency between them) must both run to completion and
    /// produce their expected number of work commands on separate queues.
    #[test]
    fn two_independent_streamers_each_complete() {
        let ifm = Agent::new(
            2,
            AgentPayload::Ifm(IfmSDesc {
                fm_data: fm_desc(),
                packed_boundary_thickness: PackedBoundaryThickness::default(),
                is_extra_packed_boundary_data_on_right_edge: false,
                is_extra_packed_boundary_data_on_bottom_edge: false,
            }),
        );
        let ofm = Agent::new(2, AgentPayload::Ofm(OfmSDesc { fm_data: fm_desc() }));
        let agents = vec![
            AgentDescAndDeps { agent: ifm, deps: AgentDependencyInfo::default() },
            AgentDescAndDeps { agent: ofm, deps: AgentDependencyInfo::default() },
        ];
        let caps = HardwareCapabilities::reference();
        let result = Scheduler::new(&agents, &caps).schedule().unwrap();
        assert_eq!(result.dma_rd.len(), 2);
        assert_eq!(result.dma_wr.len(), 2);
    }

    /// A consumer with a read-after-write dependency on a one-stripe-ahead producer must wait for
    /// the correct producer stripe before its second stripe, but not before its first.
    #[test]
    fn raw_dependency_emits_wait_before_second_stripe_only() {
        let producer = Agent::new(2, AgentPayload::Ifm(IfmSDesc {
            fm_data: fm_desc(),
            packed_boundary_thickness: PackedBoundaryThickness::default(),
            is_extra_packed_boundary_data_on_right_edge: false,
            is_extra_packed_boundary_data_on_bottom_edge: false,
        }));
        let consumer = Agent::new(2, AgentPayload::Ofm(OfmSDesc { fm_data: fm_desc() }));
        let dep = Dependency::new(0, DependencyRatio { self_: 1, other: 2 }, DependencyRatio { self_: 1, other: 1 }, 0);
        let agents = vec![
            AgentDescAndDeps { agent: producer, deps: AgentDependencyInfo::default() },
            AgentDescAndDeps {
                agent: consumer,
                deps: AgentDependencyInfo { read_dependencies: vec![dep], ..Default::default() },
            },
        ];
        let caps = HardwareCapabilities::reference();
        let result = Scheduler::new(&agents, &caps).schedule().unwrap();
        let wait_count = result.dma_wr.iter().filter(|c| matches!(c, CommandVariant::WaitForCounter { .. })).count();
        assert_eq!(wait_count, 1);
    }
}
