//! The Process Driver (§4.8): walks the planner's [`crate::graph::OpGraph`], instantiates one
//! agent per node, and computes every [`Dependency`] — read-after-write on producers,
//! write-after-read on consumers, SRAM-overlap, and intermediate-DRAM-buffer lifetimes.

use std::collections::HashMap;

use crate::descriptors::{Agent, AgentDependencyInfo, AgentDescAndDeps, AgentPayload, PleInputMode};
use crate::dependency::{Dependency, DependencyRatio};
use crate::graph::{BufferId, BufferLocation, OpGraph, OpNode};

/// How many prior SRAM writers the overlap search walks past before giving up — the teacher's
/// "stop after traversing past two DRAM buffers" bound, reinterpreted against this crate's
/// buffer-less agent history as a fixed lookback window (§4.8, §9).
const MAX_OVERLAP_LOOKBACK: usize = 2;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a.max(1)
    } else {
        gcd(b, a % b)
    }
}

fn reduced_ratio(self_total: u32, other_total: u32) -> DependencyRatio {
    let g = gcd(self_total.max(1), other_total.max(1));
    DependencyRatio { self_: (self_total.max(1) / g) as u16, other: (other_total.max(1) / g) as u16 }
}

/// A dependency owned by the consumer, pointing at its producer (read-after-write).
fn raw_dependency(producer_agent_id: u32, consumer_total: u32, producer_total: u32) -> Dependency {
    Dependency::new(producer_agent_id, reduced_ratio(consumer_total, producer_total), reduced_ratio(consumer_total, producer_total), 0)
}

/// A dependency owned by the producer, pointing at its consumer (write-after-read / tile
/// eviction).
fn war_dependency(consumer_agent_id: u32, producer_total: u32, consumer_total: u32, tile_size: u16) -> Dependency {
    let mut dep = Dependency::new(consumer_agent_id, reduced_ratio(producer_total, consumer_total), reduced_ratio(producer_total, consumer_total), 0);
    dep.writes_to_tile_size = Some(tile_size);
    dep
}

/// A dependency that always targets the other agent's last stripe, regardless of which stripe of
/// the owning agent is being scheduled — used for SRAM-overlap waits, which are a one-shot "don't
/// start until the previous occupant of this memory is done" rather than a per-stripe ratio.
fn wait_for_completion(other_agent_id: u32, self_total: u32, other_total: u32) -> Dependency {
    let ratio = DependencyRatio { self_: self_total.max(1) as u16, other: other_total.max(1) as u16 };
    let mut dep = Dependency::new(other_agent_id, ratio, ratio, 0);
    dep.use_for_scheduling = false;
    dep
}

/// A scheduling-only dependency that always targets the other agent's *first* stripe, regardless
/// of which stripe of the owning agent is in progress (§4.6(c)'s `IsNeeded` preloading limiter):
/// used to stop a streamer agent from running far ahead of a kernel load it should yield to,
/// without requiring a command-stream wait.
fn schedule_dep_on_first_stripe(other_agent_id: u32, self_total: u32) -> Dependency {
    let ratio = DependencyRatio { self_: self_total.max(1) as u16, other: 1 };
    let mut dep = Dependency::new(other_agent_id, ratio, ratio, 0);
    dep.use_for_command_stream = false;
    dep
}

#[derive(Debug, Clone, Copy)]
struct SramWrite {
    range: (u32, u32),
    agent_id: u32,
    num_stripes_total: u32,
}

fn ranges_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

pub struct CompiledAgents {
    pub agents: Vec<AgentDescAndDeps>,
    /// `[start, end)` agent-id lifetime of each intermediate DRAM buffer, for the (external)
    /// buffer manager (§4.8, "Intermediate DRAM buffer lifetime").
    pub dram_buffer_lifetimes: HashMap<BufferId, (u32, u32)>,
}

#[derive(Default)]
pub struct ProcessDriver {
    agents: Vec<AgentDescAndDeps>,
    buffer_writer: HashMap<BufferId, u32>,
    sram_writes: Vec<SramWrite>,
    dram_buffer_first_write: HashMap<BufferId, u32>,
    dram_buffer_last_read: HashMap<BufferId, u32>,
}

impl ProcessDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_agent(&mut self, num_stripes_total: u32, payload: AgentPayload) -> u32 {
        let id = self.agents.len() as u32;
        self.agents.push(AgentDescAndDeps { agent: Agent::new(num_stripes_total, payload), deps: AgentDependencyInfo::default() });
        id
    }

    fn note_dram_read(&mut self, buffer: BufferId, reader_agent_id: u32) {
        self.dram_buffer_last_read.insert(buffer, reader_agent_id);
        self.dram_buffer_first_write.entry(buffer).or_insert(reader_agent_id);
    }

    fn note_dram_write(&mut self, buffer: BufferId, writer_agent_id: u32) {
        self.dram_buffer_first_write.entry(buffer).or_insert(writer_agent_id);
        self.dram_buffer_last_read.entry(buffer).or_insert(writer_agent_id);
    }

    fn add_read_dep(&mut self, consumer_agent_id: u32, dep: Dependency) {
        self.agents[consumer_agent_id as usize].deps.read_dependencies.push(dep);
    }

    fn add_write_dep(&mut self, producer_agent_id: u32, dep: Dependency) {
        self.agents[producer_agent_id as usize].deps.write_dependencies.push(dep);
    }

    fn add_schedule_dep(&mut self, owner_agent_id: u32, dep: Dependency) {
        self.agents[owner_agent_id as usize].deps.schedule_dependencies.push(dep);
    }

    /// RAW + WAR pair for one producer→consumer edge: the consumer waits for the producer, and
    /// the producer is told when its tile slot is safe to overwrite.
    fn link(&mut self, producer_agent_id: u32, consumer_agent_id: u32, producer_tile_size: u16) {
        let producer_total = self.agents[producer_agent_id as usize].agent.num_stripes_total;
        let consumer_total = self.agents[consumer_agent_id as usize].agent.num_stripes_total;
        let raw = raw_dependency(producer_agent_id, consumer_total, producer_total);
        self.add_read_dep(consumer_agent_id, raw);
        if producer_tile_size > 0 {
            let war = war_dependency(consumer_agent_id, producer_total, consumer_total, producer_tile_size);
            self.add_write_dep(producer_agent_id, war);
        }
    }

    /// SRAM-overlap dependency insertion (§4.8): any prior write whose byte range intersects
    /// `range` gets a command-stream-only wait for its last stripe, bounded to the last
    /// [`MAX_OVERLAP_LOOKBACK`] writers so this stays linear in graph size.
    fn insert_sram_overlap_deps(&mut self, new_agent_id: u32, range: (u32, u32)) {
        let new_total = self.agents[new_agent_id as usize].agent.num_stripes_total;
        let candidates: Vec<SramWrite> =
            self.sram_writes.iter().rev().take(MAX_OVERLAP_LOOKBACK).copied().filter(|w| ranges_overlap(w.range, range)).collect();
        for w in candidates {
            let dep = wait_for_completion(w.agent_id, new_total, w.num_stripes_total);
            self.add_read_dep(new_agent_id, dep);
        }
        self.sram_writes.push(SramWrite { range, agent_id: new_agent_id, num_stripes_total: new_total });
    }

    pub fn process(mut self, graph: &OpGraph) -> CompiledAgents {
        for op in graph.ops() {
            match &op.node {
                OpNode::LoadWeights(wgt) => {
                    let total = (wgt.num_stripes.ifm_channels * wgt.num_stripes.ofm_channels).max(1);
                    let range = (wgt.tile.base_addr, wgt.tile.base_addr + wgt.tile.num_slots as u32 * wgt.tile.slot_size);
                    let id = self.push_agent(total, AgentPayload::Wgt(wgt.clone()));
                    self.insert_sram_overlap_deps(id, range);
                    self.buffer_writer.insert(op.output, id);
                }

                OpNode::LoadIfm(ifm) => {
                    let n = ifm.fm_data.num_stripes;
                    let total = (n.height * n.width * n.channels).max(1);
                    let range = (ifm.fm_data.tile.base_addr, ifm.fm_data.tile.base_addr + ifm.fm_data.tile.num_slots as u32 * ifm.fm_data.tile.slot_size);
                    let id = self.push_agent(total, AgentPayload::Ifm(ifm.clone()));
                    if let Some(src) = op.inputs.first() {
                        self.note_dram_read(*src, id);
                        if let Some(&producer) = self.buffer_writer.get(src) {
                            self.link(producer, id, 0);
                        }
                    }
                    self.insert_sram_overlap_deps(id, range);
                    self.buffer_writer.insert(op.output, id);
                }

                OpNode::StoreOfm(ofm) => {
                    let n = ofm.fm_data.num_stripes;
                    let total = (n.height * n.width * n.channels).max(1);
                    let id = self.push_agent(total, AgentPayload::Ofm(ofm.clone()));
                    if let Some(src) = op.inputs.first() {
                        if let Some(&producer) = self.buffer_writer.get(src) {
                            self.link(producer, id, self.producer_tile_size(producer));
                        }
                    }
                    self.note_dram_write(op.output, id);
                    self.buffer_writer.insert(op.output, id);
                }

                OpNode::Mce { mce, load_kernel } => {
                    // PleL agent (if any) is pushed first, so it gets the lowest agent id of the
                    // three. A schedule-only dependency from the WgtS/IfmS producers onto the
                    // PleL's first stripe (below) is what actually stops those producers from
                    // running the DmaRd queue ahead of the kernel load (§4.8, §4.6(c)); agent-id
                    // order alone only affects iteration order, not the `IsNeeded` gating.
                    let kernel_loader_id = load_kernel.map(|pl| {
                        let range = (pl.sram_addr, pl.sram_addr + pl.code_size);
                        let id = self.push_agent(1, AgentPayload::PleL(pl));
                        self.insert_sram_overlap_deps(id, range);
                        id
                    });

                    let n = mce.num_stripes;
                    let total = (n.height * n.width * n.channels).max(1);
                    let id = self.push_agent(total, AgentPayload::Mce(mce.clone()));

                    if let Some(ifm_buf) = op.inputs.first() {
                        if let Some(&producer) = self.buffer_writer.get(ifm_buf) {
                            self.link(producer, id, self.producer_tile_size(producer));
                            if let Some(pl_id) = kernel_loader_id {
                                let producer_total = self.agents[producer as usize].agent.num_stripes_total;
                                self.add_schedule_dep(producer, schedule_dep_on_first_stripe(pl_id, producer_total));
                            }
                        }
                    }
                    if let Some(wgt_buf) = op.inputs.get(1) {
                        if let Some(&producer) = self.buffer_writer.get(wgt_buf) {
                            self.link(producer, id, self.producer_tile_size(producer));
                            if let Some(pl_id) = kernel_loader_id {
                                let producer_total = self.agents[producer as usize].agent.num_stripes_total;
                                self.add_schedule_dep(producer, schedule_dep_on_first_stripe(pl_id, producer_total));
                            }
                        }
                    }
                    self.buffer_writer.insert(op.output, id);
                }

                OpNode::Ple { ple, load_kernel } => {
                    if let Some(pl) = load_kernel {
                        let range = (pl.sram_addr, pl.sram_addr + pl.code_size);
                        let id = self.push_agent(1, AgentPayload::PleL(*pl));
                        self.insert_sram_overlap_deps(id, range);
                    }

                    let n = ple.num_stripes;
                    let total = (n.height * n.width * n.channels).max(1);
                    let id = self.push_agent(total, AgentPayload::PleS(ple.clone()));

                    let fused = matches!(ple.input_mode, PleInputMode::MceAllOgs | PleInputMode::MceOneOg);
                    if fused {
                        if let Some(mce_buf) = op.inputs.first() {
                            if let Some(&producer) = self.buffer_writer.get(mce_buf) {
                                self.link(producer, id, 0);
                            }
                        }
                    } else {
                        // Standalone: link producers in ascending agent-id order (§4.8).
                        let mut producers: Vec<u32> = op.inputs.iter().filter_map(|b| self.buffer_writer.get(b).copied()).collect();
                        producers.sort_unstable();
                        for producer in producers {
                            let tile_size = self.producer_tile_size(producer);
                            self.link(producer, id, tile_size);
                        }
                    }

                    let range = (ple.ofm_tile.base_addr, ple.ofm_tile.base_addr + ple.ofm_tile.num_slots as u32 * ple.ofm_tile.slot_size);
                    self.insert_sram_overlap_deps(id, range);
                    self.buffer_writer.insert(op.output, id);
                }
            }
        }

        let mut dram_buffer_lifetimes = HashMap::new();
        for (buffer, &start) in &self.dram_buffer_first_write {
            if let Some(buf) = graph.buffer(*buffer) {
                if buf.location == BufferLocation::Dram {
                    let end = *self.dram_buffer_last_read.get(buffer).unwrap_or(&start);
                    dram_buffer_lifetimes.insert(*buffer, (start, end + 1));
                }
            }
        }

        CompiledAgents { agents: self.agents, dram_buffer_lifetimes }
    }

    fn producer_tile_size(&self, agent_id: u32) -> u16 {
        self.agents[agent_id as usize].agent.payload.tile_num_slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::fm::{FmSDesc, FmsDataType};
    use crate::descriptors::{SupertensorSize, TensorSize, Tile};
    use crate::graph::{Buffer, OpId};

    fn fm_desc(buffer_id: u16, base_addr: u32) -> FmSDesc {
        FmSDesc {
            buffer_id,
            dram_offset: 0,
            data_type: FmsDataType::Nhwc,
            fcaf_info: None,
            tile: Tile { base_addr, num_slots: 2, slot_size: 256 },
            default_stripe_size: TensorSize::new(8, 8, 8),
            edge_stripe_size: TensorSize::new(8, 8, 8),
            supertensor_size_in_cells: SupertensorSize { width: 1, channels: 1 },
            num_stripes: TensorSize::new(1, 1, 2),
            stripe_id_strides: TensorSize::new(1, 1, 1),
        }
    }

    /// A DRAM IFM load followed by an OFM store from the same SRAM tile must produce a
    /// read-after-write dependency wiring the OfmS agent to the IfmS agent.
    #[test]
    fn ifm_to_ofm_raw_dependency_is_wired() {
        let mut graph = OpGraph::new();
        let dram_in = BufferId(0);
        let sram = BufferId(1);
        let dram_out = BufferId(2);
        graph.add_buffer(Buffer { id: dram_in, location: BufferLocation::Dram, sram_range: None });
        graph.add_buffer(Buffer { id: sram, location: BufferLocation::Sram, sram_range: Some((0, 512)) });
        graph.add_buffer(Buffer { id: dram_out, location: BufferLocation::Dram, sram_range: None });

        graph.add_op(OpId(0), OpNode::LoadIfm(crate::descriptors::IfmSDesc {
            fm_data: fm_desc(1, 0),
            packed_boundary_thickness: Default::default(),
            is_extra_packed_boundary_data_on_right_edge: false,
            is_extra_packed_boundary_data_on_bottom_edge: false,
        }), vec![dram_in], sram);
        graph.add_op(OpId(1), OpNode::StoreOfm(crate::descriptors::OfmSDesc { fm_data: fm_desc(2, 0) }), vec![sram], dram_out);

        let result = ProcessDriver::new().process(&graph);
        assert_eq!(result.agents.len(), 2);
        assert_eq!(result.agents[1].deps.read_dependencies.len(), 1);
        assert_eq!(result.agents[1].deps.read_dependencies[0].other_agent_id, 0);
        assert_eq!(result.agents[0].deps.write_dependencies.len(), 1);
    }
}
