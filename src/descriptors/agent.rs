use crate::dependency::Dependency;

use super::fm::{IfmSDesc, OfmSDesc};
use super::mce::MceSDesc;
use super::ple::{PleLDesc, PleSDesc};
use super::wgt::WgtSDesc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    IfmStreamer,
    WgtStreamer,
    MceScheduler,
    PleLoader,
    PleScheduler,
    OfmStreamer,
}

/// The type-tagged payload carried by one [`Agent`] (§3: "Agent (type-tagged variant)").
#[derive(Debug, Clone, PartialEq)]
pub enum AgentPayload {
    Ifm(IfmSDesc),
    Wgt(WgtSDesc),
    Mce(MceSDesc),
    PleL(PleLDesc),
    PleS(PleSDesc),
    Ofm(OfmSDesc),
}

impl AgentPayload {
    pub fn agent_type(&self) -> AgentType {
        match self {
            AgentPayload::Ifm(_) => AgentType::IfmStreamer,
            AgentPayload::Wgt(_) => AgentType::WgtStreamer,
            AgentPayload::Mce(_) => AgentType::MceScheduler,
            AgentPayload::PleL(_) => AgentType::PleLoader,
            AgentPayload::PleS(_) => AgentType::PleScheduler,
            AgentPayload::Ofm(_) => AgentType::OfmStreamer,
        }
    }

    /// Number of SRAM slots in the tile this agent writes/reads, used for write-after-read
    /// eviction checks (§4.5/§4.6). Agents without a tile (PLE loader) report 0 — WAR deps never
    /// apply to them.
    pub fn tile_num_slots(&self) -> u16 {
        match self {
            AgentPayload::Ifm(d) => d.fm_data.tile.num_slots,
            AgentPayload::Wgt(d) => d.tile.num_slots,
            AgentPayload::Mce(d) => d.ifm_tile.num_slots,
            AgentPayload::PleL(_) => 0,
            AgentPayload::PleS(d) => d.ofm_tile.num_slots,
            AgentPayload::Ofm(d) => d.fm_data.tile.num_slots,
        }
    }
}

/// A compile-time description of one hardware engine's workload for one sub-operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub num_stripes_total: u32,
    pub payload: AgentPayload,
}

impl Agent {
    pub fn new(num_stripes_total: u32, payload: AgentPayload) -> Self {
        Self { num_stripes_total, payload }
    }

    pub fn agent_type(&self) -> AgentType {
        self.payload.agent_type()
    }
}

/// One agent plus the dependencies it owns: read-after-write on its producers, write-after-read
/// on its consumers, and schedule-only (no command-stream wait) dependencies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentDependencyInfo {
    pub read_dependencies: Vec<Dependency>,
    pub write_dependencies: Vec<Dependency>,
    pub schedule_dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescAndDeps {
    pub agent: Agent,
    pub deps: AgentDependencyInfo,
}
