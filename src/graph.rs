//! Input op-graph types the Process Driver walks (§4.8).
//!
//! The graph arrives fully resolved by the upstream planner (Non-goal: graph building, operator
//! fusion, tile-size search all happen before this crate sees anything, §1). Every [`Op`] already
//! carries the per-stripe descriptor its agent needs — this module only models the DAG shape and
//! buffer locations needed to derive dependencies, not tensor geometry.

use std::collections::HashMap;

use crate::descriptors::{IfmSDesc, MceSDesc, OfmSDesc, PleLDesc, PleSDesc, WgtSDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferLocation {
    Dram,
    Sram,
    /// The MCE's output accumulator staged for a fused PLE op, never materialised to a tile.
    PleInputSram,
}

/// A node's output or input slot. SRAM buffers carry the byte range they occupy, used for
/// overlap-dependency insertion (§4.8, "SRAM-overlap dependency insertion").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    pub id: BufferId,
    pub location: BufferLocation,
    pub sram_range: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

/// One operator in the planned dataflow graph, tagged by the hardware engine it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum OpNode {
    LoadWeights(WgtSDesc),
    LoadIfm(IfmSDesc),
    StoreOfm(OfmSDesc),
    /// `load_kernel` mirrors the original's `PleOp::m_LoadKernel`/`MceOp` pairing: the MCE's
    /// companion PLE op may request a kernel load before the MCE stripe starts (§4.8, ProcessMceOp).
    Mce { mce: MceSDesc, load_kernel: Option<PleLDesc> },
    Ple { ple: PleSDesc, load_kernel: Option<PleLDesc> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub id: OpId,
    pub node: OpNode,
    pub inputs: Vec<BufferId>,
    pub output: BufferId,
}

/// The planner's DAG, walked in a single pass by [`crate::driver::ProcessDriver`]. Insertion
/// order is assumed to already be a valid topological order (the planner's responsibility).
#[derive(Debug, Clone, Default)]
pub struct OpGraph {
    ops: Vec<Op>,
    buffers: HashMap<BufferId, Buffer>,
}

impl OpGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_buffer(&mut self, buffer: Buffer) {
        self.buffers.insert(buffer.id, buffer);
    }

    pub fn add_op(&mut self, id: OpId, node: OpNode, inputs: Vec<BufferId>, output: BufferId) {
        self.ops.push(Op { id, node, inputs, output });
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    /// The op that last wrote `buffer`, among ops processed so far up to (but not including)
    /// `before`. Used by the driver's memoised `Buffer→AgentId` lookup (§9).
    pub fn producer_before(&self, buffer: BufferId, before: OpId) -> Option<&Op> {
        self.ops.iter().take_while(|op| op.id != before).rev().find(|op| op.output == buffer)
    }
}
