//! Common descriptor types shared by every agent kind (§3).

pub mod agent;
pub mod fm;
pub mod mce;
pub mod ple;
pub mod wgt;

pub use agent::{Agent, AgentDescAndDeps, AgentPayload, AgentType};
pub use fm::{FcafInfo, FmSDesc, FmsDataType, IfmSDesc, OfmSDesc, PackedBoundaryThickness};
pub use mce::{IfmPadDelta, MceOpMode, MceSDesc, UpsampleEdgeMode, UpsampleType};
pub use ple::{PleIfmInfo, PleInputMode, PleKernelId, PleLDesc, PleOp, PleSDesc};
pub use wgt::{WeightsMetadataEntry, WgtSDesc, WgtSWorkSize};

/// A ring buffer of SRAM slots belonging to one tensor.
///
/// Invariant (spec.md §3 / §8 property 1): `slot(stripeId) = baseAddr + (stripeId mod numSlots) *
/// slotSize`, and the resulting address must fit the 15-bit, `>>4`-shifted SRAM address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tile {
    pub base_addr: u32,
    pub num_slots: u16,
    pub slot_size: u32,
}

impl Tile {
    pub fn slot_addr(&self, stripe_id: u32) -> u32 {
        self.base_addr + (stripe_id % self.num_slots as u32) * self.slot_size
    }
}

/// `{height, width, channels}`, counted in elements or cells depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TensorSize {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl TensorSize {
    pub const fn new(height: u32, width: u32, channels: u32) -> Self {
        Self { height, width, channels }
    }
}

/// `{width, channels}` counted in cells (used for supertensor extents, where height is implicit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupertensorSize {
    pub width: u32,
    pub channels: u32,
}

/// Decodes a 1-D `stripeId` into the coordinate along dimension `d`, given that dimension's
/// stride and stripe count (shared IFM/OFM/MCE stripe math, §4.2).
pub fn stripe_coord(stripe_id: u32, stride_d: u32, num_stripes_d: u32) -> u32 {
    (stripe_id / stride_d) % num_stripes_d
}

/// The size of the stripe at `coord` along a dimension: `edge` on the last stripe, `default`
/// otherwise.
pub fn stripe_size(coord: u32, num_stripes: u32, default: u32, edge: u32) -> u32 {
    if coord == num_stripes - 1 {
        edge
    } else {
        default
    }
}

/// A decoded 3-D stripe coordinate (height, width, channels) for one 1-D `stripeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StripeCoord3D {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

pub fn decode_stripe_coord_3d(stripe_id: u32, strides: TensorSize, num_stripes: TensorSize) -> StripeCoord3D {
    StripeCoord3D {
        height: stripe_coord(stripe_id, strides.height.max(1), num_stripes.height.max(1)),
        width: stripe_coord(stripe_id, strides.width.max(1), num_stripes.width.max(1)),
        channels: stripe_coord(stripe_id, strides.channels.max(1), num_stripes.channels.max(1)),
    }
}

/// Snapshot of firmware progress counters (§3 "Counters"). Monotonically non-decreasing along
/// each queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub dma_rd: u32,
    pub dma_wr: u32,
    pub mceif: u32,
    pub mce_stripe: u32,
    pub ple_code_loaded_into_ple_sram: u32,
    pub ple_stripe: u32,
}

/// The six named counters, used as keys into [`Counters`] and the dependency/queue bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterName {
    DmaRd,
    DmaWr,
    Mceif,
    MceStripe,
    PleCodeLoadedIntoPleSram,
    PleStripe,
}

impl Counters {
    pub fn get(&self, name: CounterName) -> u32 {
        match name {
            CounterName::DmaRd => self.dma_rd,
            CounterName::DmaWr => self.dma_wr,
            CounterName::Mceif => self.mceif,
            CounterName::MceStripe => self.mce_stripe,
            CounterName::PleCodeLoadedIntoPleSram => self.ple_code_loaded_into_ple_sram,
            CounterName::PleStripe => self.ple_stripe,
        }
    }

    pub fn set(&mut self, name: CounterName, value: u32) {
        match name {
            CounterName::DmaRd => self.dma_rd = value,
            CounterName::DmaWr => self.dma_wr = value,
            CounterName::Mceif => self.mceif = value,
            CounterName::MceStripe => self.mce_stripe = value,
            CounterName::PleCodeLoadedIntoPleSram => self.ple_code_loaded_into_ple_sram = value,
            CounterName::PleStripe => self.ple_stripe = value,
        }
    }

    /// Element-wise maximum, used to merge `CounterImplications` entries (§4.6).
    pub fn max(a: Counters, b: Counters) -> Counters {
        Counters {
            dma_rd: a.dma_rd.max(b.dma_rd),
            dma_wr: a.dma_wr.max(b.dma_wr),
            mceif: a.mceif.max(b.mceif),
            mce_stripe: a.mce_stripe.max(b.mce_stripe),
            ple_code_loaded_into_ple_sram: a.ple_code_loaded_into_ple_sram.max(b.ple_code_loaded_into_ple_sram),
            ple_stripe: a.ple_stripe.max(b.ple_stripe),
        }
    }
}
