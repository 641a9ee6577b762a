//! The four heterogeneous command queues and the tagged union the packager writes out (§3, §4.7).

use crate::descriptors::CounterName;
use crate::descriptors::PleKernelId;

/// Per-stripe DMA register payload produced by the DMA command builder (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaExtraData {
    pub dma_cmd_register: u32,
    pub sram_addr_register: u32,
    pub dram_offset: u32,
    pub stride0: u32,
    pub stride1: u32,
    pub stride2: u32,
    pub stride3: u32,
    pub sram_stride_register: u32,
    pub total_bytes_register: u32,
    pub comp_config0: u32,
    pub emc_mask_register: u32,
    /// `dma_channels_r` (§4.1): only set on the shared feature-map DMA path, zero for
    /// weight-streaming and PLE-code-load commands.
    pub channels_register: u32,
    pub channel_id: u8,
}

/// Register-programming payload for one MCE stripe's `ProgramMce` phase (§4.3). Per-CE/per-IG
/// arrays are indexed `[ce]` / `[ce][ig]` respectively and are always `HardwareCapabilities::num_ces`
/// long.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramMceExtraData {
    pub ce_control: u32,
    pub wide_kernel_control: u32,
    pub wide_kernel_offset: [u32; 4],
    pub ifm_zero_point: u32,
    pub ifm_default_slot_size: u32,
    pub ifm_slot_stride: u32,
    pub ifm_config1: u32,
    pub ifm_pad: [u32; 4],
    pub ifm_top_slots: u32,
    pub ifm_mid_slots: u32,
    pub ifm_bottom_slots: u32,
    pub ifm_slot_pad_config: u32,
    pub depthwise_control: u32,
    pub filter: u32,
    pub mul_enable: Vec<u32>,
    pub weight_base_addr: Vec<u32>,
    pub ifm_config2: Vec<u32>,
    pub ple_mceif_config: u32,
    pub activation_config: u32,
    pub stripe_block_config: u32,
    pub ofm_stripe_size: u32,
    pub ofm_config: u32,
    pub m_num_blocks_programmed_for_mce: u32,
}

/// Register payload for the `StartMce` kick-off phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartMceExtraData {
    pub ce_enables: u32,
}

/// 8x32-bit scratch register payload for one PLE stripe (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartPleExtraData {
    pub scratch: [u32; 8],
}

/// Tagged union over every command kind the firmware understands. Named after the variant it
/// carries; each variant holds only the fields it needs so that the packager writes the minimum
/// number of bytes per command (spec.md §3/§4.7).
#[derive(Debug, Clone, PartialEq)]
pub enum CommandVariant {
    WaitForCounter { counter_name: CounterName, value: u32 },
    LoadIfmStripe { agent_id: u32, stripe_id: u32, chunk_id: u32, extra: DmaExtraData },
    LoadWgtStripe { agent_id: u32, stripe_id: u32, extra: DmaExtraData },
    ProgramMceStripe { agent_id: u32, stripe_id: u32, extra: ProgramMceExtraData },
    ConfigMceif { agent_id: u32, ple_kernel_id: PleKernelId },
    StartMceStripe { agent_id: u32, stripe_id: u32, extra: StartMceExtraData },
    LoadPleCodeIntoSram { agent_id: u32, extra: DmaExtraData },
    LoadPleCodeIntoPleSram { agent_id: u32 },
    StartPleStripe { agent_id: u32, stripe_id: u32, extra: StartPleExtraData },
    StoreOfmStripe { agent_id: u32, stripe_id: u32, chunk_id: u32, extra: DmaExtraData },
}

impl CommandVariant {
    /// Numeric tag written as the first word of the serialised command (§4.7).
    pub fn type_tag(&self) -> u32 {
        match self {
            CommandVariant::WaitForCounter { .. } => 0,
            CommandVariant::LoadIfmStripe { .. } => 1,
            CommandVariant::LoadWgtStripe { .. } => 2,
            CommandVariant::ProgramMceStripe { .. } => 3,
            CommandVariant::ConfigMceif { .. } => 4,
            CommandVariant::StartMceStripe { .. } => 5,
            CommandVariant::LoadPleCodeIntoSram { .. } => 6,
            CommandVariant::LoadPleCodeIntoPleSram { .. } => 7,
            CommandVariant::StartPleStripe { .. } => 8,
            CommandVariant::StoreOfmStripe { .. } => 9,
        }
    }

    pub fn agent_id(&self) -> Option<u32> {
        match self {
            CommandVariant::WaitForCounter { .. } => None,
            CommandVariant::LoadIfmStripe { agent_id, .. }
            | CommandVariant::LoadWgtStripe { agent_id, .. }
            | CommandVariant::ProgramMceStripe { agent_id, .. }
            | CommandVariant::ConfigMceif { agent_id, .. }
            | CommandVariant::StartMceStripe { agent_id, .. }
            | CommandVariant::LoadPleCodeIntoSram { agent_id, .. }
            | CommandVariant::LoadPleCodeIntoPleSram { agent_id }
            | CommandVariant::StartPleStripe { agent_id, .. }
            | CommandVariant::StoreOfmStripe { agent_id, .. } => Some(*agent_id),
        }
    }
}

/// One of the four firmware-executed queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    DmaRd,
    DmaWr,
    Mce,
    Ple,
}
