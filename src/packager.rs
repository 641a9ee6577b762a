//! Binary command-stream container: assembly and parsing (§4.7).
//!
//! Layout, byte-exact, mirrors `ethosn_command_stream::CommandStream` /
//! `CommandStreamParser`: a fourcc+version header, a fixed-size `CommandStream`
//! struct of offsets/counts, the agent array (fixed-size tagged union), then
//! the four command lists back to back.

use crate::command::{CommandVariant, QueueKind};
use crate::descriptors::agent::{AgentPayload, AgentType};
use crate::descriptors::AgentDescAndDeps;
use crate::descriptors::CounterName;
use crate::scheduler::ScheduledCommands;

/// Version triple this packager writes and the parser requires an exact match on. Kept as the
/// same three-field shape as the original's `ETHOSN_COMMAND_STREAM_VERSION_{MAJOR,MINOR,PATCH}`.
pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 0;
pub const VERSION_PATCH: u32 = 0;

const FOURCC: u32 = (b'E' as u32) | ((b'N' as u32) << 8) | ((b'C' as u32) << 16) | ((b'S' as u32) << 24);

/// Words in the version header: fourcc, major, minor, patch.
const VERSION_HEADER_WORDS: usize = 4;
/// Words in the `CommandStream` struct that follows the version header.
const COMMAND_STREAM_HEADER_WORDS: usize = 11;

/// Fixed size, in bytes, of one on-wire agent record: `[type, numStripesTotal, field0..field3]`.
/// The payload fields carry only the identity the firmware needs per agent (buffer ids, kernel
/// ids, op modes) — the full per-stripe register values already live in the command lists.
const AGENT_RECORD_WORDS: usize = 6;
const AGENT_RECORD_BYTES: usize = AGENT_RECORD_WORDS * 4;

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn agent_type_tag(t: AgentType) -> u32 {
    match t {
        AgentType::IfmStreamer => 0,
        AgentType::WgtStreamer => 1,
        AgentType::MceScheduler => 2,
        AgentType::PleLoader => 3,
        AgentType::PleScheduler => 4,
        AgentType::OfmStreamer => 5,
    }
}

fn counter_name_tag(c: CounterName) -> u32 {
    match c {
        CounterName::DmaRd => 0,
        CounterName::DmaWr => 1,
        CounterName::Mceif => 2,
        CounterName::MceStripe => 3,
        CounterName::PleCodeLoadedIntoPleSram => 4,
        CounterName::PleStripe => 5,
    }
}

fn encode_agent(a: &AgentDescAndDeps) -> [u32; AGENT_RECORD_WORDS] {
    let mut fields = [0u32; 4];
    match &a.agent.payload {
        AgentPayload::Ifm(d) => fields[0] = d.fm_data.buffer_id as u32,
        AgentPayload::Wgt(d) => fields[0] = d.buffer_id as u32,
        AgentPayload::Mce(d) => {
            fields[0] = d.mce_op_mode as u32;
            fields[1] = d.ple_kernel_id as u32;
        }
        AgentPayload::PleL(d) => {
            fields[0] = d.ple_kernel_id as u32;
            fields[1] = d.sram_addr;
        }
        AgentPayload::PleS(d) => {
            fields[0] = d.input_mode as u32;
            fields[1] = d.ple_kernel_id as u32;
            fields[2] = d.ple_kernel_sram_addr;
        }
        AgentPayload::Ofm(d) => fields[0] = d.fm_data.buffer_id as u32,
    }
    [agent_type_tag(a.agent.agent_type()), a.agent.num_stripes_total, fields[0], fields[1], fields[2], fields[3]]
}

fn command_type_tag(cmd: &CommandVariant) -> u32 {
    cmd.type_tag()
}

/// Serialises one command: a 1-word type tag followed by its variant fields, in the teacher's
/// declared field order. Variable-size per-CE register arrays are length-prefixed so the command
/// remains self-describing without requiring the reader to know `HardwareCapabilities`.
fn encode_command(cmd: &CommandVariant) -> Vec<u8> {
    let mut buf = Vec::new();
    push_u32(&mut buf, command_type_tag(cmd));
    match cmd {
        CommandVariant::WaitForCounter { counter_name, value } => {
            push_u32(&mut buf, counter_name_tag(*counter_name));
            push_u32(&mut buf, *value);
        }
        CommandVariant::LoadIfmStripe { agent_id, stripe_id, chunk_id, extra } => {
            push_u32(&mut buf, *agent_id);
            push_u32(&mut buf, *stripe_id);
            push_u32(&mut buf, *chunk_id);
            encode_dma_extra(&mut buf, extra);
        }
        CommandVariant::LoadWgtStripe { agent_id, stripe_id, extra } => {
            push_u32(&mut buf, *agent_id);
            push_u32(&mut buf, *stripe_id);
            encode_dma_extra(&mut buf, extra);
        }
        CommandVariant::ProgramMceStripe { agent_id, stripe_id, extra } => {
            push_u32(&mut buf, *agent_id);
            push_u32(&mut buf, *stripe_id);
            push_u32(&mut buf, extra.ce_control);
            push_u32(&mut buf, extra.wide_kernel_control);
            for v in extra.wide_kernel_offset {
                push_u32(&mut buf, v);
            }
            push_u32(&mut buf, extra.ifm_zero_point);
            push_u32(&mut buf, extra.ifm_default_slot_size);
            push_u32(&mut buf, extra.ifm_slot_stride);
            push_u32(&mut buf, extra.ifm_config1);
            for v in extra.ifm_pad {
                push_u32(&mut buf, v);
            }
            push_u32(&mut buf, extra.ifm_top_slots);
            push_u32(&mut buf, extra.ifm_mid_slots);
            push_u32(&mut buf, extra.ifm_bottom_slots);
            push_u32(&mut buf, extra.ifm_slot_pad_config);
            push_u32(&mut buf, extra.depthwise_control);
            push_u32(&mut buf, extra.filter);
            push_u32(&mut buf, extra.mul_enable.len() as u32);
            for v in &extra.mul_enable {
                push_u32(&mut buf, *v);
            }
            push_u32(&mut buf, extra.weight_base_addr.len() as u32);
            for v in &extra.weight_base_addr {
                push_u32(&mut buf, *v);
            }
            push_u32(&mut buf, extra.ifm_config2.len() as u32);
            for v in &extra.ifm_config2 {
                push_u32(&mut buf, *v);
            }
            push_u32(&mut buf, extra.ple_mceif_config);
            push_u32(&mut buf, extra.activation_config);
            push_u32(&mut buf, extra.stripe_block_config);
            push_u32(&mut buf, extra.ofm_stripe_size);
            push_u32(&mut buf, extra.ofm_config);
            push_u32(&mut buf, extra.m_num_blocks_programmed_for_mce);
        }
        CommandVariant::ConfigMceif { agent_id, ple_kernel_id } => {
            push_u32(&mut buf, *agent_id);
            push_u32(&mut buf, *ple_kernel_id as u32);
        }
        CommandVariant::StartMceStripe { agent_id, stripe_id, extra } => {
            push_u32(&mut buf, *agent_id);
            push_u32(&mut buf, *stripe_id);
            push_u32(&mut buf, extra.ce_enables);
        }
        CommandVariant::LoadPleCodeIntoSram { agent_id, extra } => {
            push_u32(&mut buf, *agent_id);
            encode_dma_extra(&mut buf, extra);
        }
        CommandVariant::LoadPleCodeIntoPleSram { agent_id } => {
            push_u32(&mut buf, *agent_id);
        }
        CommandVariant::StartPleStripe { agent_id, stripe_id, extra } => {
            push_u32(&mut buf, *agent_id);
            push_u32(&mut buf, *stripe_id);
            for v in extra.scratch {
                push_u32(&mut buf, v);
            }
        }
        CommandVariant::StoreOfmStripe { agent_id, stripe_id, chunk_id, extra } => {
            push_u32(&mut buf, *agent_id);
            push_u32(&mut buf, *stripe_id);
            push_u32(&mut buf, *chunk_id);
            encode_dma_extra(&mut buf, extra);
        }
    }
    buf
}

fn encode_dma_extra(buf: &mut Vec<u8>, extra: &crate::command::DmaExtraData) {
    push_u32(buf, extra.dma_cmd_register);
    push_u32(buf, extra.sram_addr_register);
    push_u32(buf, extra.dram_offset);
    push_u32(buf, extra.stride0);
    push_u32(buf, extra.stride1);
    push_u32(buf, extra.stride2);
    push_u32(buf, extra.stride3);
    push_u32(buf, extra.sram_stride_register);
    push_u32(buf, extra.total_bytes_register);
    push_u32(buf, extra.comp_config0);
    push_u32(buf, extra.emc_mask_register);
    push_u32(buf, extra.channels_register);
    push_u32(buf, extra.channel_id as u32);
}

fn encode_queue(commands: &[CommandVariant]) -> Vec<u8> {
    let mut out = Vec::new();
    for cmd in commands {
        out.extend(encode_command(cmd));
    }
    out
}

/// Serialises `agents` and `commands` into the on-wire buffer described in §4.7: version header,
/// `CommandStream` offset/count table, agent array, then the four command lists.
pub fn pack(agents: &[AgentDescAndDeps], commands: &ScheduledCommands) -> Vec<u8> {
    let agents_bytes: Vec<u8> = agents.iter().flat_map(|a| encode_agent(a).into_iter().flat_map(u32::to_le_bytes)).collect();
    let dma_rd_bytes = encode_queue(&commands.dma_rd);
    let dma_wr_bytes = encode_queue(&commands.dma_wr);
    let mce_bytes = encode_queue(&commands.mce);
    let ple_bytes = encode_queue(&commands.ple);

    let header_bytes = COMMAND_STREAM_HEADER_WORDS * 4;
    let agents_offset = header_bytes as u32;
    let dma_rd_offset = agents_offset + agents_bytes.len() as u32;
    let dma_wr_offset = dma_rd_offset + dma_rd_bytes.len() as u32;
    let mce_offset = dma_wr_offset + dma_wr_bytes.len() as u32;
    let ple_offset = mce_offset + mce_bytes.len() as u32;
    let total_size = ple_offset + ple_bytes.len() as u32;

    let mut out = Vec::with_capacity(VERSION_HEADER_WORDS * 4 + total_size as usize);
    push_u32(&mut out, FOURCC);
    push_u32(&mut out, VERSION_MAJOR);
    push_u32(&mut out, VERSION_MINOR);
    push_u32(&mut out, VERSION_PATCH);

    push_u32(&mut out, total_size);
    push_u32(&mut out, agents_offset);
    push_u32(&mut out, agents.len() as u32);
    push_u32(&mut out, dma_rd_offset);
    push_u32(&mut out, commands.dma_rd.len() as u32);
    push_u32(&mut out, dma_wr_offset);
    push_u32(&mut out, commands.dma_wr.len() as u32);
    push_u32(&mut out, mce_offset);
    push_u32(&mut out, commands.mce.len() as u32);
    push_u32(&mut out, ple_offset);
    push_u32(&mut out, commands.ple.len() as u32);

    out.extend(agents_bytes);
    out.extend(dma_rd_bytes);
    out.extend(dma_wr_bytes);
    out.extend(mce_bytes);
    out.extend(ple_bytes);
    out
}

/// The `CommandStream` offset/count table, read back out of a validated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStreamHeader {
    pub total_size: u32,
    pub agents_offset: u32,
    pub num_agents: u32,
    pub dma_rd_commands_offset: u32,
    pub num_dma_rd_commands: u32,
    pub dma_wr_commands_offset: u32,
    pub num_dma_wr_commands: u32,
    pub mce_commands_offset: u32,
    pub num_mce_commands: u32,
    pub ple_commands_offset: u32,
    pub num_ple_commands: u32,
}

/// Mirrors `ethosn::command_stream::CommandStreamParser`: validates the fourcc and exact version
/// match, and on success exposes the header fields and raw byte slices. On mismatch the data is
/// invalid but the version fields read from the header are still reported.
pub struct CommandStreamParser<'a> {
    version: (u32, u32, u32),
    data: Option<(&'a [u8], CommandStreamHeader)>,
}

impl<'a> CommandStreamParser<'a> {
    pub fn parse(raw: &'a [u8]) -> Self {
        if raw.len() < VERSION_HEADER_WORDS * 4 {
            return Self { version: (0, 0, 0), data: None };
        }
        let words: Vec<u32> = raw.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        let fourcc = words[0];
        let version = (words[1], words[2], words[3]);
        if fourcc != FOURCC {
            return Self { version: (0, 0, 0), data: None };
        }
        if version != (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH) {
            return Self { version, data: None };
        }

        let body = &raw[VERSION_HEADER_WORDS * 4..];
        if body.len() < COMMAND_STREAM_HEADER_WORDS * 4 {
            return Self { version, data: None };
        }
        let w: Vec<u32> = body[..COMMAND_STREAM_HEADER_WORDS * 4]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let header = CommandStreamHeader {
            total_size: w[0],
            agents_offset: w[1],
            num_agents: w[2],
            dma_rd_commands_offset: w[3],
            num_dma_rd_commands: w[4],
            dma_wr_commands_offset: w[5],
            num_dma_wr_commands: w[6],
            mce_commands_offset: w[7],
            num_mce_commands: w[8],
            ple_commands_offset: w[9],
            num_ple_commands: w[10],
        };
        if (header.total_size as usize) > body.len() {
            return Self { version, data: None };
        }
        Self { version, data: Some((body, header)) }
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    pub fn version(&self) -> (u32, u32, u32) {
        self.version
    }

    pub fn header(&self) -> Option<&CommandStreamHeader> {
        self.data.as_ref().map(|(_, h)| h)
    }

    /// Raw bytes of one agent record, or `None` if `index` is out of range or the stream failed
    /// validation.
    pub fn agent_bytes(&self, index: u32) -> Option<&'a [u8]> {
        let (body, header) = self.data.as_ref()?;
        if index >= header.num_agents {
            return None;
        }
        let start = header.agents_offset as usize + index as usize * AGENT_RECORD_BYTES;
        body.get(start..start + AGENT_RECORD_BYTES)
    }

    /// Raw bytes of an entire command list (§4.7: commands are variable-size, so callers walk
    /// this slice themselves using each command's leading type tag).
    pub fn command_list_bytes(&self, queue: QueueKind) -> Option<&'a [u8]> {
        let (body, header) = self.data.as_ref()?;
        match queue {
            QueueKind::DmaRd => body.get(header.dma_rd_commands_offset as usize..header.dma_wr_commands_offset as usize),
            QueueKind::DmaWr => body.get(header.dma_wr_commands_offset as usize..header.mce_commands_offset as usize),
            QueueKind::Mce => body.get(header.mce_commands_offset as usize..header.ple_commands_offset as usize),
            QueueKind::Ple => body.get(header.ple_commands_offset as usize..header.total_size as usize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::agent::{Agent, AgentDependencyInfo};
    use crate::descriptors::fm::{FmSDesc, FmsDataType, OfmSDesc};
    use crate::descriptors::{SupertensorSize, TensorSize, Tile};

    fn fm_desc() -> FmSDesc {
        FmSDesc {
            buffer_id: 7,
            dram_offset: 0,
            data_type: FmsDataType::Nhwc,
            fcaf_info: None,
            tile: Tile { base_addr: 0, num_slots: 1, slot_size: 256 },
            default_stripe_size: TensorSize::new(8, 8, 8),
            edge_stripe_size: TensorSize::new(8, 8, 8),
            supertensor_size_in_cells: SupertensorSize { width: 1, channels: 1 },
            num_stripes: TensorSize::new(1, 1, 1),
            stripe_id_strides: TensorSize::new(1, 1, 1),
        }
    }

    #[test]
    fn empty_command_stream_round_trips_valid() {
        let agents: Vec<AgentDescAndDeps> = vec![];
        let commands = ScheduledCommands::default();
        let bytes = pack(&agents, &commands);
        let parsed = CommandStreamParser::parse(&bytes);
        assert!(parsed.is_valid());
        assert_eq!(parsed.version(), (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH));
        assert_eq!(parsed.header().unwrap().num_agents, 0);
    }

    #[test]
    fn mutated_fourcc_byte_invalidates_the_stream() {
        let agents: Vec<AgentDescAndDeps> = vec![];
        let commands = ScheduledCommands::default();
        let mut bytes = pack(&agents, &commands);
        bytes[0] ^= 0xFF;
        let parsed = CommandStreamParser::parse(&bytes);
        assert!(!parsed.is_valid());
    }

    #[test]
    fn mismatched_version_word_is_still_reported_but_invalid() {
        let agents: Vec<AgentDescAndDeps> = vec![];
        let commands = ScheduledCommands::default();
        let mut bytes = pack(&agents, &commands);
        bytes[4..8].copy_from_slice(&999u32.to_le_bytes());
        let parsed = CommandStreamParser::parse(&bytes);
        assert!(!parsed.is_valid());
        assert_eq!(parsed.version(), (999, VERSION_MINOR, VERSION_PATCH));
    }

    #[test]
    fn agent_array_and_command_counts_survive_the_round_trip() {
        let ofm = AgentDescAndDeps {
            agent: Agent::new(1, AgentPayload::Ofm(OfmSDesc { fm_data: fm_desc() })),
            deps: AgentDependencyInfo::default(),
        };
        let agents = vec![ofm];
        let mut commands = ScheduledCommands::default();
        commands.dma_wr.push(CommandVariant::WaitForCounter { counter_name: CounterName::DmaRd, value: 3 });
        let bytes = pack(&agents, &commands);
        let parsed = CommandStreamParser::parse(&bytes);
        assert!(parsed.is_valid());
        let header = parsed.header().unwrap();
        assert_eq!(header.num_agents, 1);
        assert_eq!(header.num_dma_wr_commands, 1);
        let agent_bytes = parsed.agent_bytes(0).unwrap();
        let tag = u32::from_le_bytes([agent_bytes[0], agent_bytes[1], agent_bytes[2], agent_bytes[3]]);
        assert_eq!(tag, agent_type_tag(AgentType::OfmStreamer));
    }
}
