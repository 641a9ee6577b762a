//! Parser/packager round-trip property (§8 invariant 6) and the version-mismatch scenario (§8 E2).

use npu_cmdstream::command::{CommandVariant, QueueKind};
use npu_cmdstream::descriptors::{Agent, AgentDependencyInfo, AgentDescAndDeps, AgentPayload, CounterName, FmSDesc, FmsDataType, OfmSDesc, SupertensorSize, TensorSize, Tile};
use npu_cmdstream::packager::{self, CommandStreamParser, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};
use npu_cmdstream::scheduler::ScheduledCommands;

fn fm_desc() -> FmSDesc {
    FmSDesc {
        buffer_id: 3,
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
fn empty_stream_round_trips_with_the_compile_time_version() {
    let bytes = packager::pack(&[], &ScheduledCommands::default());
    let parsed = CommandStreamParser::parse(&bytes);
    assert!(parsed.is_valid());
    assert_eq!(parsed.version(), (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH));
}

#[test]
fn any_mutated_header_byte_invalidates_the_stream() {
    let agents = vec![AgentDescAndDeps {
        agent: Agent::new(1, AgentPayload::Ofm(OfmSDesc { fm_data: fm_desc() })),
        deps: AgentDependencyInfo::default(),
    }];
    let mut commands = ScheduledCommands::default();
    commands.dma_wr.push(CommandVariant::WaitForCounter { counter_name: CounterName::PleStripe, value: 1 });
    let bytes = packager::pack(&agents, &commands);

    for i in 0..16 {
        let mut mutated = bytes.clone();
        mutated[i] ^= 0xFF;
        assert!(!CommandStreamParser::parse(&mutated).is_valid(), "byte {i} mutation was not detected");
    }
}

/// §8 E2: feeding the parser a short buffer with a bumped major version still reports the
/// in-buffer version fields even though the stream is rejected.
#[test]
fn version_mismatch_reports_parsed_version_but_is_invalid() {
    let mut raw = vec![b'E', b'N', b'C', b'S'];
    raw.extend((VERSION_MAJOR + 1).to_le_bytes());
    raw.extend(VERSION_MINOR.to_le_bytes());
    raw.extend(VERSION_PATCH.to_le_bytes());

    let parsed = CommandStreamParser::parse(&raw);
    assert!(!parsed.is_valid());
    assert_eq!(parsed.version(), (VERSION_MAJOR + 1, VERSION_MINOR, VERSION_PATCH));
}

#[test]
fn command_list_bytes_carve_out_the_right_queue_slices() {
    let mut commands = ScheduledCommands::default();
    commands.dma_rd.push(CommandVariant::WaitForCounter { counter_name: CounterName::DmaWr, value: 1 });
    commands.mce.push(CommandVariant::WaitForCounter { counter_name: CounterName::DmaRd, value: 2 });
    let bytes = packager::pack(&[], &commands);
    let parsed = CommandStreamParser::parse(&bytes);
    assert!(parsed.is_valid());
    assert_eq!(parsed.command_list_bytes(QueueKind::DmaRd).unwrap().len(), 8);
    assert_eq!(parsed.command_list_bytes(QueueKind::DmaWr).unwrap().len(), 0);
    assert_eq!(parsed.command_list_bytes(QueueKind::Mce).unwrap().len(), 8);
    assert_eq!(parsed.command_list_bytes(QueueKind::Ple).unwrap().len(), 0);
}
