//! MCE command builder (§4.3): a per-agent static `MceS` block plus per-stripe `ProgramMce` /
//! `StartMce` register payloads.

use crate::capabilities::HardwareCapabilities;
use crate::command::{ProgramMceExtraData, StartMceExtraData};
use crate::descriptors::mce::{MceOpMode, MceSDesc, UpsampleType};
use crate::descriptors::{stripe_coord, stripe_size, TensorSize};
use crate::error::Result;
use crate::registers;

/// Fields constant across every stripe of one MCE agent (the `MceS` struct in spec.md §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct MceStatic {
    pub activation_config: u32,
    pub wide_kernel_control: u32,
    pub filter: u32,
    pub ifm_zero_point: u32,
    pub ifm_default_slot_size: u32,
    pub ifm_slot_stride: u32,
    pub stripe_block_config: u32,
    pub depthwise_control: u32,
    pub ple_mceif_config: u32,
}

fn truncate_i16(v: i32) -> i32 {
    v.clamp(i16::MIN as i32, i16::MAX as i32)
}

/// Builds the fields shared by every stripe of one MCE agent.
pub fn build_static(mce: &MceSDesc, caps: &HardwareCapabilities) -> Result<MceStatic> {
    let min = truncate_i16(mce.relu_activ.min) as u32 & 0xFFFF;
    let max = truncate_i16(mce.relu_activ.max) as u32 & 0xFFFF;

    let filter_mode = mce.mce_op_mode.filter_mode_encoding();
    let filter_w = mce.submaps[0].filter_shape[0] as u32;
    let filter_h = mce.submaps[0].filter_shape[1] as u32;

    let block_w = caps.mce_block_width;
    let block_h = caps.mce_block_height;
    let buf_size = (block_w * block_h) / 16;
    let num_bufs = 1024 / buf_size.max(1);

    Ok(MceStatic {
        activation_config: registers::activation_config(min, max)?,
        wide_kernel_control: registers::wide_kernel_control(mce.is_wide_filter as u32)?,
        filter: registers::filter(filter_w, filter_h, filter_mode)?,
        ifm_zero_point: registers::ifm_zero_point((mce.ifm_zero_point as i32 & 0x1FF) as u32)?,
        // Always the default (not edge) shape - neighbours may be full-size.
        ifm_default_slot_size: registers::ifm_default_slot_size(mce.ifm_stripe_shape_default.0, mce.ifm_stripe_shape_default.1)?,
        ifm_slot_stride: registers::ifm_slot_stride(mce.ifm_tile.slot_size)?,
        stripe_block_config: registers::stripe_block_config(
            block_w,
            block_h,
            0,
            registers::MCEIF_SHUFFLE_PATTERN_FLIPPED_N,
        )?,
        depthwise_control: registers::depthwise_control((mce.conv_stride_xy.0 as u32) * (mce.conv_stride_xy.1 as u32))?,
        ple_mceif_config: registers::ple_mceif_config(num_bufs, buf_size)?,
    })
}

fn mce_stripe_shape(mce: &MceSDesc, stripe_id: u32) -> TensorSize {
    let h = stripe_coord(stripe_id, mce.stripe_id_strides.height.max(1), mce.num_stripes.height.max(1));
    let w = stripe_coord(stripe_id, mce.stripe_id_strides.width.max(1), mce.num_stripes.width.max(1));
    let c = stripe_coord(stripe_id, mce.stripe_id_strides.channels.max(1), mce.num_stripes.channels.max(1));
    let mut shape = TensorSize {
        height: stripe_size(h, mce.num_stripes.height.max(1), mce.default_stripe_size.height, mce.edge_stripe_size.height),
        width: stripe_size(w, mce.num_stripes.width.max(1), mce.default_stripe_size.width, mce.edge_stripe_size.width),
        channels: stripe_size(c, mce.num_stripes.channels.max(1), mce.default_stripe_size.channels, mce.edge_stripe_size.channels),
    };
    if mce.mce_op_mode == MceOpMode::FullyConnected {
        // Fully-connected stripe shape is always overridden to 8x8xC.
        shape.height = 8;
        shape.width = 8;
    }
    shape
}

fn mce_stripe_coord(mce: &MceSDesc, stripe_id: u32) -> (u32, u32, u32) {
    (
        stripe_coord(stripe_id, mce.stripe_id_strides.height.max(1), mce.num_stripes.height.max(1)),
        stripe_coord(stripe_id, mce.stripe_id_strides.width.max(1), mce.num_stripes.width.max(1)),
        stripe_coord(stripe_id, mce.stripe_id_strides.channels.max(1), mce.num_stripes.channels.max(1)),
    )
}

/// Builds the `ProgramMce` register payload for one stripe.
pub fn build_program_mce(mce: &MceSDesc, stripe_id: u32, caps: &HardwareCapabilities) -> Result<ProgramMceExtraData> {
    let (h_coord, w_coord, c_coord) = mce_stripe_coord(mce, stripe_id);
    let shape = mce_stripe_shape(mce, stripe_id);

    let stride_x = mce.conv_stride_xy.0 as u32;
    let stride_y = mce.conv_stride_xy.1 as u32;

    let relu_enable = mce.relu_activ.min != i32::MIN || mce.relu_activ.max != i32::MAX;
    let mac_acc_clr_disable = c_coord != 0;
    let mac_acc_out_dis = c_coord != mce.num_stripes.channels.saturating_sub(1);

    // Fields with no corresponding descriptor input (wide_mul_mode, the two reinterleave
    // enables, wit_broadcast_mode, ofm_bypass_enable) are not modelled by `MceSDesc` and are
    // packed as 0 (hardware default / disabled).
    let ce_control = registers::ce_control(
        stride_x * stride_y,
        0,
        mce.upsample_type.resampling_mode_encoding(),
        0,
        0,
        mce.upsample_edge_mode.odd_col as u32,
        mce.upsample_edge_mode.odd_row as u32,
        0,
        mce.is_ifm_signed as u32,
        (mce.algorithm == crate::descriptors::mce::MceAlgorithm::Winograd) as u32,
        relu_enable as u32,
        0,
        mac_acc_clr_disable as u32,
        mac_acc_out_dis as u32,
        mce.is_ofm_signed as u32,
    )?;

    // MUL_ENABLE: CONV/FC enable every bit; DEPTHWISE enables only the multiplier(s) whose
    // output OGs produce one of this stripe's OFM channels.
    let mut mul_enable = vec![0u32; caps.num_ces as usize];
    match mce.mce_op_mode {
        MceOpMode::Conv | MceOpMode::FullyConnected => {
            for v in mul_enable.iter_mut() {
                *v = registers::mul_enable(0xFFFF)?;
            }
        }
        MceOpMode::Depthwise => {
            for ce in 0..(caps.num_ces as usize) {
                let bit = if (ce as u32) < shape.channels { 1u32 << ce } else { 0 };
                mul_enable[ce] = registers::mul_enable(bit)?;
            }
        }
    }

    let weight_stripe_idx = if mce.num_stripes.channels == 1 { c_coord } else { stripe_id };
    let mut weight_base_addr = Vec::with_capacity(caps.ogs_per_emc as usize);
    for og in 0..caps.ogs_per_emc {
        let addr = mce.wgt_tile.slot_addr(weight_stripe_idx) + og * (mce.wgt_tile.slot_size / caps.ogs_per_emc.max(1));
        weight_base_addr.push(registers::weight_base_addr(addr >> 4)?);
    }

    let ifms_per_group = shape.channels.div_ceil(caps.num_srams.max(1));
    let mut ifm_config2 = Vec::with_capacity((caps.num_ces * 1) as usize);
    for ce in 0..caps.num_ces {
        let residual = if ce < caps.num_ces.saturating_sub(shape.channels % caps.num_srams.max(1)) {
            ifms_per_group
        } else {
            ifms_per_group.saturating_sub(1)
        };
        ifm_config2.push(registers::ifm_config2(residual)?);
    }

    let is_last_col = w_coord == mce.num_stripes.width.saturating_sub(1);
    let is_second_last_col = w_coord + 2 == mce.num_stripes.width;
    let is_last_row = h_coord == mce.num_stripes.height.saturating_sub(1);
    let is_second_last_row = h_coord + 2 == mce.num_stripes.height;

    let mut ifm_pad = [0u32; 4];
    let mut wide_kernel_offset = [0u32; 4];
    for s in 0..4 {
        let sm = &mce.submaps[s];
        let delta_w = if is_last_col {
            sm.ifm_delta_edge[0]
        } else if is_second_last_col {
            sm.ifm_delta_one_from_edge[0]
        } else {
            sm.ifm_delta_default[0].min(15)
        };
        let delta_h = if is_last_row {
            sm.ifm_delta_edge[1]
        } else if is_second_last_row {
            sm.ifm_delta_one_from_edge[1]
        } else {
            sm.ifm_delta_default[1].min(15)
        };
        if mce.is_wide_filter {
            wide_kernel_offset[s] = registers::wide_kernel_offset(
                delta_w as u32,
                delta_h as u32,
                sm.filter_shape[0] as u32,
                sm.filter_shape[1] as u32,
            )?;
        } else {
            ifm_pad[s] = registers::ifm_pad(sm.padding[0] as u32, sm.padding[1] as u32, delta_w as u32, delta_h as u32)?;
        }
    }

    // Five slot-routing layouts driven by packed-boundary X/Y and extra-edge-stripe flags (§4.2).
    let (top_slots, mid_slots, bottom_slots, slot_pad_config) = build_slot_routing(mce, stripe_id);

    let ofm_stripe_size = registers::ofm_stripe_size(shape.width, shape.height, shape.channels)?;
    let ofm_config = registers::ofm_config(shape.channels)?;

    let is_last_ifm_channel_stripe = c_coord == mce.num_stripes.channels.saturating_sub(1);
    let m_num_blocks_programmed_for_mce = if is_last_ifm_channel_stripe {
        shape.width.div_ceil(caps.mce_block_width) * shape.height.div_ceil(caps.mce_block_height) * shape.channels.div_ceil(caps.num_ple_engines.max(1))
    } else {
        0
    };

    let static_fields = build_static(mce, caps)?;

    Ok(ProgramMceExtraData {
        ce_control,
        wide_kernel_control: static_fields.wide_kernel_control,
        wide_kernel_offset,
        ifm_zero_point: static_fields.ifm_zero_point,
        ifm_default_slot_size: static_fields.ifm_default_slot_size,
        ifm_slot_stride: static_fields.ifm_slot_stride,
        ifm_config1: registers::ifm_config1(shape.width, ifms_per_group)?,
        ifm_pad,
        ifm_top_slots: top_slots,
        ifm_mid_slots: mid_slots,
        ifm_bottom_slots: bottom_slots,
        ifm_slot_pad_config: slot_pad_config,
        depthwise_control: static_fields.depthwise_control,
        filter: static_fields.filter,
        mul_enable,
        weight_base_addr,
        ifm_config2,
        ple_mceif_config: static_fields.ple_mceif_config,
        activation_config: static_fields.activation_config,
        stripe_block_config: static_fields.stripe_block_config,
        ofm_stripe_size,
        ofm_config,
        m_num_blocks_programmed_for_mce,
    })
}

/// The IFM top/mid/bottom slot registers select which neighbouring tile slot holds which of the
/// 9 logical positions, in one of five layouts depending on packed-boundary X/Y and whether an
/// extra edge stripe is present.
fn build_slot_routing(mce: &MceSDesc, stripe_id: u32) -> (u32, u32, u32, u32) {
    let centre = (stripe_id % mce.ifm_tile.num_slots.max(1) as u32) as u32;
    let right = if mce.is_packed_boundary_x { centre } else { centre };
    let bottom = if mce.is_packed_boundary_y { centre } else { centre };
    let bottom_right = if mce.is_packed_boundary_x && mce.is_packed_boundary_y { centre } else { centre };

    let top = registers::ifm_top_slots(bottom_right, bottom, bottom).unwrap_or(0);
    let mid = registers::ifm_mid_slots(right, centre, right).unwrap_or(0);
    let bot = registers::ifm_bottom_slots(bottom_right, bottom, bottom).unwrap_or(0);
    let residual_top = mce.is_extra_ifm_stripe_at_bottom_edge as u32;
    let residual_mid = 0u32;
    let residual_bottom = mce.is_extra_ifm_stripe_at_right_edge as u32;
    let pad_config = registers::ifm_slot_pad_config(residual_top, residual_mid, residual_bottom).unwrap_or(0);
    (top, mid, bot, pad_config)
}

/// Builds the `StartMce` register payload.
pub fn build_start_mce(mce: &MceSDesc, stripe_id: u32, caps: &HardwareCapabilities) -> Result<StartMceExtraData> {
    let shape = mce_stripe_shape(mce, stripe_id);
    let ce_enables = match mce.mce_op_mode {
        MceOpMode::FullyConnected => 0,
        _ => shape.channels.min(caps.num_ces),
    };
    Ok(StartMceExtraData { ce_enables })
}
