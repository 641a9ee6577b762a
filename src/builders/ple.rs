//! PLE command builder (§4.4): the per-stripe 8x32-bit scratch register payload, with layout
//! variants for generic stripes, MAXPOOL1D and MULTIPLICATION.

use crate::command::StartPleExtraData;
use crate::descriptors::ple::{PleInputMode, PleKernelId, PleSDesc};
use crate::descriptors::{stripe_coord, stripe_size, TensorSize};
use crate::error::Result;

fn stripe_shape_and_coord(ple: &PleSDesc, stripe_id: u32) -> (TensorSize, (u32, u32, u32)) {
    let h = stripe_coord(stripe_id, ple.stripe_id_strides.height.max(1), ple.num_stripes.height.max(1));
    let w = stripe_coord(stripe_id, ple.stripe_id_strides.width.max(1), ple.num_stripes.width.max(1));
    let c = stripe_coord(stripe_id, ple.stripe_id_strides.channels.max(1), ple.num_stripes.channels.max(1));
    let shape = TensorSize {
        height: stripe_size(h, ple.num_stripes.height.max(1), ple.default_stripe_size.height, ple.edge_stripe_size.height),
        width: stripe_size(w, ple.num_stripes.width.max(1), ple.default_stripe_size.width, ple.edge_stripe_size.width),
        channels: stripe_size(c, ple.num_stripes.channels.max(1), ple.default_stripe_size.channels, ple.edge_stripe_size.channels),
    };
    (shape, (h, w, c))
}

/// `{TOP, BOTTOM, LEFT, RIGHT}` position flags for the generic `StripeInfo` layout.
const FLAG_TOP: u32 = 1 << 0;
const FLAG_BOTTOM: u32 = 1 << 1;
const FLAG_LEFT: u32 = 1 << 2;
const FLAG_RIGHT: u32 = 1 << 3;

fn dfc_addr(ple: &PleSDesc, stripe_id: u32) -> u32 {
    ple.ofm_tile.slot_addr(stripe_id) / 16
}

fn build_maxpool1d(ple: &PleSDesc, stripe_id: u32) -> StartPleExtraData {
    let (shape, _) = stripe_shape_and_coord(ple, stripe_id);
    let is_direction_x = ple.op.is_direction_x();
    let full_input_dim = if is_direction_x { ple.op.param("full_input_width") } else { ple.op.param("full_input_height") } as u32;
    let ifm_addr = ple.ifm_tile0.map(|t| t.slot_addr(stripe_id) / 16).unwrap_or(0);
    let ofm_addr = dfc_addr(ple, stripe_id);
    let pad_before = ple.op.param("pad_before") as u32;
    let pooling_size = ple.op.param("pooling_size") as u32;

    StartPleExtraData {
        scratch: [
            shape.width,
            shape.height,
            shape.channels,
            full_input_dim,
            ifm_addr,
            ofm_addr,
            pad_before,
            pooling_size,
        ],
    }
}

/// Packs two 16-bit values per register.
fn pack16(lo: i32, hi: i32) -> u32 {
    ((lo as u16 as u32)) | ((hi as u16 as u32) << 16)
}

fn build_multiplication(ple: &PleSDesc, stripe_id: u32) -> StartPleExtraData {
    let (shape, _) = stripe_shape_and_coord(ple, stripe_id);
    let ofm_addr = dfc_addr(ple, stripe_id);
    let ifm0_addr = ple.ifm_tile0.map(|t| t.slot_addr(stripe_id) / 16).unwrap_or(0);
    let ifm1_addr = ple.ifm_tile1.map(|t| t.slot_addr(stripe_id) / 16).unwrap_or(0);
    let ofm_zp = ple.ofm_zero_point as i32;
    let zp0 = ple.ifm_info0.map(|i| i.zero_point as i32).unwrap_or(0);
    let zp1 = ple.ifm_info1.map(|i| i.zero_point as i32).unwrap_or(0);
    let multiplier = ple.op.param("multiplier");
    let shift = ple.op.param("shift");

    StartPleExtraData {
        scratch: [
            pack16(shape.width as i32, shape.height as i32),
            pack16(shape.channels as i32, ofm_zp),
            pack16(multiplier, shift),
            pack16(zp0, zp1),
            ofm_addr,
            ifm0_addr,
            ifm1_addr,
            0,
        ],
    }
}

/// The generic `StripeInfo` layout: `{flags, inputs[2]{dfcAddr, zeroPoint, multiplier, shift},
/// output{dfcAddr, zeroPoint}, stripeW, stripeH, stripeD, mceOpTag}` packed into the 32-byte
/// scratch region. This is treated as a fixed ABI (§9): explicit field order, fixed widths.
fn build_generic(ple: &PleSDesc, stripe_id: u32) -> StartPleExtraData {
    let (shape, (h, w, _)) = stripe_shape_and_coord(ple, stripe_id);

    let mut flags = 0u32;
    if h == 0 {
        flags |= FLAG_TOP;
    }
    if h == ple.num_stripes.height.saturating_sub(1) {
        flags |= FLAG_BOTTOM;
    }
    if w == 0 {
        flags |= FLAG_LEFT;
    }
    if w == ple.num_stripes.width.saturating_sub(1) {
        flags |= FLAG_RIGHT;
    }

    // Splitting in height but outputting full height: zero-height edge stripes shift the OFM
    // dfcAddr by one slot.
    let zero_height_edge = shape.height == 0 && ple.num_stripes.height > 1;
    let mut ofm_dfc_addr = dfc_addr(ple, stripe_id);
    if zero_height_edge {
        ofm_dfc_addr += ple.ofm_tile.slot_size / 16;
    }

    let (input0_addr, input1_addr, mce_op_tag) = match ple.input_mode {
        PleInputMode::MceAllOgs | PleInputMode::MceOneOg => (0, 0, 1),
        PleInputMode::SramOneInput => (ple.ifm_tile0.map(|t| t.slot_addr(stripe_id) / 16).unwrap_or(0), 0, 0),
        PleInputMode::SramTwoInputs => (
            ple.ifm_tile0.map(|t| t.slot_addr(stripe_id) / 16).unwrap_or(0),
            ple.ifm_tile1.map(|t| t.slot_addr(stripe_id) / 16).unwrap_or(0),
            0,
        ),
    };

    StartPleExtraData {
        scratch: [
            flags,
            input0_addr,
            ple.ifm_info0.map(|i| i.zero_point as u32).unwrap_or(0),
            input1_addr,
            ofm_dfc_addr,
            ple.ofm_zero_point as u32,
            pack16(shape.width as i32, shape.height as i32),
            pack16(shape.channels as i32, mce_op_tag),
        ],
    }
}

/// Builds the `StartPleStripe` scratch register payload for one stripe, dispatching to the
/// kernel-specific layout.
pub fn build_start_ple(ple: &PleSDesc, stripe_id: u32) -> Result<StartPleExtraData> {
    Ok(match ple.ple_kernel_id {
        PleKernelId::Maxpool1d => build_maxpool1d(ple, stripe_id),
        PleKernelId::Multiplication => build_multiplication(ple, stripe_id),
        _ => build_generic(ple, stripe_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::Tile;

    fn sample_ple(kernel: PleKernelId) -> PleSDesc {
        PleSDesc {
            op: crate::descriptors::ple::PleOp { kernel_id: kernel, params: Default::default() },
            ofm_tile: Tile { base_addr: 0, num_slots: 1, slot_size: 256 },
            ofm_zero_point: 0,
            default_stripe_size: TensorSize::new(8, 8, 16),
            edge_stripe_size: TensorSize::new(8, 8, 16),
            num_stripes: TensorSize::new(1, 1, 1),
            stripe_id_strides: TensorSize::new(1, 1, 1),
            input_mode: PleInputMode::SramOneInput,
            ple_kernel_id: kernel,
            ple_kernel_sram_addr: 0,
            ifm_tile0: Some(Tile { base_addr: 0x1000, num_slots: 1, slot_size: 256 }),
            ifm_tile1: None,
            ifm_info0: None,
            ifm_info1: None,
        }
    }

    #[test]
    fn generic_layout_flags_single_stripe_as_all_edges() {
        let ple = sample_ple(PleKernelId::Passthrough);
        let payload = build_start_ple(&ple, 0).unwrap();
        assert_eq!(payload.scratch[0], FLAG_TOP | FLAG_BOTTOM | FLAG_LEFT | FLAG_RIGHT);
    }

    #[test]
    fn maxpool1d_layout_uses_scratch_slots_for_dims() {
        let mut ple = sample_ple(PleKernelId::Maxpool1d);
        ple.op.params.insert("pooling_size".to_string(), 3);
        let payload = build_start_ple(&ple, 0).unwrap();
        assert_eq!(payload.scratch[2], 16); // stripeC
        assert_eq!(payload.scratch[7], 3); // poolingSize
    }
}
