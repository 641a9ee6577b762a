//! Bit-exact packing of firmware registers.
//!
//! Each register is a 32-bit value divided into named bit fields. Firmware treats these as a
//! hard ABI, so every field is packed through [`field()`]/[`field_minus_one()`]/[`field_shifted()`],
//! which assert the value fits before shifting it into place. Per spec.md §9's design note, we
//! generate the shift/mask logic from one declaration per register via [`define_register!`]
//! rather than relying on bitfield-in-union tricks.

use crate::error::{NpuError, Result};

/// Packs `value` into `bits` bits at `shift`, returning an error if it overflows.
pub fn field(register: &'static str, name: &'static str, value: u32, bits: u8, shift: u8) -> Result<u32> {
    let max = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
    if value > max {
        return Err(NpuError::RegisterOverflow {
            register,
            field: name,
            value: value as i64,
            bits,
        });
    }
    Ok(value << shift)
}

/// Packs a signed `value` into `bits` bits (two's complement) at `shift`.
pub fn field_signed(register: &'static str, name: &'static str, value: i32, bits: u8, shift: u8) -> Result<u32> {
    let lo = -(1i32 << (bits - 1));
    let hi = (1i32 << (bits - 1)) - 1;
    if value < lo || value > hi {
        return Err(NpuError::RegisterOverflow {
            register,
            field: name,
            value: value as i64,
            bits,
        });
    }
    let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
    Ok((value as u32 & mask) << shift)
}

/// Packs `value - 1` into `bits` bits at `shift` (the common "stored as N-1" hardware encoding,
/// used e.g. for stripe counts where zero stripes is never a valid value).
pub fn field_minus_one(register: &'static str, name: &'static str, value: u32, bits: u8, shift: u8) -> Result<u32> {
    if value == 0 {
        return Err(NpuError::RegisterOverflow {
            register,
            field: name,
            value: 0,
            bits,
        });
    }
    field(register, name, value - 1, bits, shift)
}

/// Packs `value >> shift_amount` into `bits` bits at `shift` (the SRAM-address-is-stored->>4
/// encoding).
pub fn field_shifted(
    register: &'static str,
    name: &'static str,
    value: u32,
    shift_amount: u8,
    bits: u8,
    shift: u8,
) -> Result<u32> {
    debug_assert_eq!(value & ((1u32 << shift_amount) - 1), 0, "{name} not aligned");
    field(register, name, value >> shift_amount, bits, shift)
}

/// Declares a register as a free function `$name(fields...) -> Result<u32>` which ORs together
/// the packed fields. Keeping this as a macro (rather than a bitfield crate) keeps every field's
/// bit width and shift visible at the declaration site, which is what gets diffed against the
/// firmware ABI during review.
macro_rules! define_register {
    ($name:ident { $($field:ident : $bits:literal @ $shift:literal),+ $(,)? }) => {
        #[allow(clippy::too_many_arguments)]
        pub fn $name($($field: u32),+) -> $crate::error::Result<u32> {
            let reg_name: &'static str = stringify!($name);
            let mut packed: u32 = 0;
            $(
                packed |= $crate::registers::field(reg_name, stringify!($field), $field, $bits, $shift)?;
            )+
            Ok(packed)
        }
    };
}

define_register! {
    sram_addr {
        addr_div16: 15 @ 0,
    }
}

define_register! {
    dma_channel {
        channel_id: 3 @ 0,
    }
}

define_register! {
    dma_emcs {
        emc_mask: 16 @ 0,
    }
}

/// `dma_rd_cmd_r`/`dma_wr_cmd_r`: both directions share this layout, just `id`/`format` (§4.1).
define_register! {
    dma_cmd {
        id: 3 @ 0,
        format: 3 @ 3,
    }
}

/// `dma_stride0_r::inner_stride` is a full 32-bit, `-1`-encoded field; likewise stride1-3 and
/// `dma_total_bytes_r::total_bytes`. These can't go through `define_register!` since it only packs
/// plain fields, so they're written out by hand.
pub fn dma_stride0(inner_stride: u32) -> Result<u32> {
    field_minus_one("dma_stride0", "inner_stride", inner_stride, 32, 0)
}
pub fn dma_stride1(outer_stride: u32) -> Result<u32> {
    field_minus_one("dma_stride1", "outer_stride", outer_stride, 32, 0)
}
pub fn dma_stride2(extra_stride: u32) -> Result<u32> {
    field_minus_one("dma_stride2", "extra_stride", extra_stride, 32, 0)
}
pub fn dma_stride3(stride3: u32) -> Result<u32> {
    field_minus_one("dma_stride3", "stride3", stride3, 32, 0)
}

define_register! {
    dma_sram_stride {
        sram_stride: 20 @ 0,
    }
}

pub fn dma_total_bytes(total_bytes: u32) -> Result<u32> {
    field_minus_one("dma_total_bytes", "total_bytes", total_bytes, 32, 0)
}

/// `dma_channels_r::channels`: a 16-bit, `-1`-encoded field set only on the shared feature-map DMA
/// path (`GenerateDmaCommandCommon` in the original) — never for weight-streaming or PLE-code-load
/// DMA commands.
pub fn dma_channels(channels: u32) -> Result<u32> {
    field_minus_one("dma_channels", "channels", channels, 16, 0)
}

define_register! {
    dma_comp_config0 {
        zero_point: 8 @ 0,
        signed_activation: 1 @ 8,
    }
}

/// `ce_control_r` (§4.1): `ifm_pad_n_active` is `-1`-encoded like the rest of the -1 fields above;
/// everything else is a plain field. Mixed encoding means this can't go through
/// `define_register!`, which only packs plain fields.
#[allow(clippy::too_many_arguments)]
pub fn ce_control(
    ifm_pad_n_active: u32,
    wide_mul_mode: u32,
    resampling_mode: u32,
    horiz_reinterleave_enable: u32,
    vert_reinterleave_enable: u32,
    upsample_2x_odd_width_enable: u32,
    upsample_2x_odd_height_enable: u32,
    wit_broadcast_mode: u32,
    signed_ifm_mode: u32,
    winograd_enable: u32,
    relu_enable: u32,
    ofm_bypass_enable: u32,
    mac_acc_clr_disable: u32,
    mac_acc_out_dis: u32,
    output_ofm_data_type: u32,
) -> Result<u32> {
    let mut packed = field_minus_one("ce_control", "ifm_pad_n_active", ifm_pad_n_active, 4, 0)?;
    packed |= field("ce_control", "wide_mul_mode", wide_mul_mode, 2, 4)?;
    packed |= field("ce_control", "resampling_mode", resampling_mode, 2, 6)?;
    packed |= field("ce_control", "horiz_reinterleave_enable", horiz_reinterleave_enable, 1, 8)?;
    packed |= field("ce_control", "vert_reinterleave_enable", vert_reinterleave_enable, 1, 9)?;
    packed |= field("ce_control", "upsample_2x_odd_width_enable", upsample_2x_odd_width_enable, 1, 10)?;
    packed |= field("ce_control", "upsample_2x_odd_height_enable", upsample_2x_odd_height_enable, 1, 11)?;
    packed |= field("ce_control", "wit_broadcast_mode", wit_broadcast_mode, 2, 13)?;
    packed |= field("ce_control", "signed_ifm_mode", signed_ifm_mode, 1, 15)?;
    packed |= field("ce_control", "winograd_enable", winograd_enable, 1, 16)?;
    packed |= field("ce_control", "relu_enable", relu_enable, 1, 17)?;
    packed |= field("ce_control", "ofm_bypass_enable", ofm_bypass_enable, 1, 18)?;
    packed |= field("ce_control", "mac_acc_clr_disable", mac_acc_clr_disable, 1, 19)?;
    packed |= field("ce_control", "mac_acc_out_dis", mac_acc_out_dis, 1, 20)?;
    packed |= field("ce_control", "output_ofm_data_type", output_ofm_data_type, 2, 21)?;
    Ok(packed)
}

define_register! {
    wide_kernel_control {
        wide_kernel_enable: 1 @ 0,
    }
}

define_register! {
    wide_kernel_offset {
        delta_width: 4 @ 0,
        delta_height: 4 @ 4,
        filter_offset_w: 4 @ 8,
        filter_offset_h: 4 @ 12,
    }
}

define_register! {
    ifm_zero_point {
        zero_point: 9 @ 0,
    }
}

define_register! {
    ifm_default_slot_size {
        width: 8 @ 0,
        height: 8 @ 8,
    }
}

define_register! {
    ifm_slot_stride {
        stride: 20 @ 0,
    }
}

define_register! {
    ifm_row_stride {
        stride: 20 @ 0,
    }
}

define_register! {
    ifm_config1 {
        row_stride: 20 @ 0,
        group_stride: 8 @ 20,
    }
}

define_register! {
    ifm_config2 {
        num_ifm_local: 8 @ 0,
    }
}

define_register! {
    ifm_pad {
        left_pad: 4 @ 0,
        top_pad: 4 @ 4,
        delta_width: 4 @ 8,
        delta_height: 4 @ 12,
    }
}

define_register! {
    ifm_top_slots {
        top_left: 4 @ 0,
        top_centre: 4 @ 4,
        top_right: 4 @ 8,
    }
}
define_register! {
    ifm_mid_slots {
        mid_left: 4 @ 0,
        mid_centre: 4 @ 4,
        mid_right: 4 @ 8,
    }
}
define_register! {
    ifm_bottom_slots {
        bottom_left: 4 @ 0,
        bottom_centre: 4 @ 4,
        bottom_right: 4 @ 8,
    }
}

define_register! {
    ifm_slot_pad_config {
        residual_top: 1 @ 0,
        residual_mid: 1 @ 1,
        residual_bottom: 1 @ 2,
    }
}

define_register! {
    depthwise_control {
        num_ifms_per_ofm: 5 @ 0,
    }
}

define_register! {
    filter {
        filter_width: 4 @ 0,
        filter_height: 4 @ 4,
        filter_mode: 2 @ 8,
    }
}

define_register! {
    mul_enable {
        mask: 16 @ 0,
    }
}

define_register! {
    weight_base_addr {
        addr_div16: 15 @ 0,
    }
}

define_register! {
    ple_mceif_config {
        num_bufs: 8 @ 0,
        buf_size: 8 @ 8,
    }
}

define_register! {
    activation_config {
        min: 16 @ 0,
        max: 16 @ 16,
    }
}

define_register! {
    stripe_block_config {
        block_width: 8 @ 0,
        block_height: 8 @ 8,
        bypass_half_patch: 1 @ 16,
        mceif_shuffle_pattern: 2 @ 17,
    }
}

define_register! {
    ofm_stripe_size {
        width: 8 @ 0,
        height: 8 @ 8,
        channels: 12 @ 16,
    }
}

define_register! {
    ofm_config {
        num_ofm: 12 @ 0,
    }
}

/// `mceif_shuffle_pattern` enumerated values (§4.3: always `FLIPPED_N` in this generator).
pub const MCEIF_SHUFFLE_PATTERN_FLIPPED_N: u32 = 0b01;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sram_addr_packs_shifted_value() {
        let v = sram_addr(0x1000 >> 4).unwrap();
        assert_eq!(v, 0x100);
    }

    #[test]
    fn field_overflow_is_rejected() {
        let err = field("REG", "f", 1 << 5, 5, 0).unwrap_err();
        assert!(matches!(err, NpuError::RegisterOverflow { .. }));
    }

    #[test]
    fn field_minus_one_rejects_zero() {
        assert!(field_minus_one("REG", "f", 0, 4, 0).is_err());
        assert_eq!(field_minus_one("REG", "f", 1, 4, 0).unwrap(), 0);
    }

    #[test]
    fn activation_config_packs_both_halves() {
        let v = activation_config(10, 200).unwrap();
        assert_eq!(v & 0xFFFF, 10);
        assert_eq!((v >> 16) & 0xFFFF, 200);
    }

    #[test]
    fn field_signed_rejects_out_of_range() {
        assert!(field_signed("REG", "f", -129, 8, 0).is_err());
        assert!(field_signed("REG", "f", 127, 8, 0).is_ok());
    }
}
