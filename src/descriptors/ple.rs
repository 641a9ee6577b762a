use std::collections::HashMap;

use super::{TensorSize, Tile};

/// Identity of a compiled PLE kernel. A representative subset of the original's
/// `PleKernelIds.hpp` enumeration, enough to exercise every code path named in spec.md §4.4/§4.6
/// (generic layout, MAXPOOL1D, MULTIPLICATION, and a kernel-identity-change trigger for
/// `ConfigMceif`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PleKernelId {
    Passthrough,
    Maxpool1d,
    Maxpool3x3_2_2Even,
    Maxpool3x3_2_2Odd,
    Addition,
    AdditionRescale,
    Multiplication,
    LeakyRelu,
    Downsample2x2,
}

/// Back-reference to the logical PLE operation: the operation kind plus its runtime parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PleOp {
    pub kernel_id: PleKernelId,
    pub params: HashMap<String, i32>,
}

impl PleOp {
    pub fn is_direction_x(&self) -> bool {
        self.params.get("is_direction_x").copied().unwrap_or(0) != 0
    }
    pub fn param(&self, key: &str) -> i32 {
        self.params.get(key).copied().unwrap_or(0)
    }
}

/// PLE loader descriptor: loads kernel code into the shared PLE SRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PleLDesc {
    pub ple_kernel_id: PleKernelId,
    pub sram_addr: u32,
    /// Size in bytes of the compiled kernel binary, supplied by the kernel library this crate
    /// does not generate (§2, Non-goals).
    pub code_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PleInputMode {
    MceAllOgs,
    MceOneOg,
    SramOneInput,
    SramTwoInputs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PleIfmInfo {
    pub zero_point: i16,
}

/// PLE scheduler descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PleSDesc {
    pub op: PleOp,
    pub ofm_tile: Tile,
    pub ofm_zero_point: i16,
    pub default_stripe_size: TensorSize,
    pub edge_stripe_size: TensorSize,
    pub num_stripes: TensorSize,
    pub stripe_id_strides: TensorSize,
    pub input_mode: PleInputMode,
    pub ple_kernel_id: PleKernelId,
    pub ple_kernel_sram_addr: u32,
    pub ifm_tile0: Option<Tile>,
    pub ifm_tile1: Option<Tile>,
    pub ifm_info0: Option<PleIfmInfo>,
    pub ifm_info1: Option<PleIfmInfo>,
}
