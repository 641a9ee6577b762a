use super::{TensorSize, Tile};
use super::ple::PleKernelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MceOpMode {
    Conv,
    Depthwise,
    FullyConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MceAlgorithm {
    Direct,
    Winograd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsampleType {
    Off,
    Transpose,
    Nearest,
    Bilinear,
}

/// Which edge of the upsampled output has an odd extra row/column (§4.3 CE_CONTROL
/// `upsample_odd_width/height`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsampleEdgeMode {
    pub odd_row: bool,
    pub odd_col: bool,
}

/// Per-submap filter geometry and IFM padding/delta (one of up to 4, for strided convolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IfmPadDelta {
    pub filter_shape: [u8; 4],
    pub padding: [u8; 4],
    pub ifm_delta_default: [u8; 4],
    pub ifm_delta_one_from_edge: [u8; 4],
    pub ifm_delta_edge: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReluActivation {
    pub min: i32,
    pub max: i32,
}

/// MCE scheduler descriptor (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct MceSDesc {
    pub ifm_tile: Tile,
    pub wgt_tile: Tile,
    pub block_size: (u32, u32),
    pub mce_op_mode: MceOpMode,
    pub ple_kernel_id: PleKernelId,
    pub submaps: [IfmPadDelta; 4],
    pub num_stripes: TensorSize,
    pub stripe_id_strides: TensorSize,
    pub default_stripe_size: TensorSize,
    pub edge_stripe_size: TensorSize,
    pub conv_stride_xy: (u8, u8),
    pub ifm_zero_point: i16,
    pub is_ifm_signed: bool,
    pub is_ofm_signed: bool,
    pub algorithm: MceAlgorithm,
    pub upsample_type: UpsampleType,
    pub upsample_edge_mode: UpsampleEdgeMode,
    pub ifm_stripe_shape_default: (u32, u32),
    pub ifm_stripe_shape_edge: (u32, u32),
    pub relu_activ: ReluActivation,
    pub is_packed_boundary_x: bool,
    pub is_packed_boundary_y: bool,
    pub is_wide_filter: bool,
    pub is_extra_ifm_stripe_at_right_edge: bool,
    pub is_extra_ifm_stripe_at_bottom_edge: bool,
}

impl MceOpMode {
    /// FILTER_NXM / DEPTHWISE_SEPARABLE / VECTOR_PRODUCT encoding used in the `FILTER` register.
    pub fn filter_mode_encoding(self) -> u32 {
        match self {
            MceOpMode::Conv => 0,
            MceOpMode::Depthwise => 1,
            MceOpMode::FullyConnected => 2,
        }
    }
}

impl UpsampleType {
    pub fn resampling_mode_encoding(self) -> u32 {
        match self {
            UpsampleType::Off => 0,
            UpsampleType::Nearest => 1,
            UpsampleType::Bilinear => 2,
            UpsampleType::Transpose => 3,
        }
    }
}
