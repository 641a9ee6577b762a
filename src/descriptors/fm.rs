use super::{SupertensorSize, TensorSize, Tile};

/// Storage layout of a feature map tensor. Cell shapes: NHWC 1x1x1, NHWCB 8x8x16,
/// FCAF_DEEP 8x8x32, FCAF_WIDE 8x16x16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmsDataType {
    Nhwc,
    Nhwcb,
    FcafDeep,
    FcafWide,
}

impl FmsDataType {
    pub fn is_fcaf(self) -> bool {
        matches!(self, FmsDataType::FcafDeep | FmsDataType::FcafWide)
    }

    /// Cell shape `{height, width, channels}` in elements.
    pub fn cell_shape(self) -> (u32, u32, u32) {
        match self {
            FmsDataType::Nhwc => (1, 1, 1),
            FmsDataType::Nhwcb => (8, 8, 16),
            FmsDataType::FcafDeep => (8, 8, 32),
            FmsDataType::FcafWide => (8, 16, 16),
        }
    }
}

/// FCAF compression info, required when `data_type` is one of the FCAF variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FcafInfo {
    pub zero_point: i16,
    pub signed_activation: bool,
}

/// Feature-map streamer descriptor, common to IFM and OFM agents.
#[derive(Debug, Clone, PartialEq)]
pub struct FmSDesc {
    pub buffer_id: u16,
    pub dram_offset: u32,
    pub data_type: FmsDataType,
    pub fcaf_info: Option<FcafInfo>,
    pub tile: Tile,
    pub default_stripe_size: TensorSize,
    pub edge_stripe_size: TensorSize,
    pub supertensor_size_in_cells: SupertensorSize,
    pub num_stripes: TensorSize,
    pub stripe_id_strides: TensorSize,
}

impl FmSDesc {
    pub fn validate(&self) -> Result<(), String> {
        if self.data_type.is_fcaf() && self.fcaf_info.is_none() {
            return Err("fcaf_info is required for FCAF data types".to_string());
        }
        Ok(())
    }
}

/// How many elements of the neighbouring stripe on each side are packed into the same SRAM slot
/// as the central stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedBoundaryThickness {
    pub left: u8,
    pub top: u8,
    pub right: u8,
    pub bottom: u8,
}

impl PackedBoundaryThickness {
    pub fn any_non_zero(&self) -> bool {
        self.left > 0 || self.top > 0 || self.right > 0 || self.bottom > 0
    }
}

/// IFM streamer descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct IfmSDesc {
    pub fm_data: FmSDesc,
    pub packed_boundary_thickness: PackedBoundaryThickness,
    /// Valid-padding optimisation: an extra stripe of packed boundary data is needed on the
    /// right/bottom edge even though no corresponding central stripe is loaded there.
    pub is_extra_packed_boundary_data_on_right_edge: bool,
    pub is_extra_packed_boundary_data_on_bottom_edge: bool,
}

impl IfmSDesc {
    pub fn validate(&self) -> Result<(), String> {
        self.fm_data.validate()?;
        if self.packed_boundary_thickness.any_non_zero() && self.fm_data.data_type != FmsDataType::Nhwcb {
            return Err("packed boundary data requires NHWCB".to_string());
        }
        Ok(())
    }
}

/// OFM streamer descriptor: identical shape to the common FM descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct OfmSDesc {
    pub fm_data: FmSDesc,
}
