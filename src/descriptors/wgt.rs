use super::Tile;

/// One `{offset, size}` entry produced by the (external) weight encoder for one
/// `(ifmChannel, ofmChannel)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeightsMetadataEntry {
    pub offset: u32,
    pub size: u32,
}

/// Number of stripes along each weight-streaming work dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WgtSWorkSize {
    pub ifm_channels: u32,
    pub ofm_channels: u32,
}

/// Weight streamer descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct WgtSDesc {
    pub buffer_id: u16,
    pub metadata: Vec<WeightsMetadataEntry>,
    pub tile: Tile,
    pub num_stripes: WgtSWorkSize,
    pub stripe_id_strides: WgtSWorkSize,
}

impl WgtSDesc {
    /// The coordinate along `(ifmChannels, ofmChannels)` for a 1-D stripe id.
    pub fn stripe_coord(&self, stripe_id: u32) -> (u32, u32) {
        let ifm = (stripe_id / self.stripe_id_strides.ifm_channels.max(1)) % self.num_stripes.ifm_channels.max(1);
        let ofm = (stripe_id / self.stripe_id_strides.ofm_channels.max(1)) % self.num_stripes.ofm_channels.max(1);
        (ifm, ofm)
    }
}
