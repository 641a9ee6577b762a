//! Per-stripe register builders (§4.2-§4.4): pure functions from a descriptor plus a stripe id to
//! the register payload the scheduler attaches to a [`crate::command::CommandVariant`].

pub mod dma;
pub mod mce;
pub mod ple;
