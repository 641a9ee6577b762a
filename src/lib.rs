//! Compile-time command-stream generator and scheduler for a fixed-function NPU.
//!
//! Given a planner-supplied [`graph::OpGraph`] (already resolved: tile sizes, stripe counts and
//! operator fusion are decided upstream, §1), this crate walks it once with
//! [`driver::ProcessDriver`] to instantiate hardware agents and their dependencies, schedules
//! those agents onto the four firmware command queues with [`scheduler::Scheduler`], and packs
//! the result into the binary format the firmware parses ([`packager`]).
//!
//! ```text
//! OpGraph -> ProcessDriver::process -> Scheduler::schedule -> packager::pack -> Vec<u8>
//! ```

pub mod builders;
pub mod cache;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod context;
pub mod dependency;
pub mod descriptors;
pub mod driver;
pub mod error;
pub mod graph;
pub mod packager;
pub mod registers;
pub mod scheduler;

pub use capabilities::HardwareCapabilities;
pub use context::{CompileContext, DebuggingContext};
pub use error::{NpuError, Result};
pub use graph::OpGraph;

/// The packed command stream plus the per-subgraph intermediate-buffer size the cache format
/// stores alongside it (§6).
#[derive(Debug, Clone, Default)]
pub struct CompiledOpGraph {
    pub command_stream: Vec<u8>,
    pub intermediate_data_size: u32,
}

/// Compiles one subgraph's op-graph into a packed command stream.
///
/// A contract violation (register overflow, an unsupported descriptor combination) is fatal to
/// this subgraph but not to the caller: it is logged via `tracing::error!` and reported back as an
/// empty [`CompiledOpGraph`], mirroring the original backend's "a compilation miss falls back to
/// another backend, it does not abort the process" failure posture (§5/§7). Debug builds still
/// assert loudly on register overflow specifically (§1.1), since that failure mode should never
/// occur for correctly-sized descriptors and is cheapest to catch close to the source.
pub fn generate(graph: &graph::OpGraph, caps: &capabilities::HardwareCapabilities) -> CompiledOpGraph {
    match try_generate(graph, caps) {
        Ok(compiled) => compiled,
        Err(e) => {
            tracing::error!(error = %e, "command stream generation failed");
            CompiledOpGraph::default()
        }
    }
}

fn try_generate(graph: &graph::OpGraph, caps: &capabilities::HardwareCapabilities) -> Result<CompiledOpGraph> {
    let driver = driver::ProcessDriver::new();
    let compiled = driver.process(graph);

    let scheduled = match scheduler::Scheduler::new(&compiled.agents, caps).schedule() {
        Ok(scheduled) => scheduled,
        Err(e @ NpuError::RegisterOverflow { .. }) => {
            debug_assert!(false, "register overflow should be unreachable for valid descriptors: {e}");
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    let command_stream = packager::pack(&compiled.agents, &scheduled);

    // Buffer byte sizes live with the planner, not in `OpGraph` (§1, Non-goals) — the caller
    // fills this in from its own tensor-size bookkeeping before persisting to the cache (§6).
    Ok(CompiledOpGraph { command_stream, intermediate_data_size: 0 })
}
