//! Per-compilation context (§9: "no global mutable state" design note — the original's
//! `EthosNCachingService` singleton is replaced here by a context value the caller owns and
//! threads through explicitly) plus the debug-dump controls (§2 supplementary feature).

use std::collections::BTreeMap;

use crate::cache::CachedNetwork;
use crate::capabilities::HardwareCapabilities;
use crate::config::{BackendConfig, BackendOptions, DebugLevel};

/// Debug-dump controls threaded alongside [`CompileContext`]. When `dot` rendering is requested
/// and the crate feature is disabled, callers silently get no output rather than an error — this
/// mirrors the original treating missing debug tooling as best-effort.
#[derive(Debug, Clone, Default)]
pub struct DebuggingContext {
    pub level: DebugLevel,
    pub dump_ram: bool,
}

impl DebuggingContext {
    pub fn new(level: DebugLevel, dump_ram: bool) -> Self {
        Self { level, dump_ram }
    }

    pub fn should_dump(&self, at_least: DebugLevel) -> bool {
        rank(self.level) >= rank(at_least)
    }
}

fn rank(level: DebugLevel) -> u8 {
    match level {
        DebugLevel::None => 0,
        DebugLevel::Medium => 1,
        DebugLevel::High => 2,
    }
}

/// Everything a single compilation call needs: fixed hardware parameters, validated per-call
/// options, file-level config, and an in-memory cache of previously compiled subgraphs (§6).
///
/// Owned by the caller and passed by reference — there is deliberately no global/static instance,
/// unlike the original's `EthosNCachingService::GetInstance()`.
pub struct CompileContext {
    pub capabilities: HardwareCapabilities,
    pub options: BackendOptions,
    pub config: BackendConfig,
    pub debugging: DebuggingContext,
    cached_networks: BTreeMap<u32, CachedNetwork>,
}

impl CompileContext {
    pub fn new(capabilities: HardwareCapabilities, options: BackendOptions, config: BackendConfig) -> Self {
        let debugging = DebuggingContext::new(config.dump_debug_files, config.dump_ram);
        Self { capabilities, options, config, debugging, cached_networks: BTreeMap::new() }
    }

    /// True when `SaveCachedNetwork` and a file path were both supplied (§6's `IsSaving`).
    pub fn is_saving(&self) -> bool {
        self.options.save_cached_network && self.options.cached_network_file_path.is_some()
    }

    /// True when a file path was supplied without the save flag (§6's `IsLoading`).
    pub fn is_loading(&self) -> bool {
        !self.options.save_cached_network && self.options.cached_network_file_path.is_some()
    }

    pub fn cached_network(&self, subgraph_idx: u32) -> Option<&CachedNetwork> {
        self.cached_networks.get(&subgraph_idx)
    }

    pub fn add_cached_network(&mut self, subgraph_idx: u32, network: CachedNetwork) {
        self.cached_networks.insert(subgraph_idx, network);
    }

    pub fn num_cached_networks(&self) -> usize {
        self.cached_networks.len()
    }

    /// Loads the on-disk cache named by `CachedNetworkFilePath`, populating the in-memory table.
    /// A no-op (success) when not in loading mode, matching the original's `LoadCachedSubgraphs`
    /// early-return.
    pub fn load_cache(&mut self) -> crate::error::Result<()> {
        if !self.is_loading() {
            return Ok(());
        }
        let path = self.options.cached_network_file_path.as_ref().expect("checked by is_loading");
        let file = std::fs::File::open(path)?;
        self.cached_networks = crate::cache::load(file)?;
        Ok(())
    }

    /// Saves the in-memory cache to `CachedNetworkFilePath` and clears it, matching the
    /// original's `Save()` + `Reset()` pairing.
    pub fn save_cache(&mut self) -> crate::error::Result<()> {
        if !self.is_saving() {
            return Ok(());
        }
        let path = self.options.cached_network_file_path.as_ref().expect("checked by is_saving");
        let file = std::fs::File::create(path)?;
        crate::cache::save(file, &self.cached_networks)?;
        self.cached_networks.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CompileContext {
        CompileContext::new(HardwareCapabilities::reference(), BackendOptions::default(), BackendConfig::default())
    }

    #[test]
    fn neither_saving_nor_loading_without_a_file_path() {
        let context = ctx();
        assert!(!context.is_saving());
        assert!(!context.is_loading());
    }

    #[test]
    fn save_flag_plus_path_is_saving_only() {
        let mut context = ctx();
        context.options.save_cached_network = true;
        context.options.cached_network_file_path = Some("/tmp/whatever.bin".into());
        assert!(context.is_saving());
        assert!(!context.is_loading());
    }

    #[test]
    fn path_without_save_flag_is_loading_only() {
        let mut context = ctx();
        context.options.cached_network_file_path = Some("/tmp/whatever.bin".into());
        assert!(!context.is_saving());
        assert!(context.is_loading());
    }

    #[test]
    fn debugging_context_level_ordering() {
        let debugging = DebuggingContext::new(DebugLevel::Medium, false);
        assert!(debugging.should_dump(DebugLevel::None));
        assert!(debugging.should_dump(DebugLevel::Medium));
        assert!(!debugging.should_dump(DebugLevel::High));
    }
}
