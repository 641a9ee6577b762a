//! Configuration surfaces (§1.3, §6): the `BackendOptions` name→value channel passed in per
//! compilation call, and the env-pointed `KEY = VALUE` config file, both grounded in
//! `EthosNConfig.cpp`'s regex-based line grammar and `EthosNSubgraphViewConverter.cpp`'s
//! exhaustive option-name dispatch.

use std::collections::HashMap;
use std::fmt;

use crate::error::{NpuError, Result};

/// The debug-dump verbosity carried in [`crate::context::CompileContext`], mirroring the
/// original's `CompilationOptions::DebugLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugLevel {
    #[default]
    None,
    Medium,
    High,
}

/// One backend option value (§6: `SaveCachedNetwork`, `CachedNetworkFilePath`, `Device`,
/// `DisableWinograd`, `StrictPrecision`).
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Resolved backend options after validating every recognised name (§6).
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub save_cached_network: bool,
    pub cached_network_file_path: Option<String>,
    pub device: Option<String>,
    pub disable_winograd: bool,
    pub strict_precision: bool,
}

impl BackendOptions {
    /// Validates a raw `name -> value` channel against the fixed set of recognised option names,
    /// matching the original's exhaustive `if (option.GetName() == ...)` chain.
    pub fn from_raw(raw: &HashMap<String, OptionValue>) -> Result<Self> {
        let mut opts = BackendOptions::default();
        for (name, value) in raw {
            match name.as_str() {
                "SaveCachedNetwork" => opts.save_cached_network = expect_bool(name, value)?,
                "CachedNetworkFilePath" => {
                    let s = expect_str(name, value)?;
                    if s.is_empty() {
                        return Err(NpuError::InvalidOptionValue { name: name.clone(), reason: "must not be empty".into() });
                    }
                    opts.cached_network_file_path = Some(s.to_string());
                }
                "Device" => opts.device = Some(expect_str(name, value)?.to_string()),
                "DisableWinograd" => opts.disable_winograd = expect_bool(name, value)?,
                "StrictPrecision" => opts.strict_precision = expect_bool(name, value)?,
                _ => return Err(NpuError::UnknownOption { name: name.clone() }),
            }
        }
        Ok(opts)
    }
}

fn expect_bool(name: &str, value: &OptionValue) -> Result<bool> {
    match value {
        OptionValue::Bool(b) => Ok(*b),
        OptionValue::Str(_) => Err(NpuError::InvalidOptionValue { name: name.to_string(), reason: "expected a bool".into() }),
    }
}

fn expect_str<'a>(name: &str, value: &'a OptionValue) -> Result<&'a str> {
    match value {
        OptionValue::Str(s) => Ok(s.as_str()),
        OptionValue::Bool(_) => Err(NpuError::InvalidOptionValue { name: name.to_string(), reason: "expected a string".into() }),
    }
}

/// The environment variable naming the `KEY = VALUE` config file, kept from the original's
/// `ARMNN_ETHOSN_BACKEND_CONFIG_FILE`.
pub const CONFIG_FILE_ENV: &str = "NPU_CMDSTREAM_CONFIG_FILE";

/// Keys recognised inside the config file (§1.3), a subset of `EthosNConfig.cpp`'s scoped to a
/// pure command-stream compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub perf_only: bool,
    pub dump_debug_files: DebugLevel,
    pub dump_ram: bool,
    pub compiler_algorithm: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { perf_only: false, dump_debug_files: DebugLevel::None, dump_ram: false, compiler_algorithm: None }
    }
}

fn parse_bool(value: &str, line: usize, text: &str) -> Result<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(NpuError::ConfigParse { line, text: text.to_string() }),
    }
}

/// Parses the `KEY = VALUE` grammar: blank lines and `#`-prefixed lines are comments, everything
/// else must match `KEY = VALUE` with `KEY` an upper-snake-case identifier.
pub fn parse_backend_config(contents: &str) -> Result<BackendConfig> {
    let mut config = BackendConfig::default();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| NpuError::ConfigParse { line: line_no, text: raw_line.to_string() })?;
        let key = key.trim();
        let value = value.split('#').next().unwrap_or("").trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()) {
            return Err(NpuError::ConfigParse { line: line_no, text: raw_line.to_string() });
        }
        match key {
            "PERF_ONLY" => config.perf_only = parse_bool(value, line_no, raw_line)?,
            "DUMP_DEBUG_FILES" => {
                config.dump_debug_files = match value {
                    "None" | "0" => DebugLevel::None,
                    "Medium" => DebugLevel::Medium,
                    "High" | "1" => DebugLevel::High,
                    _ => return Err(NpuError::ConfigParse { line: line_no, text: raw_line.to_string() }),
                };
            }
            "DUMP_RAM" => config.dump_ram = parse_bool(value, line_no, raw_line)?,
            "COMPILER_ALGORITHM" => config.compiler_algorithm = Some(value.to_string()),
            _ => return Err(NpuError::ConfigParse { line: line_no, text: raw_line.to_string() }),
        }
    }
    Ok(config)
}

/// Reads [`CONFIG_FILE_ENV`] and parses the file it names, if set. Absence of the variable is not
/// an error — the original's `ReadEthosNConfig` likewise falls back to defaults silently.
pub fn read_backend_config() -> Result<BackendConfig> {
    match std::env::var(CONFIG_FILE_ENV) {
        Ok(path) => {
            let contents = std::fs::read_to_string(&path)?;
            parse_backend_config(&contents)
        }
        Err(_) => Ok(BackendConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognised_keys_parse_and_unknown_keys_error() {
        let parsed = parse_backend_config("PERF_ONLY = 1\n# a comment\n\nDUMP_DEBUG_FILES = Medium\n").unwrap();
        assert!(parsed.perf_only);
        assert_eq!(parsed.dump_debug_files, DebugLevel::Medium);

        let err = parse_backend_config("NOT_A_KEY = 1\n").unwrap_err();
        assert!(matches!(err, NpuError::ConfigParse { line: 1, .. }));
    }

    #[test]
    fn unknown_backend_option_name_is_rejected() {
        let mut raw = HashMap::new();
        raw.insert("Bogus".to_string(), OptionValue::Bool(true));
        let err = BackendOptions::from_raw(&raw).unwrap_err();
        assert!(matches!(err, NpuError::UnknownOption { .. }));
    }

    #[test]
    fn empty_cached_network_path_is_rejected() {
        let mut raw = HashMap::new();
        raw.insert("CachedNetworkFilePath".to_string(), OptionValue::Str(String::new()));
        let err = BackendOptions::from_raw(&raw).unwrap_err();
        assert!(matches!(err, NpuError::InvalidOptionValue { .. }));
    }
}
