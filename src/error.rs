use thiserror::Error;

/// Crate-wide result alias, mirroring the teacher's per-module `Result<Self, XError>` habit.
pub type Result<T> = std::result::Result<T, NpuError>;

/// Every way the compiler can fail to produce a command stream.
///
/// Contract violations (register overflow, unsupported descriptor combinations) are fatal and
/// caught at the top of `Generate`; option/config/cache errors are reported to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NpuError {
    #[error("register {register}.{field} value {value} does not fit in {bits} bits")]
    RegisterOverflow {
        register: &'static str,
        field: &'static str,
        value: i64,
        bits: u8,
    },

    #[error("unsupported descriptor combination: {0}")]
    UnsupportedDescriptor(String),

    #[error("unknown backend option '{name}'")]
    UnknownOption { name: String },

    #[error("invalid value for backend option '{name}': {reason}")]
    InvalidOptionValue { name: String, reason: String },

    #[error("could not parse config file: line {line}: {text}")]
    ConfigParse { line: usize, text: String },

    #[error("cache I/O error: {0}")]
    CacheIo(String),

    #[error("cache file format error: {0}")]
    CacheFormat(String),
}

impl From<std::io::Error> for NpuError {
    fn from(e: std::io::Error) -> Self {
        NpuError::CacheIo(e.to_string())
    }
}
