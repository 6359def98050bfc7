use std::path::PathBuf;

/// Structured error kinds surfaced at module boundaries. Internal `?`-propagation
/// still flows through `anyhow::Result` inside function bodies; this enum is what
/// callers match on to decide how to react (retry with `force`, degrade gracefully,
/// surface to the user, etc).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to read vault file {path}: {source}")]
    VaultRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index build/merge failed: {detail}")]
    Index { detail: String },

    #[error(
        "storage directory mismatch: '{storage_dir}' holds an index for vault '{found_vault}', \
         but the engine is configured for vault '{expected_vault}'. Pass force=true to overwrite."
    )]
    StorageMismatch {
        expected_vault: PathBuf,
        found_vault: PathBuf,
        storage_dir: PathBuf,
    },

    #[error("encoder failure: {detail}")]
    Encoder { detail: String },

    #[error("{which} index unavailable")]
    IndexUnavailable { which: &'static str },

    #[error("query exceeded its deadline")]
    Deadline,

    #[error("invalid configuration: {detail}")]
    Config { detail: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
