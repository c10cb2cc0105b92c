//! Error types for the replay binary.

use std::path::PathBuf;

/// Top-level error for the replay binary.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: rangerlink_core::ConfigError,
    },

    /// The snapshot store could not be opened or read.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: rangerlink_store::StoreError,
    },

    /// A scripted tick failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: rangerlink_core::TickError,
    },

    /// The script file could not be read.
    #[error("failed to read script {}: {source}", path.display())]
    Io {
        /// Script path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The script is not valid YAML or JSON.
    #[error("failed to parse script: {source}")]
    Script {
        /// The underlying parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// The final snapshot could not be rendered.
    #[error("failed to render snapshot: {source}")]
    Render {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The command line was not understood.
    #[error("usage: rangerlink-replay <script.yaml> [rangerlink.yaml]")]
    Usage,
}
