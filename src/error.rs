//! Error types for ugenflow.
//!
//! Structural errors (bad defs, unknown types, bad paths) are raised at compile or
//! mutation time. The render loop itself never returns errors.

use thiserror::Error;

/// Error type for graph compilation, mutation and configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown unit generator type: {0}")]
    UnknownUGen(String),

    #[error("Unit generator def is missing its type name: {0}")]
    MissingUGenType(String),

    #[error("Invalid unit generator def: {0}")]
    InvalidDef(String),

    #[error("Unknown rate: {0}")]
    UnknownRate(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Path '{0}' resolves through a value that is not a container")]
    PathThroughNonContainer(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("No free {0} buses left")]
    BusPoolExhausted(String),

    #[error("Unknown synth: {0}")]
    UnknownSynth(String),

    #[error("Failed to load buffer '{id}': {msg}")]
    BufferLoad { id: String, msg: String },

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownUGen("wobble".to_string());
        assert_eq!(format!("{}", err), "Unknown unit generator type: wobble");

        let err = Error::BufferLoad {
            id: "drums".to_string(),
            msg: "truncated header".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Failed to load buffer 'drums': truncated header"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
