//! Error types for the KCMC ecosystem
//!
//! Each stage has its own error enum so callers can branch on the failure
//! class (a malformed string is never retried, a failed regeneration may be,
//! a failed heuristic can fall back to the unfiltered instance). [`KcmcError`]
//! unifies them at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use kcmc_core::{Instance, KcmcResult};
//!
//! fn load(raw: &str) -> KcmcResult<Instance> {
//!     let instance = Instance::parse(raw)?;
//!     Ok(instance)
//! }
//! ```

use crate::NodeKind;
use thiserror::Error;

/// Malformed serialized instance. Always fatal to the current parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("instance must start with the tag <KCMC;>")]
    MissingHeader,

    #[error("instance must end with the tag <;END>")]
    MissingTerminator,

    /// Non-integer or non-positive preamble field.
    #[error("invalid instance preamble: field `{field}` has value `{token}`")]
    InvalidPreamble { field: &'static str, token: String },

    /// A data section appeared before any tag, or a word is not a known tag.
    #[error("invalid tag parsing at section {position}: `{token}`")]
    UnknownToken { position: usize, token: String },

    /// An edge line is not two non-negative integers.
    #[error("malformed edge at section {position}: `{token}`")]
    MalformedEdge { position: usize, token: String },

    #[error("self-directed communication edge on sensor {sensor} is not supported")]
    SelfLoop { sensor: u32 },

    #[error("{kind} id {id} is out of range (declared {limit})")]
    OutOfRange { kind: NodeKind, id: u32, limit: u32 },

    /// Declared count differs from the ids that actually carry edges.
    #[error("invalid number of {kind}s: declared {declared}, found {found} with edges")]
    CountMismatch {
        kind: NodeKind,
        declared: u32,
        found: u32,
    },
}

/// Zero-edge recovery through the topology collaborator did not yield a usable instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyRegenerationError {
    #[error("instance `{key}` carries no edges and no topology source is configured")]
    NotConfigured { key: String },

    #[error("topology generator failed for `{key}`: {message}")]
    Generator { key: String, message: String },

    #[error("topology generator returned {len} bytes for `{key}`")]
    ShortOutput { key: String, len: usize },

    #[error("regenerated instance for `{key}` still carries no edges")]
    EmptyTopology { key: String },

    #[error("regenerated instance key `{found}` does not match requested `{expected}`")]
    KeyMismatch { expected: String, found: String },
}

/// Heuristic preprocessing failed. Fatal to the preprocessing step only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessingError {
    #[error("invalid preprocessing method `{method}` (available: {})", available.join(", "))]
    UnknownMethod {
        method: String,
        available: Vec<String>,
    },

    #[error("preprocessing method `{method}` reported an invalid result")]
    InvalidResult { method: String },

    #[error("malformed preprocessing output line {line}: {message}")]
    MalformedOutput { line: usize, message: String },

    #[error("preprocessor failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReductionError {
    #[error("path multiplicity must be at least 1")]
    ZeroMultiplicity,

    #[error("instance declares no sinks")]
    NoSinks,

    #[error("virtual sensor ids overflow: {num_sensors} sensors + {num_sinks} sinks x {max_m}")]
    IdOverflow {
        num_sensors: u32,
        num_sinks: u32,
        max_m: u32,
    },
}

/// Any failure while constructing an [`Instance`](crate::Instance).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Regeneration(#[from] TopologyRegenerationError),

    #[error(transparent)]
    Preprocessing(#[from] PreprocessingError),
}

/// Boxed stage error carried by [`KcmcError`] variants whose concrete type
/// lives in a downstream crate.
pub type StageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for KCMC operations.
///
/// `Encoding` and `Solver` keep the originating error as their source, so
/// callers can `downcast_ref` to the concrete encoder or solver error.
#[derive(Error, Debug)]
pub enum KcmcError {
    #[error("Instance error: {0}")]
    Instance(#[from] InstanceError),

    #[error("Reduction error: {0}")]
    Reduction(#[from] ReductionError),

    /// Encoding precondition violations
    #[error("Encoding error: {0}")]
    Encoding(#[source] StageError),

    /// Solver-internal failures
    #[error("Solver error: {0}")]
    Solver(#[source] StageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results using KcmcError.
pub type KcmcResult<T> = Result<T, KcmcError>;

impl From<FormatError> for KcmcError {
    fn from(err: FormatError) -> Self {
        KcmcError::Instance(err.into())
    }
}

impl From<TopologyRegenerationError> for KcmcError {
    fn from(err: TopologyRegenerationError) -> Self {
        KcmcError::Instance(err.into())
    }
}

impl From<PreprocessingError> for KcmcError {
    fn from(err: PreprocessingError) -> Self {
        KcmcError::Instance(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_names_offending_id() {
        let err = FormatError::OutOfRange {
            kind: NodeKind::Sensor,
            id: 9,
            limit: 3,
        };
        let text = err.to_string();
        assert!(text.contains("sensor id 9"));
        assert!(text.contains("declared 3"));
    }

    #[test]
    fn unknown_method_lists_alternatives() {
        let err = PreprocessingError::UnknownMethod {
            method: "magic".into(),
            available: vec!["kcov".into(), "reuse".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid preprocessing method `magic` (available: kcov, reuse)"
        );
    }

    #[test]
    fn stage_errors_convert_into_kcmc_error() {
        fn inner() -> KcmcResult<()> {
            let parsed: Result<(), FormatError> = Err(FormatError::MissingTerminator);
            parsed?;
            Ok(())
        }
        let err = inner().unwrap_err();
        assert!(matches!(
            err,
            KcmcError::Instance(InstanceError::Format(FormatError::MissingTerminator))
        ));
        assert!(err.to_string().contains("<;END>"));
    }

    #[test]
    fn stage_source_survives_boxing() {
        let inner = PreprocessingError::UnknownMethod {
            method: "magic".into(),
            available: vec![],
        };
        let err = KcmcError::Encoding(Box::new(inner.clone()));
        assert!(err.to_string().starts_with("Encoding error: invalid preprocessing method"));

        let KcmcError::Encoding(source) = &err else {
            panic!("expected an encoding error, got {err:?}");
        };
        assert_eq!(source.downcast_ref::<PreprocessingError>(), Some(&inner));
        assert!(std::error::Error::source(&err).is_some());
    }
}
