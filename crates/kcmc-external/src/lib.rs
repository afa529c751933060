//! Subprocess adapters for the collaborators of the KCMC toolchain.
//!
//! Two external binaries feed the instance model:
//!
//! - `instance_regenerator '<key>'` prints the full serialization of an
//!   instance whose key was stored without edges ([`RegeneratorProcess`]).
//! - `optimizer '<key>' <k> <m>` runs the heuristic pre-solvers and prints one
//!   tab-separated result line per method ([`PreprocessorProcess`]).
//!
//! Binaries are looked up in `~/.kcmc/bin/` first, then on `PATH`. Both
//! adapters implement the collaborator traits from `kcmc-core`, so the rest of
//! the workspace never spawns processes directly.

pub mod error;
pub mod preprocessor;
pub mod regenerator;
pub mod subprocess;

pub use error::{ExitCode, ProcessError, ProcessResult};
pub use preprocessor::{parse_report, PreprocessorProcess, PREPROCESSOR_BINARY};
pub use regenerator::{RegeneratorProcess, REGENERATOR_BINARY};
pub use subprocess::{ExternalProcess, ProcessOutput};
