//! Topology regeneration through the instance generator binary.

use crate::error::ProcessResult;
use crate::subprocess::ExternalProcess;
use kcmc_core::{InstanceKey, TopologyRegenerationError, TopologySource};
use std::path::Path;
use std::time::Duration;

pub const REGENERATOR_BINARY: &str = "instance_regenerator";

/// Anything this short cannot hold a header, a terminator and one edge.
const MIN_OUTPUT_BYTES: usize = 10;

/// Runs `instance_regenerator '<key>'` and returns the first line it prints.
#[derive(Debug, Clone)]
pub struct RegeneratorProcess {
    process: ExternalProcess,
}

impl RegeneratorProcess {
    pub fn new(process: ExternalProcess) -> Self {
        Self { process }
    }

    /// Finds the binary via an explicit path, ~/.kcmc/bin or PATH.
    pub fn locate(explicit: Option<&Path>) -> ProcessResult<Self> {
        ExternalProcess::locate(REGENERATOR_BINARY, explicit).map(Self::new)
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self::new(self.process.with_timeout(timeout))
    }
}

impl TopologySource for RegeneratorProcess {
    fn regenerate(&self, key: &InstanceKey) -> Result<String, TopologyRegenerationError> {
        let key_string = key.to_string();
        tracing::info!(key = %key_string, "regenerating instance topology");
        let output = self
            .process
            .run_blocking([key_string.as_str()])
            .map_err(|err| TopologyRegenerationError::Generator {
                key: key_string.clone(),
                message: err.to_string(),
            })?;

        if output.stdout.len() <= MIN_OUTPUT_BYTES {
            return Err(TopologyRegenerationError::ShortOutput {
                key: key_string,
                len: output.stdout.len(),
            });
        }
        output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or(TopologyRegenerationError::EmptyTopology { key: key_string })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::subprocess::test_support::script;
    use kcmc_core::{Instance, InstanceParser};

    const EMPTY: &str = "KCMC;1 3 1;10 5 5;42;END";
    const FULL: &str = "KCMC;1 3 1;10 5 5;42;PI 0 0;PI 0 1;II 0 1;II 1 2;IS 2 0;END";

    #[test]
    fn empty_instance_is_filled_in_by_the_generator() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(
            dir.path(),
            REGENERATOR_BINARY,
            &format!("echo '{FULL}'\necho 'trailing noise'"),
        );
        let source = RegeneratorProcess::locate(Some(&bin)).unwrap();
        let instance = InstanceParser::new()
            .topology_source(&source)
            .parse(EMPTY)
            .unwrap();
        assert_eq!(instance, Instance::parse(FULL).unwrap());
    }

    #[test]
    fn short_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), REGENERATOR_BINARY, "echo 'KCMC;END'");
        let source = RegeneratorProcess::locate(Some(&bin)).unwrap();
        let key = *Instance::parse(FULL).unwrap().key();
        assert!(matches!(
            source.regenerate(&key),
            Err(TopologyRegenerationError::ShortOutput { .. })
        ));
    }

    #[test]
    fn generator_failure_names_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), REGENERATOR_BINARY, "exit 1");
        let source = RegeneratorProcess::locate(Some(&bin)).unwrap();
        let key = *Instance::parse(FULL).unwrap().key();
        match source.regenerate(&key) {
            Err(TopologyRegenerationError::Generator { key: k, .. }) => {
                assert_eq!(k, key.to_string());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
