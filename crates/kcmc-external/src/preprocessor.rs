//! Heuristic pre-solving through the optimizer binary.
//!
//! The optimizer prints one tab-separated line per heuristic method:
//!
//! ```text
//! <key> \t <k> \t <m> \t <method> \t <runtime_us> \t <OK|...> \t <used> \t <rate> \t <bits>
//! ```
//!
//! Method names ending in `_<n>` carry the number of paths the method was
//! asked to build.

use crate::error::ProcessResult;
use crate::subprocess::ExternalProcess;
use kcmc_core::{
    HeuristicPreprocessor, HeuristicResult, InstanceKey, PreprocessingError, PreprocessingReport,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const PREPROCESSOR_BINARY: &str = "optimizer";

/// Leading columns that echo the request (`key`, `k`, `m`).
const ECHO_FIELDS: usize = 3;
const RESULT_FIELDS: usize = 6;
const MIN_OUTPUT_BYTES: usize = 10;

/// Runs `optimizer '<key>' <k> <m>` and parses every heuristic it reports.
#[derive(Debug, Clone)]
pub struct PreprocessorProcess {
    process: ExternalProcess,
}

impl PreprocessorProcess {
    pub fn new(process: ExternalProcess) -> Self {
        Self { process }
    }

    pub fn locate(explicit: Option<&Path>) -> ProcessResult<Self> {
        ExternalProcess::locate(PREPROCESSOR_BINARY, explicit).map(Self::new)
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self::new(self.process.with_timeout(timeout))
    }
}

impl HeuristicPreprocessor for PreprocessorProcess {
    fn preprocess(
        &self,
        key: &InstanceKey,
        k: u32,
        m: u32,
    ) -> Result<PreprocessingReport, PreprocessingError> {
        let key_string = key.to_string();
        tracing::info!(key = %key_string, k, m, "running heuristic preprocessors");
        let output = self
            .process
            .run_blocking([key_string, k.to_string(), m.to_string()])
            .map_err(|err| PreprocessingError::Failed(err.to_string()))?;

        if output.stdout.len() <= MIN_OUTPUT_BYTES {
            return Err(PreprocessingError::Failed(format!(
                "{} returned {} bytes",
                self.process.name(),
                output.stdout.len()
            )));
        }
        let report = parse_report(&output.stdout)?;
        tracing::debug!(methods = ?report.methods(), "heuristic results parsed");
        Ok(report)
    }
}

/// Parses optimizer output into a report. Blank lines are skipped.
pub fn parse_report(stdout: &str) -> Result<PreprocessingReport, PreprocessingError> {
    stdout
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| parse_line(index + 1, line))
        .collect()
}

fn parse_line(line_no: usize, line: &str) -> Result<HeuristicResult, PreprocessingError> {
    let line = line.trim().to_ascii_lowercase();
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    let malformed = |message: String| PreprocessingError::MalformedOutput {
        line: line_no,
        message,
    };

    let values = fields.get(ECHO_FIELDS..).unwrap_or_default();
    if values.len() != RESULT_FIELDS {
        return Err(malformed(format!(
            "expected {} result fields, found {}",
            RESULT_FIELDS,
            values.len()
        )));
    }
    let [method, runtime_us, valid, used, rate, solution] = [
        values[0], values[1], values[2], values[3], values[4], values[5],
    ];

    let (method, num_paths) = split_paths(method);
    Ok(HeuristicResult {
        method: method.to_string(),
        num_paths,
        runtime_us: field(runtime_us, "runtime").map_err(&malformed)?,
        valid: valid == "ok",
        num_used_sensors: field(used, "sensor count").map_err(&malformed)?,
        compression_rate: field(rate, "compression rate").map_err(&malformed)?,
        solution: solution.to_string(),
    })
}

/// `kcov-dinic_3` → (`kcov-dinic`, Some(3)).
fn split_paths(method: &str) -> (&str, Option<u32>) {
    if method.ends_with(|c: char| c.is_ascii_digit()) {
        if let Some((name, paths)) = method.rsplit_once('_') {
            if let Ok(paths) = paths.parse() {
                return (name, Some(paths));
            }
        }
    }
    (method, None)
}

fn field<T: FromStr>(raw: &str, what: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("invalid {what} `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "KCMC;1 3 1;10 5 5;42;END\t1\t1\tKCOV-DINIC_2\t130\tOK\t2\t0.333\t011\n\
KCMC;1 3 1;10 5 5;42;END\t1\t1\tflood\t88\tINVALID\t3\t0\t111\n";

    #[test]
    fn parses_every_method() {
        let report = parse_report(OUTPUT).unwrap();
        assert_eq!(report.methods(), vec!["flood", "kcov-dinic"]);

        let kcov = report.select("kcov-dinic").unwrap();
        assert_eq!(kcov.num_paths, Some(2));
        assert_eq!(kcov.runtime_us, 130);
        assert_eq!(kcov.num_used_sensors, 2);
        assert!((kcov.compression_rate - 0.333).abs() < 1e-12);
        assert_eq!(kcov.solution, "011");

        assert!(matches!(
            report.select("flood"),
            Err(PreprocessingError::InvalidResult { .. })
        ));
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        let err = parse_report("\nkey\t1\t1\tflood\t88\tok\n").unwrap_err();
        assert_eq!(
            err,
            PreprocessingError::MalformedOutput {
                line: 2,
                message: "expected 6 result fields, found 3".into()
            }
        );
    }

    #[test]
    fn bad_numbers_are_malformed() {
        let err = parse_report("key\t1\t1\tflood\tfast\tok\t3\t0\t111").unwrap_err();
        assert!(err.to_string().contains("invalid runtime `fast`"));
    }

    #[test]
    fn path_suffix_needs_an_underscore() {
        assert_eq!(split_paths("flood2"), ("flood2", None));
        assert_eq!(split_paths("a_b_12"), ("a_b", Some(12)));
        assert_eq!(split_paths("plain"), ("plain", None));
    }

    #[cfg(unix)]
    #[test]
    fn process_round_trip() {
        use crate::subprocess::test_support::script;

        let dir = tempfile::tempdir().unwrap();
        let bin = script(
            dir.path(),
            PREPROCESSOR_BINARY,
            "printf '%s\\t%s\\t%s\\tkcov_1\\t10\\tOK\\t2\\t0.5\\t0110\\n' \"$1\" \"$2\" \"$3\"",
        );
        let preprocessor = PreprocessorProcess::locate(Some(&bin)).unwrap();
        let key = InstanceKey {
            num_pois: 1,
            num_sensors: 4,
            num_sinks: 1,
            area_side: 10,
            coverage_radius: 5,
            communication_radius: 5,
            random_seed: 7,
        };
        let report = preprocessor.preprocess(&key, 1, 1).unwrap();
        let kcov = report.select("KCOV").unwrap();
        assert_eq!(kcov.num_paths, Some(1));
        assert_eq!(kcov.solution, "0110");
    }
}
