use std::fs;
use std::io::{self, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use kcmc_core::LooseAcceptance;
use kcmc_external::{ProcessError, RegeneratorProcess};
use tracing::debug;

use kcmc_cli::cli::{InstanceArgs, LooseField};

/// Resolves `-` (stdin) and `@path` instance arguments to the raw string.
pub fn read_instance(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("reading instance from stdin")?;
        return Ok(raw);
    }
    if let Some(path) = arg.strip_prefix('@') {
        return fs::read_to_string(path).with_context(|| format!("reading instance file {path}"));
    }
    Ok(arg.to_string())
}

pub fn loose_acceptance(fields: &[LooseField]) -> LooseAcceptance {
    let mut loose = LooseAcceptance::strict();
    for field in fields {
        match field {
            LooseField::Pois => loose.pois = true,
            LooseField::Sensors => loose.sensors = true,
            LooseField::Sinks => loose.sinks = true,
            LooseField::All => loose = LooseAcceptance::all(),
        }
    }
    loose
}

pub fn resolve_threads(spec: &str) -> u32 {
    let count = if spec.eq_ignore_ascii_case("auto") {
        num_cpus::get()
    } else {
        spec.parse().unwrap_or_else(|_| num_cpus::get())
    };
    count.max(1) as u32
}

/// An explicitly named regenerator must exist; the default lookup is optional
/// and only matters for key-only instances.
pub fn regenerator(args: &InstanceArgs) -> Result<Option<RegeneratorProcess>> {
    let located = match RegeneratorProcess::locate(args.regenerator.as_deref()) {
        Ok(process) => process,
        Err(err @ ProcessError::NotInstalled { .. }) => {
            debug!(error = %err, "no topology regenerator available");
            return Ok(None);
        }
        Err(err) => return Err(err).context("locating topology regenerator"),
    };
    Ok(Some(match tool_timeout(args) {
        Some(timeout) => located.with_timeout(timeout),
        None => located,
    }))
}

pub fn tool_timeout(args: &InstanceArgs) -> Option<Duration> {
    args.tool_timeout.map(Duration::from_secs)
}
