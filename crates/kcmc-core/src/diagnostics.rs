//! Warnings and errors collected while reading an instance.
//!
//! Strict parsing fails fast through [`FormatError`](crate::FormatError);
//! this module records what loose acceptance and format upgrades let
//! through, so the CLI can report it next to the parsed instance.
//!
//! ```
//! use kcmc_core::diagnostics::{Diagnostics, IssueKind};
//!
//! let mut diag = Diagnostics::new();
//! diag.warn(IssueKind::Count, "declared 4 sinks but 3 carry edges");
//! diag.error_about(IssueKind::Reachability, "no path to a sink", "p2");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! assert_eq!(diag.summary(), "1 warning, 1 error");
//! ```

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Accepted, but the instance is not what its preamble declares
    Warning,
    /// The instance cannot satisfy a requirement
    Error,
}

/// Which stage of reading an instance raised the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    /// Legacy tags or duplicate edge records
    Format,
    /// Preamble count disagrees with the edge lists
    Count,
    Regeneration,
    Reachability,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::Format => "format",
            IssueKind::Count => "count",
            IssueKind::Regeneration => "regeneration",
            IssueKind::Reachability => "reachability",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
    /// Node or node kind the issue is about (e.g. "p3", "sink")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{severity}:{}] {}", self.kind, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({entity})")?;
        }
        Ok(())
    }
}

/// Issues gathered while parsing one instance, in the order they arose.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.push(Severity::Warning, kind, message.into(), None);
    }

    pub fn warn_about(&mut self, kind: IssueKind, message: impl Into<String>, entity: &str) {
        self.push(Severity::Warning, kind, message.into(), Some(entity));
    }

    pub fn error_about(&mut self, kind: IssueKind, message: impl Into<String>, entity: &str) {
        self.push(Severity::Error, kind, message.into(), Some(entity));
    }

    fn push(&mut self, severity: Severity, kind: IssueKind, message: String, entity: Option<&str>) {
        self.issues.push(DiagnosticIssue {
            severity,
            kind,
            message,
            entity: entity.map(str::to_owned),
        });
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    fn count(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == severity)
            .count()
    }

    /// One-line tally, e.g. "2 warnings, 1 error".
    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{w} warning{}", plural(w)),
            (0, e) => format!("{e} error{}", plural(e)),
            (w, e) => format!("{w} warning{}, {e} error{}", plural(w), plural(e)),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}
