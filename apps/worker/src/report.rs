//! Structured run reports
//!
//! Projects a job run's outcome into sections, rows, facts, and issues,
//! independent of how the data was produced. The structured form feeds the
//! UI; `render` produces the operator-facing text.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    AlreadyCompleted,
    LockHeld,
    DryRun,
    Failed,
}

impl RunOutcome {
    /// Whether this outcome represents a failed run
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// A labeled row inside a report section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub detail: String,
}

/// A titled group of rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub rows: Vec<ReportRow>,
}

impl ReportSection {
    /// Create an empty section
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
        }
    }

    /// Append a row
    pub fn row(mut self, label: impl Into<String>, detail: impl Into<String>) -> Self {
        self.rows.push(ReportRow {
            label: label.into(),
            detail: detail.into(),
        });
        self
    }
}

/// A finished run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// One-line outcome statement; a failed run never carries a success
    /// headline
    pub headline: String,
    pub outcome: RunOutcome,
    pub facts: BTreeMap<String, Value>,
    pub sections: Vec<ReportSection>,
    pub issues: Vec<String>,
}

impl RunReport {
    /// Whether this report describes a failed run
    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }

    /// Render the operator-facing text form
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.headline);

        for (name, value) in &self.facts {
            let _ = writeln!(out, "  {}: {}", name, value);
        }

        for section in &self.sections {
            let _ = writeln!(out, "\n{}:", section.title);
            for row in &section.rows {
                let _ = writeln!(out, "  - {}: {}", row.label, row.detail);
            }
        }

        if !self.issues.is_empty() {
            let _ = writeln!(out, "\nIssues:");
            for issue in &self.issues {
                let _ = writeln!(out, "  ! {}", issue);
            }
        }

        out
    }
}

/// Incremental report assembly
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    report: RunReport,
}

impl ReportBuilder {
    /// Start a report with its outcome and headline
    pub fn new(outcome: RunOutcome, headline: impl Into<String>) -> Self {
        Self {
            report: RunReport {
                headline: headline.into(),
                outcome,
                facts: BTreeMap::new(),
                sections: Vec::new(),
                issues: Vec::new(),
            },
        }
    }

    /// Record a named fact
    pub fn fact(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.report.facts.insert(name.into(), value.into());
        self
    }

    /// Append a section
    pub fn section(mut self, section: ReportSection) -> Self {
        self.report.sections.push(section);
        self
    }

    /// Record an issue
    pub fn issue(mut self, issue: impl Into<String>) -> Self {
        self.report.issues.push(issue.into());
        self
    }

    /// Finish the report
    pub fn build(self) -> RunReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_outcome_is_failure() {
        assert!(RunOutcome::Failed.is_failure());
        assert!(!RunOutcome::Completed.is_failure());
        assert!(!RunOutcome::AlreadyCompleted.is_failure());
    }

    #[test]
    fn test_builder_assembles_report() {
        let report = ReportBuilder::new(RunOutcome::Completed, "completed")
            .fact("queued", 5)
            .fact("deleted", 4)
            .section(
                ReportSection::new("Rebuilt collections")
                    .row("Inspired by your Immaculate Taste (admin)", "12 items"),
            )
            .issue("one owner had no display name")
            .build();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.facts["queued"], 5);
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].rows.len(), 1);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn test_render_contains_all_parts() {
        let report = ReportBuilder::new(RunOutcome::Failed, "failed: pending items remain")
            .fact("queued", 5)
            .section(ReportSection::new("Deleted collections").row("Old taste (bob)", "deleted"))
            .issue("item 7:tv:2:taste stuck at recreated")
            .build();

        let text = report.render();
        assert!(text.starts_with("failed: pending items remain"));
        assert!(text.contains("queued: 5"));
        assert!(text.contains("Deleted collections:"));
        assert!(text.contains("! item 7:tv:2:taste stuck at recreated"));
    }

    #[test]
    fn test_facts_render_in_stable_order() {
        let report = ReportBuilder::new(RunOutcome::Completed, "completed")
            .fact("zebra", 1)
            .fact("alpha", 2)
            .build();

        let text = report.render();
        let alpha = text.find("alpha").unwrap();
        let zebra = text.find("zebra").unwrap();
        assert!(alpha < zebra);
    }
}
