//! Per-unit outcomes and the pass summary.
//!
//! Everything here is pure aggregation: the engine records one
//! [`RemediationResult`] per (PR, file) unit it attempts, and
//! [`summarize`] folds them into a deterministic report, PR order
//! preserved.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoMarkersFound,
    Committed,
    SkippedEmptyDiff,
    FileNotFound,
    ConflictExhausted,
    TransportError,
    DryRun,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::NoMarkersFound => "no markers",
            Outcome::Committed => "committed",
            Outcome::SkippedEmptyDiff => "empty diff",
            Outcome::FileNotFound => "file not found",
            Outcome::ConflictExhausted => "conflict retries exhausted",
            Outcome::TransportError => "transport error",
            Outcome::DryRun => "dry run",
        }
    }
}

/// Outcome of one attempted (PR, file) unit.
#[derive(Debug, Clone)]
pub struct RemediationResult {
    pub pr_number: u64,
    pub pr_title: String,
    pub path: String,
    pub outcome: Outcome,
    pub message: String,
}

/// One PR's section of the summary, in file listing order.
#[derive(Debug, Clone)]
pub struct PrReport {
    pub pr_number: u64,
    pub pr_title: String,
    pub results: Vec<RemediationResult>,
}

impl PrReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

impl fmt::Display for PrReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PR #{} ({}): {} file(s), {} committed",
            self.pr_number,
            self.pr_title,
            self.results.len(),
            self.count(Outcome::Committed),
        )?;
        for result in &self.results {
            writeln!(
                f,
                "  {}: {} — {}",
                result.path,
                result.outcome.label(),
                result.message
            )?;
        }
        Ok(())
    }
}

/// Read-only aggregate over every unit attempted in one pass.
#[derive(Debug, Clone, Default)]
pub struct ReviewSummary {
    pub reports: Vec<PrReport>,
}

impl ReviewSummary {
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn total_units(&self) -> usize {
        self.reports.iter().map(|r| r.results.len()).sum()
    }

    pub fn total(&self, outcome: Outcome) -> usize {
        self.reports.iter().map(|r| r.count(outcome)).sum()
    }
}

impl fmt::Display for ReviewSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return writeln!(f, "No open pull requests to review.");
        }
        for report in &self.reports {
            write!(f, "{report}")?;
        }
        writeln!(
            f,
            "Total: {} file(s) across {} PR(s), {} committed, {} failed",
            self.total_units(),
            self.reports.len(),
            self.total(Outcome::Committed),
            self.total(Outcome::ConflictExhausted) + self.total(Outcome::TransportError),
        )
    }
}

/// Group results by PR in first-seen order. Within a PR the caller's order
/// (file listing order) is preserved.
pub fn summarize(results: Vec<RemediationResult>) -> ReviewSummary {
    let mut reports: Vec<PrReport> = Vec::new();
    for result in results {
        match reports.iter_mut().find(|r| r.pr_number == result.pr_number) {
            Some(report) => report.results.push(result),
            None => reports.push(PrReport {
                pr_number: result.pr_number,
                pr_title: result.pr_title.clone(),
                results: vec![result],
            }),
        }
    }
    ReviewSummary { reports }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(pr: u64, path: &str, outcome: Outcome) -> RemediationResult {
        RemediationResult {
            pr_number: pr,
            pr_title: format!("PR {pr}"),
            path: path.to_string(),
            outcome,
            message: "msg".to_string(),
        }
    }

    #[test]
    fn test_summarize_groups_by_pr_in_first_seen_order() {
        let summary = summarize(vec![
            result(5, "a.rs", Outcome::Committed),
            result(2, "b.rs", Outcome::NoMarkersFound),
            result(5, "c.rs", Outcome::TransportError),
        ]);
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.reports[0].pr_number, 5);
        assert_eq!(summary.reports[0].results.len(), 2);
        assert_eq!(summary.reports[1].pr_number, 2);
    }

    #[test]
    fn test_summarize_empty_is_empty_not_error() {
        let summary = summarize(vec![]);
        assert!(summary.is_empty());
        assert_eq!(summary.total_units(), 0);
    }

    #[test]
    fn test_counts_per_outcome() {
        let summary = summarize(vec![
            result(1, "a.rs", Outcome::Committed),
            result(1, "b.rs", Outcome::Committed),
            result(1, "c.rs", Outcome::ConflictExhausted),
        ]);
        assert_eq!(summary.total(Outcome::Committed), 2);
        assert_eq!(summary.total(Outcome::ConflictExhausted), 1);
        assert_eq!(summary.total(Outcome::FileNotFound), 0);
    }

    #[test]
    fn test_render_is_deterministic_and_enumerates_failures() {
        let results = vec![
            result(1, "a.rs", Outcome::Committed),
            result(1, "b.rs", Outcome::TransportError),
            result(3, "c.rs", Outcome::FileNotFound),
        ];
        let first = summarize(results.clone()).to_string();
        let second = summarize(results).to_string();
        assert_eq!(first, second);
        assert!(first.contains("PR #1"));
        assert!(first.contains("b.rs: transport error"));
        assert!(first.contains("c.rs: file not found"));
        assert!(first.contains("Total: 3 file(s) across 2 PR(s), 1 committed, 1 failed"));
    }

    #[test]
    fn test_render_empty_summary() {
        let text = ReviewSummary::default().to_string();
        assert!(text.contains("No open pull requests"));
    }
}
