//! The remediation engine: one pass sweeps every open pull request,
//! flags review markers introduced in added lines, and commits a
//! resolution annotation onto the PR head branch.
//!
//! Per (PR, file) unit the flow is: parse diff → scan added lines →
//! re-fetch the file for a live sha → insert the annotation → PUT with
//! the sha, re-fetching and reapplying on conflict up to the attempt
//! bound. No unit failure aborts the pass; every attempted unit lands in
//! the summary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::diff::{DiffTag, parse_patch};
use crate::error::Error;
use crate::github::{ChangedFile, Gateway, PullRequest};
use crate::report::{Outcome, RemediationResult, ReviewSummary, summarize};

/// Maximum fetch→edit→write attempts per file. Conflicts beyond this are
/// reported as exhausted, not raised.
const MAX_WRITE_ATTEMPTS: u32 = 3;

pub struct Engine {
    gateway: Arc<dyn Gateway>,
    marker: Regex,
    resolution: String,
    workers: usize,
    dry_run: bool,
    annotate: bool,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        marker: Regex,
        resolution: String,
        workers: usize,
        dry_run: bool,
        annotate: bool,
    ) -> Self {
        Self {
            gateway,
            marker,
            resolution,
            workers: workers.max(1),
            dry_run,
            annotate,
        }
    }

    /// Run one full review pass over all currently open PRs.
    ///
    /// Units run on a bounded worker pool; writes to the same path are
    /// serialized by a per-path lock so two units never interleave their
    /// fetch/write cycles on one file. Results are re-ordered to listing
    /// order before summarization.
    pub async fn run_pass(&self) -> ReviewSummary {
        let pulls = match self.gateway.list_open_pull_requests() {
            Ok(pulls) => pulls,
            Err(e) => {
                warn!(error = %e, "failed to list open pull requests");
                return ReviewSummary::default();
            }
        };
        if pulls.is_empty() {
            info!("no open pull requests");
            return ReviewSummary::default();
        }
        info!(count = pulls.len(), "reviewing open pull requests");

        let mut units: Vec<(PullRequest, ChangedFile)> = Vec::new();
        for pr in &pulls {
            match self.gateway.list_changed_files(pr.number) {
                Ok(files) => {
                    units.extend(files.into_iter().map(|f| (pr.clone(), f)));
                }
                Err(e) => {
                    warn!(pr = pr.number, error = %e, "failed to list changed files, skipping PR");
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let path_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let mut join_set = JoinSet::new();

        for (ordinal, (pr, file)) in units.into_iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let lock = path_lock(&path_locks, &file.path);
            let marker = self.marker.clone();
            let resolution = self.resolution.clone();
            let dry_run = self.dry_run;

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("worker semaphore closed unexpectedly");
                let _guard = lock.lock().await;
                let result = review_file(&*gateway, &marker, &resolution, dry_run, &pr, &file);
                (ordinal, result)
            });
        }

        let mut ordered: Vec<(usize, RemediationResult)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(entry) => ordered.push(entry),
                Err(e) => warn!(error = %e, "review task panicked"),
            }
        }
        ordered.sort_by_key(|(ordinal, _)| *ordinal);

        let summary = summarize(ordered.into_iter().map(|(_, r)| r).collect());

        if self.annotate && !self.dry_run {
            self.post_annotations(&summary);
        }
        summary
    }

    /// Best-effort review annotation: one comment per PR with its section
    /// of the summary. Decoupled from the commit state machine — a failure
    /// here is logged and never alters a unit's result.
    fn post_annotations(&self, summary: &ReviewSummary) {
        for report in &summary.reports {
            if let Err(e) = self
                .gateway
                .post_comment(report.pr_number, &report.to_string())
            {
                warn!(pr = report.pr_number, error = %e, "failed to post review summary comment");
            }
        }
    }

    /// Run passes on an interval until shutdown is requested or the pass
    /// budget is spent. Shutdown is honored between passes, never mid-pass.
    pub async fn run_continuous(
        &self,
        interval: Duration,
        max_passes: Option<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        let mut passes: u64 = 0;
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping between passes");
                break;
            }
            let summary = self.run_pass().await;
            passes += 1;
            info!(
                pass = passes,
                units = summary.total_units(),
                committed = summary.total(Outcome::Committed),
                "pass complete"
            );
            debug!(summary = %summary, "pass summary");

            if let Some(max) = max_passes
                && passes >= max
            {
                info!(passes, "pass budget spent");
                break;
            }
            if wait_or_shutdown(interval, &mut shutdown).await {
                info!("shutdown requested during interval wait");
                break;
            }
        }
        passes
    }
}

fn path_lock(
    locks: &Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    path: &str,
) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = locks.lock().expect("path lock map poisoned");
    Arc::clone(
        locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
    )
}

/// Sleep for the interval, returning early (true) on shutdown.
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => {
            if changed.is_ok() {
                *shutdown.borrow()
            } else {
                // Sender dropped — no one can signal shutdown anymore.
                true
            }
        }
    }
}

/// Drive one (PR, file) unit through the remediation state machine.
fn review_file(
    gateway: &dyn Gateway,
    marker: &Regex,
    resolution: &str,
    dry_run: bool,
    pr: &PullRequest,
    file: &ChangedFile,
) -> RemediationResult {
    let result = |outcome: Outcome, message: String| RemediationResult {
        pr_number: pr.number,
        pr_title: pr.title.clone(),
        path: file.path.clone(),
        outcome,
        message,
    };

    let patch = match file.patch.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => {
            return result(
                Outcome::SkippedEmptyDiff,
                "no patch (binary or unchanged file)".to_string(),
            );
        }
    };

    let flagged = flag_added_lines(patch, marker, resolution);
    if flagged.is_empty() {
        return result(
            Outcome::NoMarkersFound,
            "no review markers in added lines".to_string(),
        );
    }
    debug!(
        pr = pr.number,
        path = %file.path,
        count = flagged.len(),
        "found marker candidates"
    );

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        // Re-fetch fresh each attempt: the diff reflects the comparison
        // view, and any prior conflict means our sha is stale.
        let live = match gateway.fetch_file(&file.path, &pr.head.name) {
            Ok(live) => live,
            Err(Error::NotFound(e)) => {
                return result(Outcome::FileNotFound, e);
            }
            Err(e) => {
                return result(Outcome::TransportError, e.to_string());
            }
        };

        let (content, inserted) = annotate_content(&live.content, &flagged, resolution);
        if inserted == 0 {
            return result(
                Outcome::NoMarkersFound,
                "flagged lines already annotated or absent on head".to_string(),
            );
        }
        if dry_run {
            return result(
                Outcome::DryRun,
                format!("would insert {inserted} annotation(s)"),
            );
        }

        let message = format!("Flag {inserted} review marker(s) in {}", file.path);
        match gateway.write_file(&file.path, &pr.head.name, &content, &live.sha, &message) {
            Ok(()) => {
                return result(
                    Outcome::Committed,
                    format!("inserted {inserted} annotation(s)"),
                );
            }
            Err(Error::Conflict(e)) if attempt < MAX_WRITE_ATTEMPTS => {
                warn!(
                    pr = pr.number,
                    path = %file.path,
                    attempt,
                    error = %e,
                    "version token went stale, re-fetching"
                );
            }
            Err(Error::Conflict(e)) => {
                return result(
                    Outcome::ConflictExhausted,
                    format!("gave up after {MAX_WRITE_ATTEMPTS} conflicting attempts: {e}"),
                );
            }
            Err(e) => {
                return result(Outcome::TransportError, e.to_string());
            }
        }
    }
    unreachable!()
}

/// Scan only Added lines for the marker, ignoring lines that already carry
/// the resolution text so an annotated diff is never re-flagged.
fn flag_added_lines(patch: &str, marker: &Regex, resolution: &str) -> Vec<String> {
    parse_patch(patch)
        .into_iter()
        .filter(|l| l.tag == DiffTag::Added)
        .filter(|l| marker.is_match(&l.text))
        .filter(|l| !l.text.contains(resolution))
        .map(|l| l.text)
        .collect()
}

/// Insert the resolution line immediately before each flagged line,
/// locating targets by exact text match against the live content — patch
/// positions do not reliably map to head offsets after upstream changes.
/// A target whose preceding line already carries the resolution text is
/// treated as remediated. Returns the new content and insertion count.
fn annotate_content(content: &str, flagged: &[String], resolution: &str) -> (String, usize) {
    let trailing_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    if trailing_newline {
        lines.pop();
    }

    let mut inserted = 0;
    for text in flagged {
        let target = lines.iter().enumerate().find_map(|(i, line)| {
            let annotated = i > 0 && lines[i - 1].contains(resolution);
            (line == text && !annotated).then_some(i)
        });
        if let Some(i) = target {
            let indent: String = lines[i]
                .chars()
                .take_while(|c| c.is_whitespace())
                .collect();
            lines.insert(i, format!("{indent}{resolution}"));
            inserted += 1;
        }
    }

    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    (out, inserted)
}
