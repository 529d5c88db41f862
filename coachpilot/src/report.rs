use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Aggregate outcome of a run, mapped to the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failure,
}

impl RunStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failure => 1,
            RunStatus::Partial => 2,
        }
    }
}

/// Every item a run touched and what happened to it. Partial success is
/// always visible here, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub subject: String,
    pub operation: String,
    pub items: Vec<ItemOutcome>,
    /// Set when the run stopped early; the reason names the failed stage.
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn new(subject: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            operation: operation.into(),
            items: Vec::new(),
            aborted: None,
        }
    }

    pub fn succeeded(&mut self, item: impl Into<String>) {
        self.push(item, ItemStatus::Succeeded);
    }

    pub fn skipped(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.push(item, ItemStatus::Skipped(reason.into()));
    }

    pub fn failed(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.push(item, ItemStatus::Failed(reason.into()));
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        self.aborted = Some(reason.into());
    }

    fn push(&mut self, item: impl Into<String>, status: ItemStatus) {
        self.items.push(ItemOutcome {
            item: item.into(),
            status,
        });
    }

    pub fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.status)).count()
    }

    pub fn status(&self) -> RunStatus {
        let succeeded = self.count(|s| matches!(s, ItemStatus::Succeeded));
        let failed = self.count(|s| matches!(s, ItemStatus::Failed(_)));
        let skipped = self.count(|s| matches!(s, ItemStatus::Skipped(_)));

        if self.aborted.is_some() {
            return if succeeded > 0 {
                RunStatus::Partial
            } else {
                RunStatus::Failure
            };
        }
        match (succeeded, failed + skipped) {
            (_, 0) => RunStatus::Success,
            (0, _) if failed > 0 => RunStatus::Failure,
            _ => RunStatus::Partial,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }

    /// Fold several summaries, e.g. from a session pool, into the worst
    /// status.
    pub fn aggregate_status(summaries: &[RunSummary]) -> RunStatus {
        let statuses: Vec<RunStatus> = summaries.iter().map(RunSummary::status).collect();
        if statuses.is_empty() || statuses.iter().all(|s| *s == RunStatus::Success) {
            RunStatus::Success
        } else if statuses.iter().all(|s| *s == RunStatus::Failure) {
            RunStatus::Failure
        } else {
            RunStatus::Partial
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} for {}: {:?} ({} succeeded, {} skipped, {} failed)",
            self.operation,
            self.subject,
            self.status(),
            self.count(|s| matches!(s, ItemStatus::Succeeded)),
            self.count(|s| matches!(s, ItemStatus::Skipped(_))),
            self.count(|s| matches!(s, ItemStatus::Failed(_))),
        )?;
        for item in &self.items {
            match &item.status {
                ItemStatus::Succeeded => writeln!(f, "  ok    {}", item.item)?,
                ItemStatus::Skipped(reason) => writeln!(f, "  skip  {}: {}", item.item, reason)?,
                ItemStatus::Failed(reason) => writeln!(f, "  FAIL  {}: {}", item.item, reason)?,
            }
        }
        if let Some(reason) = &self.aborted {
            writeln!(f, "  aborted: {reason}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rules() {
        let mut all_ok = RunSummary::new("c1", "build-program");
        all_ok.succeeded("Squat");
        assert_eq!(all_ok.status(), RunStatus::Success);
        assert_eq!(all_ok.exit_code(), 0);

        let mut partial = all_ok.clone();
        partial.failed("Bench Press", "not found");
        assert_eq!(partial.status(), RunStatus::Partial);
        assert_eq!(partial.exit_code(), 2);

        let mut failed = RunSummary::new("c1", "build-program");
        failed.failed("Bench Press", "not found");
        assert_eq!(failed.status(), RunStatus::Failure);

        let mut aborted = RunSummary::new("c1", "build-program");
        aborted.abort("login: rejected");
        assert_eq!(aborted.exit_code(), 1);

        let mut only_skips = RunSummary::new("c1", "update-progressions");
        only_skips.skipped("Squat", "insufficient data");
        assert_eq!(only_skips.status(), RunStatus::Partial);
    }

    #[test]
    fn test_aggregate_and_display() {
        let mut ok = RunSummary::new("c1", "scrape-checkin");
        ok.succeeded("weight");
        let mut bad = RunSummary::new("c2", "scrape-checkin");
        bad.abort("login: rejected");
        assert_eq!(RunSummary::aggregate_status(&[ok.clone()]), RunStatus::Success);
        assert_eq!(
            RunSummary::aggregate_status(&[ok.clone(), bad.clone()]),
            RunStatus::Partial
        );
        let text = bad.to_string();
        assert!(text.contains("aborted: login: rejected"));

        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["items"][0]["status"], "succeeded");
    }
}
