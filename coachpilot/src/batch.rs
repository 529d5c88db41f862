use crate::cache::{CacheKey, ExtractionCache};
use crate::errors::{AutomationError, WorkflowError};
use crate::history::HistoryStore;
use crate::orchestrator::{Credentials, Orchestrator, ProgramRequest};
use crate::persistence::{load_typed, save_typed, DocumentKey, DocumentKind, DocumentStore};
use crate::report::{ItemStatus, RunSummary};
use crate::vision::{CheckinExtraction, VisionAnalyzer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    BuildProgram,
    UpdateProgressions,
    ScrapeCheckin,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::BuildProgram => "build-program",
            Operation::UpdateProgressions => "update-progressions",
            Operation::ScrapeCheckin => "scrape-checkin",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "build-program" => Ok(Operation::BuildProgram),
            "update-progressions" => Ok(Operation::UpdateProgressions),
            "scrape-checkin" => Ok(Operation::ScrapeCheckin),
            other => Err(format!(
                "unknown operation '{other}', expected build-program, update-progressions or scrape-checkin"
            )),
        }
    }
}

/// Collaborators shared by every batch run.
#[derive(Clone)]
pub struct BatchContext {
    pub store: Arc<dyn DocumentStore>,
    pub credentials: Credentials,
    pub analyzer: Option<Arc<dyn VisionAnalyzer>>,
    pub cache: Arc<ExtractionCache<CheckinExtraction>>,
    pub checkin_fields: Vec<String>,
}

/// Run one operation for one subject: log in, load the subject's inputs,
/// run the workflow and persist what it produced. A check-in still fresh in
/// the cache is answered without logging in.
///
/// Never returns an error; everything that went wrong is in the summary.
#[instrument(skip(orchestrator, context))]
pub async fn run_batch(
    orchestrator: &Orchestrator,
    context: &BatchContext,
    subject: &str,
    operation: Operation,
) -> RunSummary {
    let mut summary = RunSummary::new(subject, operation.as_str());

    if operation == Operation::ScrapeCheckin {
        let key = CacheKey::new(subject, &context.checkin_fields);
        if let Some(extraction) = context.cache.get(&key) {
            info!(subject, "Check-in served from cache, skipping login");
            if let Err(e) = record_checkin(context, subject, &extraction, &mut summary).await {
                summary.abort(e.to_string());
            }
            return summary;
        }
    }

    if let Err(e) = orchestrator.login(&context.credentials).await {
        error!(subject, error = %e, "Aborting batch: login failed");
        summary.abort(e.to_string());
        return summary;
    }

    let result = match operation {
        Operation::BuildProgram => build_program(orchestrator, context, subject, &mut summary).await,
        Operation::UpdateProgressions => {
            update_progressions(orchestrator, context, subject, &mut summary).await
        }
        Operation::ScrapeCheckin => scrape_checkin(orchestrator, context, subject, &mut summary).await,
    };

    if let Err(e) = result {
        error!(subject, %operation, error = %e, "Batch aborted");
        summary.abort(e.to_string());
    }
    info!(subject, %operation, status = ?summary.status(), items = summary.items.len(), "Batch finished");
    summary
}

async fn build_program(
    orchestrator: &Orchestrator,
    context: &BatchContext,
    subject: &str,
    summary: &mut RunSummary,
) -> Result<(), WorkflowError> {
    let key = DocumentKey::new(DocumentKind::ProgramRequest, subject);
    let request: ProgramRequest = load_typed(context.store.as_ref(), &key)
        .await?
        .ok_or_else(|| WorkflowError::Persistence(format!("no program request stored at {key}")))?;

    for workout in &request.workouts {
        match orchestrator.build_workout(&request, workout, summary).await {
            Ok(state) => info!(workout = %workout.name, %state, "Workout built"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(workout = %workout.name, error = %e, "Workout abandoned");
                summary.failed(format!("workout {}", workout.name), e.to_string());
            }
        }
    }
    Ok(())
}

async fn update_progressions(
    orchestrator: &Orchestrator,
    context: &BatchContext,
    subject: &str,
    summary: &mut RunSummary,
) -> Result<(), WorkflowError> {
    let store = context.store.as_ref();
    let history_key = DocumentKey::new(DocumentKind::PerformanceHistory, subject);
    let mut history: HistoryStore = load_typed(store, &history_key).await?.unwrap_or_default();

    let report = orchestrator.scrape_history(&mut history).await?;
    if report.new_sessions > 0 {
        save_typed(store, &history_key, &history).await?;
    }

    let request_key = DocumentKey::new(DocumentKind::ProgramRequest, subject);
    let request: ProgramRequest = load_typed(store, &request_key)
        .await?
        .ok_or_else(|| WorkflowError::Persistence(format!("no program request stored at {request_key}")))?;
    let Some(selection) = orchestrator.select_program(&request.program).await? else {
        return Err(WorkflowError::Unresolved {
            stage: "Listing".to_string(),
            target: request.program,
        });
    };

    let rows = orchestrator.editor_rows("update progressions").await?;
    let exercises: Vec<String> = rows.into_iter().map(|(_, title)| title).collect();
    let plans = orchestrator
        .update_progressions(&exercises, &history, summary)
        .await?;
    save_typed(
        store,
        &DocumentKey::new(DocumentKind::ProgressionPlan, subject),
        &plans,
    )
    .await?;

    if summary.count(|s| matches!(s, ItemStatus::Succeeded)) > 0 {
        orchestrator.save_changes("save progressions").await?;
    }
    info!(program = %selection.label, exercises = plans.len(), "Progressions applied");
    Ok(())
}

async fn scrape_checkin(
    orchestrator: &Orchestrator,
    context: &BatchContext,
    subject: &str,
    summary: &mut RunSummary,
) -> Result<(), WorkflowError> {
    let Some(analyzer) = context.analyzer.as_deref() else {
        return Err(WorkflowError::automation(
            "scrape check-in",
            AutomationError::InvalidArgument("no vision analyzer configured".to_string()),
        ));
    };

    let extraction = orchestrator
        .scrape_checkin(subject, &context.checkin_fields, analyzer, &context.cache)
        .await?;
    record_checkin(context, subject, &extraction, summary).await
}

async fn record_checkin(
    context: &BatchContext,
    subject: &str,
    extraction: &CheckinExtraction,
    summary: &mut RunSummary,
) -> Result<(), WorkflowError> {
    for (field, value) in &extraction.fields {
        info!(subject, field = %field, value = %value, "Check-in field");
        summary.succeeded(field);
    }
    for field in &extraction.missing {
        summary.failed(field, "not reported on the check-in");
    }

    save_typed(
        context.store.as_ref(),
        &DocumentKey::new(DocumentKind::Extraction, subject),
        extraction,
    )
    .await
}
