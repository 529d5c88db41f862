use crate::port::{PortFactory, UiAutomationPort};
use crate::report::RunSummary;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, Instrument};

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub subject: String,
    pub session_id: String,
    pub summary: RunSummary,
}

/// Runs one independent browser session per subject, at most
/// `max_concurrent` at a time. Sessions share nothing but the factory.
#[derive(Debug, Clone)]
pub struct SessionPool {
    max_concurrent: usize,
    operation: String,
}

impl SessionPool {
    pub fn new(max_concurrent: usize, operation: impl Into<String>) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            operation: operation.into(),
        }
    }

    /// Run `job` for every subject and return the outcomes in subject order.
    ///
    /// A session whose port cannot be opened, or whose job panics, yields an
    /// aborted summary for that subject only.
    pub async fn run<F, Fut>(
        &self,
        subjects: Vec<String>,
        factory: Arc<dyn PortFactory>,
        job: F,
    ) -> Vec<SessionOutcome>
    where
        F: Fn(String, Arc<dyn UiAutomationPort>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RunSummary> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let job = Arc::new(job);
        let mut tasks = JoinSet::new();

        for (index, subject) in subjects.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let factory = factory.clone();
            let job = job.clone();
            let operation = self.operation.clone();
            let session_id = uuid::Uuid::new_v4().to_string();
            let span = tracing::info_span!("session", subject = %subject, session_id = %session_id);

            tasks.spawn(
                async move {
                    let summary = match semaphore.acquire_owned().await {
                        Ok(_permit) => match factory.open_session(&session_id).await {
                            Ok(port) => job(subject.clone(), port).await,
                            Err(e) => {
                                error!(error = %e, "Could not open session");
                                let mut summary = RunSummary::new(&subject, operation);
                                summary.abort(format!("session: {e}"));
                                summary
                            }
                        },
                        Err(e) => {
                            let mut summary = RunSummary::new(&subject, operation);
                            summary.abort(format!("session pool closed: {e}"));
                            summary
                        }
                    };
                    (
                        index,
                        SessionOutcome {
                            subject,
                            session_id,
                            summary,
                        },
                    )
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<SessionOutcome>> = vec![None; subjects.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    info!(subject = %outcome.subject, status = ?outcome.summary.status(), "Session finished");
                    slots[index] = Some(outcome);
                }
                Err(e) => error!(error = %e, "Session task failed"),
            }
        }

        subjects
            .into_iter()
            .zip(slots)
            .map(|(subject, slot)| {
                slot.unwrap_or_else(|| {
                    let mut summary = RunSummary::new(&subject, &self.operation);
                    summary.abort("session task failed");
                    SessionOutcome {
                        subject,
                        session_id: String::new(),
                        summary,
                    }
                })
            })
            .collect()
    }
}
