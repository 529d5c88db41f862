//! Runs one [`ActionPlan`] against the page, riding out overlays, stale
//! elements and slow renders.

use crate::errors::{AutomationError, ExecutionFailure};
use crate::plan::{Action, ActionPlan};
use crate::port::{TargetHandle, UiAutomationPort};
use crate::selector::Strategy;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of the action on the bound target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutput {
    Clicked,
    Typed,
    Text(String),
    /// `(target, text)` for every element matched by the winning strategy.
    Texts(Vec<(TargetHandle, String)>),
}

impl ActionOutput {
    pub fn into_text(self) -> Option<String> {
        match self {
            ActionOutput::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_texts(self) -> Vec<(TargetHandle, String)> {
        match self {
            ActionOutput::Texts(texts) => texts,
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Success {
    pub output: ActionOutput,
    /// Index into the plan's strategy list of the strategy that bound.
    pub strategy_index: usize,
    pub strategy: Strategy,
    pub target: Option<TargetHandle>,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct Executor {
    port: Arc<dyn UiAutomationPort>,
}

impl Executor {
    pub fn new(port: Arc<dyn UiAutomationPort>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &Arc<dyn UiAutomationPort> {
        &self.port
    }

    /// Execute `plan`, retrying whole attempts per its policy.
    ///
    /// Each attempt dismisses obstructions, then walks the strategies in
    /// declared order and acts on the first interactable hit. If anything
    /// fails after binding (most often a stale element) the attempt is thrown
    /// away and the next one starts again from the first strategy.
    #[instrument(level = "debug", skip(self, plan), fields(plan = %plan.label, action = plan.action.name()))]
    pub async fn execute(&self, plan: &ActionPlan) -> Result<Success, ExecutionFailure> {
        let policy = plan.retry;
        let mut tried: Vec<String> = Vec::new();
        let mut last_error: Option<AutomationError> = None;
        let mut attempts = 0;

        if plan.strategies.is_empty() {
            return Err(ExecutionFailure {
                plan: plan.label.clone(),
                reason: "plan has no strategies".to_string(),
                strategies_tried: tried,
                last_error: Some(AutomationError::InvalidArgument(format!(
                    "plan '{}' declares no strategies",
                    plan.label
                ))),
                attempts,
            });
        }

        while attempts < policy.max_attempts {
            if attempts > 0 {
                let delay = policy.backoff.delay(attempts);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            attempts += 1;

            let outcome = tokio::time::timeout(
                policy.per_attempt_timeout,
                self.attempt(plan, &mut tried),
            )
            .await
            .unwrap_or_else(|_| {
                Err(AutomationError::Timeout(format!(
                    "attempt {attempts} of '{}' exceeded {:?}",
                    plan.label, policy.per_attempt_timeout
                )))
            });

            match outcome {
                Ok((strategy_index, target, output)) => {
                    if attempts > 1 {
                        info!(
                            plan = %plan.label,
                            attempts,
                            strategy = %plan.strategies[strategy_index],
                            "Action succeeded after retry"
                        );
                    }
                    return Ok(Success {
                        output,
                        strategy_index,
                        strategy: plan.strategies[strategy_index].clone(),
                        target,
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(
                        plan = %plan.label,
                        attempt = attempts,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let reason = match &last_error {
            Some(e) => format!("{} ({})", e, e.kind()),
            None => "no attempts made".to_string(),
        };
        Err(ExecutionFailure {
            plan: plan.label.clone(),
            reason,
            strategies_tried: tried,
            last_error,
            attempts,
        })
    }

    /// One pass over the strategy list. Returns the index of the strategy
    /// used, the bound target (if the action binds one) and the output.
    async fn attempt(
        &self,
        plan: &ActionPlan,
        tried: &mut Vec<String>,
    ) -> Result<(usize, Option<TargetHandle>, ActionOutput), AutomationError> {
        match self.port.dismiss_obstruction().await {
            Ok(true) => debug!(plan = %plan.label, "Dismissed an obstruction"),
            Ok(false) => {}
            // Failing to dismiss is not fatal; the action itself will tell.
            Err(e) => debug!(plan = %plan.label, error = %e, "Obstruction check failed"),
        }

        let within = plan.within.as_ref();
        let mut misses: Vec<String> = Vec::new();

        for (index, strategy) in plan.strategies.iter().enumerate() {
            let key = strategy.to_string();
            if !tried.contains(&key) {
                tried.push(key.clone());
            }

            if !strategy.is_valid() {
                debug!(strategy = %key, "Skipping invalid strategy");
                misses.push(format!("{key}: invalid"));
                continue;
            }

            if let Action::ReadAll { attribute } = &plan.action {
                let targets = match self.port.locate_all(strategy, within).await {
                    Ok(targets) => targets,
                    Err(AutomationError::ElementNotFound(_)) => Vec::new(),
                    Err(e) => return Err(e),
                };
                if targets.is_empty() {
                    misses.push(format!("{key}: no match"));
                    continue;
                }
                let mut texts = Vec::with_capacity(targets.len());
                for target in targets {
                    let text = self.port.read(&target, attribute.as_deref()).await?;
                    texts.push((target, text));
                }
                return Ok((index, None, ActionOutput::Texts(texts)));
            }

            let target = match self.port.locate(strategy, within).await {
                Ok(Some(target)) if target.interactable => target,
                Ok(Some(_)) => {
                    debug!(strategy = %key, "Located but not interactable");
                    misses.push(format!("{key}: not interactable"));
                    continue;
                }
                Ok(None) | Err(AutomationError::ElementNotFound(_)) => {
                    misses.push(format!("{key}: no match"));
                    continue;
                }
                Err(e) => return Err(e),
            };

            debug!(strategy = %key, target = %target.id, "Bound target");
            // From here on any failure discards the whole attempt.
            let output = match &plan.action {
                Action::Click => {
                    self.port.click(&target).await?;
                    ActionOutput::Clicked
                }
                Action::Type(text) => {
                    self.port.type_text(&target, text).await?;
                    ActionOutput::Typed
                }
                Action::Read { attribute } => {
                    ActionOutput::Text(self.port.read(&target, attribute.as_deref()).await?)
                }
                Action::ReadAll { .. } => {
                    return Err(AutomationError::Internal(
                        "read_all reached the single-target path".to_string(),
                    ))
                }
            };
            return Ok((index, Some(target), output));
        }

        Err(AutomationError::ElementNotFound(format!(
            "'{}': {}",
            plan.label,
            misses.join("; ")
        )))
    }
}
