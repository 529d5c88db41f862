//! End-to-end workflows against the coaching app: log in, open or create a
//! program, build workouts, write progression goals, scrape history and
//! check-ins.
//!
//! Every step goes through the [`Executor`] with strategies taken from
//! configuration, and every stage change waits for a verification marker.
//! A failed gate abandons the workflow at that stage instead of guessing
//! forward.

use crate::cache::{CacheKey, ExtractionCache};
use crate::config::OrchestratorConfig;
use crate::errors::{AutomationError, ErrorKind, WorkflowError};
use crate::executor::{Executor, Success};
use crate::history::{HistoryKey, HistoryStore, RawHistoryRow, WorkoutSession};
use crate::plan::ActionPlan;
use crate::port::{TargetHandle, UiAutomationPort, WaitCondition};
use crate::progression::{next_goal, ProgressionGoal};
use crate::report::RunSummary;
use crate::resolver::{normalize, resolve, simplify_name};
use crate::selector::Strategy;
use crate::vision::{checkin_prompt, parse_fields, CheckinExtraction, VisionAnalyzer};
use crate::vocabulary::ExerciseVocabulary;
use crate::workflow::{Stage, WorkflowMachine, WorkflowState};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const LOGIN_STAGE: &str = "login";
const HISTORY_STAGE: &str = "scrape history";
const CHECKIN_STAGE: &str = "scrape check-in";

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseRequest {
    pub name: String,
    pub sets: u32,
    pub reps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutRequest {
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<ExerciseRequest>,
}

/// What to build for a subject: one program and its workouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRequest {
    pub program: String,
    #[serde(default)]
    pub weeks: Option<u32>,
    #[serde(default)]
    pub workouts: Vec<WorkoutRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSelection {
    /// The label as it appears in the app.
    pub label: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedExercise {
    pub requested: String,
    pub search_term: String,
    pub label: String,
    /// The simplified-name fallback search was needed.
    pub simplified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeReport {
    pub rows_seen: usize,
    pub new_sessions: usize,
    /// Rows whose `(date, workout)` was already in the store.
    pub already_known: usize,
    pub dropped: Vec<String>,
}

/// A computed goal for one exercise of the editor, before it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedGoal {
    pub exercise: String,
    /// The history name the exercise was matched to, if any.
    pub history_name: Option<String>,
    pub last_date: Option<NaiveDate>,
    pub goal: ProgressionGoal,
}

/// Compute next goals for `exercises` from `history`, without touching the
/// UI. Exercise names are matched to history names at the strict tier.
pub fn plan_progressions<S: AsRef<str>>(
    config: &OrchestratorConfig,
    history: &HistoryStore,
    exercises: &[S],
) -> Vec<PlannedGoal> {
    let known = history.exercises();
    exercises
        .iter()
        .map(|exercise| {
            let name = exercise.as_ref();
            let history_name = resolve(name, &known, config.strict_threshold).map(|m| m.label);
            let latest = history_name
                .as_deref()
                .and_then(|n| history.latest_for(n));
            let sets = latest.map(|r| r.sets.as_slice()).unwrap_or(&[]);
            let goal = next_goal(sets, config.equipment_for(name));
            PlannedGoal {
                exercise: name.to_string(),
                history_name,
                last_date: latest.map(|r| r.date),
                goal,
            }
        })
        .collect()
}

/// Drives one session. Not shared between sessions; the pool builds one per
/// port.
pub struct Orchestrator {
    port: Arc<dyn UiAutomationPort>,
    executor: Executor,
    config: Arc<OrchestratorConfig>,
    vocabulary: Arc<ExerciseVocabulary>,
}

impl Orchestrator {
    pub fn new(
        port: Arc<dyn UiAutomationPort>,
        config: Arc<OrchestratorConfig>,
        vocabulary: Arc<ExerciseVocabulary>,
    ) -> Self {
        let executor = Executor::new(port.clone());
        Self {
            port,
            executor,
            config,
            vocabulary,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Building blocks
    // ---------------------------------------------------------------------

    fn plan(&self, plan: ActionPlan, templates: &[String], name: &str) -> ActionPlan {
        plan.strategies(Strategy::render_all(templates, name))
            .with_retry(self.config.retry_policy())
    }

    async fn act(&self, stage: &str, plan: ActionPlan) -> Result<Success, WorkflowError> {
        self.executor
            .execute(&plan)
            .await
            .map_err(|failure| WorkflowError::Action {
                stage: stage.to_string(),
                failure,
            })
    }

    async fn click(
        &self,
        stage: &str,
        label: &str,
        templates: &[String],
        name: &str,
    ) -> Result<Success, WorkflowError> {
        self.act(stage, self.plan(ActionPlan::click(label), templates, name))
            .await
    }

    async fn fill(
        &self,
        stage: &str,
        label: &str,
        templates: &[String],
        text: &str,
    ) -> Result<Success, WorkflowError> {
        self.act(
            stage,
            self.plan(ActionPlan::type_text(label, text), templates, ""),
        )
        .await
    }

    async fn read_text(
        &self,
        stage: &str,
        label: &str,
        templates: &[String],
        within: Option<&TargetHandle>,
        attribute: Option<&str>,
    ) -> Result<String, WorkflowError> {
        let mut plan = self.plan(ActionPlan::read(label), templates, "");
        if let Some(attribute) = attribute {
            plan = plan.attribute(attribute);
        }
        if let Some(parent) = within {
            plan = plan.within(parent.clone());
        }
        let success = self.act(stage, plan).await?;
        Ok(success.output.into_text().unwrap_or_default().trim().to_string())
    }

    /// Every non-empty label matched by the first productive strategy. A page
    /// with nothing on it yields an empty list, not an error.
    async fn read_labels(
        &self,
        stage: &str,
        label: &str,
        templates: &[String],
        within: Option<&TargetHandle>,
    ) -> Result<Vec<(TargetHandle, String)>, WorkflowError> {
        let mut plan = self.plan(ActionPlan::read_all(label), templates, "");
        if let Some(parent) = within {
            plan = plan.within(parent.clone());
        }
        match self.executor.execute(&plan).await {
            Ok(success) => Ok(success
                .output
                .into_texts()
                .into_iter()
                .map(|(target, text)| (target, text.trim().to_string()))
                .filter(|(_, text)| !text.is_empty())
                .collect()),
            Err(failure) if failure.kind() == Some(ErrorKind::NotFound) => {
                debug!(stage, label, "Nothing listed");
                Ok(Vec::new())
            }
            Err(failure) => Err(WorkflowError::Action {
                stage: stage.to_string(),
                failure,
            }),
        }
    }

    async fn navigate(&self, stage: &str, path: &str) -> Result<(), WorkflowError> {
        let url = self.config.url(path);
        debug!(%url, stage, "Navigating");
        self.port.navigate(&url).await.map_err(|e| {
            let e = match e {
                AutomationError::NavigationFailed(_) => e,
                other => AutomationError::NavigationFailed(format!("{url}: {other}")),
            };
            WorkflowError::automation(stage, e)
        })
    }

    async fn verify(&self, stage: &str, condition: WaitCondition) -> Result<(), WorkflowError> {
        let held = self
            .port
            .wait_for(&condition, self.config.gate_timeout)
            .await
            .map_err(|e| WorkflowError::automation(stage, e))?;
        if held {
            debug!(stage, marker = %condition, "Gate passed");
            return Ok(());
        }
        self.capture_failure(stage).await;
        Err(WorkflowError::Gate {
            stage: stage.to_string(),
            marker: condition.to_string(),
        })
    }

    async fn gate(&self, stage: &str, templates: &[String]) -> Result<(), WorkflowError> {
        self.verify(stage, WaitCondition::Present(Strategy::parse_all(templates)))
            .await
    }

    async fn capture_failure(&self, stage: &str) {
        match self.port.capture_diagnostic(&format!("gate-{stage}")).await {
            Ok(diagnostic) => warn!(
                stage,
                label = %diagnostic.label,
                url = diagnostic.page_url.as_deref().unwrap_or("unknown"),
                bytes = diagnostic.image.len(),
                "Gate failed, diagnostic captured"
            ),
            Err(e) => warn!(stage, error = %e, "Gate failed, diagnostic capture failed too"),
        }
    }

    // ---------------------------------------------------------------------
    // Workflows
    // ---------------------------------------------------------------------

    /// Sign in. Any failure is reported as `LoginFailed`, which callers treat
    /// as fatal for everything downstream.
    #[instrument(skip(self, credentials), fields(user = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<(), WorkflowError> {
        let selectors = &self.config.selectors.login;
        self.navigate(LOGIN_STAGE, &self.config.urls.login).await?;

        let result = async {
            self.fill(LOGIN_STAGE, "username", &selectors.username, &credentials.username)
                .await?;
            self.fill(LOGIN_STAGE, "password", &selectors.password, &credentials.password)
                .await?;
            self.click(LOGIN_STAGE, "submit login", &selectors.submit, "")
                .await?;
            self.gate(LOGIN_STAGE, &selectors.signed_in_marker).await
        }
        .await;

        result.map_err(|e| {
            error!(error = %e, "Login failed");
            WorkflowError::automation(LOGIN_STAGE, AutomationError::LoginFailed(e.to_string()))
        })
    }

    /// Open an existing program matched at the lenient tier. `Ok(None)` when
    /// nothing on the listing matches.
    #[instrument(skip(self))]
    pub async fn select_program(&self, name: &str) -> Result<Option<ProgramSelection>, WorkflowError> {
        let selectors = &self.config.selectors.programs;
        let listing = Stage::Listing.to_string();
        let selected = Stage::Selected.to_string();

        self.navigate(&listing, &self.config.urls.programs).await?;
        self.gate(&listing, &selectors.listing_marker).await?;

        let labels = self
            .read_labels(&listing, "program titles", &selectors.card_title, None)
            .await?;
        let texts: Vec<&str> = labels.iter().map(|(_, text)| text.as_str()).collect();
        let Some(hit) = resolve(name, &texts, self.config.lenient_threshold) else {
            info!(program = name, visible = texts.len(), "No existing program matched");
            return Ok(None);
        };

        info!(program = name, label = %hit.label, score = hit.score, "Matched existing program");
        self.click(&selected, "open program", &selectors.open_program, &hit.label)
            .await?;
        self.gate(&selected, &selectors.editor_marker).await?;
        Ok(Some(ProgramSelection {
            label: hit.label,
            created: false,
        }))
    }

    pub async fn select_or_create_program(
        &self,
        name: &str,
        weeks: Option<u32>,
    ) -> Result<ProgramSelection, WorkflowError> {
        if let Some(selection) = self.select_program(name).await? {
            return Ok(selection);
        }
        self.create_program(name, weeks.unwrap_or(self.config.default_program_weeks))
            .await
    }

    #[instrument(skip(self))]
    async fn create_program(&self, name: &str, weeks: u32) -> Result<ProgramSelection, WorkflowError> {
        let selectors = &self.config.selectors.programs;
        let stage = Stage::Selected.to_string();

        self.click(&stage, "new program", &selectors.new_program, "")
            .await?;
        self.fill(&stage, "program name", &selectors.name_input, name)
            .await?;
        self.fill(&stage, "program weeks", &selectors.duration_input, &weeks.to_string())
            .await?;
        self.click(&stage, "create program", &selectors.create_submit, "")
            .await?;

        self.gate(&stage, &selectors.editor_marker).await?;
        self.verify(&stage, WaitCondition::TextVisible(name.to_string()))
            .await?;
        info!(program = name, weeks, "Created program");
        Ok(ProgramSelection {
            label: name.to_string(),
            created: true,
        })
    }

    /// Add an exercise to the open workout builder.
    ///
    /// The name is first normalised against the exercise vocabulary (strict
    /// tier), then searched in the app. If the search comes back empty the
    /// name is simplified and searched again. The result to click is chosen
    /// from the live results at the lenient tier.
    #[instrument(skip(self))]
    pub async fn add_exercise(
        &self,
        logical_name: &str,
        sets: u32,
        reps: u32,
    ) -> Result<AddedExercise, WorkflowError> {
        let selectors = &self.config.selectors.exercises;
        let stage = format!("add exercise '{logical_name}'");

        let search_term = match self
            .vocabulary
            .canonical(logical_name, self.config.strict_threshold)
        {
            Some(hit) => {
                debug!(requested = logical_name, canonical = %hit.label, score = hit.score, "Vocabulary match");
                hit.label
            }
            None => logical_name.trim().to_string(),
        };

        self.click(&stage, "open exercise search", &selectors.open_search, "")
            .await?;

        let mut simplified = false;
        let mut results = self.search_exercises(&stage, &search_term).await?;
        if results.is_empty() {
            let fallback = simplify_name(logical_name, self.config.simplified_name_max_len);
            if !fallback.is_empty() && normalize(&fallback) != normalize(&search_term) {
                info!(term = %search_term, fallback = %fallback, "No results, retrying with simplified name");
                results = self.search_exercises(&stage, &fallback).await?;
                simplified = true;
            }
        }

        let lenient = self.config.lenient_threshold;
        let Some(hit) = resolve(&search_term, &results, lenient)
            .or_else(|| resolve(logical_name, &results, lenient))
        else {
            return Err(WorkflowError::Unresolved {
                stage,
                target: search_term,
            });
        };

        self.click(&stage, "pick exercise", &selectors.pick_result, &hit.label)
            .await?;
        self.fill(&stage, "sets", &selectors.sets_input, &sets.to_string())
            .await?;
        self.fill(&stage, "reps", &selectors.reps_input, &reps.to_string())
            .await?;
        self.click(&stage, "submit exercise", &selectors.submit, "")
            .await?;
        self.verify(&stage, WaitCondition::TextVisible(hit.label.clone()))
            .await?;

        info!(requested = logical_name, label = %hit.label, sets, reps, "Exercise added");
        Ok(AddedExercise {
            requested: logical_name.to_string(),
            search_term,
            label: hit.label,
            simplified,
        })
    }

    async fn search_exercises(&self, stage: &str, term: &str) -> Result<Vec<String>, WorkflowError> {
        let selectors = &self.config.selectors.exercises;
        self.fill(stage, "exercise search", &selectors.search_input, term)
            .await?;
        let results = self
            .read_labels(stage, "exercise results", &selectors.search_result, None)
            .await?;
        debug!(term, count = results.len(), "Search results");
        Ok(results.into_iter().map(|(_, text)| text).collect())
    }

    /// Exercise rows of the open editor, each with its title.
    pub async fn editor_rows(&self, stage: &str) -> Result<Vec<(TargetHandle, String)>, WorkflowError> {
        let selectors = &self.config.selectors.exercises;
        let rows = self
            .read_labels(stage, "exercise rows", &selectors.editor_row, None)
            .await?;

        let mut titled = Vec::with_capacity(rows.len());
        for (row, row_text) in rows {
            let title = match self
                .read_text(stage, "row title", &selectors.row_title, Some(&row), None)
                .await
            {
                Ok(title) if !title.is_empty() => title,
                Ok(_) => String::new(),
                Err(e) => {
                    debug!(row = %row.id, error = %e, "Row title unreadable, using row text");
                    String::new()
                }
            };
            let title = if title.is_empty() {
                row_text.lines().next().unwrap_or_default().trim().to_string()
            } else {
                title
            };
            titled.push((row, title));
        }
        Ok(titled)
    }

    /// Write `goal` into the goal field of the editor row whose title
    /// matches `logical_name`. Goals without history are refused.
    #[instrument(skip(self, goal))]
    pub async fn update_exercise_goal(
        &self,
        logical_name: &str,
        goal: &ProgressionGoal,
    ) -> Result<(), WorkflowError> {
        let selectors = &self.config.selectors.exercises;
        let stage = format!("update goal '{logical_name}'");

        if !goal.has_history() {
            return Err(WorkflowError::automation(
                stage,
                AutomationError::InvalidArgument("goal has no history behind it".to_string()),
            ));
        }

        let rows = self.editor_rows(&stage).await?;
        let titles: Vec<&str> = rows.iter().map(|(_, title)| title.as_str()).collect();
        let Some(hit) = resolve(logical_name, &titles, self.config.lenient_threshold) else {
            return Err(WorkflowError::Unresolved {
                stage,
                target: logical_name.to_string(),
            });
        };

        let row = rows[hit.index].0.clone();
        let text = goal.format(&self.config.weight_unit);
        let plan = self
            .plan(ActionPlan::type_text("goal input", text.clone()), &selectors.goal_input, "")
            .within(row);
        self.act(&stage, plan).await?;

        info!(exercise = logical_name, row = %hit.label, goal = %text, "Goal written");
        Ok(())
    }

    pub fn plan_progressions<S: AsRef<str>>(
        &self,
        history: &HistoryStore,
        exercises: &[S],
    ) -> Vec<PlannedGoal> {
        plan_progressions(&self.config, history, exercises)
    }

    /// Write every planned goal. Exercises without history are skipped with
    /// "insufficient data"; item failures are recorded and the rest still
    /// proceed. Only a fatal error stops early.
    pub async fn apply_progressions(
        &self,
        plans: &[PlannedGoal],
        summary: &mut RunSummary,
    ) -> Result<(), WorkflowError> {
        for planned in plans {
            if !planned.goal.has_history() {
                info!(exercise = %planned.exercise, "No history, goal left untouched");
                summary.skipped(&planned.exercise, "insufficient data (no_history)");
                continue;
            }
            match self.update_exercise_goal(&planned.exercise, &planned.goal).await {
                Ok(()) => summary.succeeded(&planned.exercise),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(exercise = %planned.exercise, error = %e, "Goal update failed, continuing");
                    summary.failed(&planned.exercise, e.to_string());
                }
            }
        }
        Ok(())
    }

    /// Plan goals for `exercises` from `history` and write them into the open
    /// editor. Returns the plans so the caller can persist them.
    #[instrument(skip(self, exercises, history, summary))]
    pub async fn update_progressions<S: AsRef<str> + Sync>(
        &self,
        exercises: &[S],
        history: &HistoryStore,
        summary: &mut RunSummary,
    ) -> Result<Vec<PlannedGoal>, WorkflowError> {
        let plans = self.plan_progressions(history, exercises);
        self.apply_progressions(&plans, summary).await?;
        Ok(plans)
    }

    /// Save the open editor and wait for the confirmation.
    pub async fn save_changes(&self, stage: &str) -> Result<(), WorkflowError> {
        let selectors = &self.config.selectors.workouts;
        self.click(stage, "save", &selectors.save, "").await?;
        self.gate(stage, &selectors.saved_marker).await
    }

    /// Run the whole builder: open or create the program, add a workout of
    /// the configured type, name it, add its exercises and save.
    ///
    /// Exercise failures are recorded in `summary` and skipped. A failed
    /// stage gate abandons the workout and is returned as the error.
    #[instrument(skip(self, program, workout, summary), fields(program = %program.program, workout = %workout.name))]
    pub async fn build_workout(
        &self,
        program: &ProgramRequest,
        workout: &WorkoutRequest,
        summary: &mut RunSummary,
    ) -> Result<WorkflowState, WorkflowError> {
        let selectors = &self.config.selectors.workouts;
        let mut machine = WorkflowMachine::new(&workout.name);

        if let Err(e) = self
            .select_or_create_program(&program.program, program.weeks)
            .await
        {
            let stage = match e.stage() {
                Some(s) if s == Stage::Listing.to_string() => Stage::Listing,
                _ => Stage::Selected,
            };
            machine.fail(stage);
            return Err(e);
        }
        machine.advance(Stage::Selected)?;

        let stage = Stage::TypeChosen.to_string();
        let result = async {
            self.click(&stage, "add workout", &selectors.add_workout, "")
                .await?;
            self.click(&stage, "workout type", &selectors.workout_type, &self.config.workout_type)
                .await?;
            self.gate(&stage, &selectors.type_chosen_marker).await
        }
        .await;
        pass(&mut machine, Stage::TypeChosen, result)?;

        let stage = Stage::Naming.to_string();
        let result = async {
            self.fill(&stage, "workout name", &selectors.name_input, &workout.name)
                .await?;
            let value = self
                .read_text(&stage, "workout name", &selectors.name_input, None, Some("value"))
                .await?;
            if normalize(&value) != normalize(&workout.name) {
                return Err(WorkflowError::Gate {
                    stage: stage.clone(),
                    marker: format!("name field reads '{}'", workout.name),
                });
            }
            Ok(())
        }
        .await;
        pass(&mut machine, Stage::Naming, result)?;

        let stage = Stage::Building.to_string();
        let result = self.gate(&stage, &selectors.builder_marker).await;
        pass(&mut machine, Stage::Building, result)?;

        for exercise in &workout.exercises {
            let item = format!("{} / {}", workout.name, exercise.name);
            match self
                .add_exercise(&exercise.name, exercise.sets, exercise.reps)
                .await
            {
                Ok(added) => {
                    debug!(item = %item, label = %added.label, "Added");
                    summary.succeeded(item);
                }
                Err(e) if e.is_fatal() => {
                    machine.fail_in_progress();
                    return Err(e);
                }
                Err(e) => {
                    warn!(item = %item, error = %e, "Exercise skipped");
                    summary.failed(item, e.to_string());
                }
            }
        }

        let stage = Stage::Saving.to_string();
        let result = self.save_changes(&stage).await;
        pass(&mut machine, Stage::Saving, result)?;

        let stage = Stage::Done.to_string();
        let result = self
            .verify(&stage, WaitCondition::TextVisible(workout.name.clone()))
            .await;
        pass(&mut machine, Stage::Done, result)?;

        summary.succeeded(format!("workout {}", workout.name));
        Ok(machine.state())
    }

    /// Scrape every visible history row into `store`.
    ///
    /// Rows whose `(date, workout)` is already stored are skipped, so running
    /// this twice against the same page adds nothing the second time. Rows
    /// that cannot be read or parsed are dropped with a warning.
    #[instrument(skip(self, store))]
    pub async fn scrape_history(&self, store: &mut HistoryStore) -> Result<ScrapeReport, WorkflowError> {
        let selectors = &self.config.selectors.history;
        self.navigate(HISTORY_STAGE, &self.config.urls.history)
            .await?;

        let rows = self
            .read_labels(HISTORY_STAGE, "history rows", &selectors.row, None)
            .await?;
        let mut report = ScrapeReport {
            rows_seen: rows.len(),
            ..Default::default()
        };
        let mut batch: BTreeMap<HistoryKey, WorkoutSession> = BTreeMap::new();

        for (index, (row, _)) in rows.iter().enumerate() {
            let raw = match self.read_history_row(row).await {
                Ok(raw) => raw,
                Err(e) => {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(row = index, error = %e, "Dropping unreadable history row");
                    report.dropped.push(format!("row {index}: {e}"));
                    continue;
                }
            };
            let (key, record) = match raw.parse() {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(row = index, error = %e, "Dropping history row with invalid data");
                    report.dropped.push(format!("row {index}: {e}"));
                    continue;
                }
            };

            if store.contains(&key) {
                report.already_known += 1;
                continue;
            }
            let session = batch.entry(key.clone()).or_insert_with(|| WorkoutSession {
                key,
                records: Vec::new(),
            });
            match session
                .records
                .iter_mut()
                .find(|r| r.exercise.eq_ignore_ascii_case(&record.exercise))
            {
                Some(existing) => *existing = record,
                None => session.records.push(record),
            }
        }

        for session in batch.into_values() {
            if store.insert_session(session) {
                report.new_sessions += 1;
            }
        }

        info!(
            rows = report.rows_seen,
            new_sessions = report.new_sessions,
            already_known = report.already_known,
            dropped = report.dropped.len(),
            "History scraped"
        );
        Ok(report)
    }

    async fn read_history_row(&self, row: &TargetHandle) -> Result<RawHistoryRow, WorkflowError> {
        let selectors = &self.config.selectors.history;
        let date = self
            .read_text(HISTORY_STAGE, "date cell", &selectors.date_cell, Some(row), None)
            .await?;
        let workout = self
            .read_text(HISTORY_STAGE, "workout cell", &selectors.workout_cell, Some(row), None)
            .await?;
        let exercise = self
            .read_text(HISTORY_STAGE, "exercise cell", &selectors.exercise_cell, Some(row), None)
            .await?;
        let set_cells = self
            .read_labels(HISTORY_STAGE, "set cells", &selectors.set_cell, Some(row))
            .await?
            .into_iter()
            .map(|(_, text)| text)
            .collect();
        Ok(RawHistoryRow {
            date,
            workout,
            exercise,
            set_cells,
        })
    }

    /// Read the requested fields off a subject's latest check-in with the
    /// vision collaborator. Fresh cached results are returned without
    /// touching the page.
    #[instrument(skip(self, fields, analyzer, cache))]
    pub async fn scrape_checkin(
        &self,
        subject: &str,
        fields: &[String],
        analyzer: &dyn VisionAnalyzer,
        cache: &ExtractionCache<CheckinExtraction>,
    ) -> Result<CheckinExtraction, WorkflowError> {
        let key = CacheKey::new(subject, fields);
        if let Some(hit) = cache.get(&key) {
            info!(subject, "Check-in served from cache");
            return Ok(hit);
        }

        self.navigate(CHECKIN_STAGE, &self.config.checkin_url(subject))
            .await?;
        self.gate(CHECKIN_STAGE, &self.config.selectors.checkin.loaded_marker)
            .await?;

        let diagnostic = self
            .port
            .capture_diagnostic("checkin")
            .await
            .map_err(|e| WorkflowError::automation(CHECKIN_STAGE, e))?;
        let answer = analyzer
            .analyze(&diagnostic.image, &checkin_prompt(fields))
            .await
            .map_err(|e| WorkflowError::automation(CHECKIN_STAGE, e))?;

        let (found, missing) = parse_fields(&answer, fields);
        if !missing.is_empty() {
            warn!(subject, missing = ?missing, "Check-in fields not reported");
        }
        let extraction = CheckinExtraction {
            subject: subject.to_string(),
            fields: found,
            missing,
            raw: answer,
            extracted_at: Utc::now(),
        };
        cache.insert(key, extraction.clone());
        Ok(extraction)
    }
}

/// Advance on success, otherwise mark the workflow failed at `stage`.
fn pass(
    machine: &mut WorkflowMachine,
    stage: Stage,
    result: Result<(), WorkflowError>,
) -> Result<(), WorkflowError> {
    match result {
        Ok(()) => machine.advance(stage),
        Err(e) => {
            machine.fail(stage);
            Err(e)
        }
    }
}
