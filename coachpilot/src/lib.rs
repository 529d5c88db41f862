//! Resilient automation of a fitness-coaching web app
//!
//! This crate drives a coaching app through a browser transport it does not
//! own: it matches the app's labels to the names a coach asks for, computes
//! next-period progression goals from scraped history, and runs every UI
//! step with ordered fallback strategies, retries and verification gates.

pub mod batch;
pub mod cache;
pub mod config;
pub mod errors;
pub mod executor;
pub mod history;
pub mod orchestrator;
pub mod persistence;
pub mod plan;
pub mod pool;
pub mod port;
pub mod progression;
pub mod report;
pub mod resolver;
pub mod selector;
pub mod vision;
pub mod vocabulary;
pub mod workflow;

pub use batch::{run_batch, BatchContext, Operation};
pub use config::OrchestratorConfig;
pub use errors::{AutomationError, ErrorKind, ExecutionFailure, WorkflowError};
pub use executor::{ActionOutput, Executor, Success};
pub use history::{HistoryStore, PerformanceRecord};
pub use orchestrator::{Credentials, Orchestrator, ProgramRequest, WorkoutRequest};
pub use plan::{Action, ActionPlan, RetryPolicy};
pub use pool::SessionPool;
pub use port::{PortFactory, TargetHandle, UiAutomationPort, WaitCondition};
pub use progression::{next_goal, EquipmentProfile, ProgressionGoal, SetEntry};
pub use report::{RunStatus, RunSummary};
pub use resolver::{resolve, MatchMethod, MatchResult};
pub use selector::Strategy;
