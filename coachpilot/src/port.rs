//! The seam between this crate and whatever drives the browser.

use crate::errors::AutomationError;
use crate::selector::Strategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A live element the transport has bound to. Handles can go stale at any
/// time; the transport reports that as [`AutomationError::ElementStale`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHandle {
    /// Transport-specific element reference.
    pub id: String,
    /// Visible and enabled at the time it was located.
    pub interactable: bool,
}

impl TargetHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            interactable: true,
        }
    }

    pub fn inert(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            interactable: false,
        }
    }
}

/// Conditions a verification gate can wait on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitCondition {
    /// Any of the strategies locates something.
    Present(Vec<Strategy>),
    /// None of the strategies locates anything.
    Absent(Vec<Strategy>),
    /// The given text is visible somewhere on the page.
    TextVisible(String),
    /// The current URL contains the fragment.
    UrlContains(String),
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |s: &[Strategy]| s.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");
        match self {
            WaitCondition::Present(s) => write!(f, "present[{}]", join(s)),
            WaitCondition::Absent(s) => write!(f, "absent[{}]", join(s)),
            WaitCondition::TextVisible(t) => write!(f, "text '{t}'"),
            WaitCondition::UrlContains(u) => write!(f, "url contains '{u}'"),
        }
    }
}

/// Screenshot plus context, captured for failure reports and for the vision
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub label: String,
    pub captured_at: DateTime<Utc>,
    /// Encoded image bytes (PNG).
    pub image: Vec<u8>,
    pub page_url: Option<String>,
}

/// Browser primitives consumed by the executor and orchestrator.
///
/// One implementation drives one live page; it is never used from two tasks
/// at once, but must be `Send + Sync` so sessions can live on the runtime.
#[async_trait::async_trait]
pub trait UiAutomationPort: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError>;

    /// Locate the first element matching `strategy`, optionally inside
    /// `within`. `Ok(None)` means nothing matched.
    async fn locate(
        &self,
        strategy: &Strategy,
        within: Option<&TargetHandle>,
    ) -> Result<Option<TargetHandle>, AutomationError>;

    /// Locate every element matching `strategy`, in document order.
    async fn locate_all(
        &self,
        strategy: &Strategy,
        within: Option<&TargetHandle>,
    ) -> Result<Vec<TargetHandle>, AutomationError>;

    /// Read an attribute, or the visible text when `attribute` is `None`.
    async fn read(
        &self,
        target: &TargetHandle,
        attribute: Option<&str>,
    ) -> Result<String, AutomationError>;

    async fn click(&self, target: &TargetHandle) -> Result<(), AutomationError>;

    /// Replace the target's value with `text`.
    async fn type_text(&self, target: &TargetHandle, text: &str) -> Result<(), AutomationError>;

    /// Poll until `condition` holds or `timeout` elapses. Returns whether it
    /// held.
    async fn wait_for(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, AutomationError>;

    /// Dismiss any known transient overlay. Returns whether one was found.
    async fn dismiss_obstruction(&self) -> Result<bool, AutomationError>;

    async fn capture_diagnostic(&self, label: &str) -> Result<Diagnostic, AutomationError>;
}

/// Opens isolated sessions (own profile, cookies and page) for the pool.
#[async_trait::async_trait]
pub trait PortFactory: Send + Sync {
    async fn open_session(
        &self,
        session_id: &str,
    ) -> Result<Arc<dyn UiAutomationPort>, AutomationError>;
}
