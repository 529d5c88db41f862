#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use coachpilot::config::OrchestratorConfig;
use coachpilot::port::{Diagnostic, PortFactory, TargetHandle, UiAutomationPort, WaitCondition};
use coachpilot::{AutomationError, Strategy};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coachpilot=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Canonical key the fake uses for a strategy string.
pub fn key(strategy: &str) -> String {
    Strategy::from(strategy).to_string()
}

/// Default configuration with retries that do not sleep.
pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.base_url = "https://coach.test".to_string();
    config.retry.max_attempts = 2;
    config.retry.backoff_initial = Duration::ZERO;
    config.retry.backoff_max = Duration::ZERO;
    config.gate_timeout = Duration::from_millis(50);
    config
}

#[derive(Debug, Clone)]
struct FakeElement {
    id: String,
    text: String,
    interactable: bool,
}

struct TypeHook {
    target: String,
    text: String,
    strategy: String,
    elements: Vec<FakeElement>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    top: HashMap<String, Vec<FakeElement>>,
    scoped: HashMap<(String, String), Vec<FakeElement>>,
    texts: HashMap<String, String>,
    values: HashMap<String, String>,
    visible: HashSet<String>,
    locate_errors: HashMap<String, VecDeque<AutomationError>>,
    action_errors: HashMap<String, VecDeque<AutomationError>>,
    locate_delay: HashMap<String, Duration>,
    hooks: Vec<TypeHook>,
    obstructions: u32,
    navigation_error: Option<AutomationError>,
    url: Option<String>,
    captures: Vec<String>,
}

/// Scripted in-memory page. Elements are registered per strategy string;
/// every call is recorded for assertions.
#[derive(Default)]
pub struct FakePort {
    state: Mutex<FakeState>,
}

impl FakePort {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Register a top-level element matched by `strategy`.
    pub fn element(&self, strategy: &str, id: &str, text: &str) -> &Self {
        self.push(strategy, id, text, true)
    }

    pub fn inert_element(&self, strategy: &str, id: &str, text: &str) -> &Self {
        self.push(strategy, id, text, false)
    }

    fn push(&self, strategy: &str, id: &str, text: &str, interactable: bool) -> &Self {
        self.with(|s| {
            s.top.entry(key(strategy)).or_default().push(FakeElement {
                id: id.to_string(),
                text: text.to_string(),
                interactable,
            });
            s.texts.insert(id.to_string(), text.to_string());
        });
        self
    }

    /// Register an element matched by `strategy` inside `parent`.
    pub fn child(&self, parent: &str, strategy: &str, id: &str, text: &str) -> &Self {
        self.with(|s| {
            s.scoped
                .entry((parent.to_string(), key(strategy)))
                .or_default()
                .push(FakeElement {
                    id: id.to_string(),
                    text: text.to_string(),
                    interactable: true,
                });
            s.texts.insert(id.to_string(), text.to_string());
        });
        self
    }

    pub fn visible_text(&self, text: &str) -> &Self {
        self.with(|s| {
            s.visible.insert(text.to_lowercase());
        });
        self
    }

    /// When exactly `text` is typed into `target`, replace whatever
    /// `strategy` matches with `results`.
    pub fn on_type(&self, target: &str, text: &str, strategy: &str, results: &[(&str, &str)]) -> &Self {
        self.with(|s| {
            s.hooks.push(TypeHook {
                target: target.to_string(),
                text: text.to_string(),
                strategy: key(strategy),
                elements: results
                    .iter()
                    .map(|(id, text)| FakeElement {
                        id: id.to_string(),
                        text: text.to_string(),
                        interactable: true,
                    })
                    .collect(),
            });
        });
        self
    }

    pub fn fail_locate(&self, strategy: &str, error: AutomationError) -> &Self {
        self.with(|s| {
            s.locate_errors.entry(key(strategy)).or_default().push_back(error);
        });
        self
    }

    /// Queue an error for the next click, type or read on `id`.
    pub fn fail_action(&self, id: &str, error: AutomationError) -> &Self {
        self.with(|s| {
            s.action_errors.entry(id.to_string()).or_default().push_back(error);
        });
        self
    }

    pub fn delay_locate(&self, strategy: &str, delay: Duration) -> &Self {
        self.with(|s| {
            s.locate_delay.insert(key(strategy), delay);
        });
        self
    }

    /// An overlay that the next `count` obstruction checks each dismiss once.
    /// Clicks and typing fail as obstructed while any remain.
    pub fn obstruct(&self, count: u32) -> &Self {
        self.with(|s| s.obstructions = count);
        self
    }

    pub fn fail_navigation(&self, error: AutomationError) -> &Self {
        self.with(|s| s.navigation_error = Some(error));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    pub fn typed(&self, id: &str) -> Option<String> {
        self.with(|s| s.values.get(id).cloned())
    }

    pub fn clicked(&self, id: &str) -> bool {
        self.with(|s| s.calls.iter().any(|c| c == &format!("click {id}")))
    }

    pub fn captures(&self) -> Vec<String> {
        self.with(|s| s.captures.clone())
    }

    fn take_action_error(&self, id: &str) -> Option<AutomationError> {
        self.with(|s| s.action_errors.get_mut(id).and_then(|q| q.pop_front()))
    }

    fn blocked(&self) -> bool {
        self.with(|s| s.obstructions > 0)
    }

    fn present(state: &FakeState, strategies: &[Strategy]) -> bool {
        strategies
            .iter()
            .any(|st| state.top.get(&st.to_string()).is_some_and(|e| !e.is_empty()))
    }

    fn find(&self, strategy: &Strategy, within: Option<&TargetHandle>) -> Vec<FakeElement> {
        self.with(|s| {
            let key = strategy.to_string();
            match within {
                Some(parent) => s.scoped.get(&(parent.id.clone(), key)).cloned(),
                None => s.top.get(&key).cloned(),
            }
            .unwrap_or_default()
        })
    }

    async fn before_locate(&self, strategy: &Strategy, within: Option<&TargetHandle>, verb: &str) -> Result<(), AutomationError> {
        let key = strategy.to_string();
        let (delay, error) = self.with(|s| {
            let scope = within.map(|w| format!(" in {}", w.id)).unwrap_or_default();
            s.calls.push(format!("{verb} {key}{scope}"));
            (
                s.locate_delay.get(&key).copied(),
                s.locate_errors.get_mut(&key).and_then(|q| q.pop_front()),
            )
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn handle(element: &FakeElement) -> TargetHandle {
    if element.interactable {
        TargetHandle::new(&element.id)
    } else {
        TargetHandle::inert(&element.id)
    }
}

#[async_trait]
impl UiAutomationPort for FakePort {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.with(|s| {
            s.calls.push(format!("navigate {url}"));
            match s.navigation_error.clone() {
                Some(e) => Err(e),
                None => {
                    s.url = Some(url.to_string());
                    Ok(())
                }
            }
        })
    }

    async fn locate(
        &self,
        strategy: &Strategy,
        within: Option<&TargetHandle>,
    ) -> Result<Option<TargetHandle>, AutomationError> {
        self.before_locate(strategy, within, "locate").await?;
        Ok(self.find(strategy, within).first().map(handle))
    }

    async fn locate_all(
        &self,
        strategy: &Strategy,
        within: Option<&TargetHandle>,
    ) -> Result<Vec<TargetHandle>, AutomationError> {
        self.before_locate(strategy, within, "locate_all").await?;
        Ok(self.find(strategy, within).iter().map(handle).collect())
    }

    async fn read(&self, target: &TargetHandle, attribute: Option<&str>) -> Result<String, AutomationError> {
        self.with(|s| s.calls.push(format!("read {}", target.id)));
        if let Some(e) = self.take_action_error(&target.id) {
            return Err(e);
        }
        self.with(|s| match attribute {
            Some("value") => Ok(s.values.get(&target.id).cloned().unwrap_or_default()),
            _ => Ok(s.texts.get(&target.id).cloned().unwrap_or_default()),
        })
    }

    async fn click(&self, target: &TargetHandle) -> Result<(), AutomationError> {
        self.with(|s| s.calls.push(format!("click {}", target.id)));
        if let Some(e) = self.take_action_error(&target.id) {
            return Err(e);
        }
        if self.blocked() {
            return Err(AutomationError::ElementObscured(target.id.clone()));
        }
        Ok(())
    }

    async fn type_text(&self, target: &TargetHandle, text: &str) -> Result<(), AutomationError> {
        self.with(|s| s.calls.push(format!("type {} {text}", target.id)));
        if let Some(e) = self.take_action_error(&target.id) {
            return Err(e);
        }
        if self.blocked() {
            return Err(AutomationError::ElementObscured(target.id.clone()));
        }
        self.with(|s| {
            s.values.insert(target.id.clone(), text.to_string());
            let fired: Vec<(String, Vec<FakeElement>)> = s
                .hooks
                .iter()
                .filter(|h| h.target == target.id && h.text == text)
                .map(|h| (h.strategy.clone(), h.elements.clone()))
                .collect();
            for (strategy, elements) in fired {
                for element in &elements {
                    s.texts.insert(element.id.clone(), element.text.clone());
                }
                s.top.insert(strategy, elements);
            }
        });
        Ok(())
    }

    async fn wait_for(&self, condition: &WaitCondition, _timeout: Duration) -> Result<bool, AutomationError> {
        Ok(self.with(|s| {
            s.calls.push(format!("wait {condition}"));
            match condition {
                WaitCondition::Present(strategies) => Self::present(s, strategies),
                WaitCondition::Absent(strategies) => !Self::present(s, strategies),
                WaitCondition::TextVisible(text) => {
                    let text = text.to_lowercase();
                    s.visible.contains(&text)
                        || s.texts.values().any(|t| t.to_lowercase() == text)
                }
                WaitCondition::UrlContains(part) => {
                    s.url.as_deref().is_some_and(|u| u.contains(part.as_str()))
                }
            }
        }))
    }

    async fn dismiss_obstruction(&self) -> Result<bool, AutomationError> {
        Ok(self.with(|s| {
            s.calls.push("dismiss".to_string());
            if s.obstructions > 0 {
                s.obstructions -= 1;
                true
            } else {
                false
            }
        }))
    }

    async fn capture_diagnostic(&self, label: &str) -> Result<Diagnostic, AutomationError> {
        self.with(|s| {
            s.captures.push(label.to_string());
            Ok(Diagnostic {
                label: label.to_string(),
                captured_at: Utc::now(),
                image: b"\x89PNG fake".to_vec(),
                page_url: s.url.clone(),
            })
        })
    }
}

/// Hands out a fresh page per session, built by `script`.
pub struct FakeFactory {
    script: Box<dyn Fn(&str) -> Result<Arc<FakePort>, AutomationError> + Send + Sync>,
    pub opened: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn new(script: impl Fn(&str) -> Result<Arc<FakePort>, AutomationError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            opened: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PortFactory for FakeFactory {
    async fn open_session(&self, session_id: &str) -> Result<Arc<dyn UiAutomationPort>, AutomationError> {
        self.opened.lock().unwrap().push(session_id.to_string());
        let port: Arc<dyn UiAutomationPort> = (self.script)(session_id)?;
        Ok(port)
    }
}
