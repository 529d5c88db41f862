//! Per-deployment configuration: where the pages live, how to find things on
//! them, and how patient to be.
//!
//! Every semantic target is a list of strategy strings (see
//! [`crate::selector::Strategy`]), most specific first. `{name}` in a
//! template is replaced with the label being acted on.

use crate::plan::{Backoff, RetryPolicy};
use crate::progression::{EquipmentProfile, DEFAULT_INCREMENT};
use crate::resolver::{LENIENT_THRESHOLD, STRICT_THRESHOLD};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Milliseconds per unit suffix. A bare number is milliseconds.
const DURATION_UNITS: &[(&[&str], f64)] = &[
    (&["", "ms", "millisecond", "milliseconds"], 1.0),
    (&["s", "sec", "secs", "second", "seconds"], 1_000.0),
    (&["m", "min", "mins", "minute", "minutes"], 60_000.0),
    (&["h", "hr", "hrs", "hour", "hours"], 3_600_000.0),
];

/// `"500"`, `"250ms"`, `"2.5s"`, `"30m"`, `"1 hour"`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    let unit_at = text.find(|c: char| c.is_alphabetic()).unwrap_or(text.len());
    let (amount, unit) = text.split_at(unit_at);
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(anyhow!("duration '{}' has no amount", input));
    }
    let amount: f64 = amount
        .parse()
        .map_err(|_| anyhow!("duration '{}' has a malformed amount", input))?;
    let unit = unit.trim().to_lowercase();
    let scale = DURATION_UNITS
        .iter()
        .find(|(names, _)| names.contains(&unit.as_str()))
        .map(|(_, scale)| *scale)
        .ok_or_else(|| anyhow!("duration '{}' has unknown unit '{}'", input, unit))?;
    let millis = (amount * scale).round();
    if !millis.is_finite() || millis < 0.0 || millis > u64::MAX as f64 {
        return Err(anyhow!("duration '{}' is negative or out of range", input));
    }
    Ok(Duration::from_millis(millis as u64))
}

fn de_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(deserialize_with = "de_duration")]
    pub per_attempt_timeout: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub backoff_initial: Duration,
    pub backoff_multiplier: f64,
    #[serde(deserialize_with = "de_duration")]
    pub backoff_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            per_attempt_timeout: policy.per_attempt_timeout,
            backoff_initial: policy.backoff.initial,
            backoff_multiplier: policy.backoff.multiplier,
            backoff_max: policy.backoff.max,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.per_attempt_timeout).with_backoff(Backoff {
            initial: self.backoff_initial,
            multiplier: self.backoff_multiplier,
            max: self.backoff_max,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PageUrls {
    pub login: String,
    pub programs: String,
    pub history: String,
    /// `{subject}` is replaced with the subject identifier.
    pub checkin: String,
}

impl Default for PageUrls {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            programs: "/programs".to_string(),
            history: "/history".to_string(),
            checkin: "/clients/{subject}/checkins".to_string(),
        }
    }
}

fn strategies(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub username: Vec<String>,
    pub password: Vec<String>,
    pub submit: Vec<String>,
    pub signed_in_marker: Vec<String>,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username: strategies(&["#email", "css:input[type=email]", "placeholder:Email"]),
            password: strategies(&["#password", "css:input[type=password]", "placeholder:Password"]),
            submit: strategies(&["testid:login-submit", "role:button|Log in", "text:Log in"]),
            signed_in_marker: strategies(&["testid:account-menu", "role:navigation"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgramSelectors {
    pub listing_marker: Vec<String>,
    pub card_title: Vec<String>,
    /// Templates; `{name}` is the resolved program label.
    pub open_program: Vec<String>,
    pub new_program: Vec<String>,
    pub name_input: Vec<String>,
    pub duration_input: Vec<String>,
    pub create_submit: Vec<String>,
    pub editor_marker: Vec<String>,
}

impl Default for ProgramSelectors {
    fn default() -> Self {
        Self {
            listing_marker: strategies(&["testid:program-list", "role:heading|Programs"]),
            card_title: strategies(&["css:[data-testid=program-card] h3", "css:.program-card .title", "role:link"]),
            open_program: strategies(&["role:link|{name}", "text:{name}", "contains:{name}"]),
            new_program: strategies(&["testid:new-program", "role:button|New Program", "contains:New Program"]),
            name_input: strategies(&["#program-name", "placeholder:Program name", "label:Name"]),
            duration_input: strategies(&["#program-duration", "label:Duration (weeks)", "placeholder:Weeks"]),
            create_submit: strategies(&["testid:create-program", "role:button|Create", "text:Create"]),
            editor_marker: strategies(&["testid:program-editor", "role:button|Add Workout"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkoutSelectors {
    pub add_workout: Vec<String>,
    /// Templates; `{name}` is the workout type, e.g. "Regular".
    pub workout_type: Vec<String>,
    pub type_chosen_marker: Vec<String>,
    pub name_input: Vec<String>,
    pub builder_marker: Vec<String>,
    pub save: Vec<String>,
    pub saved_marker: Vec<String>,
}

impl Default for WorkoutSelectors {
    fn default() -> Self {
        Self {
            add_workout: strategies(&["testid:add-workout", "role:button|Add Workout", "contains:Add Workout"]),
            workout_type: strategies(&["role:menuitem|{name}", "role:option|{name}", "text:{name}"]),
            type_chosen_marker: strategies(&["#workout-name", "placeholder:Workout name"]),
            name_input: strategies(&["#workout-name", "placeholder:Workout name", "label:Workout name"]),
            builder_marker: strategies(&["testid:workout-builder", "role:button|Add Exercise"]),
            save: strategies(&["testid:save-workout", "role:button|Save", "text:Save"]),
            saved_marker: strategies(&["testid:toast-success", "contains:Workout saved"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExerciseSelectors {
    pub open_search: Vec<String>,
    pub search_input: Vec<String>,
    pub search_result: Vec<String>,
    /// Templates; `{name}` is the resolved result label.
    pub pick_result: Vec<String>,
    pub sets_input: Vec<String>,
    pub reps_input: Vec<String>,
    pub submit: Vec<String>,
    /// Rows of the exercise list inside an open editor.
    pub editor_row: Vec<String>,
    /// Title element, relative to an editor row.
    pub row_title: Vec<String>,
    /// Goal input, relative to an editor row.
    pub goal_input: Vec<String>,
}

impl Default for ExerciseSelectors {
    fn default() -> Self {
        Self {
            open_search: strategies(&["testid:add-exercise", "role:button|Add Exercise", "contains:Add Exercise"]),
            search_input: strategies(&["testid:exercise-search", "placeholder:Search exercises", "css:input[type=search]"]),
            search_result: strategies(&["css:[data-testid=exercise-result] .name", "css:.exercise-result", "role:option"]),
            pick_result: strategies(&["role:option|{name}", "text:{name}", "contains:{name}"]),
            sets_input: strategies(&["#exercise-sets", "label:Sets", "placeholder:Sets"]),
            reps_input: strategies(&["#exercise-reps", "label:Reps", "placeholder:Reps"]),
            submit: strategies(&["testid:add-exercise-submit", "role:button|Add", "text:Add"]),
            editor_row: strategies(&["css:[data-testid=exercise-row]", "css:.exercise-row", "role:row"]),
            row_title: strategies(&["css:.exercise-title", "role:heading"]),
            goal_input: strategies(&["css:input.goal", "placeholder:Goal", "label:Goal"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySelectors {
    pub row: Vec<String>,
    pub date_cell: Vec<String>,
    pub workout_cell: Vec<String>,
    pub exercise_cell: Vec<String>,
    pub set_cell: Vec<String>,
}

impl Default for HistorySelectors {
    fn default() -> Self {
        Self {
            row: strategies(&["css:[data-testid=history-row]", "css:table.history tbody tr", "role:row"]),
            date_cell: strategies(&["css:.date", "css:td:nth-child(1)"]),
            workout_cell: strategies(&["css:.workout", "css:td:nth-child(2)"]),
            exercise_cell: strategies(&["css:.exercise", "css:td:nth-child(3)"]),
            set_cell: strategies(&["css:.set", "css:td.set"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckinSelectors {
    pub loaded_marker: Vec<String>,
}

impl Default for CheckinSelectors {
    fn default() -> Self {
        Self {
            loaded_marker: strategies(&["testid:checkin-detail", "role:heading|Check-in"]),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub login: LoginSelectors,
    pub programs: ProgramSelectors,
    pub workouts: WorkoutSelectors,
    pub exercises: ExerciseSelectors,
    pub history: HistorySelectors,
    pub checkin: CheckinSelectors,
}

/// Exercises whose name contains `keyword` use `profile`.
#[derive(Debug, Clone, Deserialize)]
pub struct EquipmentRule {
    pub keyword: String,
    pub profile: EquipmentProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub base_url: String,
    pub urls: PageUrls,
    pub selectors: Selectors,
    pub strict_threshold: u8,
    pub lenient_threshold: u8,
    pub retry: RetryConfig,
    #[serde(deserialize_with = "de_duration")]
    pub gate_timeout: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub cache_ttl: Duration,
    pub simplified_name_max_len: usize,
    pub weight_unit: String,
    pub workout_type: String,
    pub default_program_weeks: u32,
    pub equipment: Vec<EquipmentRule>,
    pub default_equipment: EquipmentProfile,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://app.example-coach.com".to_string(),
            urls: PageUrls::default(),
            selectors: Selectors::default(),
            strict_threshold: STRICT_THRESHOLD,
            lenient_threshold: LENIENT_THRESHOLD,
            retry: RetryConfig::default(),
            gate_timeout: Duration::from_secs(15),
            cache_ttl: Duration::from_secs(30 * 60),
            simplified_name_max_len: 30,
            weight_unit: "kg".to_string(),
            workout_type: "Regular".to_string(),
            default_program_weeks: 4,
            equipment: vec![EquipmentRule {
                keyword: "dumbbell".to_string(),
                profile: EquipmentProfile::dumbbells(),
            }],
            default_equipment: EquipmentProfile::Continuous {
                increment: DEFAULT_INCREMENT,
            },
        }
    }
}

impl OrchestratorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: OrchestratorConfig =
            serde_yaml::from_str(yaml).context("Failed to parse orchestrator config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.strict_threshold > 100 || self.lenient_threshold > 100 {
            return Err(anyhow!("thresholds must be within 0..=100"));
        }
        if self.lenient_threshold > self.strict_threshold {
            return Err(anyhow!(
                "lenient threshold ({}) must not exceed strict threshold ({})",
                self.lenient_threshold,
                self.strict_threshold
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.retry.per_attempt_timeout.is_zero() {
            return Err(anyhow!("retry.per_attempt_timeout must be positive"));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(anyhow!(
                "retry.backoff_multiplier must be a finite number of at least 1, got {}",
                self.retry.backoff_multiplier
            ));
        }
        if self.simplified_name_max_len == 0 {
            return Err(anyhow!("simplified_name_max_len must be positive"));
        }
        let profiles = self
            .equipment
            .iter()
            .map(|rule| (rule.keyword.as_str(), &rule.profile))
            .chain(std::iter::once(("default", &self.default_equipment)));
        for (keyword, profile) in profiles {
            match profile {
                EquipmentProfile::Discrete {
                    catalog,
                    fallback_increment,
                } => {
                    // Re-run the constructor checks; serde bypasses them.
                    let normalized = EquipmentProfile::discrete(catalog.clone(), *fallback_increment)
                        .map_err(|e| anyhow!("equipment '{}': {}", keyword, e))?;
                    if &normalized != profile {
                        return Err(anyhow!(
                            "equipment '{}': catalog must be strictly increasing",
                            keyword
                        ));
                    }
                }
                EquipmentProfile::Continuous { increment } => {
                    EquipmentProfile::continuous(*increment)
                        .map_err(|e| anyhow!("equipment '{}': {}", keyword, e))?;
                }
            }
        }
        Ok(())
    }

    /// Absolute URL for a configured page path.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn checkin_url(&self, subject: &str) -> String {
        self.url(&self.urls.checkin.replace("{subject}", subject))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    /// Equipment profile for an exercise, by the first keyword rule that
    /// matches its name.
    pub fn equipment_for(&self, exercise: &str) -> &EquipmentProfile {
        let lower = exercise.to_lowercase();
        self.equipment
            .iter()
            .find(|rule| lower.contains(&rule.keyword.to_lowercase()))
            .map(|rule| &rule.profile)
            .unwrap_or(&self.default_equipment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2.5s").unwrap(), Duration::from_millis(2500));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("1 hour").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-2s").is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
base_url: https://coach.test/
gate_timeout: 3s
retry:
  max_attempts: 5
  per_attempt_timeout: 750ms
selectors:
  programs:
    new_program: ["testid:create", "text:+ Program"]
equipment:
  - keyword: kettlebell
    profile:
      type: discrete
      catalog: [8, 12, 16, 20, 24]
      fallback_increment: 4
"#;
        let config = OrchestratorConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.gate_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.per_attempt_timeout, Duration::from_millis(750));
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert_eq!(config.selectors.programs.new_program.len(), 2);
        assert_eq!(
            config.selectors.programs.open_program,
            ProgramSelectors::default().open_program
        );
        assert_eq!(config.url("/programs"), "https://coach.test/programs");
        assert_eq!(config.lenient_threshold, LENIENT_THRESHOLD);

        assert_eq!(config.equipment_for("Kettlebell Swing").next_weight(16.0), 20.0);
        assert_eq!(config.equipment_for("Back Squat").next_weight(100.0), 102.5);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let yaml = "strict_threshold: 50\nlenient_threshold: 70\n";
        assert!(OrchestratorConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_bad_retry_settings_rejected() {
        assert!(OrchestratorConfig::from_yaml_str("retry:\n  per_attempt_timeout: 0ms\n").is_err());
        assert!(OrchestratorConfig::from_yaml_str("retry:\n  backoff_multiplier: 0.5\n").is_err());
        assert!(OrchestratorConfig::from_yaml_str("retry:\n  backoff_multiplier: .inf\n").is_err());

        let config = OrchestratorConfig::from_yaml_str("retry:\n  max_attempts: 500\n").unwrap();
        let policy = config.retry_policy();
        assert_eq!(policy.backoff.delay(499), policy.backoff.max);
    }

    #[test]
    fn test_unsorted_catalog_rejected() {
        let yaml = r#"
equipment:
  - keyword: plate
    profile: { type: discrete, catalog: [10, 5, 20], fallback_increment: 5 }
"#;
        let err = OrchestratorConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "weight_unit: lb\ncache_ttl: 10m").unwrap();
        let config = OrchestratorConfig::load(file.path()).unwrap();
        assert_eq!(config.weight_unit, "lb");
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(
            config.checkin_url("client-42"),
            "https://app.example-coach.com/clients/client-42/checkins"
        );
    }

    #[test]
    fn test_demo_config_is_valid() {
        let config =
            OrchestratorConfig::from_yaml_str(include_str!("../../demos/coachpilot.yaml")).unwrap();
        assert_eq!(config.equipment.len(), 2);
        assert_eq!(config.equipment_for("Goblet Squat (Kettlebell)").next_weight(24.0), 28.0);
        assert_eq!(config.equipment_for("Incline Dumbbell Press").next_weight(7.0), 7.5);
        assert_eq!(config.selectors.exercises.search_result.len(), 3);
    }
}
