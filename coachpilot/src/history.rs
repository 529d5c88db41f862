//! Scraped performance history and the parsing of its cells.

use crate::errors::AutomationError;
use crate::progression::SetEntry;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static SET_CELL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*[x×]\s*(\d+(?:[.,]\d+)?)\s*(kg|lbs?)?\s*$")
        .expect("set cell pattern is valid")
});

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%b %d, %Y", "%d %b %Y", "%B %d, %Y"];

/// One exercise's sets on a given date. Never modified after scraping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub exercise: String,
    pub date: NaiveDate,
    pub sets: Vec<SetEntry>,
}

/// Deduplication key: the same workout on the same day is only ever
/// recorded once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HistoryKey {
    pub date: NaiveDate,
    pub workout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSession {
    pub key: HistoryKey,
    pub records: Vec<PerformanceRecord>,
}

/// Parse a `"<reps> X <weight>[unit]"` cell, e.g. `"10 x 22.5kg"`.
pub fn parse_set_cell(cell: &str) -> Result<SetEntry, AutomationError> {
    let caps = SET_CELL
        .captures(cell)
        .ok_or_else(|| AutomationError::InvalidData(format!("set cell '{}'", cell.trim())))?;

    let reps: u32 = caps[1]
        .parse()
        .map_err(|_| AutomationError::InvalidData(format!("reps in '{}'", cell.trim())))?;
    let weight: f64 = caps[2]
        .replace(',', ".")
        .parse()
        .map_err(|_| AutomationError::InvalidData(format!("weight in '{}'", cell.trim())))?;

    Ok(SetEntry::new(weight, reps))
}

pub fn parse_date(text: &str) -> Result<NaiveDate, AutomationError> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| AutomationError::InvalidData(format!("date '{text}'")))
}

/// Raw text scraped from one history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHistoryRow {
    pub date: String,
    pub workout: String,
    pub exercise: String,
    pub set_cells: Vec<String>,
}

impl RawHistoryRow {
    /// Validate and convert. Any malformed cell rejects the whole row so a
    /// half-parsed record never reaches the store.
    pub fn parse(&self) -> Result<(HistoryKey, PerformanceRecord), AutomationError> {
        let date = parse_date(&self.date)?;
        let workout = self.workout.trim();
        let exercise = self.exercise.trim();
        if workout.is_empty() || exercise.is_empty() {
            return Err(AutomationError::InvalidData(format!(
                "row on {date} is missing its workout or exercise name"
            )));
        }

        let sets = self
            .set_cells
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| parse_set_cell(c))
            .collect::<Result<Vec<_>, _>>()?;
        if sets.is_empty() {
            return Err(AutomationError::InvalidData(format!(
                "'{exercise}' on {date} has no sets"
            )));
        }

        Ok((
            HistoryKey {
                date,
                workout: workout.to_string(),
            },
            PerformanceRecord {
                exercise: exercise.to_string(),
                date,
                sets,
            },
        ))
    }
}

/// All scraped sessions, keyed by `(date, workout)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStore {
    #[serde(with = "session_list")]
    sessions: BTreeMap<HistoryKey, WorkoutSession>,
}

/// JSON object keys must be strings, so the map is stored as a list.
mod session_list {
    use super::{HistoryKey, WorkoutSession};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<HistoryKey, WorkoutSession>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.values().collect::<Vec<_>>().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<HistoryKey, WorkoutSession>, D::Error> {
        let list = Vec::<WorkoutSession>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|s| (s.key.clone(), s)).collect())
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, key: &HistoryKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &HistoryKey> {
        self.sessions.keys()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &WorkoutSession> {
        self.sessions.values()
    }

    /// Add a session unless its key is already present. Returns whether it
    /// was added.
    pub fn insert_session(&mut self, session: WorkoutSession) -> bool {
        if self.sessions.contains_key(&session.key) {
            return false;
        }
        self.sessions.insert(session.key.clone(), session);
        true
    }

    /// Merge another store; existing keys win. Returns the number of new
    /// sessions.
    pub fn merge(&mut self, other: HistoryStore) -> usize {
        other
            .sessions
            .into_values()
            .filter(|s| self.insert_session(s.clone()))
            .count()
    }

    /// Every record for `exercise` (case-insensitive), oldest first.
    pub fn records_for(&self, exercise: &str) -> Vec<&PerformanceRecord> {
        let wanted = exercise.trim().to_lowercase();
        let mut records: Vec<&PerformanceRecord> = self
            .sessions
            .values()
            .flat_map(|s| s.records.iter())
            .filter(|r| r.exercise.to_lowercase() == wanted)
            .collect();
        records.sort_by_key(|r| r.date);
        records
    }

    pub fn latest_for(&self, exercise: &str) -> Option<&PerformanceRecord> {
        self.records_for(exercise).into_iter().last()
    }

    /// Distinct exercise names, as first seen.
    pub fn exercises(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in self.sessions.values().flat_map(|s| s.records.iter()) {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&record.exercise)) {
                names.push(record.exercise.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, workout: &str, exercise: &str, sets: &[&str]) -> RawHistoryRow {
        RawHistoryRow {
            date: date.into(),
            workout: workout.into(),
            exercise: exercise.into(),
            set_cells: sets.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_set_cell_variants() {
        assert_eq!(parse_set_cell("10 X 22.5kg").unwrap(), SetEntry::new(22.5, 10));
        assert_eq!(parse_set_cell(" 8 x 60 ").unwrap(), SetEntry::new(60.0, 8));
        assert_eq!(parse_set_cell("12×17,5 lbs").unwrap(), SetEntry::new(17.5, 12));
        assert!(matches!(
            parse_set_cell("AMRAP"),
            Err(AutomationError::InvalidData(_))
        ));
        assert!(parse_set_cell("10 x").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(parse_date("2024-03-07").unwrap(), expected);
        assert_eq!(parse_date("03/07/2024").unwrap(), expected);
        assert_eq!(parse_date("Mar 07, 2024").unwrap(), expected);
        assert_eq!(parse_date("7 Mar 2024").unwrap(), expected);
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_malformed_cell_rejects_row() {
        let bad = row("2024-03-07", "Push A", "Bench Press", &["10 x 60kg", "failed"]);
        assert!(bad.parse().is_err());
        let empty = row("2024-03-07", "Push A", "Bench Press", &["", " "]);
        assert!(empty.parse().is_err());
    }

    #[test]
    fn test_insert_is_idempotent_by_key() {
        let (key, record) = row("2024-03-07", "Push A", "Bench Press", &["10 x 60kg"])
            .parse()
            .unwrap();
        let mut store = HistoryStore::new();
        let session = WorkoutSession {
            key: key.clone(),
            records: vec![record],
        };
        assert!(store.insert_session(session.clone()));
        assert!(!store.insert_session(session.clone()));
        assert_eq!(store.len(), 1);

        let mut other = HistoryStore::new();
        other.insert_session(session);
        assert_eq!(store.merge(other), 0);
    }

    #[test]
    fn test_latest_for_is_case_insensitive_and_newest() {
        let mut store = HistoryStore::new();
        for (date, reps) in [("2024-03-01", "8 x 60kg"), ("2024-03-08", "10 x 60kg")] {
            let (key, record) = row(date, "Push A", "Bench Press", &[reps]).parse().unwrap();
            store.insert_session(WorkoutSession {
                key,
                records: vec![record],
            });
        }
        let latest = store.latest_for("bench press").unwrap();
        assert_eq!(latest.sets[0].reps, 10);
        assert_eq!(store.records_for("BENCH PRESS").len(), 2);
        assert!(store.latest_for("Squat").is_none());
        assert_eq!(store.exercises(), vec!["Bench Press".to_string()]);
    }

    #[test]
    fn test_store_serializes_as_list() {
        let (key, record) = row("2024-03-07", "Legs", "Squat", &["5 x 100kg"]).parse().unwrap();
        let mut store = HistoryStore::new();
        store.insert_session(WorkoutSession {
            key,
            records: vec![record],
        });
        let json = serde_json::to_value(&store).unwrap();
        assert!(json["sessions"].is_array());
        let back: HistoryStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }
}
