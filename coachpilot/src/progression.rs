//! Progressive overload: turn the last recorded sets of an exercise into the
//! next period's per-set targets.
//!
//! Every set index progresses on its own. Reps climb the [`REP_LADDER`]; once
//! a set reaches the top rung the weight steps up and reps reset to the
//! floor. How far the weight steps depends on the [`EquipmentProfile`].

use crate::errors::ProgressionError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const REP_LADDER: [u32; 5] = [6, 8, 10, 12, 15];
pub const MIN_GOAL_SETS: usize = 3;
pub const DEFAULT_INCREMENT: f64 = 2.5;
pub const NO_HISTORY_REASON: &str = "no_history";

const LADDER_FLOOR: u32 = REP_LADDER[0];
const LADDER_TOP: u32 = REP_LADDER[REP_LADDER.len() - 1];

/// Standard fixed-weight dumbbell rack.
pub const DUMBBELL_CATALOG: &[f64] = &[
    1.0, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0, 7.0, 7.5, 8.0, 9.0, 10.0, 12.5, 15.0, 17.5, 20.0, 22.5,
    25.0, 27.5, 30.0, 32.5, 35.0, 37.5, 40.0, 42.5, 45.0, 47.5, 50.0,
];

/// One performed set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub weight: f64,
    pub reps: u32,
}

impl SetEntry {
    pub fn new(weight: f64, reps: u32) -> Self {
        Self { weight, reps }
    }
}

/// How weight steps up for a piece of equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EquipmentProfile {
    /// Fixed catalog of available weights, strictly increasing. Past the top
    /// of the catalog the fallback increment is used instead.
    Discrete {
        catalog: Vec<f64>,
        fallback_increment: f64,
    },
    /// Any weight is available; add a fixed increment.
    Continuous { increment: f64 },
}

impl EquipmentProfile {
    /// Build a discrete profile. The catalog is sorted and deduplicated, so
    /// callers may pass weights in any order.
    pub fn discrete(catalog: Vec<f64>, fallback_increment: f64) -> Result<Self, ProgressionError> {
        if catalog.is_empty() {
            return Err(ProgressionError::EmptyCatalog);
        }
        if let Some(bad) = catalog.iter().find(|w| !w.is_finite() || **w <= 0.0) {
            return Err(ProgressionError::InvalidWeight(*bad));
        }
        validate_increment(fallback_increment)?;

        let mut catalog = catalog;
        catalog.sort_by(|a, b| a.total_cmp(b));
        catalog.dedup();
        Ok(EquipmentProfile::Discrete {
            catalog,
            fallback_increment,
        })
    }

    pub fn continuous(increment: f64) -> Result<Self, ProgressionError> {
        validate_increment(increment)?;
        Ok(EquipmentProfile::Continuous { increment })
    }

    pub fn dumbbells() -> Self {
        EquipmentProfile::Discrete {
            catalog: DUMBBELL_CATALOG.to_vec(),
            fallback_increment: DEFAULT_INCREMENT,
        }
    }

    /// The next weight strictly above `current`.
    pub fn next_weight(&self, current: f64) -> f64 {
        match self {
            EquipmentProfile::Discrete {
                catalog,
                fallback_increment,
            } => catalog
                .iter()
                .copied()
                .find(|w| *w > current)
                .unwrap_or_else(|| round_weight(current + fallback_increment)),
            EquipmentProfile::Continuous { increment } => round_weight(current + increment),
        }
    }
}

impl Default for EquipmentProfile {
    fn default() -> Self {
        EquipmentProfile::Continuous {
            increment: DEFAULT_INCREMENT,
        }
    }
}

fn validate_increment(increment: f64) -> Result<(), ProgressionError> {
    if !increment.is_finite() || increment <= 0.0 {
        return Err(ProgressionError::InvalidIncrement(increment));
    }
    Ok(())
}

fn round_weight(weight: f64) -> f64 {
    (weight * 100.0).round() / 100.0
}

/// Target for one set next period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetGoal {
    /// `None` only when there is no history to base a weight on.
    pub weight: Option<f64>,
    pub reps: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalBasis {
    Computed,
    NoHistory,
}

/// Per-set targets for one exercise. Always at least [`MIN_GOAL_SETS`] long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionGoal {
    pub sets: Vec<SetGoal>,
    pub basis: GoalBasis,
}

impl ProgressionGoal {
    pub fn has_history(&self) -> bool {
        self.basis == GoalBasis::Computed
    }

    /// Render the goal in the form written into the coach app's goal field,
    /// e.g. `"22.5kg x 6 | 20kg x 12 | 20kg x 12"`.
    pub fn format(&self, unit: &str) -> String {
        self.sets
            .iter()
            .map(|set| match set.weight {
                Some(w) => format!("{}{} x {}", format_weight(w), unit, set.reps),
                None => format!("{} reps", set.reps),
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for ProgressionGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.sets.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match set.weight {
                Some(w) => write!(f, "set {}: {} x {} ({})", i + 1, format_weight(w), set.reps, set.reason)?,
                None => write!(f, "set {}: ? x {} ({})", i + 1, set.reps, set.reason)?,
            }
        }
        Ok(())
    }
}

/// `20.0 -> "20"`, `22.5 -> "22.5"`, `1.25 -> "1.25"`.
pub fn format_weight(weight: f64) -> String {
    let rounded = round_weight(weight);
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        let s = format!("{rounded:.2}");
        s.trim_end_matches('0').to_string()
    }
}

/// The smallest ladder rung strictly above `reps`, or `None` at the top.
fn next_rung(reps: u32) -> Option<u32> {
    REP_LADDER.iter().copied().find(|rung| *rung > reps)
}

/// Progress a single set.
pub fn next_set(entry: SetEntry, equipment: &EquipmentProfile) -> SetGoal {
    if entry.reps >= LADDER_TOP {
        let weight = equipment.next_weight(entry.weight);
        return SetGoal {
            weight: Some(weight),
            reps: LADDER_FLOOR,
            reason: format!(
                "reps {}→{}, weight {}→{}",
                entry.reps,
                LADDER_FLOOR,
                format_weight(entry.weight),
                format_weight(weight)
            ),
        };
    }

    // Below the top rung there is always a next rung.
    let reps = next_rung(entry.reps).unwrap_or(LADDER_FLOOR);
    SetGoal {
        weight: Some(entry.weight),
        reps,
        reason: format!("reps {}→{}, same weight", entry.reps, reps),
    }
}

/// Compute next period's targets from the sets of the most recent session.
///
/// With no history a neutral goal (floor reps, no weight) is returned rather
/// than a made-up weight. Fewer than [`MIN_GOAL_SETS`] sets are padded by
/// repeating the last computed goal.
pub fn next_goal(past_sets: &[SetEntry], equipment: &EquipmentProfile) -> ProgressionGoal {
    if past_sets.is_empty() {
        let neutral = SetGoal {
            weight: None,
            reps: LADDER_FLOOR,
            reason: NO_HISTORY_REASON.to_string(),
        };
        return ProgressionGoal {
            sets: vec![neutral; MIN_GOAL_SETS],
            basis: GoalBasis::NoHistory,
        };
    }

    let mut sets: Vec<SetGoal> = past_sets.iter().map(|s| next_set(*s, equipment)).collect();
    if let Some(last) = sets.last().cloned() {
        while sets.len() < MIN_GOAL_SETS {
            sets.push(last.clone());
        }
    }

    ProgressionGoal {
        sets,
        basis: GoalBasis::Computed,
    }
}
