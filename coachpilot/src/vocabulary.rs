use crate::resolver::{resolve, MatchResult};
use once_cell::sync::Lazy;
use serde::Deserialize;

/// Canonical exercise names the vendor's search understands.
static DEFAULT_EXERCISES: Lazy<Vec<String>> = Lazy::new(|| {
    [
        "Back Squat",
        "Front Squat",
        "Goblet Squat",
        "Bulgarian Split Squat",
        "Leg Press",
        "Walking Lunge",
        "Reverse Lunge",
        "Step Up",
        "Romanian Deadlift",
        "Conventional Deadlift",
        "Sumo Deadlift",
        "Hip Thrust",
        "Glute Bridge",
        "Leg Extension",
        "Lying Leg Curl",
        "Seated Leg Curl",
        "Standing Calf Raise",
        "Seated Calf Raise",
        "Bench Press",
        "Incline Bench Press",
        "Dumbbell Bench Press",
        "Incline Dumbbell Press",
        "Chest Fly",
        "Cable Crossover",
        "Push Up",
        "Dips",
        "Overhead Press",
        "Dumbbell Shoulder Press",
        "Arnold Press",
        "Lateral Raise",
        "Rear Delt Fly",
        "Face Pull",
        "Upright Row",
        "Pull Up",
        "Chin Up",
        "Lat Pulldown",
        "Seated Cable Row",
        "Barbell Row",
        "Dumbbell Row",
        "T-Bar Row",
        "Shrug",
        "Bicep Curl",
        "Hammer Curl",
        "Preacher Curl",
        "Concentration Curl",
        "Triceps Pushdown",
        "Overhead Triceps Extension",
        "Skull Crusher",
        "Close Grip Bench Press",
        "Plank",
        "Side Plank",
        "Hanging Leg Raise",
        "Cable Crunch",
        "Russian Twist",
        "Ab Wheel Rollout",
        "Farmer's Carry",
        "Kettlebell Swing",
        "Battle Ropes",
        "Box Jump",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
});

/// Read-only list of canonical exercise names used to normalise a caller's
/// exercise name before searching the live UI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ExerciseVocabulary {
    names: Vec<String>,
}

impl Default for ExerciseVocabulary {
    fn default() -> Self {
        Self {
            names: DEFAULT_EXERCISES.clone(),
        }
    }
}

impl ExerciseVocabulary {
    pub fn new(names: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.trim().to_string();
            if !name.is_empty() && !unique.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                unique.push(name);
            }
        }
        Self { names: unique }
    }

    /// A JSON array of names.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let names: Vec<String> = serde_json::from_str(json)?;
        Ok(Self::new(names))
    }

    /// One name per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn canonical(&self, logical_name: &str, threshold: u8) -> Option<MatchResult> {
        resolve(logical_name, &self.names, threshold)
    }
}
