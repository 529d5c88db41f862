use crate::errors::AutomationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// External image-to-text service. Opaque: its availability and retries are
/// its own business.
#[async_trait::async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, AutomationError>;
}

/// Fields read off a client's check-in page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinExtraction {
    pub subject: String,
    pub fields: BTreeMap<String, String>,
    /// Requested fields the analyzer did not report.
    pub missing: Vec<String>,
    pub raw: String,
    pub extracted_at: DateTime<Utc>,
}

pub fn checkin_prompt<S: AsRef<str>>(fields: &[S]) -> String {
    let list: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
    format!(
        "This is a screenshot of a client's weekly check-in. Report only these fields, \
one per line as `field: value`, copying values exactly as shown: {}. \
If a field is not visible write `field: unknown`.",
        list.join(", ")
    )
}

/// Pull `field: value` lines out of the analyzer's answer. Unknown or empty
/// values count as missing.
pub fn parse_fields<S: AsRef<str>>(
    answer: &str,
    fields: &[S],
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut found = BTreeMap::new();
    for line in answer.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches('`').to_lowercase();
        let value = value.trim().trim_matches('`').trim();
        if value.is_empty() || value.eq_ignore_ascii_case("unknown") {
            continue;
        }
        if let Some(field) = fields.iter().find(|f| f.as_ref().to_lowercase() == key) {
            found
                .entry(field.as_ref().to_string())
                .or_insert_with(|| value.to_string());
        }
    }

    let missing = fields
        .iter()
        .map(|f| f.as_ref().to_string())
        .filter(|f| !found.contains_key(f))
        .collect();
    (found, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields_ignores_noise_and_unknowns() {
        let answer = "Here you go:\n- Weight: 81.4 kg\n* sleep: `7h`\nmood: unknown\nsteps: 9000\n";
        let fields = ["weight", "sleep", "mood"];
        let (found, missing) = parse_fields(answer, &fields);
        assert_eq!(found.get("weight").map(String::as_str), Some("81.4 kg"));
        assert_eq!(found.get("sleep").map(String::as_str), Some("7h"));
        assert!(!found.contains_key("steps"));
        assert_eq!(missing, vec!["mood".to_string()]);
    }

    #[test]
    fn test_prompt_names_every_field() {
        let prompt = checkin_prompt(&["weight", "waist"]);
        assert!(prompt.contains("weight, waist"));
    }
}
