//! Fuzzy matching of a logical name against the labels currently on screen.
//!
//! The vendor UI labels the same thing inconsistently ("Bench Press",
//! "Barbell Bench Press (Flat)", "bench press - bb"), so callers never compare
//! labels directly. [`resolve`] scores every candidate with a ladder of
//! increasingly loose strategies and returns the best one that clears the
//! caller's threshold.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Threshold for "does this already exist" checks. Prefers false negatives.
pub const STRICT_THRESHOLD: u8 = 80;
/// Threshold for "pick the best of what's on screen". Prefers false
/// positives; the click that follows is verified by a gate.
pub const LENIENT_THRESHOLD: u8 = 60;

/// Score given to a prefix-overlap hit. Clears the lenient tier only.
const PREFIX_SCORE: u8 = 60;
const PREFIX_LEN: usize = 4;
/// A contained phrase with this many significant words is accepted at any
/// threshold. Shorter ones must earn it on their length ratio.
const STRONG_CONTAINMENT_WORDS: usize = 2;
const SIGNIFICANT_WORD_LEN: usize = 3;
const POSITIONAL_MAX_LEN: usize = 12;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "of", "on", "in", "to", "for", "with", "w", "by", "at",
];

/// A logical target plus the labels observed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub target: String,
    pub labels: Vec<String>,
}

impl MatchCandidate {
    pub fn new(target: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            target: target.into(),
            labels,
        }
    }

    pub fn resolve(&self, threshold: u8) -> Option<MatchResult> {
        resolve(&self.target, &self.labels, threshold)
    }
}

/// Which rule produced a match. Ordered weakest to strongest so that a
/// stronger method always outranks a weaker one regardless of score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Positional,
    PrefixOverlap,
    TokenOverlap,
    Containment,
    Exact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub label: String,
    /// Index of `label` in the candidate list.
    pub index: usize,
    /// Confidence in `0..=100`.
    pub score: u8,
    pub method: MatchMethod,
}

/// Pick the best label for `target`, or `None` if nothing clears `threshold`.
///
/// Containment only counts on whole words. Exact matches and containment of
/// a multi-word phrase are always accepted; everything else must reach
/// `threshold`. Candidates are ranked by method first, then score, and ties
/// go to the earliest candidate.
pub fn resolve<S: AsRef<str>>(target: &str, candidates: &[S], threshold: u8) -> Option<MatchResult> {
    let target_norm = normalize(target);
    if target_norm.is_empty() {
        return None;
    }

    let mut best: Option<MatchResult> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let label = candidate.as_ref();
        let Some(Scored {
            method,
            score,
            strong,
        }) = score_pair(&target_norm, &normalize(label))
        else {
            continue;
        };

        if method == MatchMethod::Exact {
            return Some(MatchResult {
                label: label.to_string(),
                index,
                score,
                method,
            });
        }

        if !strong && score < threshold {
            continue;
        }

        let better = match &best {
            None => true,
            Some(current) => (method, score) > (current.method, current.score),
        };
        if better {
            best = Some(MatchResult {
                label: label.to_string(),
                index,
                score,
                method,
            });
        }
    }
    best
}

struct Scored {
    method: MatchMethod,
    score: u8,
    /// Accepted whatever the threshold.
    strong: bool,
}

impl Scored {
    fn new(method: MatchMethod, score: u8) -> Self {
        Self {
            method,
            score,
            strong: false,
        }
    }
}

/// Score one normalized pair with the first rule that applies.
fn score_pair(target: &str, candidate: &str) -> Option<Scored> {
    if candidate.is_empty() {
        return None;
    }

    if target == candidate {
        return Some(Scored {
            strong: true,
            ..Scored::new(MatchMethod::Exact, 100)
        });
    }

    let target_tokens: Vec<&str> = target.split_whitespace().map(stem).collect();
    let candidate_tokens: Vec<&str> = candidate.split_whitespace().map(stem).collect();
    let (inner, outer) = if target_tokens.len() <= candidate_tokens.len() {
        (&target_tokens, &candidate_tokens)
    } else {
        (&candidate_tokens, &target_tokens)
    };
    if contains_phrase(outer, inner) {
        let shorter = target.chars().count().min(candidate.chars().count());
        let longer = target.chars().count().max(candidate.chars().count());
        let ratio = ((shorter as f64 / longer as f64) * 100.0).round() as u8;
        let significant = inner.iter().filter(|w| is_significant(w)).count();
        return Some(Scored {
            strong: significant >= STRONG_CONTAINMENT_WORDS,
            ..Scored::new(MatchMethod::Containment, ratio.clamp(LENIENT_THRESHOLD, 99))
        });
    }

    let target_words = significant_words(target);
    let candidate_words = significant_words(candidate);

    if !target_words.is_empty() && !candidate_words.is_empty() {
        let common = target_words.intersection(&candidate_words).count();
        if common > 0 {
            let union = target_words.union(&candidate_words).count();
            let score = ((common as f64 / union as f64) * 100.0).round() as u8;
            return Some(Scored::new(MatchMethod::TokenOverlap, score));
        }
    }

    if prefixes_overlap(target, candidate) {
        return Some(Scored::new(MatchMethod::PrefixOverlap, PREFIX_SCORE));
    }

    let target_len = target.chars().count();
    let candidate_len = candidate.chars().count();
    if target_len < POSITIONAL_MAX_LEN && candidate_len < POSITIONAL_MAX_LEN {
        let same = target
            .chars()
            .zip(candidate.chars())
            .filter(|(a, b)| a == b)
            .count();
        let score = ((same as f64 / target_len.max(candidate_len) as f64) * 100.0).round() as u8;
        if score > 0 {
            return Some(Scored::new(MatchMethod::Positional, score));
        }
    }

    None
}

/// Lowercase, turn punctuation into spaces and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_significant(word: &str) -> bool {
    !STOP_WORDS.contains(&word) && word.chars().count() > SIGNIFICANT_WORD_LEN
}

fn significant_words(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().filter(|w| is_significant(w)).collect()
}

/// Drop a plural `s` so "squats" and "squat" compare equal.
fn stem(word: &str) -> &str {
    if word.len() > SIGNIFICANT_WORD_LEN && word.ends_with('s') && !word.ends_with("ss") {
        &word[..word.len() - 1]
    } else {
        word
    }
}

/// `needle` appears in `haystack` as a run of whole words.
fn contains_phrase(haystack: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|window| window == needle)
}

fn prefix(word: &str) -> Option<String> {
    if word.chars().count() < PREFIX_LEN {
        return None;
    }
    Some(word.chars().take(PREFIX_LEN).collect())
}

fn prefixes_overlap(target: &str, candidate: &str) -> bool {
    let candidate_prefixes: HashSet<String> =
        candidate.split_whitespace().filter_map(prefix).collect();
    target
        .split_whitespace()
        .filter_map(prefix)
        .any(|p| candidate_prefixes.contains(&p))
}

/// Reduce a verbose exercise name to something the vendor search box copes
/// with: drop parenthetical and bracketed qualifiers, collapse whitespace and
/// cut at a word boundary no longer than `max_len` characters.
pub fn simplify_name(name: &str, max_len: usize) -> String {
    let mut depth = 0usize;
    let mut stripped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let words: Vec<&str> = stripped
        .split(|c: char| c.is_whitespace() || c == '-' || c == ',')
        .filter(|w| !w.is_empty())
        .collect();

    let mut out = String::new();
    for word in words {
        let extra = if out.is_empty() { word.len() } else { word.len() + 1 };
        if out.len() + extra > max_len {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }

    if out.is_empty() {
        // A single over-long word: hard cut rather than returning nothing.
        stripped.trim().chars().take(max_len).collect()
    } else {
        out
    }
}
