//! coachpilot CLI
//!
//! Offline helpers around the automation core: compute next progression
//! goals from a saved history, try the name resolver, and validate a
//! configuration file before it is used against the live app.
//!
//! Usage:
//!   coachpilot progress --history history.json            # goals for every exercise
//!   coachpilot progress --history history.json -e "Squat"  # goals for one exercise
//!   coachpilot resolve "bench press" "Bench Press (Barbell)" "Incline Bench"
//!   coachpilot check-config coachpilot.yaml

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use coachpilot::history::HistoryStore;
use coachpilot::orchestrator::plan_progressions;
use coachpilot::resolver::{resolve, LENIENT_THRESHOLD, STRICT_THRESHOLD};
use coachpilot::vocabulary::ExerciseVocabulary;
use coachpilot::{OrchestratorConfig, Strategy};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "coachpilot")]
#[command(about = "Progressive overload planning and resilient coach-app automation")]
struct Cli {
    /// Configuration file (YAML). Defaults are used when omitted.
    #[arg(long, short = 'c', global = true, env = "COACHPILOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print next-period goals computed from a saved performance history
    Progress {
        /// Performance history as saved by the batch runner (JSON)
        #[arg(long)]
        history: PathBuf,

        /// Exercise to plan; repeat for several. Defaults to every exercise in the history.
        #[arg(long = "exercise", short = 'e')]
        exercises: Vec<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Resolve a name against candidate labels (or the exercise vocabulary)
    Resolve {
        target: String,

        /// Candidate labels; the built-in exercise vocabulary when empty
        candidates: Vec<String>,

        /// Defaults to the strict tier against the vocabulary and the lenient
        /// tier against explicit candidates
        #[arg(long, short = 't')]
        threshold: Option<u8>,
    },
    /// Validate a configuration file and print its strategies
    CheckConfig { path: PathBuf },
}

#[derive(Serialize)]
struct GoalLine<'a> {
    exercise: &'a str,
    matched: Option<&'a str>,
    last_session: Option<String>,
    goal: String,
    basis: &'a coachpilot::progression::GoalBasis,
    reasons: Vec<&'a str>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Progress {
            history,
            exercises,
            json,
        } => progress(cli.config.as_deref(), history, exercises, *json),
        Commands::Resolve {
            target,
            candidates,
            threshold,
        } => resolve_cmd(target, candidates, *threshold),
        Commands::CheckConfig { path } => check_config(path),
    };

    if let Err(e) = result {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,coachpilot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading config");
            OrchestratorConfig::load(path)
        }
        None => Ok(OrchestratorConfig::default()),
    }
}

fn progress(config: Option<&Path>, history: &Path, exercises: &[String], json: bool) -> Result<()> {
    let config = load_config(config)?;
    let text = fs::read_to_string(history)
        .with_context(|| format!("Failed to read history file {}", history.display()))?;
    let store: HistoryStore = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse history file {}", history.display()))?;
    info!(sessions = store.len(), "Loaded history");

    let names = if exercises.is_empty() {
        store.exercises()
    } else {
        exercises.to_vec()
    };
    if names.is_empty() {
        bail!("history has no exercises and none were given with --exercise");
    }

    let plans = plan_progressions(&config, &store, &names);
    let lines: Vec<GoalLine> = plans
        .iter()
        .map(|p| GoalLine {
            exercise: &p.exercise,
            matched: p.history_name.as_deref(),
            last_session: p.last_date.map(|d| d.to_string()),
            goal: p.goal.format(&config.weight_unit),
            basis: &p.goal.basis,
            reasons: p.goal.sets.iter().map(|s| s.reason.as_str()).collect(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
        return Ok(());
    }
    for line in &lines {
        match (&line.matched, &line.last_session) {
            (Some(matched), Some(date)) => {
                println!("{} (history: {matched}, {date})", line.exercise);
                println!("  goal: {}", line.goal);
                for (n, reason) in line.reasons.iter().enumerate() {
                    println!("  set {}: {reason}", n + 1);
                }
            }
            _ => println!("{}: no history, leaving goal untouched", line.exercise),
        }
    }
    Ok(())
}

fn default_threshold(candidates: &[String]) -> u8 {
    if candidates.is_empty() {
        STRICT_THRESHOLD
    } else {
        LENIENT_THRESHOLD
    }
}

fn resolve_cmd(target: &str, candidates: &[String], threshold: Option<u8>) -> Result<()> {
    let threshold = threshold.unwrap_or_else(|| default_threshold(candidates));
    let result = if candidates.is_empty() {
        ExerciseVocabulary::default().canonical(target, threshold)
    } else {
        resolve(target, candidates, threshold)
    };
    match result {
        Some(hit) => {
            println!(
                "✅ '{}' -> '{}' ({:?}, score {}, index {})",
                target, hit.label, hit.method, hit.score, hit.index
            );
            Ok(())
        }
        None => bail!("nothing matched '{target}' at threshold {threshold}"),
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = OrchestratorConfig::load(path)?;
    println!("✅ {} is valid", path.display());
    println!("  base url:   {}", config.base_url);
    println!(
        "  thresholds: strict {}, lenient {}",
        config.strict_threshold, config.lenient_threshold
    );
    let retry = config.retry_policy();
    println!(
        "  retry:      {} attempts, {:?} per attempt",
        retry.max_attempts, retry.per_attempt_timeout
    );

    let selectors = &config.selectors;
    let groups: [(&str, Vec<(&str, &Vec<String>)>); 3] = [
        (
            "login",
            vec![
                ("username", &selectors.login.username),
                ("password", &selectors.login.password),
                ("submit", &selectors.login.submit),
                ("signed_in_marker", &selectors.login.signed_in_marker),
            ],
        ),
        (
            "programs",
            vec![
                ("listing_marker", &selectors.programs.listing_marker),
                ("card_title", &selectors.programs.card_title),
                ("open_program", &selectors.programs.open_program),
                ("new_program", &selectors.programs.new_program),
                ("editor_marker", &selectors.programs.editor_marker),
            ],
        ),
        (
            "exercises",
            vec![
                ("open_search", &selectors.exercises.open_search),
                ("search_input", &selectors.exercises.search_input),
                ("search_result", &selectors.exercises.search_result),
                ("pick_result", &selectors.exercises.pick_result),
                ("editor_row", &selectors.exercises.editor_row),
                ("goal_input", &selectors.exercises.goal_input),
            ],
        ),
    ];

    let mut invalid = 0;
    for (group, entries) in &groups {
        println!("  {group}:");
        for (name, strategies) in entries {
            let parsed = Strategy::parse_all(strategies);
            let rendered: Vec<String> = parsed
                .iter()
                .map(|s| {
                    if !s.is_valid() {
                        invalid += 1;
                    }
                    s.to_string()
                })
                .collect();
            println!("    {name}: {}", rendered.join("  ->  "));
        }
    }
    if invalid > 0 {
        bail!("{invalid} strategy string(s) could not be parsed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_lookup_defaults_to_strict_tier() {
        assert_eq!(default_threshold(&[]), STRICT_THRESHOLD);
        assert_eq!(default_threshold(&["Bench Press".to_string()]), LENIENT_THRESHOLD);

        let cli = Cli::try_parse_from(["coachpilot", "resolve", "Row"]).unwrap();
        let Commands::Resolve { threshold, candidates, .. } = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(threshold, None);
        assert!(candidates.is_empty());
        // "T-Bar Row" would pass the lenient tier but not the strict one.
        assert!(resolve_cmd("Row", &candidates, threshold).is_err());
    }
}
