// Challenge catalogue: built-in algorithm fixtures, built-in UI assertion
// suites, and optional extra algorithm challenges loaded from a JSON file

pub mod ui;

use crate::error::EngineError;
use crate::ui::Assertion;
use lazy_static::lazy_static;
use regex::Regex;
use sandcheck_common::types::{ChallengeKind, ChallengeSummary};
use sandcheck_common::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

const BUILTIN_ALGORITHMS: &str = include_str!("algorithms.json");

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("static regex");
    static ref CHALLENGE_ID: Regex = Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("static regex");
}

/// One input/expected-output pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub id: String,
    pub description: String,
    /// Positional arguments passed to the entry point
    pub input: Vec<Value>,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_cap: Option<u64>,
    /// Absolute tolerance for numeric comparison; exact when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmChallenge {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub entry_point: String,
    pub fixtures: Vec<Fixture>,
}

#[derive(Debug, Clone)]
pub struct UiChallenge {
    pub id: String,
    pub title: String,
    pub description: String,
    pub entry_point: String,
    pub assertions: Vec<Assertion>,
}

#[derive(Debug, Clone)]
pub enum Challenge {
    Algorithm(AlgorithmChallenge),
    Ui(UiChallenge),
}

impl Challenge {
    pub fn id(&self) -> &str {
        match self {
            Challenge::Algorithm(c) => &c.id,
            Challenge::Ui(c) => &c.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Challenge::Algorithm(c) => &c.title,
            Challenge::Ui(c) => &c.title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Challenge::Algorithm(c) => &c.description,
            Challenge::Ui(c) => &c.description,
        }
    }

    pub fn kind(&self) -> ChallengeKind {
        match self {
            Challenge::Algorithm(_) => ChallengeKind::Algorithm,
            Challenge::Ui(_) => ChallengeKind::Ui,
        }
    }

    pub fn entry_point(&self) -> &str {
        match self {
            Challenge::Algorithm(c) => &c.entry_point,
            Challenge::Ui(c) => &c.entry_point,
        }
    }

    /// Number of checks a verification produces
    pub fn check_count(&self) -> usize {
        match self {
            Challenge::Algorithm(c) => c.fixtures.len(),
            Challenge::Ui(c) => c.assertions.len(),
        }
    }

    /// Names of the checks, in order
    pub fn check_names(&self) -> Vec<String> {
        match self {
            Challenge::Algorithm(c) => c.fixtures.iter().map(|f| f.description.clone()).collect(),
            Challenge::Ui(c) => c.assertions.iter().map(|a| a.name.to_string()).collect(),
        }
    }

    pub fn summary(&self) -> ChallengeSummary {
        ChallengeSummary {
            id: self.id().to_string(),
            title: self.title().to_string(),
            kind: self.kind(),
            entry_point: self.entry_point().to_string(),
            checks: self.check_count(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengesJson {
    pub challenges: Vec<AlgorithmChallenge>,
}

/// Read-only lookup of challenges by id, in registration order
#[derive(Debug, Clone, Default)]
pub struct ChallengeRegistry {
    challenges: HashMap<String, Challenge>,
    order: Vec<String>,
}

impl ChallengeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in algorithm and UI challenge
    pub fn builtin() -> Result<Self, EngineError> {
        let mut registry = Self::new();
        registry.extend_from_json(BUILTIN_ALGORITHMS)?;
        for challenge in ui::builtin() {
            registry.register(Challenge::Ui(challenge))?;
        }
        Ok(registry)
    }

    /// Built-ins plus the algorithm challenges in `path`
    pub fn with_file(path: &Path) -> Result<Self, EngineError> {
        let mut registry = Self::builtin()?;
        registry.load_file(path)?;
        Ok(registry)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize, EngineError> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidChallenge(format!("cannot read {}: {}", path.display(), e))
        })?;
        let added = self.extend_from_json(&content)?;
        info!(path = %path.display(), added, "Loaded challenge file");
        Ok(added)
    }

    pub fn extend_from_json(&mut self, content: &str) -> Result<usize, EngineError> {
        let parsed: ChallengesJson = serde_json::from_str(content)
            .map_err(|e| EngineError::InvalidChallenge(format!("malformed challenge file: {}", e)))?;
        let added = parsed.challenges.len();
        for challenge in parsed.challenges {
            self.register(Challenge::Algorithm(challenge))?;
        }
        Ok(added)
    }

    pub fn register(&mut self, challenge: Challenge) -> Result<(), EngineError> {
        validate(&challenge)?;
        let id = challenge.id().to_string();
        if self.challenges.contains_key(&id) {
            return Err(EngineError::InvalidChallenge(format!("duplicate challenge id `{}`", id)));
        }
        self.order.push(id.clone());
        self.challenges.insert(id, challenge);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Challenge, EngineError> {
        self.challenges
            .get(id)
            .ok_or_else(|| EngineError::UnknownChallenge(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Challenge> {
        self.order.iter().filter_map(|id| self.challenges.get(id))
    }

    pub fn summaries(&self) -> Vec<ChallengeSummary> {
        self.iter().map(Challenge::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn validate(challenge: &Challenge) -> Result<(), EngineError> {
    let id = challenge.id();
    let invalid = |reason: String| EngineError::InvalidChallenge(format!("{}: {}", id, reason));

    if !CHALLENGE_ID.is_match(id) {
        return Err(invalid("ids use lowercase letters, digits and dashes".to_string()));
    }
    if !IDENTIFIER.is_match(challenge.entry_point()) {
        return Err(invalid(format!(
            "entry point `{}` is not an identifier",
            challenge.entry_point()
        )));
    }
    match challenge {
        Challenge::Algorithm(c) => {
            if c.fixtures.is_empty() {
                return Err(invalid("no fixtures".to_string()));
            }
            let mut seen = std::collections::HashSet::new();
            for fixture in &c.fixtures {
                if !seen.insert(fixture.id.as_str()) {
                    return Err(invalid(format!("duplicate fixture id `{}`", fixture.id)));
                }
                if fixture.tolerance.is_some_and(|t| !(t >= 0.0 && t.is_finite())) {
                    return Err(invalid(format!("fixture `{}` has an invalid tolerance", fixture.id)));
                }
            }
        }
        Challenge::Ui(c) => {
            if c.assertions.is_empty() {
                return Err(invalid("no assertions".to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_catalogue() {
        let registry = ChallengeRegistry::builtin().unwrap();
        for id in [
            "two-sum",
            "reverse-string",
            "valid-palindrome",
            "fizz-buzz",
            "valid-parentheses",
            "max-subarray",
            "fibonacci",
            "binary-search",
            "toggle-switch",
            "counter",
            "todo-list",
        ] {
            assert!(registry.get(id).is_ok(), "missing {}", id);
        }
        let toggle = registry.get("toggle-switch").unwrap();
        assert_eq!(toggle.kind(), ChallengeKind::Ui);
        assert_eq!(toggle.check_count(), 4);
        assert_eq!(registry.get("counter").unwrap().check_count(), 4);
    }

    #[test]
    fn test_unknown_challenge() {
        let registry = ChallengeRegistry::builtin().unwrap();
        assert!(matches!(
            registry.get("no-such-thing"),
            Err(EngineError::UnknownChallenge(id)) if id == "no-such-thing"
        ));
    }

    #[test]
    fn test_duplicate_and_empty_challenges_are_rejected() {
        let mut registry = ChallengeRegistry::builtin().unwrap();
        let duplicate = r#"{"challenges":[{"id":"two-sum","title":"Again","entryPoint":"twoSum","fixtures":[{"id":"a","description":"a","input":[],"expected":null}]}]}"#;
        assert!(matches!(
            registry.extend_from_json(duplicate),
            Err(EngineError::InvalidChallenge(_))
        ));

        let empty = r#"{"challenges":[{"id":"empty","title":"Empty","entryPoint":"f","fixtures":[]}]}"#;
        assert!(matches!(
            registry.extend_from_json(empty),
            Err(EngineError::InvalidChallenge(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("sandcheck-{}.json", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"challenges":[{{"id":"square","title":"Square","entryPoint":"square","fixtures":[{{"id":"two","description":"2 squared","input":[2],"expected":4}}]}}]}}"#
        )
        .unwrap();

        let registry = ChallengeRegistry::with_file(&path).unwrap();
        let square = registry.get("square").unwrap();
        assert_eq!(square.entry_point(), "square");
        assert_eq!(registry.summaries().last().unwrap().id, "square");
        fs::remove_file(&path).ok();
    }
}
