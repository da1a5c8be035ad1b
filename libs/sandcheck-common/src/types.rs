use crate::value::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A learner's submission, immutable once received
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub source_text: String,
    pub challenge_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_id: Option<String>,
}

impl Submission {
    pub fn new(source_text: impl Into<String>, challenge_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_text: source_text.into(),
            challenge_id: challenge_id.into(),
            submitter_id: None,
        }
    }

    pub fn with_submitter(mut self, submitter_id: impl Into<String>) -> Self {
        self.submitter_id = Some(submitter_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Algorithm,
    Ui,
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeKind::Algorithm => write!(f, "algorithm"),
            ChallengeKind::Ui => write!(f, "ui"),
        }
    }
}

/// Outcome of exactly one check (a fixture comparison or an assertion)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub pass: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<Value>,
}

impl CheckResult {
    pub fn passed(message: impl Into<String>) -> Self {
        Self::new(true, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(false, message)
    }

    pub fn new(pass: bool, message: impl Into<String>) -> Self {
        Self {
            pass,
            message: message.into(),
            execution_time_ms: None,
            actual_output: None,
            expected_output: None,
        }
    }

    pub fn with_time(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = Some(execution_time_ms);
        self
    }

    pub fn with_outputs(mut self, expected: Value, actual: Option<Value>) -> Self {
        self.expected_output = Some(expected);
        self.actual_output = actual;
        self
    }
}

/// Ordered check outcomes for one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub results: Vec<CheckResult>,
    pub is_correct: bool,
}

impl Verdict {
    /// A verdict is correct when it holds at least one check and every check passed
    pub fn from_results(results: Vec<CheckResult>) -> Self {
        let is_correct = !results.is_empty() && results.iter().all(|r| r.pass);
        Self { results, is_correct }
    }

    /// Verdict carrying a single diagnostic failure (compile errors, broken renders)
    pub fn single_failure(message: impl Into<String>) -> Self {
        Self::from_results(vec![CheckResult::failed(message)])
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.pass).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Body of `POST /verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub code: String,
    pub challenge_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub submit_only: bool,
}

impl VerifyRequest {
    pub fn into_submission(self) -> Submission {
        let submission = Submission::new(self.code, self.challenge_id);
        match self.user_id {
            Some(user) => submission.with_submitter(user),
            None => submission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub test_results: Vec<CheckResult>,
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed_tests: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tests: Option<usize>,
}

impl From<Verdict> for VerifyResponse {
    fn from(verdict: Verdict) -> Self {
        let passed = verdict.passed_count();
        let total = verdict.total();
        Self {
            test_results: verdict.results,
            is_correct: verdict.is_correct,
            passed_tests: Some(passed),
            total_tests: Some(total),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Listing entry for a registered challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSummary {
    pub id: String,
    pub title: String,
    pub kind: ChallengeKind,
    pub entry_point: String,
    pub checks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verdict_requires_all_passing() {
        let verdict = Verdict::from_results(vec![
            CheckResult::passed("ok"),
            CheckResult::failed("nope"),
        ]);
        assert!(!verdict.is_correct);
        assert_eq!(verdict.passed_count(), 1);
        assert_eq!(verdict.total(), 2);

        let verdict = Verdict::from_results(vec![CheckResult::passed("ok")]);
        assert!(verdict.is_correct);
    }

    #[test]
    fn test_empty_verdict_is_not_correct() {
        assert!(!Verdict::from_results(vec![]).is_correct);
    }

    #[test]
    fn test_response_shape() {
        let verdict = Verdict::from_results(vec![CheckResult::failed("Expected [0,1], got []")
            .with_time(3)
            .with_outputs(Value::Array(vec![0i64.into(), 1i64.into()]), Some(Value::Array(vec![])))]);
        let response = VerifyResponse::from(verdict);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({
                "testResults": [{
                    "pass": false,
                    "message": "Expected [0,1], got []",
                    "executionTimeMs": 3,
                    "actualOutput": [],
                    "expectedOutput": [0, 1]
                }],
                "isCorrect": false,
                "passedTests": 0,
                "totalTests": 1
            })
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: VerifyRequest =
            serde_json::from_value(json!({"code": "x", "challengeId": "two-sum"})).unwrap();
        assert!(!request.submit_only);
        assert!(request.user_id.is_none());

        let submission = VerifyRequest {
            user_id: Some("learner-7".to_string()),
            ..request
        }
        .into_submission();
        assert_eq!(submission.challenge_id, "two-sum");
        assert_eq!(submission.submitter_id.as_deref(), Some("learner-7"));
    }
}
