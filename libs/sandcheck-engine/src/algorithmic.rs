/// Algorithmic Verifier - Fixture-Driven Scoring
///
/// **Core Responsibility:**
/// Run the entry point once per fixture and compare what it returns with the
/// fixture's expected value.
///
/// **Critical Properties:**
/// - Knows nothing about how code runs (the sandbox's job)
/// - Every fixture runs, in order; a failure never stops the suite
/// - Fixtures run sequentially, each in a fresh sandbox context
///
/// **Messages:**
/// - pass: `Test N passed: <description>`
/// - mismatch: `Test N failed: <description>. Expected <e>, got <a> (<where>)`
/// - error: `Test N failed: <description>. <what went wrong>`

use crate::challenges::{AlgorithmChallenge, Fixture};
use crate::compiler::CompiledUnit;
use crate::error::ExecutionError;
use crate::sandbox::{Execution, Limits, Sandbox};
use crate::verdict::Aggregator;
use sandcheck_common::config::EngineConfig;
use sandcheck_common::types::{CheckResult, Verdict};
use sandcheck_common::value::{first_difference, Value};
use tracing::{debug, warn};

// longest value preview shown in a message
const PREVIEW_CHARS: usize = 200;

/// Score one fixture from what the sandbox returned
pub fn evaluate_fixture(
    index: usize,
    fixture: &Fixture,
    outcome: &Result<Execution, ExecutionError>,
) -> CheckResult {
    let number = index + 1;
    match outcome {
        Ok(execution) => {
            let elapsed_ms = execution.elapsed.as_millis() as u64;
            match first_difference(&fixture.expected, &execution.output, fixture.tolerance) {
                None => CheckResult::passed(format!("Test {} passed: {}", number, fixture.description)),
                Some(difference) => CheckResult::failed(format!(
                    "Test {} failed: {}. Expected {}, got {} ({})",
                    number,
                    fixture.description,
                    fixture.expected.preview(PREVIEW_CHARS),
                    execution.output.preview(PREVIEW_CHARS),
                    difference
                )),
            }
            .with_time(elapsed_ms)
            .with_outputs(fixture.expected.clone(), Some(execution.output.clone()))
        }
        Err(err) => CheckResult::failed(format!(
            "Test {} failed: {}. Your code {}",
            number,
            fixture.description,
            err.describe()
        ))
        .with_outputs(fixture.expected.clone(), None),
    }
}

/// Run every fixture of `challenge` and aggregate the results
#[tracing::instrument(skip_all, fields(challenge_id = %challenge.id, fixtures = challenge.fixtures.len()))]
pub async fn verify(
    sandbox: &Sandbox,
    config: &EngineConfig,
    unit: &CompiledUnit,
    challenge: &AlgorithmChallenge,
) -> Verdict {
    let mut aggregator = Aggregator::with_capacity(challenge.fixtures.len());

    for (index, fixture) in challenge.fixtures.iter().enumerate() {
        let limits = Limits::from_config(config, fixture.time_limit_ms, fixture.iteration_cap);
        let outcome = sandbox
            .execute(unit, &challenge.entry_point, &fixture.input, &limits)
            .await;

        match &outcome {
            Ok(execution) => debug!(
                fixture_id = %fixture.id,
                elapsed_ms = execution.elapsed.as_millis() as u64,
                "Fixture executed"
            ),
            Err(err) => warn!(fixture_id = %fixture.id, kind = %err.kind, "Fixture execution failed"),
        }

        aggregator.push(evaluate_fixture(index, fixture, &outcome));
    }

    aggregator.finish()
}

/// Arguments as they would appear in a call, for CLI and log output
pub fn describe_call(entry_point: &str, input: &[Value]) -> String {
    let args: Vec<String> = input.iter().map(|v| v.preview(60)).collect();
    format!("{}({})", entry_point, args.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionErrorKind;
    use std::time::Duration;

    fn fixture(expected: Value) -> Fixture {
        Fixture {
            id: "basic".to_string(),
            description: "nums = [2,7,11,15], target = 9".to_string(),
            input: vec![],
            expected,
            time_limit_ms: None,
            iteration_cap: None,
            tolerance: None,
        }
    }

    fn pair() -> Value {
        Value::Array(vec![Value::from(0i64), Value::from(1i64)])
    }

    fn executed(output: Value) -> Result<Execution, ExecutionError> {
        Ok(Execution {
            output,
            elapsed: Duration::from_millis(3),
            logs: vec![],
        })
    }

    #[test]
    fn test_passing_fixture() {
        let result = evaluate_fixture(0, &fixture(pair()), &executed(pair()));
        assert!(result.pass);
        assert_eq!(result.message, "Test 1 passed: nums = [2,7,11,15], target = 9");
        assert_eq!(result.execution_time_ms, Some(3));
    }

    #[test]
    fn test_mismatch_names_expected_and_actual() {
        let result = evaluate_fixture(0, &fixture(pair()), &executed(Value::Array(vec![])));
        assert!(!result.pass);
        assert!(result.message.contains("Expected [0,1]"), "{}", result.message);
        assert!(result.message.contains("got []"), "{}", result.message);
        assert_eq!(result.actual_output, Some(Value::Array(vec![])));
    }

    #[test]
    fn test_execution_error_message() {
        let outcome = Err(ExecutionError::new(
            ExecutionErrorKind::ResourceExceeded,
            "exceeded the iteration limit of 1000000 loop iterations",
        ));
        let result = evaluate_fixture(2, &fixture(pair()), &outcome);
        assert!(!result.pass);
        assert_eq!(
            result.message,
            "Test 3 failed: nums = [2,7,11,15], target = 9. Your code exceeded the iteration limit of 1000000 loop iterations"
        );
        assert!(result.actual_output.is_none());
    }

    #[test]
    fn test_describe_call() {
        let call = describe_call("twoSum", &[pair(), Value::from(9i64)]);
        assert_eq!(call, "twoSum([0,1], 9)");
    }
}
