/// Verdict Aggregator
///
/// **Core Responsibility:**
/// Collect check outcomes, in the order they ran, into a `Verdict`.
///
/// **Rules:**
/// - Order is preserved; results are never sorted or deduplicated
/// - `is_correct` requires at least one check and every check passing
/// - A verdict has no lifecycle after `finish`: it is serialized and dropped

use sandcheck_common::types::{CheckResult, Verdict};
use tracing::info;

#[derive(Debug, Default)]
pub struct Aggregator {
    results: Vec<CheckResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.pass).count()
    }

    pub fn finish(self) -> Verdict {
        let verdict = Verdict::from_results(self.results);
        info!(
            passed = verdict.passed_count(),
            total = verdict.total(),
            is_correct = verdict.is_correct,
            "Verdict aggregated"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_passing() {
        let mut aggregator = Aggregator::new();
        aggregator.push(CheckResult::passed("Test 1 passed"));
        aggregator.push(CheckResult::passed("Test 2 passed"));
        assert_eq!(aggregator.passed(), 2);
        let verdict = aggregator.finish();
        assert!(verdict.is_correct);
        assert_eq!(verdict.results[1].message, "Test 2 passed");
    }

    #[test]
    fn test_one_failure_keeps_order() {
        let mut aggregator = Aggregator::with_capacity(3);
        aggregator.push(CheckResult::passed("first"));
        aggregator.push(CheckResult::failed("second"));
        aggregator.push(CheckResult::passed("third"));
        let verdict = aggregator.finish();
        assert!(!verdict.is_correct);
        let messages: Vec<&str> = verdict.results.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[test]
    fn test_empty_is_not_correct() {
        let verdict = Aggregator::new().finish();
        assert!(!verdict.is_correct);
        assert_eq!(verdict.total(), 0);
    }
}
