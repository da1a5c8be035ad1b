/// End-to-end verification scenarios
///
/// These drive `Engine::verify` exactly as the API and CLI do:
/// 1. Correct and incorrect algorithm submissions
/// 2. Runaway loops and forbidden calls
/// 3. Compile failures surfacing as a single diagnostic check
/// 4. UI suites where exactly one assertion should fail
/// 5. Repeat runs producing the same verdict

#[cfg(test)]
mod verification_tests {
    use crate::engine::Engine;
    use crate::error::EngineError;
    use sandcheck_common::config::EngineConfig;
    use sandcheck_common::types::{Submission, Verdict};

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).expect("built-in catalogue loads")
    }

    async fn verify(challenge: &str, source: &str) -> Verdict {
        engine()
            .verify(&Submission::new(source, challenge))
            .await
            .expect("known challenge")
    }

    fn failing(verdict: &Verdict) -> Vec<&str> {
        verdict
            .results
            .iter()
            .filter(|r| !r.pass)
            .map(|r| r.message.as_str())
            .collect()
    }

    const TWO_SUM: &str = r#"
function twoSum(nums, target) {
  const seen = new Map();
  for (let i = 0; i < nums.length; i++) {
    const need = target - nums[i];
    if (seen.has(need)) return [seen.get(need), i];
    seen.set(nums[i], i);
  }
  return [];
}
"#;

    #[tokio::test]
    async fn test_two_sum_correct() {
        let verdict = verify("two-sum", TWO_SUM).await;
        assert!(verdict.is_correct, "{:?}", failing(&verdict));
        assert_eq!(verdict.total(), 4);
        assert_eq!(
            verdict.results[0].message,
            "Test 1 passed: nums = [2,7,11,15], target = 9"
        );
    }

    #[tokio::test]
    async fn test_two_sum_wrong_answer_names_both_values() {
        let verdict = verify("two-sum", "function twoSum(nums, target) { return []; }").await;
        assert!(!verdict.is_correct);
        assert_eq!(verdict.passed_count(), 0);
        let first = &verdict.results[0].message;
        assert!(first.contains("Expected [0,1]"), "{}", first);
        assert!(first.contains("got []"), "{}", first);
    }

    #[tokio::test]
    async fn test_fixtures_do_not_cross_contaminate() {
        // right only for the first fixture
        let source = "function twoSum(nums, target) { if (target === 9) return [0, 1]; return [9, 9]; }";
        let verdict = verify("two-sum", source).await;
        let passes: Vec<bool> = verdict.results.iter().map(|r| r.pass).collect();
        assert_eq!(passes, vec![true, false, false, false]);
    }

    #[tokio::test]
    async fn test_infinite_loop_is_bounded() {
        let started = std::time::Instant::now();
        let verdict = verify("two-sum", "function twoSum(nums, target) { while (true) {} }").await;
        assert!(started.elapsed() < std::time::Duration::from_secs(10 * 4));
        assert!(!verdict.is_correct);
        for result in &verdict.results {
            assert!(
                result.message.contains("iteration limit") || result.message.contains("time limit"),
                "{}",
                result.message
            );
        }
    }

    #[tokio::test]
    async fn test_runaway_recursion_is_bounded() {
        let verdict = verify("fibonacci", "function fib(n) { return fib(n + 1); }").await;
        assert!(!verdict.is_correct);
        assert!(verdict.results.iter().all(|r| !r.pass));
    }

    #[tokio::test]
    async fn test_denylisted_call_never_runs() {
        let source = "function reverseString(s) { return eval('s.split(\"\").reverse().join(\"\")'); }";
        let verdict = verify("reverse-string", source).await;
        assert!(!verdict.is_correct);
        assert!(verdict.results[0].message.contains("forbidden operation"), "{}", verdict.results[0].message);
        assert!(verdict.results[0].message.contains("`eval`"));
    }

    #[tokio::test]
    async fn test_compile_error_is_single_check() {
        let verdict = verify("two-sum", "function twoSum(nums, target {\n  return [];\n}").await;
        assert_eq!(verdict.total(), 1);
        assert!(!verdict.is_correct);
        assert!(verdict.results[0].message.starts_with("Compilation failed: syntax error"));
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let verdict = verify("two-sum", "function solve(nums, target) { return [0, 1]; }").await;
        assert_eq!(verdict.total(), 1);
        assert_eq!(
            verdict.results[0].message,
            "Compilation failed: expected a top-level definition named `twoSum`"
        );
    }

    #[tokio::test]
    async fn test_module_exports_entry_point() {
        let source = "module.exports = function (s) { return s.split('').reverse().join(''); };";
        let verdict = verify("reverse-string", source).await;
        assert!(verdict.is_correct, "{:?}", failing(&verdict));
    }

    #[tokio::test]
    async fn test_verification_is_idempotent() {
        let source = "function maxSubArray(nums) { let best = nums[0], cur = 0; for (const n of nums) { cur = Math.max(n, cur + n); best = Math.max(best, cur); } return best; }";
        let first = verify("max-subarray", source).await;
        let second = verify("max-subarray", source).await;
        assert!(first.is_correct, "{:?}", failing(&first));
        let summary = |v: &Verdict| -> Vec<(bool, String)> {
            v.results.iter().map(|r| (r.pass, r.message.clone())).collect()
        };
        assert_eq!(summary(&first), summary(&second));
    }

    #[tokio::test]
    async fn test_unknown_challenge_is_an_error() {
        let err = engine()
            .verify(&Submission::new("function f() {}", "no-such-challenge"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownChallenge(id) if id == "no-such-challenge"));
    }

    const TOGGLE: &str = r#"
import { useState } from 'react';

export default function Component() {
  const [on, setOn] = useState(false);
  return (
    <button
      className={on ? "switch switch-on" : "switch switch-off"}
      style={{ transition: "background-color 0.3s ease" }}
      onClick={() => setOn(!on)}
    >
      {on ? "On" : "Off"}
    </button>
  );
}
"#;

    const TOGGLE_UNSTYLED: &str = r#"
import { useState } from 'react';

export default function Component() {
  const [on, setOn] = useState(false);
  return (
    <button
      className="switch"
      style={{ transition: "background-color 0.3s ease" }}
      onClick={() => setOn(!on)}
    >
      {on ? "On" : "Off"}
    </button>
  );
}
"#;

    #[tokio::test]
    async fn test_toggle_passes_all_assertions() {
        let verdict = verify("toggle-switch", TOGGLE).await;
        assert_eq!(verdict.total(), 4);
        assert!(verdict.is_correct, "{:?}", failing(&verdict));
    }

    #[tokio::test]
    async fn test_toggle_without_conditional_styling() {
        let verdict = verify("toggle-switch", TOGGLE_UNSTYLED).await;
        let failed = failing(&verdict);
        assert_eq!(failed.len(), 1, "{:?}", failed);
        assert!(failed[0].starts_with("conditional styling"));
    }

    const COUNTER: &str = r#"
function Component() {
  const [count, setCount] = useState(0);
  return (
    <div className="counter">
      <h2>Count: {count}</h2>
      <button onClick={() => setCount(count - 1)}>-</button>
      <button onClick={() => setCount(count + 1)}>+</button>
      <button onClick={() => setCount(0)}>Reset</button>
    </div>
  );
}
"#;

    #[tokio::test]
    async fn test_counter_without_floor_fails_only_prevents_negative() {
        let verdict = verify("counter", COUNTER).await;
        let failed = failing(&verdict);
        assert_eq!(failed.len(), 1, "{:?}", failed);
        assert!(failed[0].starts_with("prevents negative"));
    }

    #[tokio::test]
    async fn test_counter_with_floor_passes() {
        let source = COUNTER.replace("setCount(count - 1)", "setCount(Math.max(0, count - 1))");
        let verdict = verify("counter", &source).await;
        assert!(verdict.is_correct, "{:?}", failing(&verdict));
    }

    #[tokio::test]
    async fn test_todo_list_passes() {
        let source = r#"
function Component() {
  const [text, setText] = useState("");
  const [todos, setTodos] = useState([]);
  const add = () => {
    if (text.trim() === "") return;
    setTodos([...todos, { id: todos.length + 1, text }]);
    setText("");
  };
  return (
    <div>
      <input value={text} onChange={(e) => setText(e.target.value)} placeholder="New task" />
      <button onClick={add}>Add</button>
      <ul>
        {todos.map((todo) => (
          <li key={todo.id}>
            {todo.text}
            <button onClick={() => setTodos(todos.filter((t) => t.id !== todo.id))}>Delete</button>
          </li>
        ))}
      </ul>
    </div>
  );
}
"#;
        let verdict = verify("todo-list", source).await;
        assert!(verdict.is_correct, "{:?}", failing(&verdict));
    }

    #[tokio::test]
    async fn test_broken_render_is_single_failure() {
        let source = "function Component() { return <div>{missing.value}</div>; }";
        let verdict = verify("counter", source).await;
        assert_eq!(verdict.total(), 1);
        assert!(verdict.results[0].message.starts_with("Component failed to render"));
    }
}
