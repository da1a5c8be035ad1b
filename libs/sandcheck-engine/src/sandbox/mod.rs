/// Sandbox - Isolated Execution of Compiled Submissions
///
/// **Responsibility:**
/// Run a `CompiledUnit` against one set of inputs and hand back its output,
/// or an `ExecutionError` saying why it produced none.
///
/// **Isolation model:**
/// 1. Size check and static denylist scan before anything runs
/// 2. A fresh interpreter context per execution, never reused
/// 3. Globals outside the allowlist are deleted before user code loads
/// 4. Loop ticks and function-entry probes enforce the iteration cap and deadline
/// 5. A hard `tokio::time::timeout` bounds the blocking thread from outside
///
/// Nothing observable leaks between executions: inputs are rebuilt as literals
/// inside each context and outputs leave as tagged JSON.
pub mod codec;
pub mod runtime;
pub mod scan;

use crate::compiler::CompiledUnit;
use crate::error::{ExecutionError, ExecutionErrorKind};
use runtime::{Budget, JsRuntime};
use sandcheck_common::config::EngineConfig;
use sandcheck_common::value::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// extra wall-clock allowance before the outer timeout abandons the worker thread
const GRACE: Duration = Duration::from_millis(250);

/// Resource limits for one execution
#[derive(Debug, Clone)]
pub struct Limits {
    pub time_limit: Duration,
    pub iteration_cap: u64,
    pub recursion_limit: usize,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
}

impl Limits {
    /// Limits for one fixture, clamped to the configured ceilings
    pub fn from_config(config: &EngineConfig, time_limit_ms: Option<u64>, iteration_cap: Option<u64>) -> Self {
        Self {
            time_limit: Duration::from_millis(config.effective_time_limit_ms(time_limit_ms)),
            iteration_cap: config.effective_iteration_cap(iteration_cap),
            recursion_limit: config.recursion_limit,
            max_source_bytes: config.max_source_bytes,
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// Limits for one interactive UI check
    pub fn for_ui(config: &EngineConfig) -> Self {
        Self::from_config(config, Some(config.ui_time_limit_ms), None)
    }

    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit.as_millis() as u64
    }
}

/// Successful execution
#[derive(Debug, Clone)]
pub struct Execution {
    pub output: Value,
    pub elapsed: Duration,
    /// Console lines the code wrote, capped by the harness
    pub logs: Vec<String>,
}

/// Lifecycle of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    /// Refused by the pre-execution checks; never ran
    Rejected,
    Running,
    Completed,
    TimedOut,
    ResourceExceeded,
    Threw,
}

impl ExecutionState {
    fn from_error(err: &ExecutionError) -> Self {
        match err.kind {
            ExecutionErrorKind::ForbiddenOperation => ExecutionState::Rejected,
            ExecutionErrorKind::Threw => ExecutionState::Threw,
            ExecutionErrorKind::TimedOut => ExecutionState::TimedOut,
            ExecutionErrorKind::ResourceExceeded => ExecutionState::ResourceExceeded,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Pending | ExecutionState::Running)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Rejected => "rejected",
            ExecutionState::Running => "running",
            ExecutionState::Completed => "completed",
            ExecutionState::TimedOut => "timed_out",
            ExecutionState::ResourceExceeded => "resource_exceeded",
            ExecutionState::Threw => "threw",
        };
        write!(f, "{}", name)
    }
}

/// Shared executor; cheap to clone, holds no per-execution state
#[derive(Debug, Clone)]
pub struct Sandbox {
    allowed_globals: Arc<[String]>,
}

impl Sandbox {
    pub fn new(allowed_globals: Vec<String>) -> Self {
        Self {
            allowed_globals: Arc::from(allowed_globals),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.allowed_globals.clone())
    }

    pub fn allowed_globals(&self) -> &[String] {
        &self.allowed_globals
    }

    /// Checks that run before any code is evaluated
    pub fn preflight(&self, unit: &CompiledUnit, limits: &Limits) -> Result<(), ExecutionError> {
        if unit.code().len() > limits.max_source_bytes {
            return Err(ExecutionError::resource(format!(
                "source exceeds the limit of {} bytes",
                limits.max_source_bytes
            )));
        }
        scan::scan(unit.code())
    }

    /// Execute `entry_point` from `unit` with `args`
    ///
    /// Every failure mode comes back as an `ExecutionError`; nothing here panics
    /// or leaves the thread pool blocked past the time limit plus a short grace.
    #[tracing::instrument(skip(self, unit, args, limits), fields(time_limit_ms = limits.time_limit_ms()))]
    pub async fn execute(
        &self,
        unit: &CompiledUnit,
        entry_point: &str,
        args: &[Value],
        limits: &Limits,
    ) -> Result<Execution, ExecutionError> {
        let started = Instant::now();
        let callee = callee_expression(unit, entry_point);
        let name = entry_point.to_string();
        let args = args.to_vec();

        let (output, logs) = self
            .run_isolated(unit, limits, &[], &[], move |runtime| {
                runtime.invoke(&callee, &name, &args)
            })
            .await?;

        Ok(Execution {
            output,
            elapsed: started.elapsed(),
            logs,
        })
    }

    /// Preflight `unit`, then load it into a fresh runtime on a blocking
    /// thread and hand the runtime to `job`
    ///
    /// `preludes` are evaluated after the harness and before lockdown;
    /// `extra_globals` survive lockdown alongside the allowlist.
    pub async fn run_isolated<T, F>(
        &self,
        unit: &CompiledUnit,
        limits: &Limits,
        preludes: &'static [&'static str],
        extra_globals: &'static [&'static str],
        job: F,
    ) -> Result<(T, Vec<String>), ExecutionError>
    where
        T: Send + 'static,
        F: FnOnce(&mut JsRuntime) -> Result<T, ExecutionError> + Send + 'static,
    {
        let mut state = ExecutionState::Pending;
        if let Err(err) = self.preflight(unit, limits) {
            log_transition(&mut state, ExecutionState::from_error(&err));
            return Err(err);
        }

        let budget = Budget::new(limits);
        let worker_budget = Arc::clone(&budget);
        let worker_limits = limits.clone();
        let allowed = Arc::clone(&self.allowed_globals);
        let code = unit.code().to_string();

        log_transition(&mut state, ExecutionState::Running);
        let handle = tokio::task::spawn_blocking(move || {
            let mut runtime = JsRuntime::new(worker_budget, &worker_limits, &allowed, preludes, extra_globals)?;
            let result = runtime.load(&code).and_then(|_| job(&mut runtime));
            let logs = runtime.take_logs();
            if !logs.is_empty() {
                debug!(lines = logs.len(), "Captured console output");
            }
            result.map(|value| (value, logs))
        });

        let result = match tokio::time::timeout(limits.time_limit + GRACE, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ExecutionError::threw(format!(
                "the sandbox worker failed: {}",
                join_err
            ))),
            Err(_) => {
                // the worker cannot be killed; the expired budget stops it at its next guard
                budget.expire();
                warn!(
                    time_limit_ms = limits.time_limit_ms(),
                    ticks = budget.ticks(),
                    "Execution abandoned after hard timeout"
                );
                Err(ExecutionError::timed_out(limits.time_limit_ms()))
            }
        };

        match &result {
            Ok(_) => log_transition(&mut state, ExecutionState::Completed),
            Err(err) => log_transition(&mut state, ExecutionState::from_error(err)),
        }
        result
    }
}

fn log_transition(state: &mut ExecutionState, next: ExecutionState) {
    debug!(from = %state, to = %next, "Execution state");
    *state = next;
}

/// Expression that evaluates to the function to call for `entry_point`
pub fn callee_expression(unit: &CompiledUnit, entry_point: &str) -> String {
    let fallback = unit.entry_expression();
    if is_identifier(entry_point) && fallback != entry_point {
        format!(
            "(typeof {name} === \"function\" ? {name} : {fallback})",
            name = entry_point,
            fallback = fallback
        )
    } else {
        fallback
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn sandbox() -> (Sandbox, EngineConfig) {
        let config = EngineConfig::default();
        (Sandbox::from_config(&config), config)
    }

    #[tokio::test]
    async fn test_execute_returns_output() {
        let (sandbox, config) = sandbox();
        let unit = compile("function twoSum(nums, target) { const seen = {}; for (let i = 0; i < nums.length; i++) { const need = target - nums[i]; if (need in seen) return [seen[need], i]; seen[nums[i]] = i; } return []; }", "twoSum").unwrap();
        let limits = Limits::from_config(&config, None, None);
        let args = vec![
            Value::Array(vec![Value::from(2i64), Value::from(7i64), Value::from(11i64)]),
            Value::from(9i64),
        ];
        let execution = sandbox.execute(&unit, "twoSum", &args, &limits).await.unwrap();
        assert_eq!(execution.output, Value::Array(vec![Value::from(0i64), Value::from(1i64)]));
    }

    #[tokio::test]
    async fn test_infinite_loop_is_stopped() {
        let (sandbox, config) = sandbox();
        let unit = compile("function spin() { while (true) {} }", "spin").unwrap();
        let limits = Limits::from_config(&config, Some(500), Some(10_000));
        let err = sandbox.execute(&unit, "spin", &[], &limits).await.unwrap_err();
        assert!(err.kind.is_limit());
    }

    #[tokio::test]
    async fn test_caught_limit_error_still_fails() {
        let (sandbox, config) = sandbox();
        let src = "function sneaky() { try { for (;;) {} } catch (e) {} return 42; }";
        let unit = compile(src, "sneaky").unwrap();
        let limits = Limits::from_config(&config, None, Some(1_000));
        let err = sandbox.execute(&unit, "sneaky", &[], &limits).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ResourceExceeded);
    }

    #[tokio::test]
    async fn test_forbidden_code_never_runs() {
        let (sandbox, config) = sandbox();
        let unit = compile("function f() { return fetch('http://example.com'); }", "f").unwrap();
        let limits = Limits::from_config(&config, None, None);
        let err = sandbox.execute(&unit, "f", &[], &limits).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ForbiddenOperation);
    }

    #[tokio::test]
    async fn test_inputs_are_not_shared() {
        let (sandbox, config) = sandbox();
        let unit = compile("function grow(xs) { xs.push(1); return xs.length; }", "grow").unwrap();
        let limits = Limits::from_config(&config, None, None);
        let args = vec![Value::Array(vec![])];
        for _ in 0..2 {
            let execution = sandbox.execute(&unit, "grow", &args, &limits).await.unwrap();
            assert_eq!(execution.output, Value::from(1i64));
        }
    }

    #[tokio::test]
    async fn test_deep_recursion_is_a_resource_error() {
        let (sandbox, config) = sandbox();
        let unit = compile("function down(n) { return down(n + 1); }", "down").unwrap();
        let limits = Limits::from_config(&config, None, None);
        let err = sandbox.execute(&unit, "down", &[Value::from(0i64)], &limits).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ResourceExceeded);
    }

    #[test]
    fn test_runaway_arrow_releases_the_worker() {
        // one blocking thread: a leaked worker would starve the second call
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (sandbox, config) = sandbox();

        rt.block_on(async {
            let src = "const f = n => n <= 0 ? 0 : f(n - 1) + f(n - 1);\nfunction spin() { return f(60); }";
            let unit = compile(src, "spin").unwrap();
            let limits = Limits::from_config(&config, Some(300), None);
            let started = Instant::now();
            let err = sandbox.execute(&unit, "spin", &[], &limits).await.unwrap_err();
            assert_eq!(err.kind, ExecutionErrorKind::TimedOut);
            assert!(started.elapsed() < Duration::from_secs(2));

            let unit = compile("function one() { return 1; }", "one").unwrap();
            let limits = Limits::from_config(&config, Some(1_000), None);
            let execution = sandbox.execute(&unit, "one", &[], &limits).await.unwrap();
            assert_eq!(execution.output, Value::from(1i64));
        });
        rt.shutdown_timeout(Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_promise_chain_of_arrows_is_stopped() {
        let (sandbox, config) = sandbox();
        let src = "const step = () => Promise.resolve().then(step);\nfunction spin() { return step(); }";
        let unit = compile(src, "spin").unwrap();
        let limits = Limits::from_config(&config, Some(300), None);
        let err = sandbox.execute(&unit, "spin", &[], &limits).await.unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::TimedOut);
    }

    #[test]
    fn test_callee_expression() {
        let unit = compile("export default function Toggle() { return null; }", "Component").unwrap();
        assert_eq!(
            callee_expression(&unit, "Component"),
            "(typeof Component === \"function\" ? Component : Toggle)"
        );
        let unit = compile("function twoSum() {}", "twoSum").unwrap();
        assert_eq!(callee_expression(&unit, "twoSum"), "twoSum");
    }
}
