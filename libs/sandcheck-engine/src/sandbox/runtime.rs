// One isolated JavaScript context per execution
// Holds the guard functions, the harness, lockdown and the shared budget

use super::codec::{self, Envelope};
use super::Limits;
use crate::error::ExecutionError;
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsError, JsNativeError, JsString, JsValue, NativeFunction, Source};
use boa_gc::{Finalize, Trace};
use sandcheck_common::value::Value;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

const HARNESS: &str = include_str!("harness.js");

/// Internal names every context keeps through lockdown
pub const HARNESS_GLOBALS: &[&str] = &[
    "__sc_tick",
    "__sc_probe",
    "__sc_encode",
    "__sc_describe",
    "__sc_invoke",
    "__sc_collect",
    "__sc_iter",
    "__sc_take_logs",
    "__sc_module_export",
    "console",
    "module",
];

const CLEAR: u8 = 0;
const ITERATIONS: u8 = 1;
const DEADLINE: u8 = 2;

// deadline is read from the clock once per this many ticks
const CLOCK_STRIDE: u64 = 256;

/// Iteration and wall-clock allowance shared between the guard functions
/// and the task that owns the execution
#[derive(Debug)]
pub struct Budget {
    ticks: AtomicU64,
    iteration_cap: u64,
    deadline: Instant,
    time_limit_ms: u64,
    tripped: AtomicU8,
}

impl Budget {
    pub fn new(limits: &Limits) -> Arc<Self> {
        Arc::new(Self {
            ticks: AtomicU64::new(0),
            iteration_cap: limits.iteration_cap,
            deadline: Instant::now() + limits.time_limit,
            time_limit_ms: limits.time_limit_ms(),
            tripped: AtomicU8::new(CLEAR),
        })
    }

    /// Count one loop iteration; false once any limit is reached
    pub fn tick(&self) -> bool {
        if self.is_tripped() {
            return false;
        }
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks > self.iteration_cap {
            self.trip(ITERATIONS);
            return false;
        }
        if ticks % CLOCK_STRIDE == 0 {
            return self.probe();
        }
        true
    }

    /// Check the deadline without counting an iteration
    pub fn probe(&self) -> bool {
        if self.is_tripped() {
            return false;
        }
        if Instant::now() >= self.deadline {
            self.trip(DEADLINE);
            return false;
        }
        true
    }

    /// Stop the execution from outside; the next guard call throws
    pub fn expire(&self) {
        self.trip(DEADLINE);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire) != CLEAR
    }

    /// The error for whichever limit tripped first
    pub fn violation(&self) -> Option<ExecutionError> {
        match self.tripped.load(Ordering::Acquire) {
            ITERATIONS => Some(ExecutionError::resource(format!(
                "exceeded the iteration limit of {} loop iterations",
                self.iteration_cap
            ))),
            DEADLINE => Some(ExecutionError::timed_out(self.time_limit_ms)),
            _ => None,
        }
    }

    fn trip(&self, reason: u8) {
        let _ = self
            .tripped
            .compare_exchange(CLEAR, reason, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// State captured by a native guard function
#[derive(Trace, Finalize)]
struct Guard {
    #[unsafe_ignore_trace]
    budget: Arc<Budget>,
    #[unsafe_ignore_trace]
    check: fn(&Budget) -> bool,
    ok: JsValue,
}

/// A fresh interpreter with the harness loaded and the global scope locked down
pub struct JsRuntime {
    context: Context,
    budget: Arc<Budget>,
    recursion_limit: usize,
    max_output_bytes: usize,
}

impl JsRuntime {
    /// Build a context: guards, harness, `preludes` in order, then lockdown
    /// keeping `allowed_globals` plus the harness and `extra_globals`
    pub fn new(
        budget: Arc<Budget>,
        limits: &Limits,
        allowed_globals: &[String],
        preludes: &[&str],
        extra_globals: &[&str],
    ) -> Result<Self, ExecutionError> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(limits.iteration_cap.saturating_add(1));
        context
            .runtime_limits_mut()
            .set_recursion_limit(limits.recursion_limit);

        let mut runtime = Self {
            context,
            budget,
            recursion_limit: limits.recursion_limit,
            max_output_bytes: limits.max_output_bytes,
        };

        runtime.register_guard(js_string!("__sc_tick"), Budget::tick, JsValue::from(true))?;
        runtime.register_guard(js_string!("__sc_probe"), Budget::probe, JsValue::undefined())?;

        runtime.eval_setup(HARNESS)?;
        for prelude in preludes {
            runtime.eval_setup(prelude)?;
        }

        let mut keep: Vec<&str> = allowed_globals.iter().map(String::as_str).collect();
        keep.extend_from_slice(HARNESS_GLOBALS);
        keep.extend_from_slice(extra_globals);
        let lockdown = lockdown_script(&keep);
        runtime.eval_setup(&lockdown)?;

        Ok(runtime)
    }

    pub fn budget(&self) -> &Arc<Budget> {
        &self.budget
    }

    /// Evaluate compiled submission code at the top level
    pub fn load(&mut self, code: &str) -> Result<(), ExecutionError> {
        self.context
            .eval(Source::from_bytes(code))
            .map_err(|e| self.classify(e))?;
        self.check_budget()
    }

    /// Evaluate a harness call that returns a string
    pub fn eval_string(&mut self, script: &str) -> Result<String, ExecutionError> {
        let value = self
            .context
            .eval(Source::from_bytes(script))
            .map_err(|e| self.classify(e))?;
        self.check_budget()?;

        let text = value
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| ExecutionError::threw("sandbox returned a non-string result"))?;
        if text.len() > self.max_output_bytes {
            return Err(ExecutionError::resource(format!(
                "output exceeds the limit of {} bytes",
                self.max_output_bytes
            )));
        }
        Ok(text)
    }

    /// Call `callee` (a JS expression) through the harness and wait for the result,
    /// draining the job queue when it returns a promise
    pub fn invoke(&mut self, callee: &str, name: &str, args: &[Value]) -> Result<Value, ExecutionError> {
        let literals: Vec<String> = args.iter().map(codec::to_js_literal).collect();
        let script = format!(
            "__sc_invoke({}, {}, [{}])",
            callee,
            serde_json::Value::String(name.to_string()),
            literals.join(",")
        );
        let envelope = self.eval_string(&script)?;
        self.settle(&envelope)
    }

    fn settle(&mut self, envelope: &str) -> Result<Value, ExecutionError> {
        let mut envelope = codec::decode_envelope(envelope)?;
        if matches!(envelope, Envelope::Pending(_)) {
            self.run_jobs();
            self.check_budget()?;
            let collected = self.eval_string("__sc_collect()")?;
            envelope = codec::decode_envelope(&collected)?;
        }
        match envelope {
            Envelope::Ok(json) => codec::decode_value(json),
            Envelope::Threw(detail) | Envelope::Missing(detail) => Err(ExecutionError::threw(detail)),
            Envelope::Invalid(detail) => Err(ExecutionError::threw(format!(
                "returned a value that cannot be compared ({})",
                detail
            ))),
            Envelope::Pending(_) => Err(ExecutionError::threw("returned a promise that never settled")),
        }
    }

    /// Drain pending promise jobs
    pub fn run_jobs(&mut self) {
        let _ = self.context.run_jobs();
    }

    /// Console lines recorded since the last call
    pub fn take_logs(&mut self) -> Vec<String> {
        self.eval_string("__sc_take_logs()")
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn check_budget(&self) -> Result<(), ExecutionError> {
        match self.budget.violation() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Map an interpreter error onto the execution taxonomy
    pub fn classify(&self, err: JsError) -> ExecutionError {
        if let Some(violation) = self.budget.violation() {
            return violation;
        }
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("loop iteration limit") {
            return ExecutionError::resource(format!(
                "exceeded the iteration limit of {} loop iterations",
                self.budget.iteration_cap
            ));
        }
        if lowered.contains("recursion limit") || lowered.contains("stack size") {
            return ExecutionError::resource(format!(
                "exceeded the recursion limit of {} nested calls",
                self.recursion_limit
            ));
        }
        ExecutionError::threw(message)
    }

    fn register_guard(
        &mut self,
        name: JsString,
        check: fn(&Budget) -> bool,
        ok: JsValue,
    ) -> Result<(), ExecutionError> {
        let guard = Guard {
            budget: Arc::clone(&self.budget),
            check,
            ok,
        };
        let native = NativeFunction::from_copy_closure_with_captures(
            |_this, _args, guard: &Guard, _context| {
                if (guard.check)(&guard.budget) {
                    Ok(guard.ok.clone())
                } else {
                    Err(JsNativeError::range()
                        .with_message("sandbox limit reached")
                        .into())
                }
            },
            guard,
        );
        let function = FunctionObjectBuilder::new(self.context.realm(), native)
            .name(name.clone())
            .length(0)
            .constructor(false)
            .build();
        self.context
            .register_global_property(
                name,
                function,
                Attribute::READONLY | Attribute::NON_ENUMERABLE | Attribute::PERMANENT,
            )
            .map_err(|e| ExecutionError::threw(format!("sandbox setup failed: {}", e)))
    }

    fn eval_setup(&mut self, script: &str) -> Result<(), ExecutionError> {
        self.context
            .eval(Source::from_bytes(script))
            .map(|_| ())
            .map_err(|e| ExecutionError::threw(format!("sandbox setup failed: {}", e)))
    }
}

/// Delete every global not in `keep` and cut the function constructors off
/// the function prototypes
pub fn lockdown_script(keep: &[&str]) -> String {
    let names = serde_json::to_string(keep).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(function (g, keep) {{
  var allowed = Object.create(null);
  for (var i = 0; i < keep.length; i++) allowed[keep[i]] = true;
  var names = Object.getOwnPropertyNames(g);
  for (var j = 0; j < names.length; j++) {{
    if (!allowed[names[j]]) {{
      try {{ delete g[names[j]]; }} catch (e) {{}}
    }}
  }}
  var blocked = function () {{
    throw new TypeError("code generation is not available");
  }};
  var samples = [function () {{}}, async function () {{}}, function* () {{}}, async function* () {{}}];
  for (var k = 0; k < samples.length; k++) {{
    try {{
      Object.defineProperty(Object.getPrototypeOf(samples[k]), "constructor", {{
        value: blocked, writable: false, enumerable: false, configurable: false
      }});
    }} catch (e) {{}}
  }}
}})(this, {});"#,
        names
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionErrorKind;
    use sandcheck_common::EngineConfig;

    fn limits() -> Limits {
        Limits::from_config(&EngineConfig::default(), None, None)
    }

    fn runtime(limits: &Limits) -> JsRuntime {
        let config = EngineConfig::default();
        JsRuntime::new(Budget::new(limits), limits, &config.allowed_globals, &[], &[]).unwrap()
    }

    #[test]
    fn test_budget_trips_on_iteration_cap() {
        let mut limits = limits();
        limits.iteration_cap = 10;
        let budget = Budget::new(&limits);
        for _ in 0..10 {
            assert!(budget.tick());
        }
        assert!(!budget.tick());
        assert!(!budget.probe());
        let err = budget.violation().unwrap();
        assert_eq!(err.kind, ExecutionErrorKind::ResourceExceeded);
    }

    #[test]
    fn test_expired_budget_reports_timeout() {
        let budget = Budget::new(&limits());
        budget.expire();
        assert!(!budget.probe());
        assert_eq!(budget.violation().unwrap().kind, ExecutionErrorKind::TimedOut);
    }

    #[test]
    fn test_guards_follow_the_shared_budget() {
        let limits = limits();
        let mut rt = runtime(&limits);
        let text = rt
            .eval_string("[__sc_tick(), typeof __sc_probe(), __sc_tick.name].join(',')")
            .unwrap();
        assert_eq!(text, "true,undefined,__sc_tick");
        assert_eq!(rt.budget().ticks(), 1);

        rt.budget().expire();
        let err = rt.eval_string("String(__sc_probe())").unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::TimedOut);
    }

    #[test]
    fn test_lockdown_removes_globals() {
        let limits = limits();
        let mut rt = runtime(&limits);
        let text = rt
            .eval_string("[typeof eval, typeof Function, typeof Reflect, typeof Math, typeof __sc_invoke].join(',')")
            .unwrap();
        assert_eq!(text, "undefined,undefined,undefined,object,function");
    }

    #[test]
    fn test_function_constructor_is_blocked() {
        let limits = limits();
        let mut rt = runtime(&limits);
        rt.load("function f() { return 1; }").unwrap();
        let err = rt.eval_string("f.constructor('return 1')()").unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Threw);
        assert!(err.detail.contains("code generation"));
    }

    #[test]
    fn test_invoke_returns_values() {
        let limits = limits();
        let mut rt = runtime(&limits);
        rt.load("function add(a, b) { return a + b; }").unwrap();
        let value = rt
            .invoke("add", "add", &[Value::from(2i64), Value::from(3i64)])
            .unwrap();
        assert_eq!(value, Value::from(5i64));
    }

    #[test]
    fn test_invoke_reports_throws() {
        let limits = limits();
        let mut rt = runtime(&limits);
        rt.load("function boom() { throw new TypeError('bad input'); }").unwrap();
        let err = rt.invoke("boom", "boom", &[]).unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Threw);
        assert_eq!(err.detail, "TypeError: bad input");
    }

    #[test]
    fn test_invoke_settles_promises() {
        let limits = limits();
        let mut rt = runtime(&limits);
        rt.load("async function later(x) { return x * 2; }").unwrap();
        let value = rt.invoke("later", "later", &[Value::from(21i64)]).unwrap();
        assert_eq!(value, Value::from(42i64));
    }

    #[test]
    fn test_console_is_captured() {
        let limits = limits();
        let mut rt = runtime(&limits);
        rt.load("console.log('hello', 1); console.warn({a: 1});").unwrap();
        assert_eq!(rt.take_logs(), vec!["hello 1".to_string(), "warn: {\"a\":1}".to_string()]);
        assert!(rt.take_logs().is_empty());
    }
}
