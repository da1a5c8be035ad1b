/// UI Verifier - Assertion Suites Against Rendered Components
///
/// **Core Responsibility:**
/// Render a compiled component into a throwaway tree and run the challenge's
/// assertions against it, one `CheckResult` per assertion.
///
/// **Assertion Styles:**
/// - Structural: mount, query, interact, flush, query again. Each one gets its
///   own fresh runtime, so no assertion sees another's clicks.
/// - Heuristic: lexical patterns over the comment-free source. Lower
///   confidence; used only for behavior a tree cannot show (transitions,
///   hover styling in CSS).
///
/// A component that fails to render produces one failing check and no
/// assertions run.
pub mod dom;
pub mod session;

use crate::challenges::UiChallenge;
use crate::compiler::CompiledUnit;
use crate::error::{ExecutionError, ExecutionErrorKind};
use crate::sandbox::{callee_expression, Limits, Sandbox};
use crate::verdict::Aggregator;
use sandcheck_common::config::EngineConfig;
use sandcheck_common::types::{CheckResult, Verdict};
use session::RenderSession;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

const UI_RUNTIME: &str = include_str!("runtime.js");

/// Scripts evaluated before lockdown for UI challenges
pub const UI_PRELUDES: &[&str] = &[UI_RUNTIME];

/// Globals the UI runtime defines and user code may use
pub const UI_GLOBALS: &[&str] = &[
    "React",
    "Fragment",
    "createContext",
    "useState",
    "useReducer",
    "useRef",
    "useMemo",
    "useCallback",
    "useEffect",
    "useLayoutEffect",
    "useContext",
    "useId",
    "__sc_h",
    "__sc_Fragment",
    "__sc_mount",
    "__sc_flush",
    "__sc_dispatch",
    "__sc_state",
];

/// Result of one assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub pass: bool,
    pub message: String,
}

impl Outcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            pass: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            pass: false,
            message: message.into(),
        }
    }

    pub fn check(pass: bool, ok: impl Into<String>, failed: impl Into<String>) -> Self {
        if pass {
            Self::pass(ok)
        } else {
            Self::fail(failed)
        }
    }
}

pub type StructuralCheck = fn(&mut RenderSession<'_>) -> Result<Outcome, ExecutionError>;
pub type HeuristicCheck = fn(&str) -> Outcome;

#[derive(Clone, Copy)]
pub enum Check {
    Structural(StructuralCheck),
    /// Runs over the comment-stripped source; tolerant of false positives
    Heuristic(HeuristicCheck),
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Structural(_) => write!(f, "Structural"),
            Check::Heuristic(_) => write!(f, "Heuristic"),
        }
    }
}

/// A named predicate over a rendered tree or the raw source
#[derive(Debug, Clone)]
pub struct Assertion {
    pub name: &'static str,
    pub check: Check,
}

impl Assertion {
    pub const fn structural(name: &'static str, check: StructuralCheck) -> Self {
        Self {
            name,
            check: Check::Structural(check),
        }
    }

    pub const fn heuristic(name: &'static str, check: HeuristicCheck) -> Self {
        Self {
            name,
            check: Check::Heuristic(check),
        }
    }
}

/// Run every assertion of `challenge` against `unit`
#[tracing::instrument(skip_all, fields(challenge_id = %challenge.id))]
pub async fn verify(sandbox: &Sandbox, config: &EngineConfig, unit: &CompiledUnit, challenge: &UiChallenge) -> Verdict {
    let limits = Limits::for_ui(config);
    let callee = callee_expression(unit, &challenge.entry_point);

    // render once up front; a broken tree stops the suite
    let probe_callee = callee.clone();
    let probe = sandbox
        .run_isolated(unit, &limits, UI_PRELUDES, UI_GLOBALS, move |runtime| {
            RenderSession::mount(runtime, &probe_callee).map(|session| session.dom().is_empty())
        })
        .await;
    match probe {
        Ok((empty, _)) => {
            debug!(empty, "Render probe succeeded");
        }
        Err(err) => {
            info!(kind = %err.kind, "Component failed to render");
            return Verdict::single_failure(render_failure(&err, &challenge.entry_point));
        }
    }

    let mut aggregator = Aggregator::new();
    for assertion in &challenge.assertions {
        let started = Instant::now();
        let outcome = match assertion.check {
            Check::Heuristic(check) => Ok(check(unit.stripped_source())),
            Check::Structural(check) => {
                let callee = callee.clone();
                sandbox
                    .run_isolated(unit, &limits, UI_PRELUDES, UI_GLOBALS, move |runtime| {
                        let mut session = RenderSession::mount(runtime, &callee)?;
                        check(&mut session)
                    })
                    .await
                    .map(|(outcome, _)| outcome)
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(outcome) => CheckResult::new(outcome.pass, format!("{}: {}", assertion.name, outcome.message)),
            Err(err) => CheckResult::failed(format!("{}: {}", assertion.name, err.describe())),
        };
        debug!(assertion = assertion.name, pass = result.pass, elapsed_ms, "Assertion finished");
        aggregator.push(result.with_time(elapsed_ms));
    }

    aggregator.finish()
}

fn render_failure(err: &ExecutionError, entry_point: &str) -> String {
    match err.kind {
        ExecutionErrorKind::ForbiddenOperation => format!("Submission rejected: {}", err.detail),
        _ => format!(
            "Component failed to render: {}. Check that `{}` returns valid JSX.",
            err.describe(),
            entry_point
        ),
    }
}
