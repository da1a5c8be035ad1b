// A mounted component inside one sandbox runtime
//
// Every interaction dispatches, drains pending jobs, flushes updates and
// re-reads the tree before returning, so callers always query settled output.

use super::dom::Dom;
use crate::error::ExecutionError;
use crate::sandbox::runtime::JsRuntime;
use sandcheck_common::value::Value;
use serde::Deserialize;
use serde_json::json;

/// Hook values of one mounted component instance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentState {
    pub component: String,
    pub path: String,
    pub hooks: Vec<HookState>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HookState {
    pub kind: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl HookState {
    /// useState, useReducer and class state hold component state
    pub fn is_state(&self) -> bool {
        matches!(self.kind.as_str(), "state" | "reducer" | "classState")
    }
}

pub struct RenderSession<'r> {
    runtime: &'r mut JsRuntime,
    dom: Dom,
}

impl<'r> RenderSession<'r> {
    /// Render `component` (a JS expression naming the component) into a fresh tree
    pub fn mount(runtime: &'r mut JsRuntime, component: &str) -> Result<Self, ExecutionError> {
        let rendered = runtime.eval_string(&format!("__sc_mount({})", component))?;
        let mut session = Self {
            runtime,
            dom: Dom::default(),
        };
        session.dom = parse_dom(&rendered)?;
        // effects may have scheduled promise work during mount
        session.settle()?;
        Ok(session)
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn state(&mut self) -> Result<Vec<ComponentState>, ExecutionError> {
        let text = self.runtime.eval_string("__sc_state()")?;
        serde_json::from_str(&text)
            .map_err(|e| ExecutionError::threw(format!("unreadable component state: {}", e)))
    }

    /// State values only, for before/after comparisons
    pub fn state_values(&mut self) -> Result<Vec<Option<Value>>, ExecutionError> {
        Ok(self
            .state()?
            .into_iter()
            .flat_map(|c| c.hooks)
            .filter(HookState::is_state)
            .map(|h| h.value)
            .collect())
    }

    pub fn click(&mut self, id: u64) -> Result<&Dom, ExecutionError> {
        self.dispatch(id, "click", json!({}))
    }

    /// Type `value` into a field: sets it and fires `input` then `change`
    pub fn change(&mut self, id: u64, value: &str) -> Result<&Dom, ExecutionError> {
        self.dispatch(id, "change", json!({ "value": value }))
    }

    pub fn hover(&mut self, id: u64) -> Result<&Dom, ExecutionError> {
        self.dispatch(id, "hover", json!({}))
    }

    pub fn unhover(&mut self, id: u64) -> Result<&Dom, ExecutionError> {
        self.dispatch(id, "unhover", json!({}))
    }

    pub fn key_down(&mut self, id: u64, key: &str) -> Result<&Dom, ExecutionError> {
        self.dispatch(id, "keydown", json!({ "key": key, "code": key }))
    }

    /// Submit the form containing `id` (or `id` itself when it is a form)
    pub fn submit(&mut self, id: u64) -> Result<&Dom, ExecutionError> {
        self.dispatch(id, "submit", json!({}))
    }

    fn dispatch(&mut self, id: u64, kind: &str, init: serde_json::Value) -> Result<&Dom, ExecutionError> {
        let script = format!("__sc_dispatch({}, {:?}, {})", id, kind, init);
        let rendered = self.runtime.eval_string(&script)?;
        self.dom = parse_dom(&rendered)?;
        self.settle()?;
        Ok(&self.dom)
    }

    fn settle(&mut self) -> Result<(), ExecutionError> {
        self.runtime.run_jobs();
        self.runtime.check_budget()?;
        let rendered = self.runtime.eval_string("__sc_flush()")?;
        self.dom = parse_dom(&rendered)?;
        Ok(())
    }
}

fn parse_dom(text: &str) -> Result<Dom, ExecutionError> {
    Dom::from_json(text).map_err(|e| ExecutionError::threw(format!("unreadable render output: {}", e)))
}
