/// Source Compiler
///
/// Turns submitted source text into a `CompiledUnit`: plain script text the
/// sandbox can evaluate, with JSX lowered to calls and every loop and function
/// body instrumented. Compilation never runs submitted code; the final syntax
/// check only parses.
pub mod lexer;
pub mod transpile;

use crate::error::{CompileError, CompileErrorKind};
use boa_engine::{Context, Script, Source};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    static ref PARSER_LINE: Regex = Regex::new(r"line (\d+)").expect("static regex");
}

/// How the entry point is reached once the unit has been evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBinding {
    /// A top-level declaration with the requested name
    Declared(String),
    /// The default export (named or bound to the internal default name)
    DefaultExport(String),
    /// Whatever the code assigns to `module.exports`
    ModuleExports(String),
}

/// Invocable form of one submission; owned by the request that compiled it
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    source: Arc<str>,
    code: Arc<str>,
    stripped: Arc<str>,
    entry: EntryBinding,
}

impl CompiledUnit {
    /// The submitted text, unchanged
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Script text handed to the interpreter
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Submitted text with comments blanked out (newlines kept)
    pub fn stripped_source(&self) -> &str {
        &self.stripped
    }

    pub fn entry(&self) -> &EntryBinding {
        &self.entry
    }

    /// JavaScript expression evaluating to the entry function
    pub fn entry_expression(&self) -> String {
        match &self.entry {
            EntryBinding::Declared(name) | EntryBinding::DefaultExport(name) => name.clone(),
            EntryBinding::ModuleExports(name) => format!("__sc_module_export({:?})", name),
        }
    }
}

/// Compile `source`, requiring `entry_point` (or a default export) to exist
pub fn compile(source: &str, entry_point: &str) -> Result<CompiledUnit, CompileError> {
    let output = transpile::transpile(source)?;
    let stripped = strip_comments(source, &output.comments);

    let entry = if output.top_level.iter().any(|name| name == entry_point) {
        EntryBinding::Declared(entry_point.to_string())
    } else if let Some(default) = output.default_export {
        EntryBinding::DefaultExport(default)
    } else if stripped.contains("module.exports") {
        EntryBinding::ModuleExports(entry_point.to_string())
    } else {
        return Err(CompileError::missing_entry_point(entry_point));
    };

    check_syntax(&output.code)?;

    debug!(
        entry_point,
        binding = ?entry,
        source_bytes = source.len(),
        compiled_bytes = output.code.len(),
        "Compiled submission"
    );

    Ok(CompiledUnit {
        source: Arc::from(source),
        code: Arc::from(output.code),
        stripped: Arc::from(stripped),
        entry,
    })
}

/// Parse the compiled script without evaluating it
fn check_syntax(code: &str) -> Result<(), CompileError> {
    let mut context = Context::default();
    match Script::parse(Source::from_bytes(code), None, &mut context) {
        Ok(_) => Ok(()),
        Err(err) => {
            let message = err.to_string();
            let line = PARSER_LINE
                .captures(&message)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<usize>().ok());
            let detail = message
                .trim_start_matches("SyntaxError: ")
                .to_string();
            Err(CompileError {
                kind: CompileErrorKind::SyntaxError,
                detail,
                line,
            })
        }
    }
}

fn strip_comments(source: &str, comments: &[(usize, usize)]) -> String {
    let mut stripped = String::with_capacity(source.len());
    let mut cursor = 0;
    for &(start, end) in comments {
        if start < cursor || end > source.len() {
            continue;
        }
        stripped.push_str(&source[cursor..start]);
        for c in source[start..end].chars() {
            stripped.push(if c == '\n' { '\n' } else { ' ' });
        }
        cursor = end;
    }
    stripped.push_str(&source[cursor..]);
    stripped
}
