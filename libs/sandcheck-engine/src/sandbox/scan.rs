// Static denylist scan over compiled code
// Runs before any evaluation; a finding means the code never executes

use crate::compiler::lexer::{tokenize, Token, TokenKind};
use crate::error::ExecutionError;

/// Globals that reach outside the sandbox: evaluation, process and
/// environment access, network, storage, timers and threads
pub const DENYLIST: &[&str] = &[
    "eval",
    "Function",
    "require",
    "process",
    "globalThis",
    "global",
    "window",
    "document",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "EventSource",
    "navigator",
    "localStorage",
    "sessionStorage",
    "indexedDB",
    "setTimeout",
    "setInterval",
    "setImmediate",
    "queueMicrotask",
    "requestAnimationFrame",
    "Worker",
    "SharedArrayBuffer",
    "Atomics",
    "importScripts",
    "Deno",
    "Bun",
    "Reflect",
    "Proxy",
];

/// Properties that lead back to constructors or prototypes
const FORBIDDEN_MEMBERS: &[&str] = &["constructor", "__proto__", "__defineGetter__", "__defineSetter__", "__lookupGetter__"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub what: String,
    pub line: usize,
}

impl Finding {
    fn into_error(self) -> ExecutionError {
        ExecutionError::forbidden(format!("{} is not allowed (line {})", self.what, self.line))
    }
}

/// Scan compiled code and fail on the first denylisted construct
pub fn scan(code: &str) -> Result<(), ExecutionError> {
    match find_forbidden(code) {
        Some(finding) => Err(finding.into_error()),
        None => Ok(()),
    }
}

pub fn find_forbidden(code: &str) -> Option<Finding> {
    let tokens = match tokenize(code) {
        Ok(tokens) => tokens,
        // compiled code always lexes; refuse anything that does not
        Err(err) => {
            return Some(Finding {
                what: "unrecognised source".to_string(),
                line: err.line.unwrap_or(1),
            })
        }
    };

    let text = |t: &Token| t.text(code);
    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|p| tokens.get(p));
        let next = tokens.get(i + 1);
        match token.kind {
            TokenKind::Ident => {
                let name = text(token);
                let is_member = prev.is_some_and(|p| matches!(text(p), "." | "?."));
                if is_member {
                    if FORBIDDEN_MEMBERS.contains(&name) {
                        return Some(Finding {
                            what: format!("access to `.{}`", name),
                            line: token.line,
                        });
                    }
                    continue;
                }
                let is_key = next.is_some_and(|n| text(n) == ":")
                    && prev.is_some_and(|p| matches!(text(p), "{" | ","));
                if is_key {
                    continue;
                }
                if name == "import" && next.is_some_and(|n| text(n) == "(") {
                    return Some(Finding {
                        what: "dynamic `import()`".to_string(),
                        line: token.line,
                    });
                }
                if DENYLIST.contains(&name) {
                    return Some(Finding {
                        what: format!("`{}`", name),
                        line: token.line,
                    });
                }
            }
            TokenKind::Str => {
                let computed = prev.is_some_and(|p| text(p) == "[")
                    && next.is_some_and(|n| text(n) == "]");
                if !computed {
                    continue;
                }
                let raw = text(token);
                let key = &raw[1..raw.len() - 1];
                if FORBIDDEN_MEMBERS.contains(&key) || DENYLIST.contains(&key) {
                    return Some(Finding {
                        what: format!("computed access to `{}`", key),
                        line: token.line,
                    });
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionErrorKind;

    #[test]
    fn test_denylisted_globals() {
        let finding = find_forbidden("const a = 1;\nreturn eval('1+1');").unwrap();
        assert_eq!(finding, Finding { what: "`eval`".to_string(), line: 2 });
        assert!(find_forbidden("fetch('http://x')").is_some());
        assert!(find_forbidden("setTimeout(() => {}, 0)").is_some());
        assert!(find_forbidden("const p = process.env").is_some());
    }

    #[test]
    fn test_member_access_and_keys_are_not_globals() {
        assert!(find_forbidden("const o = { fetch: 1, window: 2 }; o.fetch; o.eval;").is_none());
        assert!(find_forbidden("const s = 'eval is a word';").is_none());
    }

    #[test]
    fn test_constructor_escapes() {
        assert!(find_forbidden("(() => {}).constructor('return this')()").is_some());
        assert!(find_forbidden("x['constructor']").is_some());
        assert!(find_forbidden("x[\"globalThis\"]").is_some());
        assert!(find_forbidden("o.__proto__").is_some());
    }

    #[test]
    fn test_dynamic_import_and_template_expressions() {
        assert!(find_forbidden("import('fs')").is_some());
        assert!(find_forbidden("const s = `${require('fs')}`;").is_some());
    }

    #[test]
    fn test_scan_error_kind() {
        let err = scan("window.alert(1)").unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::ForbiddenOperation);
        assert_eq!(err.detail, "`window` is not allowed (line 1)");
    }
}
