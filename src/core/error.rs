// This module defines error types for vsynth using the thiserror crate. CompileError is
// the single error enum of the backend and covers every fatal condition of a compilation
// request: external tools that exit with a non-zero status or cannot be started, types
// and node kinds that an emitter cannot express, dynamic-load failures, missing toolchain
// configuration, an oracle run that produced no solution, and misuse of the module state
// machine. Ineligible expressions are not errors and never reach this type. Each variant
// carries the context needed for a single descriptive diagnostic (command line, exit
// code, type name, loader text). CompileResult<T> aliases Result<T, CompileError>.

//! Error types for the vsynth backend.
//!
//! Nothing in the backend is retried or recovered: every variant terminates the
//! current compilation request and is returned up to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for a compilation request.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{tool} failed with {}:\n{command}", describe_code(*code))]
    ToolFailed {
        tool: &'static str,
        command: String,
        code: Option<i32>,
    },

    #[error("could not start {command}: {source}")]
    ToolSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported type {ty} in {context}")]
    UnsupportedType {
        ty: String,
        context: &'static str,
    },

    #[error("cannot emit {kind} node in {context}")]
    UnsupportedExpr {
        kind: &'static str,
        context: &'static str,
    },

    #[error("failed to load generated code from {}: {reason}", path.display())]
    LoadFailed {
        path: PathBuf,
        reason: String,
    },

    #[error("environment variable {var} must be set for the synthesis-linked build")]
    MissingEnv {
        var: &'static str,
    },

    #[error("synthesis found no solution for expression {expr_id} (expected {})", log_path.display())]
    NoSolution {
        expr_id: usize,
        log_path: PathBuf,
    },

    #[error("symbol not found: {name}")]
    SymbolNotFound {
        name: String,
    },

    #[error("invalid module state: {reason}")]
    InvalidState {
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "termination by signal".to_string(),
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_reports_command_and_code() {
        let err = CompileError::ToolFailed {
            tool: "oracle",
            command: "racket /tmp/x.rkt".to_string(),
            code: Some(2),
        };
        let text = err.to_string();
        assert!(text.contains("exit status 2"));
        assert!(text.contains("racket /tmp/x.rkt"));
    }

    #[test]
    fn test_signal_termination_message() {
        let err = CompileError::ToolFailed { tool: "opt", command: "opt".into(), code: None };
        assert!(err.to_string().contains("signal"));
    }
}
