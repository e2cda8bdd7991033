//! Error types for the dispatch core.
//!
//! [`RpcError`] is the wire-level taxonomy: every variant maps to one of the
//! fixed JSON-RPC error codes and is rendered into an error envelope by the
//! transports. The remaining enums describe failures at individual component
//! seams (registry construction, argument validation, batch execution) and
//! are folded into [`RpcError`] at the dispatcher boundary.

use std::fmt;

use thiserror::Error;

use crate::protocol::ErrorObject;

/// Malformed request envelope.
pub const PARSE_ERROR: i32 = -32700;
/// Unrecognised top-level method.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Unknown tool or invalid tool arguments.
pub const INVALID_PARAMS: i32 = -32602;
/// Failure inside a tool handler.
pub const INTERNAL_ERROR: i32 = -32603;

/// Errors that are reported to clients as error envelopes.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The incoming message was not valid JSON or not a request object.
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// The `method` field named something other than a supported method.
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// `tools/call` named a tool that is not registered.
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// Arguments failed validation against the tool's input contract.
    #[error("Invalid arguments for {tool}: {}", FieldIssues(.issues))]
    InvalidArguments { tool: String, issues: Vec<FieldIssue> },

    /// The handler failed. Only the message crosses the wire.
    #[error("Tool execution failed: {message}")]
    Internal { message: String },
}

impl RpcError {
    /// Returns the wire error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::UnknownTool { .. } | Self::InvalidArguments { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Creates a parse error from a serde failure.
    pub fn parse(source: &serde_json::Error) -> Self {
        Self::Parse {
            message: source.to_string(),
        }
    }

    /// Creates an internal error from a handler failure.
    ///
    /// Uses the alternate `anyhow` rendering so the context chain is kept in
    /// one line, without a backtrace.
    pub fn internal(source: &anyhow::Error) -> Self {
        Self::Internal {
            message: format!("{source:#}"),
        }
    }

    /// Renders the error as the `error` member of a response envelope.
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// A single problem found while validating one argument field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Field path, e.g. `urls[2]` for an array element.
    pub field: String,
    pub kind: IssueKind,
}

/// Kind of validation failure for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// A required field was absent or null.
    Missing,
    /// The value's JSON type does not match the declared type tag.
    WrongType { expected: String, found: String },
    /// The value is not one of the declared enum members.
    NotAllowed { value: String, allowed: Vec<String> },
    /// The field is not declared by the contract.
    Unexpected,
    /// The arguments member itself was not an object.
    NotAnObject,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "{}: required field is missing", self.field),
            IssueKind::WrongType { expected, found } => {
                write!(f, "{}: expected {expected}, found {found}", self.field)
            }
            IssueKind::NotAllowed { value, allowed } => write!(
                f,
                "{}: '{value}' is not one of [{}]",
                self.field,
                allowed.join(", ")
            ),
            IssueKind::Unexpected => write!(f, "{}: unexpected field", self.field),
            IssueKind::NotAnObject => write!(f, "{}: expected an object", self.field),
        }
    }
}

/// Joins issues with `"; "` for single-line error messages.
struct FieldIssues<'a>(&'a [FieldIssue]);

impl fmt::Display for FieldIssues<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Errors raised while building the tool registry or dispatcher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{name}' is already registered")]
    DuplicateTool { name: String },

    #[error("tool '{name}' has a handler but its contract declares '{declared}'")]
    ContractMismatch { name: String, declared: String },
}

/// Errors raised by argument validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid arguments for {tool}: {}", FieldIssues(.issues))]
    Invalid { tool: String, issues: Vec<FieldIssue> },
}

impl From<ValidationError> for RpcError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnknownTool { name } => Self::UnknownTool { name },
            ValidationError::Invalid { tool, issues } => Self::InvalidArguments { tool, issues },
        }
    }
}

/// Errors raised by the batch executor before any work starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("concurrency limit must be greater than zero, got {limit}")]
    InvalidConcurrency { limit: i64 },
}
