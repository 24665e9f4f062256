//! Structured error handling for the prover
//!
//! Provides a unified error type with:
//! - Error codes for programmatic handling
//! - Structured error values (JSON-friendly)
//! - Context preservation through error chains
//! - Process exit code mapping for the command-line contracts
//!
//! # Error Categories
//!
//! - Construction errors - malformed statements, unknown symbols, arity mismatches
//! - Search errors - aborted searches, invalid solver settings
//! - Store errors - SQLite failures and constraint violations
//! - Training errors - invalid HMM parameters
//! - Config errors - configuration issues
//!
//! Search outcomes such as "proved" or "exhausted" are not errors and never
//! appear here.
//!
//! # Example
//!
//! ```rust,ignore
//! use atp::error::{AtpError, ErrorCode};
//!
//! fn check_arity(expected: usize, got: usize) -> Result<(), AtpError> {
//!     if expected != got {
//!         return Err(AtpError::arity_mismatch("*", expected, got)
//!             .with_context("statement", "*(x) = x"));
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};

// ============================================================================
// Error Codes
// ============================================================================

/// Unique error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Construction errors (1xxx)
    /// Malformed statement text
    SyntaxError = 1000,
    /// Identifier applied to arguments but not defined in the context
    UndefinedSymbol = 1001,
    /// Wrong number of children for a symbol
    ArityMismatch = 1002,
    /// Symbol id not registered in the context
    UnknownSymbol = 1003,
    /// Symbol defined twice in one context
    DuplicateSymbol = 1004,
    /// Context definition is unusable
    InvalidContext = 1005,

    // Search errors (2xxx)
    /// Internal invariant violated during search
    SearchAborted = 2000,
    /// Solver or stopping settings out of range
    InvalidSettings = 2001,

    // Store errors (3xxx)
    /// Generic store error
    StoreError = 3000,
    /// Referenced theorem, context or settings row does not exist
    ConstraintViolation = 3001,
    /// Transaction could not be committed
    TransactionFailed = 3002,
    /// Requested record not found
    NotFound = 3003,

    // Training errors (4xxx)
    /// HMM parameters are not row-stochastic or have mismatched shapes
    InvalidModel = 4000,

    // Config errors (7xxx)
    /// Generic config error
    ConfigError = 7000,
    /// Config file not found
    ConfigNotFound = 7001,
    /// Invalid config syntax
    InvalidConfigSyntax = 7002,
    /// Unknown search profile
    UnknownProfile = 7003,

    // Internal errors (9xxx)
    /// Internal error
    InternalError = 9000,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a short description of the error code
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::SyntaxError => "Syntax error",
            ErrorCode::UndefinedSymbol => "Undefined symbol",
            ErrorCode::ArityMismatch => "Arity mismatch",
            ErrorCode::UnknownSymbol => "Unknown symbol",
            ErrorCode::DuplicateSymbol => "Duplicate symbol",
            ErrorCode::InvalidContext => "Invalid model context",

            ErrorCode::SearchAborted => "Search aborted",
            ErrorCode::InvalidSettings => "Invalid search settings",

            ErrorCode::StoreError => "Store error",
            ErrorCode::ConstraintViolation => "Constraint violation",
            ErrorCode::TransactionFailed => "Transaction failed",
            ErrorCode::NotFound => "Record not found",

            ErrorCode::InvalidModel => "Invalid model parameters",

            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::ConfigNotFound => "Configuration file not found",
            ErrorCode::InvalidConfigSyntax => "Invalid configuration syntax",
            ErrorCode::UnknownProfile => "Unknown profile",

            ErrorCode::InternalError => "Internal error",
        }
    }

    /// Whether this code reports invalid user input rather than a fault
    pub fn is_construction(&self) -> bool {
        (1000..2000).contains(&self.code())
    }

    /// Process exit status for the command-line contracts
    ///
    /// Construction errors are user errors (1); everything else is an
    /// unexpected failure (-1).
    pub fn exit_code(&self) -> i32 {
        if self.is_construction() {
            1
        } else {
            -1
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Error Context
// ============================================================================

/// Additional context information for an error
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Key-value pairs of context information
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
    /// Source location (file:line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Stack of error causes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for the prover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtpError {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    /// Hint for resolving the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl AtpError {
    /// Create a new error with a code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    // ========================================================================
    // Factory methods for common error types
    // ========================================================================

    /// Create a syntax error
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SyntaxError, message)
    }

    /// Create an undefined-symbol error for a parsed identifier
    pub fn undefined_symbol(name: &str) -> Self {
        Self::new(
            ErrorCode::UndefinedSymbol,
            format!("Symbol '{}' is not defined in this context", name),
        )
    }

    /// Create an arity mismatch error
    pub fn arity_mismatch(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ErrorCode::ArityMismatch,
            format!("Symbol '{}' takes {} argument(s), got {}", name, expected, got),
        )
    }

    /// Create an unknown-symbol error for a raw symbol id
    pub fn unknown_symbol(id: usize) -> Self {
        Self::new(
            ErrorCode::UnknownSymbol,
            format!("Symbol id {} is not registered in this context", id),
        )
    }

    /// Create an aborted-search error
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SearchAborted, message)
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreError, message)
    }

    /// Create a constraint violation error
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConstraintViolation, message)
    }

    /// Create an invalid-model error
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidModel, message)
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// Set the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.fields.insert(key.into(), value.into());
        self
    }

    /// Add a cause to the error chain
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.causes.push(cause.into());
        self
    }

    /// Add source location
    pub fn at(mut self, location: impl Into<String>) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::new);
        ctx.location = Some(location.into());
        self
    }

    /// Add a hint for resolving the error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Exit status for the command-line contracts
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":"INTERNAL_ERROR","message":"{}"}}"#, self.message)
        })
    }
}

impl fmt::Display for AtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)?;

        if let Some(ref ctx) = self.context {
            if let Some(ref loc) = ctx.location {
                write!(f, " at {}", loc)?;
            }
            if !ctx.causes.is_empty() {
                write!(f, "\nCaused by:")?;
                for cause in &ctx.causes {
                    write!(f, "\n  - {}", cause)?;
                }
            }
        }

        if let Some(ref hint) = self.hint {
            write!(f, "\nHint: {}", hint)?;
        }

        Ok(())
    }
}

impl std::error::Error for AtpError {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<std::io::Error> for AtpError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::NotFound => ErrorCode::ConfigNotFound,
            _ => ErrorCode::InternalError,
        };
        AtpError::new(code, err.to_string())
    }
}

impl From<serde_json::Error> for AtpError {
    fn from(err: serde_json::Error) -> Self {
        AtpError::new(ErrorCode::InvalidContext, err.to_string())
            .with_context("format", "JSON")
    }
}

impl From<toml::de::Error> for AtpError {
    fn from(err: toml::de::Error) -> Self {
        AtpError::config(err.to_string())
            .with_code(ErrorCode::InvalidConfigSyntax)
    }
}

impl From<rusqlite::Error> for AtpError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => ErrorCode::ConstraintViolation,
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                ErrorCode::TransactionFailed
            }
            _ => ErrorCode::StoreError,
        };
        AtpError::new(code, err.to_string()).with_context("backend", "sqlite")
    }
}

// ============================================================================
// Result type alias
// ============================================================================

/// A Result type using AtpError
pub type AtpResult<T> = Result<T, AtpError>;

// ============================================================================
// Macros for convenient error creation
// ============================================================================

/// Create an AtpError with context from the current location
#[macro_export]
macro_rules! atp_error {
    ($code:expr, $msg:expr) => {
        $crate::error::AtpError::new($code, $msg)
            .at(format!("{}:{}", file!(), line!()))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::error::AtpError::new($code, format!($fmt, $($arg)*))
            .at(format!("{}:{}", file!(), line!()))
    };
}

/// Bail out early with an error
#[macro_export]
macro_rules! atp_bail {
    ($code:expr, $msg:expr) => {
        return Err($crate::atp_error!($code, $msg))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::atp_error!($code, $fmt, $($arg)*))
    };
}

/// Ensure a condition holds, or return an error
#[macro_export]
macro_rules! atp_ensure {
    ($cond:expr, $code:expr, $msg:expr) => {
        if !$cond {
            $crate::atp_bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::atp_bail!($code, $fmt, $($arg)*);
        }
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AtpError::syntax("unexpected ')'");
        assert_eq!(err.code, ErrorCode::SyntaxError);
        assert_eq!(err.message, "unexpected ')'");
    }

    #[test]
    fn test_error_with_context() {
        let err = AtpError::arity_mismatch("i", 1, 2)
            .with_context("statement", "i(x, y) = x");

        let ctx = err.context.as_ref().unwrap();
        assert_eq!(ctx.fields.get("statement"), Some(&"i(x, y) = x".to_string()));
        assert!(err.message.contains("takes 1"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AtpError::syntax("bad").exit_code(), 1);
        assert_eq!(AtpError::undefined_symbol("f").exit_code(), 1);
        assert_eq!(AtpError::unknown_symbol(7).exit_code(), 1);
        assert_eq!(AtpError::store("disk").exit_code(), -1);
        assert_eq!(AtpError::internal("oops").exit_code(), -1);
    }

    #[test]
    fn test_error_display() {
        let err = AtpError::constraint("theorem 42 does not exist")
            .at("store.rs:10")
            .with_cause("FOREIGN KEY constraint failed")
            .with_hint("Insert the theorem first");

        let display = err.to_string();
        assert!(display.contains("[3001]"));
        assert!(display.contains("theorem 42"));
        assert!(display.contains("store.rs:10"));
        assert!(display.contains("FOREIGN KEY"));
        assert!(display.contains("Insert the theorem first"));
    }

    #[test]
    fn test_error_to_json() {
        let err = AtpError::syntax("missing '='");
        let json = err.to_json();
        assert!(json.contains("SYNTAX_ERROR"));
        assert!(json.contains("missing '='"));
    }

    #[test]
    fn test_macro_sets_location() {
        fn fails() -> AtpResult<()> {
            atp_bail!(ErrorCode::InvalidSettings, "depth {} too small", 0);
        }
        let err = fails().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSettings);
        assert!(err.context.unwrap().location.unwrap().contains("error.rs"));
    }
}
