//! Error types for the jobloop runtime core

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Main error type for jobloop
///
/// Errors are `Clone` so that a single failure can be stored on a module
/// record and handed to every importer that observes it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An import specifier could not be mapped to an existing module
    #[error("ResolutionError: cannot resolve '{specifier}' from {referrer}")]
    Resolution { specifier: String, referrer: String },

    /// Uncaught exception during a module body or async frame
    #[error("EvaluationError: {message}")]
    Evaluation { message: String },

    /// Invalid timer delay, raised synchronously at the call site
    #[error("TimerSchedulingError: {0}")]
    TimerScheduling(String),

    /// Module graph error (cycles, missing exports)
    #[error("ModuleError: {0}")]
    Module(String),

    /// The compiler collaborator rejected a module's source
    #[error("CompileError: {path}: {message}")]
    Compile { path: String, message: String },

    /// IO error while reading module source or configuration
    #[error("IOError: {path}: {message}")]
    Io { path: String, message: String },

    /// Wrong value type for an operation
    #[error("TypeError: {0}")]
    Type(String),

    /// Invalid runtime configuration
    #[error("ConfigError: {0}")]
    Config(String),
}

/// Error taxonomy used for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Import specifier cannot be mapped to an existing module
    ResolutionError,
    /// Uncaught exception in module-body or async-frame execution
    EvaluationError,
    /// Invalid delay passed to a timer binding
    TimerSchedulingError,
    /// Module graph inconsistency
    ModuleError,
    /// Source rejected by the compiler
    CompileError,
    /// Underlying IO failure
    IoError,
    /// Wrong value type
    TypeError,
    /// Bad configuration
    ConfigError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ResolutionError => write!(f, "ResolutionError"),
            ErrorKind::EvaluationError => write!(f, "EvaluationError"),
            ErrorKind::TimerSchedulingError => write!(f, "TimerSchedulingError"),
            ErrorKind::ModuleError => write!(f, "ModuleError"),
            ErrorKind::CompileError => write!(f, "CompileError"),
            ErrorKind::IoError => write!(f, "IOError"),
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ConfigError => write!(f, "ConfigError"),
        }
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Resolution { .. } => ErrorKind::ResolutionError,
            Error::Evaluation { .. } => ErrorKind::EvaluationError,
            Error::TimerScheduling(_) => ErrorKind::TimerSchedulingError,
            Error::Module(_) => ErrorKind::ModuleError,
            Error::Compile { .. } => ErrorKind::CompileError,
            Error::Io { .. } => ErrorKind::IoError,
            Error::Type(_) => ErrorKind::TypeError,
            Error::Config(_) => ErrorKind::ConfigError,
        }
    }

    /// Create a resolution error
    pub fn resolution(specifier: impl Into<String>, referrer: impl Into<String>) -> Self {
        Error::Resolution {
            specifier: specifier.into(),
            referrer: referrer.into(),
        }
    }

    /// Create an evaluation error
    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation {
            message: message.into(),
        }
    }

    /// Create a compile error for a module path
    pub fn compile(path: &Path, message: impl Into<String>) -> Self {
        Error::Compile {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Wrap an IO error with the path it concerns
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.display().to_string(),
            message: source.to_string(),
        }
    }

    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }
}

/// Result type alias for jobloop
pub type Result<T> = std::result::Result<T, Error>;

/// Standardized error message templates
pub mod messages {
    pub const NOT_A_FUNCTION: &str = "is not a function";
    pub const NOT_A_PROMISE: &str = "is not a promise";
    pub const BARE_SPECIFIER: &str = "only './' and '../' specifiers are supported";
    pub const CIRCULAR_IMPORT: &str = "circular import";
    pub const INVALID_DELAY: &str = "delay must be a finite number between 0 and 2147483647";

    /// Format a "X is not a function" error message
    pub fn not_a_function(name: &str) -> String {
        format!("'{}' {}", name, NOT_A_FUNCTION)
    }

    /// Format a "X is not a promise" error message
    pub fn not_a_promise(what: &str) -> String {
        format!("{} {}", what, NOT_A_PROMISE)
    }

    /// Format a "export 'X' not found in module 'Y'" error message
    pub fn export_not_found(export: &str, module: &str) -> String {
        format!("export '{}' not found in module '{}'", export, module)
    }

    /// Format a circular import message for the offending module
    pub fn circular_import(module: &str) -> String {
        format!("{}: {}", CIRCULAR_IMPORT, module)
    }

    /// Format an invalid timer delay message
    pub fn invalid_delay(delay: f64) -> String {
        format!("{} (got {})", INVALID_DELAY, delay)
    }
}
