//! Error types for cross-boundary operations.
//!
//! A script exception caught in the engine's trap is rendered once into a
//! [`ScriptException`] and forwarded to the caller unchanged.

use std::fmt;

use thiserror::Error;

use crate::engine::{ScriptEngine, Value};

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced to host callers.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Exception thrown inside the script engine, forwarded verbatim
    #[error("{0}")]
    Engine(ScriptException),

    /// A proxy call was given an argument the script side cannot act on
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// Class name not present in the registry
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// Script value with no host representation
    #[error("Cannot marshal value: {0}")]
    Unmarshalable(String),

    /// Array nesting deeper than the configured maximum
    #[error("Value nesting exceeds maximum depth of {0}")]
    MarshalDepth(usize),

    /// The engine thread is gone; no further work can be marshaled onto it
    #[error("Engine thread has stopped")]
    EngineThreadStopped,

    #[error("Failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl BridgeError {
    pub fn is_engine_exception(&self) -> bool {
        matches!(self, BridgeError::Engine(_))
    }

    /// The forwarded script exception, if this error carries one.
    pub fn exception(&self) -> Option<&ScriptException> {
        match self {
            BridgeError::Engine(exception) => Some(exception),
            _ => None,
        }
    }
}

impl From<ScriptException> for BridgeError {
    fn from(exception: ScriptException) -> Self {
        BridgeError::Engine(exception)
    }
}

/// A thrown script value rendered for the host side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptException {
    /// `name` of a thrown error object (`"TypeError"`, ...), if it had one
    pub name: Option<String>,
    /// Default string conversion of the thrown value
    pub message: String,
}

impl ScriptException {
    /// Render a value caught by the engine's exception trap.
    ///
    /// Conversion itself may throw (a throwing `toString`); the rendering then
    /// falls back to a placeholder rather than losing the original failure.
    pub fn capture<E: ScriptEngine>(engine: &mut E, thrown: &Value) -> Self {
        let name = match thrown.as_object() {
            Some(object) => match engine.get(object, "name") {
                Ok(Value::String(name)) => Some(name),
                _ => None,
            },
            None => None,
        };

        let message = engine
            .to_display_string(thrown)
            .unwrap_or_else(|_| "<exception could not be converted to a string>".to_string());

        Self { name, message }
    }
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ScriptException {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Heap;

    #[test]
    fn test_capture_error_object() {
        let mut heap = Heap::new();
        let thrown = heap.type_error("bad things");

        let exception = ScriptException::capture(&mut heap, &thrown);
        assert_eq!(exception.name.as_deref(), Some("TypeError"));
        assert_eq!(exception.to_string(), "TypeError: bad things");
    }

    #[test]
    fn test_capture_primitive() {
        let mut heap = Heap::new();
        let exception = ScriptException::capture(&mut heap, &Value::Number(42.0));

        assert_eq!(exception.name, None);
        assert_eq!(exception.message, "42");
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::IllegalArgument("Called field is not a function".into());
        assert_eq!(err.to_string(), "Illegal argument: Called field is not a function");
        assert!(!err.is_engine_exception());

        let err: BridgeError = ScriptException {
            name: None,
            message: "boom".into(),
        }
        .into();
        assert!(err.is_engine_exception());
        assert_eq!(err.exception().map(|e| e.message.as_str()), Some("boom"));
    }
}
