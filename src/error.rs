use std::fmt;

use thiserror::Error;

/// A failure reported by the native engine.
///
/// Carries the raw status code for Rust callers; the Lua surface only ever
/// shows `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EngineError {}

/// Errors produced by connection and statement operations.
///
/// The `Invalid*` variants are caller-contract violations and always carry
/// a fixed message; the Lua surface raises them. `Engine` is returned to
/// Lua as a `nil, message` pair instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid parameters.")]
    InvalidParameters,

    #[error("Invalid parameter.")]
    InvalidParameter,

    #[error("Invalid database.")]
    InvalidConnection,

    #[error("Invalid statement.")]
    InvalidStatement,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Error {
    /// Whether this error is a caller-contract violation rather than an engine failure.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, Error::Engine(_))
    }
}

impl From<Error> for mlua::Error {
    fn from(err: Error) -> Self {
        mlua::Error::external(err)
    }
}

impl Error {
    /// The fixed message of a contract violation carried by `err`, looking
    /// through callback wrapping.
    pub(crate) fn contract_message(err: &mlua::Error) -> Option<String> {
        match err {
            mlua::Error::ExternalError(cause) => (**cause)
                .downcast_ref::<Error>()
                .filter(|e| e.is_contract_violation())
                .map(ToString::to_string),
            mlua::Error::CallbackError { cause, .. } => Error::contract_message(cause),
            _ => None,
        }
    }
}
