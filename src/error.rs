use thiserror::Error;

/// A template whose shape is malformed. These are reported once, when the template is built,
/// never while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("closing tag </{found}> does not match open tag <{expected}>")]
    MismatchedClose { expected: String, found: String },
    #[error("closing tag </{0}> has no open tag")]
    UnexpectedClose(String),
    #[error("tag <{0}> is never closed")]
    Unclosed(String),
    #[error("attribute `{0}` outside of an open tag")]
    AttributeOutsideTag(String),
    #[error("template needs {expected} arguments but got {found}")]
    MissingArguments { expected: usize, found: usize }
}

/// A computation which panicked while the runtime was draining.
///
/// The other computations in the same drain still run; this is handed to the error handler
/// (see [crate::RxRuntime::set_error_handler]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("effect #{effect} panicked: {message}")]
pub struct EffectError {
    pub effect: u64,
    pub message: String
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Effects kept re-triggering each other past the configured bound.
    #[error("effects did not settle after {0} drains")]
    Unsettled(usize)
}
