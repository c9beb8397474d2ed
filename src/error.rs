//! Error taxonomy of the render engine.
//!
//! None of these errors escape [`Renderer::render`](crate::Renderer::render):
//! each one is contained at the smallest boundary that can absorb it and is
//! logged through [`report`] with a stable code.

use deno_core::error::JsError;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SsrError {
    /// A module file could not be read, transformed or executed. Degrades to
    /// an empty exports object.
    #[error("failed to load module '{}': {reason}", path.display())]
    ModuleLoad { path: PathBuf, reason: String },

    /// A tag name was defined a second time. The second definition is
    /// ignored.
    #[error("custom element <{tag}> is already defined by {owner}")]
    DuplicateRegistration { tag: String, owner: String, origin: String },

    /// A single element's lifecycle callback threw. Only that element is
    /// replaced.
    #[error("<{}> failed to render: {}", .0.component, .0.failure.message)]
    ComponentRender(Box<ComponentFailure>),

    /// An event-binding attribute was refused by the validator.
    #[error("invalid event binding {attribute}=\"{value}\" on <{element}>: {reason}")]
    InvalidEventBinding {
        attribute: String,
        value: String,
        element: String,
        reason: String,
    },

    /// The realm could not be built or the document could not be injected.
    /// The whole call falls back to the unrendered input.
    #[error("render runtime failed: {0}")]
    RuntimeFatal(String),
}

impl SsrError {
    pub fn code(&self) -> &'static str {
        match self {
            SsrError::ModuleLoad { .. } => "SSR_MODULE_LOAD",
            SsrError::DuplicateRegistration { .. } => "SSR_DUPLICATE_ELEMENT",
            SsrError::ComponentRender(_) => "SSR_COMPONENT_RENDER",
            SsrError::InvalidEventBinding { .. } => "SSR_EVENT_BINDING",
            SsrError::RuntimeFatal(_) => "SSR_RUNTIME_FATAL",
        }
    }

    pub fn fatal(context: &str, err: impl fmt::Display) -> Self {
        SsrError::RuntimeFatal(format!("{context}: {err}"))
    }
}

/// What a component's failure looked like from the script side.
#[derive(Debug, Clone)]
pub struct ComponentFailure {
    pub component: String,
    pub file: Option<PathBuf>,
    pub failure: ScriptFailure,
}

/// A JavaScript exception, flattened out of `deno_core`'s error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub message: String,
    /// `file:line:column` of the innermost frame that belongs to a module.
    pub location: Option<String>,
    pub stack: Option<String>,
}

impl ScriptFailure {
    pub fn from_error(err: &anyhow::Error) -> Self {
        let Some(js) = err.downcast_ref::<JsError>() else {
            return Self {
                message: err.to_string(),
                location: None,
                stack: None,
            };
        };

        let location = js
            .frames
            .iter()
            .find(|frame| {
                frame
                    .file_name
                    .as_deref()
                    .is_some_and(|name| name.starts_with("file://"))
            })
            .map(|frame| {
                let file = frame.file_name.as_deref().unwrap_or_default();
                let file = file.strip_prefix("file://").unwrap_or(file);
                match (frame.line_number, frame.column_number) {
                    (Some(line), Some(column)) => format!("{file}:{line}:{column}"),
                    (Some(line), None) => format!("{file}:{line}"),
                    _ => file.to_string(),
                }
            });

        let message = match (js.name.as_deref(), js.message.as_deref()) {
            (Some(name), Some(message)) if !message.is_empty() => format!("{name}: {message}"),
            (None, Some(message)) if !message.is_empty() => message.to_string(),
            _ => js.exception_message.clone(),
        };

        Self {
            message,
            location,
            stack: js.stack.clone(),
        }
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({location})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Log an error with its stable code and structured context.
pub fn report(err: &SsrError) {
    let code = err.code();
    match err {
        SsrError::ModuleLoad { path, reason } => {
            tracing::error!(code, file = %path.display(), reason = %reason, "{err}");
        }
        SsrError::DuplicateRegistration { tag, owner, origin } => {
            tracing::warn!(code, component = %tag, owner = %owner, origin = %origin, "{err}");
        }
        SsrError::ComponentRender(failure) => {
            tracing::error!(
                code,
                component = %failure.component,
                file = %display_path(failure.file.as_deref()),
                location = failure.failure.location.as_deref().unwrap_or("unknown"),
                stack = failure.failure.stack.as_deref().unwrap_or(""),
                "{err}"
            );
        }
        SsrError::InvalidEventBinding { element, .. } => {
            tracing::warn!(code, component = %element, "{err}");
        }
        SsrError::RuntimeFatal(_) => {
            tracing::error!(code, "{err}");
        }
    }
}

pub(crate) fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| String::from("<unknown>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = SsrError::ModuleLoad {
            path: PathBuf::from("/app/x.js"),
            reason: "missing".into(),
        };
        assert_eq!(err.code(), "SSR_MODULE_LOAD");
        assert_eq!(err.to_string(), "failed to load module '/app/x.js': missing");

        let err = SsrError::fatal("building realm", "isolate gone");
        assert_eq!(err.code(), "SSR_RUNTIME_FATAL");
        assert!(err.to_string().contains("building realm: isolate gone"));
    }

    #[test]
    fn test_plain_errors_become_script_failures() {
        let failure = ScriptFailure::from_error(&anyhow::anyhow!("not a js error"));
        assert_eq!(failure.message, "not a js error");
        assert!(failure.location.is_none());
        assert_eq!(failure.to_string(), "not a js error");
    }
}
