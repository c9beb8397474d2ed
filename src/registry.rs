//! Guard in front of custom-element registration.
//!
//! The realm's `customElements.define` asks [`RegistryGuard::define`] before
//! delegating to the native registry. Duplicate tags are logged and skipped,
//! never thrown, so a double import cannot abort a render.

use crate::error::{display_path, report, SsrError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Names the HTML spec reserves even though they contain a hyphen.
const RESERVED_NAMES: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

/// What a component class can do during a server render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Has the designated server-render method
    pub render: bool,
    /// Has `connectedCallback`
    pub connect: bool,
}

impl Capabilities {
    pub fn renders_on_server(&self) -> bool {
        self.render || self.connect
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredElement {
    pub tag: String,
    /// Module that defined the tag, if it was defined during a module load
    pub file: Option<PathBuf>,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Accepted,
    Duplicate { owner: Option<PathBuf> },
    InvalidName,
}

impl Registration {
    /// Verdict string handed back to the realm script.
    pub fn as_str(&self) -> &'static str {
        match self {
            Registration::Accepted => "accepted",
            Registration::Duplicate { .. } => "duplicate",
            Registration::InvalidName => "invalid",
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistryGuard {
    elements: HashMap<String, RegisteredElement>,
}

impl RegistryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `tag` may be registered. First writer wins.
    pub fn define(&mut self, tag: &str, file: Option<&Path>, capabilities: Capabilities) -> Registration {
        if !is_valid_custom_element_name(tag) {
            tracing::warn!(component = tag, file = %display_path(file), "Invalid custom element name");
            return Registration::InvalidName;
        }

        if let Some(existing) = self.elements.get(tag) {
            report(&SsrError::DuplicateRegistration {
                tag: tag.to_string(),
                owner: display_path(existing.file.as_deref()),
                origin: display_path(file),
            });
            return Registration::Duplicate {
                owner: existing.file.clone(),
            };
        }

        if !capabilities.renders_on_server() {
            tracing::warn!(
                component = tag,
                file = %display_path(file),
                "Component has neither a server-render method nor connectedCallback; it will not render on the server"
            );
        }

        self.elements.insert(
            tag.to_string(),
            RegisteredElement {
                tag: tag.to_string(),
                file: file.map(Path::to_path_buf),
                capabilities,
            },
        );
        tracing::debug!(component = tag, file = %display_path(file), "Custom element registered");
        Registration::Accepted
    }

    pub fn get(&self, tag: &str) -> Option<&RegisteredElement> {
        self.elements.get(tag)
    }

    pub fn owner(&self, tag: &str) -> Option<&Path> {
        self.elements.get(tag).and_then(|e| e.file.as_deref())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Valid custom element name: starts with a lowercase ASCII letter, contains
/// a hyphen, has no ASCII uppercase, and is not reserved.
pub fn is_valid_custom_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_lower = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    starts_lower
        && name.contains('-')
        && !name.chars().any(|c| c.is_ascii_uppercase() || c.is_ascii_whitespace() || matches!(c, '/' | '>' | '<' | '"' | '\'' | '='))
        && !RESERVED_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECT: Capabilities = Capabilities {
        render: false,
        connect: true,
    };

    #[test]
    fn test_first_writer_wins() {
        let mut guard = RegistryGuard::new();
        let first = Path::new("/app/badge.js");
        let second = Path::new("/app/other.js");

        assert_eq!(guard.define("my-badge", Some(first), CONNECT), Registration::Accepted);
        assert_eq!(
            guard.define("my-badge", Some(second), Capabilities::default()),
            Registration::Duplicate {
                owner: Some(first.to_path_buf())
            }
        );
        assert_eq!(guard.owner("my-badge"), Some(first));
        assert_eq!(guard.get("my-badge").unwrap().capabilities, CONNECT);
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_component_without_render_hooks_is_still_registered() {
        let mut guard = RegistryGuard::new();
        assert_eq!(guard.define("x-inert", None, Capabilities::default()), Registration::Accepted);
        assert!(!guard.get("x-inert").unwrap().capabilities.renders_on_server());
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_custom_element_name("my-badge"));
        assert!(is_valid_custom_element_name("x-1"));
        assert!(is_valid_custom_element_name("math-α"));
        assert!(!is_valid_custom_element_name("badge"));
        assert!(!is_valid_custom_element_name("My-badge"));
        assert!(!is_valid_custom_element_name("my-Badge"));
        assert!(!is_valid_custom_element_name("1-badge"));
        assert!(!is_valid_custom_element_name("font-face"));

        let mut guard = RegistryGuard::new();
        assert_eq!(guard.define("nohyphen", None, CONNECT), Registration::InvalidName);
        assert!(guard.is_empty());
    }
}
