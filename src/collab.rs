//! Collaborators the render driver calls out to.
//!
//! Each has a trait and a small default implementation; hosts plug in
//! their own through the `Renderer` builder methods.

use crate::dom::Attribute;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

// ============================================================================
// Sanitizer
// ============================================================================

pub trait Sanitizer {
    /// Clean an HTML fragment before it is parsed into the realm.
    fn sanitize(&self, html: &str) -> String;
}

/// Returns its input unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
    fn sanitize(&self, html: &str) -> String {
        html.to_string()
    }
}

// ============================================================================
// Event binding validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(String),
}

/// Where an event-binding attribute was found.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub element: &'a str,
}

pub trait EventValidator {
    fn validate(&self, attribute: &str, value: &str, context: &EventContext<'_>) -> Validation;
}

/// Accepts a dotted identifier path, optionally called with no arguments:
/// `save`, `this.save`, `cart.items.add()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifierPathValidator;

impl EventValidator for IdentifierPathValidator {
    fn validate(&self, _attribute: &str, value: &str, _context: &EventContext<'_>) -> Validation {
        let path = value.trim();
        let path = path.strip_suffix("()").unwrap_or(path);
        if path.is_empty() {
            return Validation::Invalid("handler is empty".into());
        }
        let valid = path.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        });
        if valid {
            Validation::Valid
        } else {
            Validation::Invalid(format!("'{path}' is not a handler reference"))
        }
    }
}

// ============================================================================
// Render cache
// ============================================================================

/// Identity of one rendered element: its tag and its attributes as a JSON
/// object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub tag: String,
    pub attributes: String,
}

impl RenderKey {
    pub fn new(tag: &str, attributes: &[Attribute]) -> Self {
        let mut sorted: Vec<&Attribute> = attributes.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let object: serde_json::Map<String, serde_json::Value> = sorted
            .into_iter()
            .map(|a| (a.name.clone(), serde_json::Value::from(a.value.as_str())))
            .collect();
        Self {
            tag: tag.to_string(),
            attributes: serde_json::Value::Object(object).to_string(),
        }
    }
}

/// What a render leaves on its host element: the final attribute list and
/// the children as markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRender {
    pub attributes: Vec<Attribute>,
    pub html: String,
}

pub trait RenderCache {
    fn get(&mut self, key: &RenderKey) -> Option<CachedRender>;
    fn set(&mut self, key: RenderKey, render: CachedRender);
}

/// In-memory LRU cache of rendered elements.
pub struct MemoryRenderCache {
    entries: LruCache<RenderKey, CachedRender>,
}

impl MemoryRenderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RenderCache for MemoryRenderCache {
    fn get(&mut self, key: &RenderKey) -> Option<CachedRender> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: RenderKey, render: CachedRender) {
        self.entries.put(key, render);
    }
}

// ============================================================================
// Profiler
// ============================================================================

/// An in-flight measurement returned by [`Profiler::start`].
#[derive(Debug, Clone)]
pub struct ProfileHandle {
    pub component: String,
    started: Instant,
}

impl ProfileHandle {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

pub trait Profiler {
    fn start(&mut self, component: &str) -> ProfileHandle;
    fn end(&mut self, handle: ProfileHandle);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn start(&mut self, component: &str) -> ProfileHandle {
        ProfileHandle::new(component)
    }

    fn end(&mut self, _handle: ProfileHandle) {}
}
