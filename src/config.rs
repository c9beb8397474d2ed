//! Engine configuration.

use serde::Deserialize;
use std::path::PathBuf;

/// Which flavour of failure output the engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Inline diagnostics, render cache bypassed, invalid event bindings fatal.
    Development,
    /// Skeleton placeholders, diagnostics only in logs.
    #[default]
    Production,
}

impl Mode {
    /// Read the mode from `SSR_MODE` (`development`/`dev` or
    /// `production`/`prod`). Anything else yields the default.
    pub fn from_env() -> Self {
        match std::env::var("SSR_MODE").as_deref().map(str::trim) {
            Ok("development") | Ok("dev") => Mode::Development,
            Ok("production") | Ok("prod") => Mode::Production,
            _ => Mode::default(),
        }
    }

    pub fn is_development(self) -> bool {
        self == Mode::Development
    }
}

/// Lifetime of the script host that owns the module cache and the element
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// A fresh isolate, module cache and registry for every render call.
    #[default]
    PerRender,
    /// One isolate kept warm across render calls of the same `Renderer`.
    Shared,
}

/// Configuration for the render engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shared component modules preloaded before every render
    pub baseline_modules: Vec<PathBuf>,
    /// If set, relative imports may not resolve outside this directory
    pub module_root: Option<PathBuf>,
    pub mode: Mode,
    pub cache_policy: CachePolicy,
    /// Name of the designated server-render method on component classes
    pub render_method: String,
    /// Attribute name prefixes treated as event bindings (e.g. `on:click`)
    pub event_attribute_prefixes: Vec<String>,
    /// A component render slower than this is reported as slow
    pub slow_render_ms: u64,
    /// A component render slower than this is reported as very slow
    pub very_slow_render_ms: u64,
    /// Maximum V8 heap size in bytes (None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Script run in every realm after the shims, before any module
    pub globals_script: Option<String>,
    /// Entries kept by the default render cache
    pub render_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_modules: vec![],
            module_root: None,
            mode: Mode::default(),
            cache_policy: CachePolicy::default(),
            render_method: String::from("render"),
            event_attribute_prefixes: vec![String::from("on:"), String::from("@")],
            slow_render_ms: 50,
            very_slow_render_ms: 250,
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
            globals_script: None,
            render_cache_capacity: 512,
        }
    }
}

impl EngineConfig {
    pub fn development() -> Self {
        Self {
            mode: Mode::Development,
            ..Default::default()
        }
    }

    pub fn production() -> Self {
        Self {
            mode: Mode::Production,
            ..Default::default()
        }
    }

    pub(crate) fn is_event_attribute(&self, name: &str) -> bool {
        self.event_attribute_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
    }
}
