//! The render driver.
//!
//! One call to [`Renderer::render`] builds a realm, preloads component
//! modules, injects the input markup, runs every server-renderable custom
//! element in document order and serializes the result. It never fails:
//! element failures are replaced in place, and anything that breaks the
//! realm itself falls back to the unmodified input.

use crate::collab::{
    CachedRender, EventContext, EventValidator, IdentifierPathValidator, MemoryRenderCache,
    NoopProfiler, PassthroughSanitizer, Profiler, RenderCache, RenderKey, Sanitizer, Validation,
};
use crate::config::{CachePolicy, EngineConfig};
use crate::dom::parse::{parse_fragment, shell_attributes};
use crate::dom::serialize::serialize_document;
use crate::dom::{Document, DomError, NodeId};
use crate::error::{report, ComponentFailure, ScriptFailure, SsrError};
use crate::fallback::failure_markup;
use crate::markup::split_document;
use crate::module::ModuleLoader;
use crate::monitor::{PerfReport, PerformanceMonitor, SessionMonitor};
use crate::realm::ScriptHost;
use crate::resolve::PathResolver;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Outcome for one custom element in the render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRenderResult {
    pub tag: String,
    pub success: bool,
    /// Inner HTML of the element after the pass visited it
    pub html: String,
    pub duration: Duration,
    pub from_cache: bool,
}

/// An isolate together with the modules it has executed.
struct Host {
    script: ScriptHost,
    modules: ModuleLoader,
}

pub struct Renderer {
    config: EngineConfig,
    resolver: PathResolver,
    warm: Option<Host>,
    sanitizer: Box<dyn Sanitizer>,
    validator: Box<dyn EventValidator>,
    cache: Box<dyn RenderCache>,
    profiler: Box<dyn Profiler>,
    monitor: Box<dyn PerformanceMonitor>,
    last_report: Option<PerfReport>,
    last_results: Vec<ComponentRenderResult>,
}

impl Renderer {
    pub fn new(config: EngineConfig) -> Self {
        let resolver = match &config.module_root {
            Some(root) => PathResolver::confined_to(root),
            None => PathResolver::new(),
        };
        Self {
            resolver,
            warm: None,
            sanitizer: Box::new(PassthroughSanitizer),
            validator: Box::new(IdentifierPathValidator),
            cache: Box::new(MemoryRenderCache::new(config.render_cache_capacity)),
            profiler: Box::new(NoopProfiler),
            monitor: Box::new(SessionMonitor::new(config.slow_render_ms, config.very_slow_render_ms)),
            last_report: None,
            last_results: Vec::new(),
            config,
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: impl Sanitizer + 'static) -> Self {
        self.sanitizer = Box::new(sanitizer);
        self
    }

    pub fn with_event_validator(mut self, validator: impl EventValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_render_cache(mut self, cache: impl RenderCache + 'static) -> Self {
        self.cache = Box::new(cache);
        self
    }

    pub fn with_profiler(mut self, profiler: impl Profiler + 'static) -> Self {
        self.profiler = Box::new(profiler);
        self
    }

    pub fn with_monitor(mut self, monitor: impl PerformanceMonitor + 'static) -> Self {
        self.monitor = Box::new(monitor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Timings of the most recent render call.
    pub fn last_report(&self) -> Option<&PerfReport> {
        self.last_report.as_ref()
    }

    /// Per-element outcomes of the most recent render call.
    pub fn last_results(&self) -> &[ComponentRenderResult] {
        &self.last_results
    }

    /// Render `input` (a document or a fragment) after loading the baseline
    /// modules and `preload`. Always returns HTML; on a realm-level failure
    /// that HTML is `input` itself.
    pub async fn render(&mut self, input: &str, preload: &[PathBuf]) -> String {
        self.monitor.start_session();
        self.last_results.clear();

        let output = match self.render_document(input, preload) {
            Ok(html) => html,
            Err(err) => {
                report(&err);
                input.to_string()
            }
        };

        let report = self.monitor.end_session();
        tracing::info!(
            components = report.components,
            cache_hits = report.cache_hits,
            average_ms = report.average_ms,
            slow = report.slow,
            very_slow = report.very_slow,
            slowest = report.slowest.as_ref().map(|(tag, _)| tag.as_str()).unwrap_or(""),
            "Render session finished"
        );
        self.last_report = Some(report);
        output
    }

    fn render_document(&mut self, input: &str, preload: &[PathBuf]) -> Result<String, SsrError> {
        let mut host = match self.warm.take() {
            Some(host) => host,
            None => Host {
                script: ScriptHost::new(&self.config)?,
                modules: ModuleLoader::new(self.resolver.clone()),
            },
        };

        let result = self.render_in(&mut host, input, preload);

        if self.config.cache_policy == CachePolicy::Shared {
            self.warm = Some(host);
        }
        result
    }

    fn render_in(&mut self, host: &mut Host, input: &str, preload: &[PathBuf]) -> Result<String, SsrError> {
        host.script.build_realm(&self.config)?;

        let modules = self.config.baseline_modules.iter().chain(preload);
        host.modules.load_all(&mut host.script, modules);

        self.inject(&mut host.script, input)?;
        self.render_pass(&mut host.script);

        Ok(host.script.with_document(|doc| serialize_document(doc)))
    }

    /// Split, sanitize, parse and validate the input, then attach it to the
    /// realm document.
    fn inject(&self, script: &mut ScriptHost, input: &str) -> Result<(), SsrError> {
        let parts = split_document(input);
        let shell = match (parts.html_tag, parts.body_tag) {
            (None, None) => None,
            (html, body) => Some(
                shell_attributes(html.unwrap_or("<html>"), body.unwrap_or("<body>"))
                    .map_err(|e| SsrError::fatal("parsing document shell", e))?,
            ),
        };
        let head = self.sanitizer.sanitize(parts.head);
        let body = self.sanitizer.sanitize(parts.body);

        script.with_document(|doc| {
            let head_nodes = parse_fragment(doc, &head).map_err(|e| SsrError::fatal("parsing head", e))?;
            let body_nodes = parse_fragment(doc, &body).map_err(|e| SsrError::fatal("parsing body", e))?;
            self.validate_event_bindings(doc, head_nodes.iter().chain(&body_nodes))?;

            let attach = |doc: &mut Document| -> Result<(), DomError> {
                if let Some((html_attrs, body_attrs)) = &shell {
                    for attr in html_attrs {
                        doc.set_attribute(doc.html(), &attr.name, &attr.value)?;
                    }
                    for attr in body_attrs {
                        doc.set_attribute(doc.body(), &attr.name, &attr.value)?;
                    }
                }
                for &node in &head_nodes {
                    doc.append_child(doc.head(), node)?;
                }
                for &node in &body_nodes {
                    doc.append_child(doc.body(), node)?;
                }
                Ok(())
            };
            attach(doc).map_err(|e| SsrError::fatal("attaching document", e))
        })
    }

    /// Development: the first invalid binding is fatal. Production: invalid
    /// bindings are logged and removed.
    fn validate_event_bindings<'a>(
        &self,
        doc: &mut Document,
        roots: impl Iterator<Item = &'a NodeId>,
    ) -> Result<(), SsrError> {
        let mut rejected = Vec::new();
        for &root in roots {
            let subtree = std::iter::once(root).chain(doc.descendants(root));
            for node in subtree {
                let Some(tag) = doc.tag_name(node) else {
                    continue;
                };
                for attr in doc.attributes(node) {
                    if !self.config.is_event_attribute(&attr.name) {
                        continue;
                    }
                    let context = EventContext { element: tag };
                    if let Validation::Invalid(reason) = self.validator.validate(&attr.name, &attr.value, &context) {
                        let err = SsrError::InvalidEventBinding {
                            attribute: attr.name.clone(),
                            value: attr.value.clone(),
                            element: tag.to_string(),
                            reason,
                        };
                        if self.config.mode.is_development() {
                            return Err(err);
                        }
                        report(&err);
                        rejected.push((node, attr.name.clone()));
                    }
                }
            }
        }
        for (node, name) in rejected {
            doc.remove_attribute(node, &name)
                .map_err(|e| SsrError::fatal("removing event binding", e))?;
        }
        Ok(())
    }

    fn render_pass(&mut self, script: &mut ScriptHost) {
        let production = !self.config.mode.is_development();
        let mut processed = HashSet::new();
        let mut failed = Vec::new();
        let mut rendered = Vec::new();
        let mut cursor = Cursor::Start;

        while let Some((node, tag)) = next_candidate(script, cursor, &processed) {
            processed.insert(node);
            cursor = Cursor::Into(node);
            let (key, file) = script.inspect(|doc, registry| {
                (
                    RenderKey::new(&tag, doc.attributes(node)),
                    registry.owner(&tag).map(Path::to_path_buf),
                )
            });

            if production {
                if let Some(cached) = self.cache.get(&key) {
                    let started = Instant::now();
                    let restored = script.with_document(|doc| {
                        doc.replace_attributes(node, cached.attributes)?;
                        doc.set_inner_html(node, &cached.html)?;
                        // Cached markup is already rendered
                        processed.extend(doc.descendants(node));
                        Ok::<_, DomError>(())
                    });
                    if let Err(err) = restored {
                        tracing::warn!(component = %tag, error = %err, "Could not restore cached render");
                    }
                    cursor = Cursor::Past(node);
                    self.finish(&tag, file.as_deref(), cached.html, true, true, started.elapsed());
                    continue;
                }
            }

            let handle = self.profiler.start(&tag);
            let started = Instant::now();
            let outcome = script.connect(node);
            let elapsed = started.elapsed();
            self.profiler.end(handle);

            match outcome {
                Ok(outcome) => {
                    tracing::trace!(component = %tag, ?outcome, "Component rendered");
                    rendered.push((node, key));
                    let html = script.with_document(|doc| doc.inner_html(node));
                    self.finish(&tag, file.as_deref(), html, true, false, elapsed);
                }
                Err(err) => {
                    let failure = ComponentFailure {
                        component: tag.clone(),
                        file: file.clone(),
                        failure: ScriptFailure::from_error(&err),
                    };
                    let markup = failure_markup(self.config.mode, &failure);
                    report(&SsrError::ComponentRender(Box::new(failure)));
                    if let Err(err) = script.with_document(|doc| doc.set_inner_html(node, &markup)) {
                        tracing::error!(component = %tag, error = %err, "Could not insert fallback markup");
                    }
                    failed.push(node);
                    self.finish(&tag, file.as_deref(), markup, false, false, elapsed);
                }
            }
        }

        // Cache the final state, which includes nested components, but never
        // a subtree that holds a failure.
        if production {
            for (node, key) in rendered {
                let render = script.with_document(|doc| {
                    let clean = !failed.iter().any(|&f| doc.is_inclusive_ancestor(node, f));
                    clean.then(|| CachedRender {
                        attributes: doc.attributes(node).to_vec(),
                        html: doc.inner_html(node),
                    })
                });
                if let Some(render) = render {
                    self.cache.set(key, render);
                }
            }
        }
    }

    fn finish(
        &mut self,
        tag: &str,
        file: Option<&Path>,
        html: String,
        success: bool,
        from_cache: bool,
        duration: Duration,
    ) {
        self.monitor.record(tag, duration, file, from_cache);
        self.last_results.push(ComponentRenderResult {
            tag: tag.to_string(),
            success,
            html,
            duration,
            from_cache,
        });
    }
}

/// Where the scan for the next element resumes.
#[derive(Debug, Clone, Copy)]
enum Cursor {
    Start,
    /// After this element, entering its children
    Into(NodeId),
    /// After this element's subtree
    Past(NodeId),
}

/// The next unvisited custom element in document order whose registration
/// can render on the server. Elements a component inserted after itself are
/// found; if the last element was detached, the scan restarts from the root.
fn next_candidate(script: &mut ScriptHost, cursor: Cursor, processed: &HashSet<NodeId>) -> Option<(NodeId, String)> {
    script.inspect(|doc, registry| {
        let mut current = match cursor {
            Cursor::Into(node) if doc.is_connected(node) => next_in_order(doc, node, true),
            Cursor::Past(node) if doc.is_connected(node) => next_in_order(doc, node, false),
            _ => Some(doc.root()),
        };
        while let Some(id) = current {
            if let Some(tag) = doc.tag_name(id) {
                let renders = tag.contains('-')
                    && !processed.contains(&id)
                    && registry.get(tag).is_some_and(|e| e.capabilities.renders_on_server());
                if renders {
                    return Some((id, tag.to_string()));
                }
            }
            current = next_in_order(doc, id, !is_inert_template(doc, id));
        }
        None
    })
}

/// The node after `id` in a pre-order walk of the current document.
fn next_in_order(doc: &Document, id: NodeId, descend: bool) -> Option<NodeId> {
    if descend {
        if let Some(&first) = doc.children(id).first() {
            return Some(first);
        }
    }
    let mut current = id;
    loop {
        if let Some(next) = doc.sibling(current, 1) {
            return Some(next);
        }
        current = doc.parent(current)?;
    }
}

/// `<template>` content is inert unless it is a declarative shadow root.
fn is_inert_template(doc: &Document, id: NodeId) -> bool {
    doc.tag_name(id) == Some("template") && doc.get_attribute(id, "shadowrootmode").is_none()
}
