//! Component module loading.
//!
//! A module's source is rewritten into a plain script (see [`rewrite`]),
//! wrapped in a function that builds and returns its exports object, and run
//! once inside the script host. Results are memoized per absolute path for
//! the life of the host.

pub mod lexer;
pub mod rewrite;

use crate::error::{report, ScriptFailure, SsrError};
use crate::realm::ScriptHost;
use crate::resolve::{absolutize, PathResolver};
use deno_core::v8;
use rewrite::{ModuleSyntax, EXPORTS_OBJ, IMPORT_FN, META_OBJ, REEXPORT_FN};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub use lexer::TransformError;

/// The exports of one executed module file.
#[derive(Debug)]
pub struct ModuleRecord {
    path: PathBuf,
    exports: Option<v8::Global<v8::Value>>,
    export_names: Vec<String>,
    degraded: bool,
}

impl ModuleRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle to the exports object inside the isolate.
    pub fn exports(&self) -> Option<&v8::Global<v8::Value>> {
        self.exports.as_ref()
    }

    /// Names copied from tracked export declarations and export lists.
    pub fn export_names(&self) -> &[String] {
        &self.export_names
    }

    /// True when loading failed and the record stands for an empty object.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

enum Link {
    Ready(Rc<ModuleRecord>),
    Cycle,
}

pub struct ModuleLoader {
    resolver: PathResolver,
    cache: HashMap<PathBuf, Rc<ModuleRecord>>,
    in_progress: Vec<PathBuf>,
}

impl ModuleLoader {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Return the exports of `path`, executing the file first if this host
    /// has not run it yet. Never fails: broken modules yield an empty,
    /// degraded record.
    pub fn load(&mut self, host: &mut ScriptHost, path: &Path) -> Rc<ModuleRecord> {
        let path = absolutize(path);
        match self.load_resolved(host, &path) {
            Link::Ready(record) => record,
            // Only reachable through imports, never for a top-level load.
            Link::Cycle => Rc::new(ModuleRecord {
                path,
                exports: None,
                export_names: vec![],
                degraded: true,
            }),
        }
    }

    /// Load every path in order.
    pub fn load_all<'p>(
        &mut self,
        host: &mut ScriptHost,
        paths: impl IntoIterator<Item = &'p PathBuf>,
    ) -> Vec<Rc<ModuleRecord>> {
        paths.into_iter().map(|path| self.load(host, path)).collect()
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache.contains_key(&absolutize(path))
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn load_resolved(&mut self, host: &mut ScriptHost, path: &Path) -> Link {
        if let Some(record) = self.cache.get(path) {
            return Link::Ready(Rc::clone(record));
        }

        if self.in_progress.iter().any(|p| p == path) {
            tracing::warn!(
                code = "SSR_MODULE_CYCLE",
                file = %path.display(),
                importer = %self.in_progress.last().map(|p| p.display().to_string()).unwrap_or_default(),
                "Circular import; the importing module sees an empty object"
            );
            return Link::Cycle;
        }

        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                report(&SsrError::ModuleLoad {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
                // Not cached: the file may appear later.
                return Link::Ready(Rc::new(self.degraded_record(host, path)));
            }
        };

        let syntax = match rewrite::rewrite(&source) {
            Ok(syntax) => syntax,
            Err(err) => {
                report(&SsrError::ModuleLoad {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
                let record = Rc::new(self.degraded_record(host, path));
                self.cache.insert(path.to_path_buf(), Rc::clone(&record));
                return Link::Ready(record);
            }
        };

        let links = self.link_imports(host, path, &syntax);
        let code = wrap_module(path, &links, &syntax);

        host.set_executing_module(Some(path.to_path_buf()));
        let result = host.execute("<ssr-module>", code);
        host.set_executing_module(None);

        let record = match result {
            Ok(exports) => {
                tracing::debug!(file = %path.display(), exports = syntax.exports.len(), "Module executed");
                ModuleRecord {
                    path: path.to_path_buf(),
                    exports: Some(exports),
                    export_names: syntax.exports.into_iter().map(|b| b.exported).collect(),
                    degraded: false,
                }
            }
            Err(err) => {
                let failure = ScriptFailure::from_error(&err);
                report(&SsrError::ModuleLoad {
                    path: path.to_path_buf(),
                    reason: failure.to_string(),
                });
                if let Some(stack) = &failure.stack {
                    tracing::debug!(file = %path.display(), stack = %stack, "Module stack");
                }
                self.degraded_record(host, path)
            }
        };

        let record = Rc::new(record);
        self.cache.insert(path.to_path_buf(), Rc::clone(&record));
        Link::Ready(record)
    }

    /// Resolve and load each import of a module before it runs. The result
    /// maps specifiers to the paths the module's import function may see.
    fn link_imports(
        &mut self,
        host: &mut ScriptHost,
        path: &Path,
        syntax: &ModuleSyntax,
    ) -> BTreeMap<String, String> {
        self.in_progress.push(path.to_path_buf());
        let mut links = BTreeMap::new();
        for specifier in &syntax.imports {
            let Some(target) = self.resolver.resolve(path, specifier) else {
                tracing::warn!(
                    code = "SSR_MODULE_UNRESOLVED",
                    file = %path.display(),
                    specifier = %specifier,
                    "Import has no local module; it resolves to an empty object"
                );
                continue;
            };
            if let Link::Ready(_) = self.load_resolved(host, &target) {
                links.insert(specifier.clone(), path_key(&target));
            }
        }
        self.in_progress.pop();
        links
    }

    fn degraded_record(&self, host: &mut ScriptHost, path: &Path) -> ModuleRecord {
        let code = format!("globalThis.__ssr.degrade({})", quote(&path_key(path)));
        let exports = match host.execute("<ssr-module>", code) {
            Ok(exports) => Some(exports),
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err, "Could not create empty exports");
                None
            }
        };
        ModuleRecord {
            path: path.to_path_buf(),
            exports,
            export_names: vec![],
            degraded: true,
        }
    }
}

pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Wrap a rewritten module body into a self-executing script.
///
/// The prologue sits on the same line as the first body line so line numbers
/// in stack traces match the original file.
fn wrap_module(path: &Path, links: &BTreeMap<String, String>, syntax: &ModuleSyntax) -> String {
    let key = quote(&path_key(path));
    let url = format!("file://{}", path_key(path));
    let links: serde_json::Map<String, serde_json::Value> = links
        .iter()
        .map(|(specifier, target)| (specifier.clone(), serde_json::Value::from(target.as_str())))
        .collect();
    let links = serde_json::Value::Object(links);

    let copies: String = syntax
        .exports
        .iter()
        .map(|binding| format!(" {EXPORTS_OBJ}[{}] = {};", quote(&binding.exported), binding.local))
        .collect();

    format!(
        "(function () {{ \"use strict\"; \
         const {EXPORTS_OBJ} = {{}}; \
         const {IMPORT_FN} = globalThis.__ssr.importer({key}, {links}); \
         const {REEXPORT_FN} = globalThis.__ssr.reexport; \
         const {META_OBJ} = {{ url: {url_json} }}; \
         {body}\n;{copies}\nreturn globalThis.__ssr.publish({key}, {EXPORTS_OBJ});\n}})();\n//# sourceURL={url}",
        url_json = quote(&url),
        body = syntax.code,
    )
}
