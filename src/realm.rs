//! Script host and DOM realm construction.
//!
//! A [`ScriptHost`] owns one V8 isolate with the `ssr_realm` extension
//! loaded. The element registry guard and the current document live in its
//! `OpState`. A realm is a fresh tree in that [`Document`] plus the realm script's
//! globals rebound to it; a host can build any number of realms in turn.

use crate::config::EngineConfig;
use crate::dom::{Document, NodeId};
use crate::error::{ScriptFailure, SsrError};
use crate::ops::ssr_realm;
use crate::registry::RegistryGuard;
use anyhow::Error;
use deno_core::{v8, JsRuntime, RuntimeOptions};
use std::path::PathBuf;

/// Absolute path of the module whose top level is currently running.
#[derive(Debug, Default, Clone)]
pub struct ExecutingModule(pub Option<PathBuf>);

/// What the realm did with an element during the render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// `connectedCallback` ran
    Connected,
    /// The server-render method ran
    Rendered,
    /// The element had neither
    Skipped,
}

pub struct ScriptHost {
    runtime: JsRuntime,
    realms_built: usize,
}

impl ScriptHost {
    pub fn new(config: &EngineConfig) -> Result<Self, SsrError> {
        // Configure V8 heap limits if specified
        let create_params = config
            .max_heap_size
            .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![ssr_realm::init_ops_and_esm()],
            create_params,
            ..Default::default()
        });

        if config.max_heap_size.is_some() {
            runtime.add_near_heap_limit_callback(|current, initial| {
                // Keep the limit: V8 terminates instead of growing
                tracing::error!(
                    code = "SSR_RUNTIME_FATAL",
                    current_mb = current / (1024 * 1024),
                    initial_mb = initial / (1024 * 1024),
                    "Script heap is near its limit"
                );
                current
            });
        }

        {
            let state = runtime.op_state();
            let mut state = state.borrow_mut();
            state.put(Document::new());
            state.put(RegistryGuard::new());
            state.put(ExecutingModule::default());
        }

        let mut host = Self {
            runtime,
            realms_built: 0,
        };
        let options = serde_json::json!({ "renderMethod": config.render_method });
        host.execute("<ssr-configure>", format!("globalThis.__ssr.configure({options})"))
            .map_err(|e| SsrError::fatal("configuring script host", ScriptFailure::from_error(&e)))?;
        Ok(host)
    }

    /// Start an empty document tree, rebind `document` and the browser shims
    /// to it, then run the configured globals script.
    ///
    /// The tree lives in the same arena as earlier realms, so nodes that
    /// module-level code created in a previous realm keep their ids.
    pub fn build_realm(&mut self, config: &EngineConfig) -> Result<(), SsrError> {
        let ids = self.with_document(|doc| {
            doc.new_tree();
            [doc.root(), doc.html(), doc.head(), doc.body()].map(NodeId::raw)
        });

        self.execute(
            "<ssr-realm>",
            format!(
                "globalThis.__ssr.installRealm({}, {}, {}, {})",
                ids[0], ids[1], ids[2], ids[3]
            ),
        )
        .map_err(|e| SsrError::fatal("installing realm globals", ScriptFailure::from_error(&e)))?;

        if let Some(script) = &config.globals_script {
            self.execute("<ssr-globals>", script.clone())
                .map_err(|e| SsrError::fatal("running globals script", ScriptFailure::from_error(&e)))?;
        }

        self.realms_built += 1;
        tracing::debug!(realm = self.realms_built, "Realm built");
        Ok(())
    }

    /// Number of realms this host has built so far.
    pub fn realms_built(&self) -> usize {
        self.realms_built
    }

    pub fn execute(&mut self, name: &'static str, code: String) -> Result<v8::Global<v8::Value>, Error> {
        self.runtime.execute_script(name, code)
    }

    /// Run `code` and convert its completion value to a string.
    pub fn eval_string(&mut self, name: &'static str, code: String) -> Result<String, Error> {
        let value = self.execute(name, code)?;
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, &value);
        Ok(local.to_rust_string_lossy(scope))
    }

    pub fn set_executing_module(&mut self, path: Option<PathBuf>) {
        self.runtime.op_state().borrow_mut().put(ExecutingModule(path));
    }

    /// Run the server lifecycle of one element: upgrade, observed attribute
    /// callbacks, then `connectedCallback` or the server-render method.
    pub fn connect(&mut self, node: NodeId) -> Result<ConnectOutcome, Error> {
        let outcome = self.eval_string("<ssr-connect>", format!("globalThis.__ssr.connect({})", node.raw()))?;
        Ok(match outcome.as_str() {
            "connected" => ConnectOutcome::Connected,
            "rendered" => ConnectOutcome::Rendered,
            _ => ConnectOutcome::Skipped,
        })
    }

    pub fn with_document<R>(&mut self, f: impl FnOnce(&mut Document) -> R) -> R {
        let state = self.runtime.op_state();
        let mut state = state.borrow_mut();
        f(state.borrow_mut::<Document>())
    }

    pub fn with_registry<R>(&mut self, f: impl FnOnce(&RegistryGuard) -> R) -> R {
        let state = self.runtime.op_state();
        let state = state.borrow();
        f(state.borrow::<RegistryGuard>())
    }

    /// Read the document and the registry together.
    pub fn inspect<R>(&mut self, f: impl FnOnce(&Document, &RegistryGuard) -> R) -> R {
        let state = self.runtime.op_state();
        let state = state.borrow();
        f(state.borrow::<Document>(), state.borrow::<RegistryGuard>())
    }
}
