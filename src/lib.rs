//! # Component SSR
//!
//! Server-side rendering of custom elements inside an embedded V8 isolate.
//!
//! Component modules are plain browser ES modules. They are rewritten into
//! scripts, executed once per isolate, and register their elements through
//! a guarded `customElements` registry. Each render builds a fresh DOM realm
//! backed by a Rust document, injects the input markup, runs every
//! server-renderable element in document order and serializes the result.
//!
//! ## Guarantees
//!
//! - **Total**: `render` always returns HTML. A failing element gets fallback
//!   markup; a broken realm returns the input unchanged.
//! - **Isolated**: one element's failure never affects its siblings.
//! - **First definition wins**: a tag claimed by one module file cannot be
//!   taken over by another.
//! - **Confined**: with `module_root` set, imports never resolve outside it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use component_ssr::{EngineConfig, Renderer};
//! use std::path::PathBuf;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut renderer = Renderer::new(EngineConfig::development());
//!     let html = renderer
//!         .render(
//!             r#"<my-badge label="x"></my-badge>"#,
//!             &[PathBuf::from("./components/my-badge.js")],
//!         )
//!         .await;
//!     println!("{html}");
//! }
//! ```

pub mod collab;
pub mod config;
pub mod dom;
pub mod error;
pub mod fallback;
pub mod markup;
pub mod module;
pub mod monitor;
mod ops;
pub mod realm;
pub mod registry;
pub mod render;
pub mod resolve;

pub use collab::{
    CachedRender, EventContext, EventValidator, IdentifierPathValidator, MemoryRenderCache,
    NoopProfiler, PassthroughSanitizer, ProfileHandle, Profiler, RenderCache, RenderKey, Sanitizer,
    Validation,
};
pub use config::{CachePolicy, EngineConfig, Mode};
pub use error::{ComponentFailure, ScriptFailure, SsrError};
pub use module::{ModuleLoader, ModuleRecord};
pub use monitor::{PerfReport, PerformanceMonitor, SessionMonitor};
pub use realm::{ConnectOutcome, ScriptHost};
pub use registry::{Capabilities, RegistryGuard};
pub use render::{ComponentRenderResult, Renderer};
pub use resolve::PathResolver;
