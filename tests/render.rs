use component_ssr::{
    CachePolicy, EngineConfig, Mode, PerfReport, PerformanceMonitor, ProfileHandle, Profiler, Renderer,
};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

const BADGE: &str = r#"
class MyBadge extends HTMLElement {
  connectedCallback() {
    const span = document.createElement("span");
    span.textContent = this.getAttribute("label");
    this.appendChild(span);
  }
}
customElements.define("my-badge", MyBadge);
"#;

fn component(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, source).unwrap();
    path
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn renderer(mode: Mode) -> Renderer {
    init_tracing();
    Renderer::new(EngineConfig {
        mode,
        ..Default::default()
    })
}

fn document(body: &str) -> String {
    format!("<!DOCTYPE html><html><head></head><body>{body}</body></html>")
}

#[tokio::test]
async fn test_badge_renders_its_label() {
    let dir = TempDir::new().unwrap();
    let badge = component(dir.path(), "my-badge.js", BADGE);

    let mut renderer = renderer(Mode::Development);
    let html = renderer
        .render(r#"<html><head></head><body><my-badge label="x"></my-badge></body></html>"#, &[badge.clone()])
        .await;
    let expected = r#"<!DOCTYPE html><html><head></head><body><my-badge label="x"><span>x</span></my-badge></body></html>"#;
    assert_eq!(html, expected);

    // The same element as a bare fragment
    let html = renderer.render(r#"<my-badge label="x"></my-badge>"#, &[badge]).await;
    assert_eq!(html, expected);
    let results = renderer.last_results();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].html, "<span>x</span>");
}

#[tokio::test]
async fn test_rendering_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let badge = component(dir.path(), "my-badge.js", BADGE);
    let input = r#"<main><my-badge label="a"></my-badge><my-badge label="b"></my-badge></main>"#;

    let mut renderer = renderer(Mode::Development);
    let first = renderer.render(input, &[badge.clone()]).await;
    let second = renderer.render(input, &[badge]).await;

    assert_eq!(first, second);
    assert_eq!(
        first,
        document(r#"<main><my-badge label="a"><span>a</span></my-badge><my-badge label="b"><span>b</span></my-badge></main>"#)
    );
}

#[tokio::test]
async fn test_plain_markup_round_trips() {
    let mut renderer = renderer(Mode::Development);
    let input = r#"<p title="say &quot;hi&quot; &amp; go">a &lt; b<br><img src="x.png" alt=""></p><hr><x-unknown>kept</x-unknown>"#;
    let html = renderer.render(input, &[]).await;

    assert_eq!(
        html,
        document(r#"<p title="say &quot;hi&quot; &amp; go">a &lt; b<br><img src="x.png" alt=""></p><hr><x-unknown>kept</x-unknown>"#)
    );
    assert!(renderer.last_results().is_empty());
}

#[tokio::test]
async fn test_document_shell_is_preserved() {
    let dir = TempDir::new().unwrap();
    let badge = component(dir.path(), "my-badge.js", BADGE);
    let input = r#"<!doctype html><html lang="en"><head><title>T</title></head><body class="page"><my-badge label="y"></my-badge></body></html>"#;

    let html = renderer(Mode::Development).render(input, &[badge]).await;

    assert_eq!(
        html,
        r#"<!DOCTYPE html><html lang="en"><head><title>T</title></head><body class="page"><my-badge label="y"><span>y</span></my-badge></body></html>"#
    );
}

#[tokio::test]
async fn test_first_definition_wins() {
    let dir = TempDir::new().unwrap();
    let first = component(
        dir.path(),
        "first.js",
        r#"customElements.define("dup-el", class extends HTMLElement {
          connectedCallback() { this.textContent = "first"; }
        });"#,
    );
    let second = component(
        dir.path(),
        "second.js",
        r#"customElements.define("dup-el", class extends HTMLElement {
          connectedCallback() { this.textContent = "second"; }
        });
        customElements.define("other-el", class extends HTMLElement {
          connectedCallback() { this.textContent = "other"; }
        });"#,
    );

    let html = renderer(Mode::Development)
        .render("<dup-el></dup-el><other-el></other-el>", &[first, second])
        .await;

    assert_eq!(html, document("<dup-el>first</dup-el><other-el>other</other-el>"));
}

#[tokio::test]
async fn test_failure_is_contained_to_its_element() {
    let dir = TempDir::new().unwrap();
    let components = component(
        dir.path(),
        "abc.js",
        r#"
        for (const tag of ["el-a", "el-c"]) {
          customElements.define(tag, class extends HTMLElement {
            connectedCallback() { this.innerHTML = `<b>${tag}</b>`; }
          });
        }
        customElements.define("el-b", class extends HTMLElement {
          connectedCallback() { throw new Error("boom"); }
        });
        "#,
    );
    let input = "<el-a></el-a><el-b><i>old</i></el-b><el-c></el-c>";

    let mut renderer = renderer(Mode::Production);
    let html = renderer.render(input, &[components]).await;

    assert_eq!(
        html,
        document(
            "<el-a><b>el-a</b></el-a>\
             <el-b><div class=\"ssr-skeleton\" data-component=\"el-b\" aria-busy=\"true\"></div></el-b>\
             <el-c><b>el-c</b></el-c>"
        )
    );
    let outcomes: Vec<_> = renderer
        .last_results()
        .iter()
        .map(|r| (r.tag.as_str(), r.success))
        .collect();
    assert_eq!(outcomes, vec![("el-a", true), ("el-b", false), ("el-c", true)]);
}

#[tokio::test]
async fn test_development_shows_diagnostic() {
    let dir = TempDir::new().unwrap();
    let bomb = component(
        dir.path(),
        "bomb.js",
        r#"customElements.define("x-bomb", class extends HTMLElement {
          connectedCallback() { throw new Error("boom <now>"); }
        });"#,
    );

    let html = renderer(Mode::Development)
        .render("<x-bomb></x-bomb>", &[bomb.clone()])
        .await;
    assert!(html.contains(r#"<div class="ssr-error" data-component="x-bomb" role="alert">"#), "{html}");
    assert!(html.contains("boom &lt;now&gt;"), "{html}");
    assert!(html.contains("bomb.js"), "{html}");

    let html = renderer(Mode::Production).render("<x-bomb></x-bomb>", &[bomb]).await;
    assert!(!html.contains("boom"), "{html}");
    assert!(!html.contains("bomb.js"), "{html}");
}

#[tokio::test]
async fn test_components_created_during_render_are_rendered() {
    let dir = TempDir::new().unwrap();
    let nested = component(
        dir.path(),
        "nested.js",
        r#"
        customElements.define("x-outer", class extends HTMLElement {
          connectedCallback() {
            const list = document.createElement("ul");
            for (const name of ["a", "b"]) {
              const li = document.createElement("li");
              const inner = document.createElement("x-inner");
              inner.setAttribute("name", name);
              li.append(inner);
              list.appendChild(li);
            }
            this.append(list);
          }
        });
        customElements.define("x-inner", class extends HTMLElement {
          connectedCallback() { this.textContent = this.getAttribute("name").toUpperCase(); }
        });
        "#,
    );

    let html = renderer(Mode::Development).render("<x-outer></x-outer>", &[nested]).await;

    assert_eq!(
        html,
        document(r#"<x-outer><ul><li><x-inner name="a">A</x-inner></li><li><x-inner name="b">B</x-inner></li></ul></x-outer>"#)
    );
}

#[tokio::test]
async fn test_server_render_method() {
    let dir = TempDir::new().unwrap();
    let card = component(
        dir.path(),
        "card.js",
        r#"customElements.define("my-card", class extends HTMLElement {
          render() { return `<h2>${this.dataset.title}</h2>`; }
        });
        customElements.define("my-inert", class extends HTMLElement {});"#,
    );

    let html = renderer(Mode::Development)
        .render(
            r#"<my-card data-title="Hello"></my-card><my-inert>x</my-inert><template><my-card data-title="no"></my-card></template>"#,
            &[card],
        )
        .await;

    assert_eq!(
        html,
        document(r#"<my-card data-title="Hello"><h2>Hello</h2></my-card><my-inert>x</my-inert><template><my-card data-title="no"></my-card></template>"#)
    );
}

#[tokio::test]
async fn test_realm_failure_returns_input() {
    let mut renderer = Renderer::new(EngineConfig {
        mode: Mode::Development,
        globals_script: Some("throw new Error('no globals');".into()),
        ..Default::default()
    });
    let input = "<my-badge label=\"x\"></my-badge>";

    assert_eq!(renderer.render(input, &[]).await, input);
}

#[tokio::test]
async fn test_globals_script_is_visible_to_components() {
    let dir = TempDir::new().unwrap();
    let hello = component(
        dir.path(),
        "hello.js",
        r#"customElements.define("x-hello", class extends HTMLElement {
          connectedCallback() { this.textContent = globalThis.SITE.name; }
        });"#,
    );
    let mut renderer = Renderer::new(EngineConfig {
        mode: Mode::Development,
        globals_script: Some("globalThis.SITE = { name: 'Docs' };".into()),
        ..Default::default()
    });

    let html = renderer.render("<x-hello></x-hello>", &[hello]).await;
    assert_eq!(html, document("<x-hello>Docs</x-hello>"));
}

#[tokio::test]
async fn test_event_bindings_by_mode() {
    let input = r#"<button on:click="alert(1)" @focus="form.focus">Go</button>"#;

    let html = renderer(Mode::Development).render(input, &[]).await;
    assert_eq!(html, input);

    let html = renderer(Mode::Production).render(input, &[]).await;
    assert_eq!(html, document(r#"<button @focus="form.focus">Go</button>"#));
}

#[tokio::test]
async fn test_production_render_cache() {
    let dir = TempDir::new().unwrap();
    let badge = component(dir.path(), "my-badge.js", BADGE);
    let input = r#"<my-badge label="x"></my-badge>"#;

    let mut renderer = renderer(Mode::Production);
    let first = renderer.render(input, &[badge.clone()]).await;
    assert_eq!(renderer.last_report().unwrap().cache_hits, 0);

    let second = renderer.render(input, &[badge]).await;
    assert_eq!(first, second);
    let report = renderer.last_report().unwrap();
    assert_eq!(report.components, 1);
    assert_eq!(report.cache_hits, 1);
    assert!(renderer.last_results()[0].from_cache);
}

#[tokio::test]
async fn test_shared_policy_keeps_modules_warm() {
    let dir = TempDir::new().unwrap();
    let counter = component(
        dir.path(),
        "counter.js",
        r#"globalThis.__loads = (globalThis.__loads ?? 0) + 1;
        customElements.define("x-count", class extends HTMLElement {
          connectedCallback() { this.textContent = String(globalThis.__loads); }
        });"#,
    );
    let mut renderer = Renderer::new(EngineConfig {
        mode: Mode::Development,
        cache_policy: CachePolicy::Shared,
        ..Default::default()
    });

    let first = renderer.render("<x-count></x-count>", &[counter.clone()]).await;
    let second = renderer.render("<x-count></x-count><p>more</p>", &[counter]).await;

    assert_eq!(first, document("<x-count>1</x-count>"));
    assert_eq!(second, document("<x-count>1</x-count><p>more</p>"));
}

#[tokio::test]
async fn test_cached_render_restores_host_attributes() {
    let dir = TempDir::new().unwrap();
    let status = component(
        dir.path(),
        "status.js",
        r#"customElements.define("x-status", class extends HTMLElement {
          connectedCallback() {
            this.setAttribute("role", "status");
            this.classList.add("ready");
            this.textContent = this.getAttribute("label");
          }
        });"#,
    );
    let input = r#"<x-status label="x"></x-status>"#;

    let mut renderer = renderer(Mode::Production);
    let first = renderer.render(input, &[status.clone()]).await;
    let second = renderer.render(input, &[status]).await;

    assert_eq!(first, document(r#"<x-status label="x" role="status" class="ready">x</x-status>"#));
    assert_eq!(second, first);
    assert!(renderer.last_results()[0].from_cache);
}

#[tokio::test]
async fn test_shared_host_keeps_module_level_nodes() {
    let dir = TempDir::new().unwrap();
    let stamped = component(
        dir.path(),
        "stamped.js",
        r#"const tpl = document.createElement("template");
        tpl.innerHTML = "<b>T</b>";
        customElements.define("x-t", class extends HTMLElement {
          connectedCallback() { this.appendChild(tpl.content.cloneNode(true)); }
        });"#,
    );
    let mut renderer = Renderer::new(EngineConfig {
        mode: Mode::Development,
        cache_policy: CachePolicy::Shared,
        ..Default::default()
    });

    let first = renderer.render("<p>a</p><x-t></x-t>", &[stamped.clone()]).await;
    let second = renderer.render("<p>a</p><x-t></x-t>", &[stamped.clone()]).await;
    let third = renderer.render("<x-t></x-t><x-t></x-t>", &[stamped]).await;

    assert_eq!(first, document("<p>a</p><x-t><b>T</b></x-t>"));
    assert_eq!(second, first);
    assert_eq!(third, document("<x-t><b>T</b></x-t><x-t><b>T</b></x-t>"));
}

#[derive(Default)]
struct Recorded {
    samples: Vec<(String, Option<PathBuf>)>,
    profiled: Vec<String>,
}

struct RecordingMonitor(Rc<RefCell<Recorded>>);

impl PerformanceMonitor for RecordingMonitor {
    fn start_session(&mut self) {}

    fn record(&mut self, component: &str, _elapsed: Duration, file: Option<&Path>, _from_cache: bool) {
        self.0
            .borrow_mut()
            .samples
            .push((component.to_string(), file.map(Path::to_path_buf)));
    }

    fn end_session(&mut self) -> PerfReport {
        PerfReport::default()
    }
}

struct RecordingProfiler(Rc<RefCell<Recorded>>);

impl Profiler for RecordingProfiler {
    fn start(&mut self, component: &str) -> ProfileHandle {
        ProfileHandle::new(component)
    }

    fn end(&mut self, handle: ProfileHandle) {
        self.0.borrow_mut().profiled.push(handle.component);
    }
}

#[tokio::test]
async fn test_collaborators_see_component_and_file() {
    let dir = TempDir::new().unwrap();
    let badge = component(dir.path(), "my-badge.js", BADGE);
    let recorded = Rc::new(RefCell::new(Recorded::default()));

    let mut renderer = renderer(Mode::Development)
        .with_monitor(RecordingMonitor(Rc::clone(&recorded)))
        .with_profiler(RecordingProfiler(Rc::clone(&recorded)));
    renderer.render(r#"<my-badge label="x"></my-badge>"#, &[badge.clone()]).await;

    let recorded = recorded.borrow();
    let expected_file = badge.canonicalize().unwrap();
    assert_eq!(recorded.samples, vec![("my-badge".to_string(), Some(expected_file))]);
    assert_eq!(recorded.profiled, vec!["my-badge".to_string()]);
}
