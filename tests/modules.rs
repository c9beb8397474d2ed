use component_ssr::{EngineConfig, ModuleLoader, PathResolver, ScriptHost};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, source).unwrap();
    path
}

fn host() -> ScriptHost {
    let config = EngineConfig::development();
    let mut host = ScriptHost::new(&config).unwrap();
    host.build_realm(&config).unwrap();
    host
}

fn eval(host: &mut ScriptHost, code: &str) -> String {
    host.eval_string("<test>", code.to_string()).unwrap()
}

#[test]
fn test_module_runs_once_per_host() {
    let dir = TempDir::new().unwrap();
    let shared = write(
        dir.path(),
        "shared.js",
        "globalThis.__runs = (globalThis.__runs ?? 0) + 1;\nexport const greeting = 'hi';",
    );
    let a = write(dir.path(), "a.js", "import { greeting } from './shared.js';\nexport const a = greeting + ' a';");
    let b = write(dir.path(), "b.js", "import { greeting } from './shared';\nexport const b = greeting + ' b';");

    let mut host = host();
    let mut loader = ModuleLoader::new(PathResolver::new());

    let first = loader.load(&mut host, &shared);
    loader.load_all(&mut host, [&a, &b]);
    let again = loader.load(&mut host, &shared);

    assert!(Rc::ptr_eq(&first, &again));
    assert_eq!(eval(&mut host, "String(globalThis.__runs)"), "1");
    assert_eq!(loader.cached_count(), 3);
    assert!(loader.is_cached(&b));
}

#[test]
fn test_named_default_and_reexports() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "lib/index.js",
        "export const one = 1;\nexport const two = 2;\nexport default 'lib-default';",
    );
    let entry = write(
        dir.path(),
        "entry.js",
        "import label, { one } from './lib';\nexport * from './lib/index.js';\nexport { one as uno };\nglobalThis.__entry = [label, one].join(':');",
    );

    let mut host = host();
    let mut loader = ModuleLoader::new(PathResolver::new());
    let record = loader.load(&mut host, &entry);

    assert!(!record.is_degraded());
    assert_eq!(record.export_names(), &["uno".to_string()]);
    assert_eq!(eval(&mut host, "globalThis.__entry"), "lib-default:1");
}

#[test]
fn test_cycle_sees_empty_object() {
    let dir = TempDir::new().unwrap();
    let a = write(
        dir.path(),
        "a.js",
        "import { fromB } from './b.js';\nexport const fromA = 'a';\nglobalThis.__seen = String(fromB);",
    );
    write(
        dir.path(),
        "b.js",
        "import * as a from './a.js';\nexport const fromB = 'b';\nglobalThis.__cycle = Object.keys(a).length;",
    );

    let mut host = host();
    let mut loader = ModuleLoader::new(PathResolver::new());
    let record = loader.load(&mut host, &a);

    assert!(!record.is_degraded());
    assert_eq!(eval(&mut host, "globalThis.__seen"), "b");
    assert_eq!(eval(&mut host, "String(globalThis.__cycle)"), "0");
}

#[test]
fn test_broken_modules_degrade_to_empty_exports() {
    let dir = TempDir::new().unwrap();
    let throws = write(dir.path(), "throws.js", "throw new Error('top-level');");
    let missing = dir.path().join("missing.js");
    let user = write(
        dir.path(),
        "user.js",
        "import * as t from './throws.js';\nimport x from 'some-package';\nglobalThis.__user = Object.keys(t).length + ':' + typeof x;",
    );

    let mut host = host();
    let mut loader = ModuleLoader::new(PathResolver::new());

    assert!(loader.load(&mut host, &throws).is_degraded());
    assert!(loader.load(&mut host, &missing).is_degraded());
    assert!(!loader.is_cached(&missing));

    assert!(!loader.load(&mut host, &user).is_degraded());
    assert_eq!(eval(&mut host, "globalThis.__user"), "0:undefined");
}

#[test]
fn test_confined_resolver_blocks_escapes() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "outside.js", "globalThis.__leaked = true;");
    let root = dir.path().join("app");
    let entry = write(
        &root,
        "entry.js",
        "import '../outside.js';\nimport './inside.js';\nglobalThis.__entry = 'ran';",
    );
    write(&root, "inside.js", "globalThis.__inside = true;");

    let mut host = host();
    let mut loader = ModuleLoader::new(PathResolver::confined_to(&root));
    loader.load(&mut host, &entry);

    assert_eq!(eval(&mut host, "globalThis.__entry"), "ran");
    assert_eq!(eval(&mut host, "String(globalThis.__inside)"), "true");
    assert_eq!(eval(&mut host, "String(globalThis.__leaked)"), "undefined");
}
