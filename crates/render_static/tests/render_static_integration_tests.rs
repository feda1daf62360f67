//! Integration tests rendering real templates to temporary directories.

use std::fs;
use std::path::Path;

use render_static::{
    AppConfig, ContextRegistry, RenderOptions, RenderStaticError, Settings, StaticTemplateEngine,
    DJANGO_BACKEND, JINJA2_BACKEND,
};
use serde_json::{json, Value};
use tempfile::tempdir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn engine(settings: Settings, config: Value) -> StaticTemplateEngine {
    StaticTemplateEngine::new(settings.with_static_templates(config))
}

#[test]
fn test_default_engine_renders_into_app_static() {
    let app = tempdir().unwrap();
    write(
        &app.path().join("static_templates/app1/hello.html"),
        "{% extends \"app1/base.html\" %}{% block body %}Hello {{ name }}{% endblock %}",
    );
    write(
        &app.path().join("static_templates/app1/base.html"),
        "<p>{% block body %}{% endblock %}</p>",
    );

    let settings = Settings::new().with_app(AppConfig::new("app1", app.path()));
    let engine = engine(
        settings,
        json!({"templates": {"app1/hello.html": {"context": {"name": "World"}}}}),
    );

    let renders = engine
        .render_to_disk(["app1/hello.html"], RenderOptions::new())
        .unwrap();

    let expected = app.path().join("static/app1/hello.html");
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].destination(), expected);
    assert_eq!(
        renders[0].to_string(),
        format!("[app1] app1/hello.html -> {}", expected.display())
    );
    assert_eq!(fs::read_to_string(expected).unwrap(), "<p>Hello World</p>");
}

#[test]
fn test_static_root_and_dest_override() {
    let templates = tempdir().unwrap();
    let root = tempdir().unwrap();
    write(&templates.path().join("js/defines.js"), "var DEBUG = {{ settings.DEBUG }};");

    let settings = Settings::new()
        .with_static_root(root.path())
        .with_setting("DEBUG", true);
    let engine = engine(
        settings,
        json!({"ENGINES": [{"BACKEND": DJANGO_BACKEND, "DIRS": [templates.path()]}]}),
    );

    engine
        .render_to_disk(["js/defines.js"], RenderOptions::new())
        .unwrap();
    assert_eq!(
        fs::read_to_string(root.path().join("js/defines.js")).unwrap(),
        "var DEBUG = true;"
    );

    let target = root.path().join("elsewhere/settings.js");
    let renders = engine
        .render_to_disk(["js/defines.js"], RenderOptions::new().with_dest(&target))
        .unwrap();
    assert_eq!(renders[0].destination(), target);
    assert!(target.is_file());
}

#[test]
fn test_glob_selector_with_configured_directory() {
    let templates = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(&templates.path().join("js/a.js"), "var a = {{ a }};");
    write(&templates.path().join("js/b.js"), "var b = {{ b }};");
    write(&templates.path().join("css/site.css"), "body {}");

    let bundle = out.path().join("bundle");
    let engine = engine(
        Settings::new(),
        json!({
            "ENGINES": [{"BACKEND": DJANGO_BACKEND, "DIRS": [templates.path()]}],
            "context": {"a": 1, "b": 2},
            "templates": {"js/*.js": {"dest": bundle}}
        }),
    );

    let renders = engine.render_configured(RenderOptions::new()).unwrap();

    let mut names: Vec<&str> = renders.iter().map(|r| r.template().name()).collect();
    names.sort();
    assert_eq!(names, vec!["js/a.js", "js/b.js"]);
    assert_eq!(fs::read_to_string(bundle.join("js/a.js")).unwrap(), "var a = 1;");
    assert_eq!(fs::read_to_string(bundle.join("js/b.js")).unwrap(), "var b = 2;");
    assert!(!bundle.join("css").exists());
}

#[test]
fn test_engine_precedence() {
    let django_dir = tempdir().unwrap();
    let jinja_dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(&django_dir.path().join("shared.txt"), "django {{ who }}");
    write(&jinja_dir.path().join("shared.txt"), "jinja {{ who }}");
    write(&jinja_dir.path().join("only_jinja.txt"), "{{ who | upper }}");

    let engine = engine(
        Settings::new(),
        json!({
            "ENGINES": [
                {"BACKEND": DJANGO_BACKEND, "DIRS": [django_dir.path()]},
                {"BACKEND": JINJA2_BACKEND, "DIRS": [jinja_dir.path()]}
            ],
            "context": {"who": "me"}
        }),
    );

    let first_only = out.path().join("first");
    fs::create_dir_all(&first_only).unwrap();
    let renders = engine
        .render_to_disk(
            ["*.txt"],
            RenderOptions::new().with_dest(&first_only).first_engine(true),
        )
        .unwrap();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].engine(), "StaticDjangoTemplates");
    assert_eq!(
        fs::read_to_string(first_only.join("shared.txt")).unwrap(),
        "django me"
    );

    let union = out.path().join("union");
    let renders = engine
        .render_to_disk(["*.txt"], RenderOptions::new().with_dest(&union))
        .unwrap();
    let engines: Vec<&str> = renders.iter().map(|r| r.engine()).collect();
    assert_eq!(engines, vec!["StaticDjangoTemplates", "StaticJinja2Templates"]);
    assert_eq!(fs::read_to_string(union.join("shared.txt")).unwrap(), "django me");
    assert_eq!(fs::read_to_string(union.join("only_jinja.txt")).unwrap(), "ME");
}

#[test]
fn test_first_preference_over_search_dirs() {
    let preferred = tempdir().unwrap();
    let fallback = tempdir().unwrap();
    let root = tempdir().unwrap();
    write(&preferred.path().join("js/a.js"), "preferred a");
    write(&fallback.path().join("js/a.js"), "fallback a");
    write(&fallback.path().join("js/b.js"), "fallback b");

    let engine = engine(
        Settings::new().with_static_root(root.path()),
        json!({"ENGINES": [{
            "BACKEND": DJANGO_BACKEND,
            "DIRS": [preferred.path(), fallback.path()]
        }]}),
    );

    let renders = engine
        .render_to_disk(["js/*.js"], RenderOptions::new().first_preference(true))
        .unwrap();
    assert_eq!(renders.len(), 1);
    assert_eq!(
        fs::read_to_string(root.path().join("js/a.js")).unwrap(),
        "preferred a"
    );
    assert!(!root.path().join("js/b.js").exists());

    let renders = engine
        .render_to_disk(["js/*.js"], RenderOptions::new())
        .unwrap();
    assert_eq!(renders.len(), 2);
    assert_eq!(
        fs::read_to_string(root.path().join("js/b.js")).unwrap(),
        "fallback b"
    );
}

#[test]
fn test_template_names_with_glob_characters() {
    let templates = tempdir().unwrap();
    let root = tempdir().unwrap();
    write(&templates.path().join("a.txt"), "a");
    write(&templates.path().join("b[1].txt"), "b {{ n }}");

    let engine = engine(
        Settings::new().with_static_root(root.path()),
        json!({
            "ENGINES": [{"BACKEND": JINJA2_BACKEND, "DIRS": [templates.path()]}],
            "context": {"n": 1}
        }),
    );

    let renders = engine.render_to_disk(["*.txt"], RenderOptions::new()).unwrap();
    assert_eq!(renders.len(), 2);
    assert_eq!(fs::read_to_string(root.path().join("b[1].txt")).unwrap(), "b 1");

    fs::remove_file(root.path().join("b[1].txt")).unwrap();
    let renders = engine
        .render_to_disk(["b[1].txt"], RenderOptions::new())
        .unwrap();
    assert_eq!(renders[0].template().name(), "b[1].txt");
    assert!(root.path().join("b[1].txt").is_file());
}

#[test]
fn test_unparsable_sibling_does_not_block_render() {
    let templates = tempdir().unwrap();
    let root = tempdir().unwrap();
    write(&templates.path().join("good.html"), "hello {{ x }}");
    write(&templates.path().join("unrelated.js"), "var a = `{% if %}`;");

    let engine = engine(
        Settings::new().with_static_root(root.path()),
        json!({
            "ENGINES": [{"BACKEND": DJANGO_BACKEND, "DIRS": [templates.path()]}],
            "context": {"x": "there"}
        }),
    );

    engine.render_to_disk(["good.html"], RenderOptions::new()).unwrap();
    assert_eq!(
        fs::read_to_string(root.path().join("good.html")).unwrap(),
        "hello there"
    );
}

#[test]
fn test_context_sources() {
    let templates = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(&templates.path().join("greeting.txt"), "{{ greeting }}, {{ to }}{{ suffix }}");
    let context_file = out.path().join("context.yaml");
    write(&context_file, "greeting: Hi\nto: file\n");

    let contexts = ContextRegistry::new().with("app.context.greeting", || {
        Ok(json!({"to": "registry", "suffix": "!"}))
    });
    let settings = Settings::new().with_static_templates(json!({
        "ENGINES": [{"BACKEND": JINJA2_BACKEND, "DIRS": [templates.path()]}],
        "context": context_file,
        "templates": {"greeting.txt": {"context": "app.context.greeting"}}
    }));
    let engine = StaticTemplateEngine::new(settings).with_context_registry(contexts);

    let target = out.path().join("greeting.txt");
    engine
        .render_to_disk(["greeting.txt"], RenderOptions::new().with_dest(&target))
        .unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "Hi, registry!");

    let mut overrides = serde_json::Map::new();
    overrides.insert("suffix".to_string(), json!("?"));
    engine
        .render_to_disk(
            ["greeting.txt"],
            RenderOptions::new().with_dest(&target).with_context(overrides),
        )
        .unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "Hi, registry?");
}

#[test]
fn test_rerender_is_identical() {
    let templates = tempdir().unwrap();
    let root = tempdir().unwrap();
    write(&templates.path().join("page.html"), "<b>{{ title }}</b>");

    let engine = engine(
        Settings::new().with_static_root(root.path()),
        json!({
            "ENGINES": [{"BACKEND": DJANGO_BACKEND, "DIRS": [templates.path()]}],
            "context": {"title": "Fish & Chips"}
        }),
    );

    engine.render_to_disk(["page.html"], RenderOptions::new()).unwrap();
    let first = fs::read(root.path().join("page.html")).unwrap();
    engine.render_to_disk(["page.html"], RenderOptions::new()).unwrap();
    let second = fs::read(root.path().join("page.html")).unwrap();

    assert_eq!(first, second);
    assert_eq!(String::from_utf8(first).unwrap(), "<b>Fish &amp; Chips</b>");
}

#[test]
fn test_partial_progress_is_kept() {
    let templates = tempdir().unwrap();
    let root = tempdir().unwrap();
    write(&templates.path().join("one.txt"), "1");
    write(&templates.path().join("three.txt"), "3");

    let engine = engine(
        Settings::new().with_static_root(root.path()),
        json!({"ENGINES": [{"BACKEND": JINJA2_BACKEND, "DIRS": [templates.path()]}]}),
    );

    let results: Vec<_> = engine
        .render_each(["one.txt", "two.txt", "three.txt"], RenderOptions::new())
        .collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(
        &results[1],
        Err(RenderStaticError::TemplateDoesNotExist(missing)) if missing.name() == "two.txt"
    ));
    assert!(root.path().join("one.txt").is_file());
    assert!(!root.path().join("three.txt").exists());
}

#[test]
fn test_missing_template_writes_nothing() {
    let templates = tempdir().unwrap();
    let root = tempdir().unwrap();

    let engine = engine(
        Settings::new().with_static_root(root.path()),
        json!({"ENGINES": [{"BACKEND": DJANGO_BACKEND, "DIRS": [templates.path()]}]}),
    );

    let err = engine
        .render_to_disk(["nope/*.html"], RenderOptions::new())
        .unwrap_err();
    assert!(err.is_template_does_not_exist());
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn test_settings_file() {
    let dir = tempdir().unwrap();
    let templates = dir.path().join("templates");
    let root = dir.path().join("static");
    write(&templates.join("robots.txt"), "Sitemap: {{ site }}/sitemap.xml");
    write(
        &dir.path().join("settings.yaml"),
        &format!(
            "STATIC_ROOT: '{}'\n\
             SITE: https://example.com\n\
             STATIC_TEMPLATES:\n  \
               ENGINES:\n    \
                 - BACKEND: {}\n      \
                   DIRS: ['{}']\n  \
               context:\n    \
                 site: https://example.com\n",
            root.display(),
            JINJA2_BACKEND,
            templates.display()
        ),
    );

    let settings = Settings::from_path(dir.path().join("settings.yaml")).unwrap();
    let engine = StaticTemplateEngine::new(settings);
    engine.render_to_disk(["robots.txt"], RenderOptions::new()).unwrap();

    assert_eq!(
        fs::read_to_string(root.join("robots.txt")).unwrap(),
        "Sitemap: https://example.com/sitemap.xml"
    );
    assert_eq!(engine.context().unwrap()["settings"]["SITE"], "https://example.com");
}

#[test]
fn test_configuration_errors() {
    let cases = [
        json!({"ENGINES": [], "unknown": {}}),
        json!({"ENGINES": {"BACKEND": DJANGO_BACKEND}}),
        json!({"templates": {"a.html": {"dest": "relative/a.html"}}}),
        json!({"templates": {"a.html": {"context": 5}}}),
        json!({"ENGINES": [{"BACKEND": DJANGO_BACKEND, "APP_DIRS": true, "OPTIONS": {"loaders": []}}]}),
        json!({"ENGINES": [{"BACKEND": DJANGO_BACKEND, "OPTIONS": {"unknown": true}}]}),
        json!({"ENGINES": [{"NAME": "missing_backend"}]}),
    ];

    for config in cases {
        let engine = engine(Settings::new(), config.clone());
        let err = engine
            .render_to_disk(["a.html"], RenderOptions::new())
            .unwrap_err();
        assert!(err.is_improperly_configured(), "{config}: {err}");
    }
}

#[test]
fn test_no_destination_without_app_or_root() {
    let templates = tempdir().unwrap();
    write(&templates.path().join("orphan.txt"), "orphan");

    let engine = engine(
        Settings::new(),
        json!({"ENGINES": [{"BACKEND": DJANGO_BACKEND, "DIRS": [templates.path()]}]}),
    );

    let err = engine
        .render_to_disk(["orphan.txt"], RenderOptions::new())
        .unwrap_err();
    assert!(err.to_string().contains("STATIC_ROOT"));
}
