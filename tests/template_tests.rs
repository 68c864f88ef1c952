use resourcehub::settings::TemplateSettings;
use resourcehub::template;
use resourcehub::template::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;

fn write_templates(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn settings_for(dir: &tempfile::TempDir) -> TemplateSettings {
    TemplateSettings {
        dir: dir.path().to_string_lossy().to_string(),
        debug: false,
    }
}

#[test]
fn test_tokenize_basic() {
    let input = "Hello, {{ username }}! {% if user.is_admin %}Admin!{% endif %}";
    let tokens = tokenize_template(input);

    assert_eq!(tokens.len(), 6);
    match &tokens[1] {
        Token::Variable(var) => assert_eq!(var, "username"),
        _ => panic!("Expected variable token"),
    }
    match &tokens[3] {
        Token::Tag(tag) => assert_eq!(tag, "if user.is_admin"),
        _ => panic!("Expected tag token"),
    }
}

#[test]
fn test_parse_simple_nodes() {
    let tokens = tokenize_template("Welcome, {{user.name}}");
    let nodes = parse_tokens(&tokens);

    assert_eq!(nodes.len(), 2);
    match &nodes[1] {
        Node::Variable(var) => assert_eq!(var, "user.name"),
        _ => panic!("Expected variable node"),
    }
}

#[test]
fn test_variables_are_escaped() {
    let nodes = parse_tokens(&tokenize_template("<p>{{ title }}</p>"));
    let mut context = HashMap::new();
    context.insert(
        "title".to_string(),
        TemplateValue::from("<script>alert('x')</script> & more"),
    );
    let rendered = template::render_nodes(&nodes, &context);
    assert_eq!(
        rendered,
        "<p>&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt; &amp; more</p>"
    );
}

#[test]
fn test_if_not_and_else() {
    let nodes = parse_tokens(&tokenize_template(
        "{% if not items %}empty{% else %}has items{% endif %}",
    ));
    let mut context = HashMap::new();
    context.insert("items".to_string(), TemplateValue::List(vec![]));
    assert_eq!(template::render_nodes(&nodes, &context), "empty");

    context.insert(
        "items".to_string(),
        TemplateValue::List(vec![TemplateValue::from("a")]),
    );
    assert_eq!(template::render_nodes(&nodes, &context), "has items");
}

#[test]
fn test_truthiness() {
    assert!(!TemplateValue::Null.is_truthy());
    assert!(!TemplateValue::from("").is_truthy());
    assert!(!TemplateValue::from(0i64).is_truthy());
    assert!(!TemplateValue::Object(HashMap::new()).is_truthy());
    assert!(TemplateValue::from(3i64).is_truthy());
    assert!(TemplateValue::from("x").is_truthy());
}

#[test]
fn test_missing_variable_renders_empty() {
    let nodes = parse_tokens(&tokenize_template("[{{ nope.deeper }}]"));
    assert_eq!(template::render_nodes(&nodes, &HashMap::new()), "[]");
}

#[test]
fn test_for_loop_over_serialized_structs() {
    #[derive(Serialize)]
    struct Technology {
        id: i64,
        name: String,
        selected: bool,
    }

    let list = vec![
        Technology {
            id: 1,
            name: "Go".into(),
            selected: false,
        },
        Technology {
            id: 2,
            name: "Rust".into(),
            selected: true,
        },
    ];
    let nodes = parse_tokens(&tokenize_template(
        "{% for t in techs %}<option value=\"{{ t.id }}\"{% if t.selected %} selected{% endif %}>{{ t.name }}</option>{% endfor %}",
    ));
    let mut context = HashMap::new();
    context.insert(
        "techs".to_string(),
        TemplateValue::from_serialize(&list).unwrap(),
    );
    assert_eq!(
        template::render_nodes(&nodes, &context),
        "<option value=\"1\">Go</option><option value=\"2\" selected>Rust</option>"
    );
}

#[test]
fn test_tailwind_tag_inserts_cdn() {
    let nodes = vec![
        Node::Text("start".into()),
        Node::Tailwind,
        Node::Text("end".into()),
    ];
    let html = template::render_nodes(&nodes, &HashMap::new());
    assert!(html.contains("https://cdn.tailwindcss.com"));
    assert!(html.starts_with("start"));
    assert!(html.ends_with("end"));
}

#[test]
fn test_block_and_extends_logic() {
    let dir = write_templates(&[
        ("base.html", "<h1>{% block title %}Base{% endblock %}</h1>{% block content %}{% endblock %}!"),
        (
            "pages/child.html",
            "{% extends \"base.html\" %}{% block content %}Hello {{ name }}{% endblock %}",
        ),
    ]);
    let mut context = HashMap::new();
    context.insert("name".to_string(), TemplateValue::from("Ada"));

    let resp = render_template(&settings_for(&dir), "pages/child.html", &context, 200);
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "<h1>Base</h1>Hello Ada!");
    assert_eq!(
        resp.headers.get("Content-Type").map(String::as_str),
        Some("text/html; charset=utf-8")
    );
}

#[test]
fn test_render_status_is_kept() {
    let dir = write_templates(&[("form.html", "invalid")]);
    let resp = render_template(&settings_for(&dir), "form.html", &HashMap::new(), 422);
    assert_eq!(resp.status_code, 422);
}

#[test]
fn test_template_not_found_is_server_error() {
    let dir = write_templates(&[]);
    let resp = render_template(
        &settings_for(&dir),
        "hopefully_does_not_exist_zzz999.html",
        &HashMap::new(),
        200,
    );
    assert_eq!(resp.status_code, 500);

    let err = render_to_string(&settings_for(&dir).dir, "missing.html", &HashMap::new());
    assert!(err.unwrap_err().to_string().contains("not found"));
}

#[test]
fn test_unknown_tag_is_skipped() {
    let nodes = parse_tokens(&tokenize_template("a{% csrf_token %}b"));
    assert_eq!(template::render_nodes(&nodes, &HashMap::new()), "ab");
}
