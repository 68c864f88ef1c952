use chrono::{Duration, Utc};
use resourcehub::error::AppError;
use resourcehub::forms::FormData;
use resourcehub::models::{Category, Resource, ResourceInput, Taxonomy, Technology};
use resourcehub::orm::{self, Db};
use resourcehub::router::{AppState, Request, Router};
use resourcehub::settings::Settings;
use resourcehub::template::TemplateValue;
use resourcehub::urls::{self, Urls};
use resourcehub::views::{categories, dashboard, resources, technologies, View};
use std::sync::Arc;

async fn test_state() -> AppState {
    let db = Db::connect("sqlite::memory:").await.unwrap();
    orm::auto_migrate(Arc::new(db.clone())).await.unwrap();
    AppState {
        db: Arc::new(db),
        settings: Settings::default(),
    }
}

fn app(state: &AppState) -> Router {
    let mut router = Router::new();
    router.set_app_state(state.clone());
    urls::register(&mut router, &Urls::new(&state.settings.mount_prefix));
    router
}

fn with_id(mut request: Request, id: i64) -> Request {
    request.params.insert("id".into(), id.to_string());
    request
}

fn context_value<'a>(view: &'a View, path: &str) -> &'a TemplateValue {
    let mut parts = path.split('.');
    let context = view.context().expect("rendered view");
    let mut current = context.get(parts.next().unwrap()).expect("top-level key");
    for key in parts {
        current = current.get(key).expect("nested key");
    }
    current
}

fn list_len(value: &TemplateValue) -> usize {
    match value {
        TemplateValue::List(items) => items.len(),
        other => panic!("expected a list, got {:?}", other),
    }
}

async fn add_resource(state: &AppState, title: &str, technology_id: Option<i64>) -> Resource {
    let input = ResourceInput {
        title: title.to_string(),
        url: None,
        description: "d".to_string(),
        technology_id,
        category_ids: vec![],
    };
    Resource::create(&state.db, &input, Utc::now()).await.unwrap()
}

// ========== Scenarios ==========

#[tokio::test]
async fn test_create_technology_then_filter_resources_by_it() {
    let state = test_state().await;

    let view = technologies::create(
        Request::post("/resourcehub/technologies/create/", FormData::parse("name=Go")),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(
        view.redirect_location(),
        Some("/resourcehub/technologies/")
    );
    let go = Technology::all(&state.db).await.unwrap().remove(0);

    let form = FormData::parse(&format!("title=A&description=first&technology={}", go.id));
    let view = resources::create(
        Request::post("/resourcehub/resources/create/", form),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(view.redirect_location(), Some("/resourcehub/resources/"));
    add_resource(&state, "B", None).await;

    let view = resources::list(
        Request::get(&format!("/resourcehub/resources/?technology={}", go.id)),
        state.clone(),
    )
    .await
    .unwrap();
    let listed = context_value(&view, "resources");
    assert_eq!(list_len(listed), 1);
    match listed {
        TemplateValue::List(items) => {
            assert_eq!(items[0].get("title"), Some(&TemplateValue::from("A")));
            assert_eq!(
                items[0].get("technology").and_then(|t| t.get("name")),
                Some(&TemplateValue::from("Go"))
            );
        }
        _ => unreachable!(),
    }
    assert_eq!(
        context_value(&view, "filters.technology"),
        &TemplateValue::from(go.id.to_string())
    );
}

#[tokio::test]
async fn test_deleting_a_category_keeps_the_resource() {
    let state = test_state().await;
    let x = Category::create(&state.db, "X").await.unwrap();
    let y = Category::create(&state.db, "Y").await.unwrap();
    let input = ResourceInput {
        title: "Linked".into(),
        url: None,
        description: "d".into(),
        technology_id: None,
        category_ids: vec![x.id, y.id],
    };
    let resource = Resource::create(&state.db, &input, Utc::now()).await.unwrap();

    // GET only asks for confirmation
    let view = categories::delete(
        with_id(Request::get("/resourcehub/categories/1/delete/"), x.id),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(view.template(), Some("resourcehub/categories/delete.html"));
    assert_eq!(Category::count(&state.db).await.unwrap(), 2);

    let view = categories::delete(
        with_id(
            Request::post("/resourcehub/categories/1/delete/", FormData::new()),
            x.id,
        ),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(view.redirect_location(), Some("/resourcehub/categories/"));

    let reloaded = Resource::get(&state.db, resource.id).await.unwrap();
    assert_eq!(reloaded.categories, vec![y]);
}

#[tokio::test]
async fn test_empty_title_is_rejected_without_writing() {
    let state = test_state().await;
    let view = resources::create(
        Request::post(
            "/resourcehub/resources/create/",
            FormData::parse("title=&description=something"),
        ),
        state.clone(),
    )
    .await
    .unwrap();

    match &view {
        View::Render {
            template, status, ..
        } => {
            assert_eq!(template, "resourcehub/resources/create.html");
            assert_eq!(*status, 200);
        }
        other => panic!("expected the form again, got {:?}", other),
    }
    assert_eq!(
        context_value(&view, "form.errors.title"),
        &TemplateValue::from("This field is required.")
    );
    assert_eq!(
        context_value(&view, "form.values.description"),
        &TemplateValue::from("something")
    );
    assert_eq!(Resource::count(&state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_deleting_a_technology_nulls_it_on_resources() {
    let state = test_state().await;
    let go = Technology::create(&state.db, "Go").await.unwrap();
    let resource = add_resource(&state, "Uses Go", Some(go.id)).await;

    technologies::delete(
        with_id(
            Request::post("/resourcehub/technologies/1/delete/", FormData::new()),
            go.id,
        ),
        state.clone(),
    )
    .await
    .unwrap();

    let reloaded = Resource::get(&state.db, resource.id).await.unwrap();
    assert_eq!(reloaded.technology, None);

    let view = resources::list(Request::get("/resourcehub/resources/"), state.clone())
        .await
        .unwrap();
    assert_eq!(list_len(context_value(&view, "resources")), 1);
}

#[tokio::test]
async fn test_update_keeps_created_at() {
    let state = test_state().await;
    let created_at = Utc::now() - Duration::days(10);
    let input = ResourceInput {
        title: "Before".into(),
        url: None,
        description: "d".into(),
        technology_id: None,
        category_ids: vec![],
    };
    let resource = Resource::create(&state.db, &input, created_at).await.unwrap();

    // GET pre-fills the stored values
    let view = resources::update(
        with_id(Request::get("/resourcehub/resources/1/update/"), resource.id),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(
        context_value(&view, "form.values.title"),
        &TemplateValue::from("Before")
    );
    assert_eq!(
        context_value(&view, "resource.title"),
        &TemplateValue::from("Before")
    );

    let view = resources::update(
        with_id(
            Request::post(
                "/resourcehub/resources/1/update/",
                FormData::parse("title=After&description=d&url=https://example.org"),
            ),
            resource.id,
        ),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(view.redirect_location(), Some("/resourcehub/resources/"));

    let reloaded = Resource::get(&state.db, resource.id).await.unwrap();
    assert_eq!(reloaded.title, "After");
    assert_eq!(reloaded.url.as_deref(), Some("https://example.org"));
    assert_eq!(reloaded.created_at, created_at);
}

#[tokio::test]
async fn test_missing_records_are_not_found() {
    let state = test_state().await;

    let result = resources::update(
        with_id(Request::get("/resourcehub/resources/9/update/"), 9),
        state.clone(),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = resources::delete(
        with_id(
            Request::post("/resourcehub/resources/9/delete/", FormData::new()),
            9,
        ),
        state.clone(),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = categories::update(
        with_id(
            Request::post("/resourcehub/categories/9/update/", FormData::parse("name=Z")),
            9,
        ),
        state.clone(),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_duplicate_name_redisplays_the_form() {
    let state = test_state().await;
    Category::create(&state.db, "Docs").await.unwrap();

    let view = categories::create(
        Request::post(
            "/resourcehub/categories/create/",
            FormData::parse("name=Docs"),
        ),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(
        view.template(),
        Some("resourcehub/categories/category-form.html")
    );
    assert_eq!(
        context_value(&view, "form.errors.name"),
        &TemplateValue::from("Category with this Name already exists.")
    );
    assert_eq!(Category::count(&state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_rename_to_own_name_is_allowed() {
    let state = test_state().await;
    let rust = Technology::create(&state.db, "Rust").await.unwrap();

    let view = technologies::update(
        with_id(
            Request::post(
                "/resourcehub/technologies/1/update/",
                FormData::parse("name=Rust"),
            ),
            rust.id,
        ),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(
        view.redirect_location(),
        Some("/resourcehub/technologies/")
    );
}

#[tokio::test]
async fn test_taxonomy_list_has_inline_form_and_pages() {
    let state = test_state().await;
    for i in 0..11 {
        Technology::create(&state.db, &format!("tech-{:02}", i))
            .await
            .unwrap();
    }

    let view = technologies::list(Request::get("/resourcehub/technologies/"), state.clone())
        .await
        .unwrap();
    assert_eq!(list_len(context_value(&view, "technologies")), 10);
    assert_eq!(context_value(&view, "is_paginated"), &TemplateValue::Bool(true));
    assert_eq!(context_value(&view, "section"), &TemplateValue::from("technologies"));
    assert_eq!(context_value(&view, "form.values.name"), &TemplateValue::from(""));

    let view = technologies::list(
        Request::get("/resourcehub/technologies/?page=2"),
        state.clone(),
    )
    .await
    .unwrap();
    assert_eq!(list_len(context_value(&view, "technologies")), 1);

    let result = technologies::list(
        Request::get("/resourcehub/technologies/?page=3"),
        state.clone(),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_dashboard_counts() {
    let state = test_state().await;
    Technology::create(&state.db, "Rust").await.unwrap();
    add_resource(&state, "new", None).await;

    let view = dashboard::home(Request::get("/resourcehub/"), state.clone())
        .await
        .unwrap();
    assert_eq!(view.template(), Some("resourcehub/dashboard.html"));
    assert_eq!(context_value(&view, "total_resources"), &TemplateValue::from(1i64));
    assert_eq!(context_value(&view, "total_technologies"), &TemplateValue::from(1i64));
    assert_eq!(context_value(&view, "total_categories"), &TemplateValue::from(0i64));
    assert_eq!(
        context_value(&view, "new_resources_last_30_days"),
        &TemplateValue::from(1i64)
    );
    assert_eq!(context_value(&view, "active.dashboard"), &TemplateValue::Bool(true));
}

// ========== Through the router and the real templates ==========

#[tokio::test]
async fn test_every_page_renders() {
    let state = test_state().await;
    let router = app(&state);
    let go = Technology::create(&state.db, "Go").await.unwrap();
    let docs = Category::create(&state.db, "Docs").await.unwrap();
    let resource = add_resource(&state, "<b>Escaped</b>", Some(go.id)).await;

    let pages = [
        "/resourcehub/".to_string(),
        "/resourcehub/resources/".to_string(),
        "/resourcehub/resources/?search=esc&technology=&category=".to_string(),
        "/resourcehub/resources/create/".to_string(),
        format!("/resourcehub/resources/{}/update/", resource.id),
        format!("/resourcehub/resources/{}/delete/", resource.id),
        "/resourcehub/categories/".to_string(),
        "/resourcehub/categories/create/".to_string(),
        format!("/resourcehub/categories/{}/update/", docs.id),
        format!("/resourcehub/categories/{}/delete/", docs.id),
        "/resourcehub/technologies/".to_string(),
        "/resourcehub/technologies/create/".to_string(),
        format!("/resourcehub/technologies/{}/update/", go.id),
        format!("/resourcehub/technologies/{}/delete/", go.id),
    ];
    for page in &pages {
        let resp = router.dispatch(Request::get(page)).await;
        assert_eq!(resp.status_code, 200, "GET {} -> {}", page, resp.body);
        assert!(resp.body.contains("ResourceHub"), "GET {}", page);
    }

    let resp = router.dispatch(Request::get("/resourcehub/resources/")).await;
    assert!(resp.body.contains("&lt;b&gt;Escaped&lt;/b&gt;"));
    assert!(!resp.body.contains("<b>Escaped</b>"));
}

#[tokio::test]
async fn test_router_status_codes() {
    let state = test_state().await;
    let router = app(&state);

    let resp = router
        .dispatch(Request::post(
            "/resourcehub/technologies/create/",
            FormData::parse("name=Rust"),
        ))
        .await;
    assert_eq!(resp.status_code, 302);
    assert_eq!(
        resp.headers.get("Location").map(String::as_str),
        Some("/resourcehub/technologies/")
    );

    let resp = router
        .dispatch(Request::post("/resourcehub/resources/", FormData::new()))
        .await;
    assert_eq!(resp.status_code, 405);

    for missing in [
        "/resourcehub/resources/999/update/",
        "/resourcehub/resources/abc/delete/",
        "/resourcehub/resources/?page=7",
        "/resourcehub/nowhere/",
    ] {
        let resp = router.dispatch(Request::get(missing)).await;
        assert_eq!(resp.status_code, 404, "GET {}", missing);
    }
}
