use chrono::{DateTime, Duration, Utc};
use resourcehub::error::AppError;
use resourcehub::forms::FormData;
use resourcehub::models::{Category, Resource, ResourceInput, Taxonomy, Technology};
use resourcehub::orm::{self, Db};
use resourcehub::query::{count_resources, list_resources, IdFilter, ResourceFilter};
use std::sync::Arc;

async fn migrated_db() -> Db {
    let db = Db::connect("sqlite::memory:").await.unwrap();
    orm::auto_migrate(Arc::new(db.clone())).await.unwrap();
    db
}

async fn add(
    db: &Db,
    title: &str,
    description: &str,
    technology_id: Option<i64>,
    category_ids: Vec<i64>,
    created_at: DateTime<Utc>,
) -> Resource {
    let input = ResourceInput {
        title: title.to_string(),
        url: None,
        description: description.to_string(),
        technology_id,
        category_ids,
    };
    Resource::create(db, &input, created_at).await.unwrap()
}

fn titles(resources: &[Resource]) -> Vec<&str> {
    resources.iter().map(|r| r.title.as_str()).collect()
}

#[tokio::test]
async fn test_newest_first_with_id_tie_break() {
    let db = migrated_db().await;
    let base = Utc::now();
    add(&db, "old", "", None, vec![], base - Duration::days(2)).await;
    add(&db, "tied-first", "", None, vec![], base).await;
    add(&db, "tied-second", "", None, vec![], base).await;
    add(&db, "middle", "", None, vec![], base - Duration::days(1)).await;

    let page = list_resources(&db, &ResourceFilter::default(), None)
        .await
        .unwrap();
    assert_eq!(
        titles(&page.items),
        vec!["tied-second", "tied-first", "middle", "old"]
    );
}

#[tokio::test]
async fn test_search_is_case_insensitive_over_title_or_description() {
    let db = migrated_db().await;
    let now = Utc::now();
    add(&db, "Learning FOO", "", None, vec![], now).await;
    add(&db, "Other", "all about foo bars", None, vec![], now).await;
    add(&db, "Unrelated", "nothing here", None, vec![], now).await;

    let filter = ResourceFilter::new(Some("Foo"), None, None);
    let page = list_resources(&db, &filter, None).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(titles(&page.items).contains(&"Learning FOO"));
    assert!(titles(&page.items).contains(&"Other"));
}

#[tokio::test]
async fn test_search_folds_non_ascii_case() {
    let db = migrated_db().await;
    add(&db, "École de Rust", "Über async", None, vec![], Utc::now()).await;
    add(&db, "Unrelated", "nothing here", None, vec![], Utc::now()).await;

    for needle in ["école", "ÉCOLE", "über", "ÜBER", "rust"] {
        let filter = ResourceFilter::new(Some(needle), None, None);
        assert_eq!(count_resources(&db, &filter).await.unwrap(), 1, "search {}", needle);
    }
}

#[tokio::test]
async fn test_search_folding_follows_updates() {
    let db = migrated_db().await;
    let resource = add(&db, "Ärger", "", None, vec![], Utc::now()).await;
    let changes = ResourceInput {
        title: "Straße".to_string(),
        url: None,
        description: String::new(),
        technology_id: None,
        category_ids: vec![],
    };
    Resource::update(&db, resource.id, &changes).await.unwrap();

    let filter = ResourceFilter::new(Some("STRAßE"), None, None);
    assert_eq!(count_resources(&db, &filter).await.unwrap(), 1);
    let filter = ResourceFilter::new(Some("ärger"), None, None);
    assert_eq!(count_resources(&db, &filter).await.unwrap(), 0);
}

#[tokio::test]
async fn test_search_keeps_surrounding_spaces() {
    let db = migrated_db().await;
    let now = Utc::now();
    add(&db, "foo bar", "", None, vec![], now).await;
    add(&db, "foobar", "", None, vec![], now).await;

    let filter = ResourceFilter::from_query(&FormData::parse("search=foo+"));
    let page = list_resources(&db, &filter, None).await.unwrap();
    assert_eq!(titles(&page.items), vec!["foo bar"]);
}

#[tokio::test]
async fn test_search_treats_wildcards_literally() {
    let db = migrated_db().await;
    let now = Utc::now();
    add(&db, "100% Rust", "", None, vec![], now).await;
    add(&db, "1000 Rust tips", "", None, vec![], now).await;

    let filter = ResourceFilter::new(Some("100%"), None, None);
    let page = list_resources(&db, &filter, None).await.unwrap();
    assert_eq!(titles(&page.items), vec!["100% Rust"]);

    let filter = ResourceFilter::new(Some("_"), None, None);
    assert_eq!(count_resources(&db, &filter).await.unwrap(), 0);
}

#[tokio::test]
async fn test_filters_intersect() {
    let db = migrated_db().await;
    let now = Utc::now();
    let go = Technology::create(&db, "Go").await.unwrap();
    let rust = Technology::create(&db, "Rust").await.unwrap();
    add(&db, "foo in go", "", Some(go.id), vec![], now).await;
    add(&db, "foo in rust", "", Some(rust.id), vec![], now).await;
    add(&db, "bar in go", "", Some(go.id), vec![], now).await;

    let filter = ResourceFilter::new(Some("foo"), Some(go.id), None);
    let page = list_resources(&db, &filter, None).await.unwrap();
    assert_eq!(titles(&page.items), vec!["foo in go"]);
}

#[tokio::test]
async fn test_category_membership_filter() {
    let db = migrated_db().await;
    let now = Utc::now();
    let x = Category::create(&db, "X").await.unwrap();
    let y = Category::create(&db, "Y").await.unwrap();
    add(&db, "both", "", None, vec![x.id, y.id], now).await;
    add(&db, "only y", "", None, vec![y.id], now - Duration::seconds(1)).await;
    add(&db, "none", "", None, vec![], now - Duration::seconds(2)).await;

    let page = list_resources(&db, &ResourceFilter::new(None, None, Some(y.id)), None)
        .await
        .unwrap();
    assert_eq!(titles(&page.items), vec!["both", "only y"]);
    // Each matching resource is listed once, with all of its categories
    assert_eq!(page.items[0].categories.len(), 2);

    let page = list_resources(&db, &ResourceFilter::new(None, None, Some(x.id)), None)
        .await
        .unwrap();
    assert_eq!(titles(&page.items), vec!["both"]);
}

#[tokio::test]
async fn test_thirteen_resources_paginate_by_six() {
    let db = migrated_db().await;
    let base = Utc::now();
    for i in 0..13 {
        add(&db, &format!("r{}", i), "", None, vec![], base - Duration::minutes(i)).await;
    }
    let all = ResourceFilter::default();

    let first = list_resources(&db, &all, None).await.unwrap();
    assert_eq!(first.len(), 6);
    assert_eq!(first.info.num_pages, 3);
    assert!(first.is_paginated());

    let third = list_resources(&db, &all, Some("3")).await.unwrap();
    assert_eq!(titles(&third.items), vec!["r12"]);
    assert!(!third.info.has_next);

    let last = list_resources(&db, &all, Some("last")).await.unwrap();
    assert_eq!(last.info.number, 3);

    for bad in ["4", "0", "abc"] {
        assert!(matches!(
            list_resources(&db, &all, Some(bad)).await,
            Err(AppError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_empty_listing_has_a_first_page() {
    let db = migrated_db().await;
    let page = list_resources(&db, &ResourceFilter::default(), Some("1"))
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(page.info.num_pages, 1);
    assert!(!page.is_paginated());
}

#[tokio::test]
async fn test_query_parameters_build_the_filter() {
    let db = migrated_db().await;
    let go = Technology::create(&db, "Go").await.unwrap();
    add(&db, "A", "", Some(go.id), vec![], Utc::now()).await;

    let query = FormData::parse(&format!("search=&technology={}&category=", go.id));
    let filter = ResourceFilter::from_query(&query);
    assert_eq!(filter.technology, IdFilter::Is(go.id));
    assert_eq!(filter.category, IdFilter::Any);
    assert_eq!(count_resources(&db, &filter).await.unwrap(), 1);

    let filter = ResourceFilter::from_query(&FormData::parse("technology=go"));
    assert_eq!(count_resources(&db, &filter).await.unwrap(), 0);
}
