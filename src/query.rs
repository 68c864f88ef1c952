//! Filtered, searched and paginated resource listing.
//!
//! Filters are independent and combine with AND: a case-insensitive text search
//! over title or description, an exact technology id, and category membership.
//! Results are newest first, ties broken by id descending.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::Result;
use crate::forms::FormData;
use crate::models::Resource;
use crate::models::resource::{fold_case, ResourceRow, SELECT_RESOURCES};
use crate::orm::Db;
use crate::pagination::{Page, Paginator, RESOURCES_PER_PAGE};

/// An id filter taken from a query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum IdFilter {
    #[default]
    Any,
    Is(i64),
    /// The parameter was given but is not an id; nothing can match.
    Invalid,
}

impl IdFilter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|v| !v.is_empty()) {
            None => IdFilter::Any,
            Some(v) => v.parse().map(IdFilter::Is).unwrap_or(IdFilter::Invalid),
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            IdFilter::Is(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<Option<i64>> for IdFilter {
    fn from(id: Option<i64>) -> Self {
        id.map(IdFilter::Is).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceFilter {
    pub search: Option<String>,
    pub technology: IdFilter,
    pub category: IdFilter,
}

impl ResourceFilter {
    pub fn new(search: Option<&str>, technology: Option<i64>, category: Option<i64>) -> Self {
        ResourceFilter {
            search: search_needle(search),
            technology: technology.into(),
            category: category.into(),
        }
    }

    /// Read `search`, `technology` and `category`. Absent and blank values both mean "no filter";
    /// any other search text is matched as typed, surrounding spaces included.
    pub fn from_query(query: &FormData) -> Self {
        ResourceFilter {
            search: search_needle(query.get("search")),
            technology: IdFilter::parse(query.get("technology")),
            category: IdFilter::parse(query.get("category")),
        }
    }

    pub fn is_active(&self) -> bool {
        self.search.is_some() || self.technology != IdFilter::Any || self.category != IdFilter::Any
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(search) = &self.search {
            let pattern = like_pattern(&fold_case(search));
            qb.push(" AND (r.search_title LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR r.search_description LIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\')");
        }
        match self.technology {
            IdFilter::Any => {}
            IdFilter::Is(id) => {
                qb.push(" AND r.technology_id = ");
                qb.push_bind(id);
            }
            IdFilter::Invalid => {
                qb.push(" AND 0");
            }
        }
        match self.category {
            IdFilter::Any => {}
            IdFilter::Is(id) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM resource_categories rc \
                     WHERE rc.resource_id = r.id AND rc.category_id = ",
                );
                qb.push_bind(id);
                qb.push(")");
            }
            IdFilter::Invalid => {
                qb.push(" AND 0");
            }
        }
    }
}

fn search_needle(raw: Option<&str>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty()).map(str::to_string)
}

/// `%needle%` with LIKE wildcards in the needle escaped by `\`.
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub async fn count_resources(db: &Db, filter: &ResourceFilter) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM resources r");
    filter.push_where(&mut qb);
    let (count,): (i64,) = qb.build_query_as().fetch_one(db.pool()).await?;
    Ok(count)
}

/// One page of resources matching `filter`. `page` is the raw query value.
pub async fn list_resources(
    db: &Db,
    filter: &ResourceFilter,
    page: Option<&str>,
) -> Result<Page<Resource>> {
    let paginator = Paginator::new(count_resources(db, filter).await?, RESOURCES_PER_PAGE);
    let number = paginator.validate_number(page)?;

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_RESOURCES);
    filter.push_where(&mut qb);
    qb.push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ");
    qb.push_bind(paginator.per_page);
    qb.push(" OFFSET ");
    qb.push_bind(paginator.offset(number));

    let rows: Vec<ResourceRow> = qb.build_query_as().fetch_all(db.pool()).await?;
    log::debug!(
        "Listing resources page {}/{} ({} matching, filter {:?})",
        number,
        paginator.num_pages(),
        paginator.count,
        filter
    );
    let items = Resource::hydrate(db, rows).await?;
    Ok(paginator.page(number, items))
}
