//! Page handlers.
//!
//! Every handler takes the decoded `Request` and the shared `AppState` and returns
//! `Result<View, AppError>`. Rendering and error-to-status mapping happen once, in
//! the `Responder` impl below, so handlers can be called directly in tests.

pub mod categories;
pub mod dashboard;
pub mod resources;
pub mod taxonomy;
pub mod technologies;

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::forms::FormData;
use crate::pagination::{Page, PageInfo};
use crate::router::{AppState, Responder, Response};
use crate::template::{self, Context, TemplateValue};
use crate::urls::Urls;

#[derive(Debug, Clone)]
pub enum View {
    Render {
        template: String,
        context: Context,
        status: u16,
    },
    Redirect(String),
}

impl View {
    pub fn render(template: &str, context: Context) -> Self {
        View::Render {
            template: template.to_string(),
            context,
            status: 200,
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        View::Redirect(location.into())
    }

    pub fn template(&self) -> Option<&str> {
        match self {
            View::Render { template, .. } => Some(template),
            View::Redirect(_) => None,
        }
    }

    pub fn context(&self) -> Option<&Context> {
        match self {
            View::Render { context, .. } => Some(context),
            View::Redirect(_) => None,
        }
    }

    pub fn redirect_location(&self) -> Option<&str> {
        match self {
            View::Redirect(location) => Some(location),
            View::Render { .. } => None,
        }
    }
}

impl Responder for Result<View> {
    fn respond(self, state: &AppState) -> Response {
        match self {
            Ok(View::Render {
                template,
                context,
                status,
            }) => template::render_template(&state.settings.template, &template, &context, status),
            Ok(View::Redirect(location)) => Response::redirect(location),
            Err(AppError::NotFound(what)) => {
                log::debug!("{} not found", what);
                Response::not_found()
            }
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    log::error!("Request failed: {}", e);
                } else {
                    log::warn!("Request rejected: {}", e);
                }
                Response::error(status)
            }
        }
    }
}

pub fn urls(state: &AppState) -> Urls {
    Urls::new(&state.settings.mount_prefix)
}

/// Context every page starts from: navigation `urls`, the sidebar `section` (also as
/// `active.<section>` for templates), and `debug`.
pub fn base_context(state: &AppState, section: &str) -> Result<Context> {
    let mut context = Context::new();
    insert(&mut context, "urls", &urls(state).nav())?;
    context.insert("section".to_string(), section.into());
    context.insert(
        "active".to_string(),
        TemplateValue::Object(HashMap::from([(section.to_string(), true.into())])),
    );
    context.insert("debug".to_string(), state.settings.debug.into());
    Ok(context)
}

pub fn insert<T: Serialize + ?Sized>(context: &mut Context, key: &str, value: &T) -> Result<()> {
    context.insert(key.to_string(), TemplateValue::from_serialize(value)?);
    Ok(())
}

/// A record plus the links to edit and delete it.
#[derive(Debug, Serialize)]
pub struct Linked<'a, T> {
    #[serde(flatten)]
    pub item: &'a T,
    pub update_url: String,
    pub delete_url: String,
}

impl<'a, T> Linked<'a, T> {
    pub fn new(urls: &Urls, slug: &str, id: i64, item: &'a T) -> Self {
        Linked {
            item,
            update_url: urls.update(slug, id),
            delete_url: urls.delete(slug, id),
        }
    }
}

/// Links to neighbouring pages, keeping every other query parameter.
#[derive(Debug, Serialize)]
pub struct PageLinks {
    pub first: String,
    pub previous: Option<String>,
    pub next: Option<String>,
    pub last: String,
}

impl PageLinks {
    pub fn new(base: &str, query: &FormData, info: &PageInfo) -> Self {
        let kept = query.without("page").to_query_string();
        let link = |number: i64| {
            if kept.is_empty() {
                format!("{}?page={}", base, number)
            } else {
                format!("{}?{}&page={}", base, kept, number)
            }
        };
        PageLinks {
            first: link(1),
            previous: info.previous_page_number.map(link),
            next: info.next_page_number.map(link),
            last: link(info.num_pages),
        }
    }
}

/// Adds `page_obj`, `is_paginated` and `page_links` for a page listed at `base`.
pub fn insert_page<T>(
    context: &mut Context,
    page: &Page<T>,
    base: &str,
    query: &FormData,
) -> Result<()> {
    insert(context, "page_obj", &page.info)?;
    context.insert("is_paginated".to_string(), page.is_paginated().into());
    insert(context, "page_links", &PageLinks::new(base, query, &page.info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::Paginator;

    #[test]
    fn page_links_keep_filters() {
        let info = Paginator::new(13, 6).page::<()>(2, vec![]).info;
        let query = FormData::parse("search=rust&page=2&technology=");
        let links = PageLinks::new("/resources/", &query, &info);
        assert_eq!(links.previous.as_deref(), Some("/resources/?search=rust&page=1"));
        assert_eq!(links.next.as_deref(), Some("/resources/?search=rust&page=3"));
        assert_eq!(links.last, "/resources/?search=rust&page=3");
    }

    #[test]
    fn view_accessors() {
        let view = View::redirect("/x/");
        assert_eq!(view.redirect_location(), Some("/x/"));
        assert!(view.context().is_none());
        let view = View::render("a.html", Context::new());
        assert_eq!(view.template(), Some("a.html"));
    }
}
