use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::forms::{FieldErrors, Form, FormData, FormState, ResourceForm};
use crate::models::{Category, Resource, Taxonomy, Technology};
use crate::orm::Db;
use crate::query::{list_resources, ResourceFilter};
use crate::router::{AppState, Request};
use crate::urls::RESOURCES;
use crate::views::{base_context, insert, insert_page, urls, Linked, View};

pub const LIST_TEMPLATE: &str = "resourcehub/resources/index.html";
pub const CREATE_TEMPLATE: &str = "resourcehub/resources/create.html";
pub const UPDATE_TEMPLATE: &str = "resourcehub/resources/update.html";
pub const DELETE_TEMPLATE: &str = "resourcehub/resources/delete.html";

/// A technology or category option in a select box.
#[derive(Debug, Serialize)]
struct Choice<'a> {
    id: i64,
    name: &'a str,
    selected: bool,
}

fn choices<'a, T: Taxonomy>(items: &'a [T], selected: &[i64]) -> Vec<Choice<'a>> {
    items
        .iter()
        .map(|item| Choice {
            id: item.id(),
            name: item.name(),
            selected: selected.contains(&item.id()),
        })
        .collect()
}

/// Raw filter values echoed back into the filter bar.
#[derive(Debug, Serialize)]
struct Filters<'a> {
    search: &'a str,
    technology: &'a str,
    category: &'a str,
    active: bool,
}

/// Newest first, filtered by `search`, `technology` and `category`, six per page.
pub async fn list(request: Request, state: AppState) -> Result<View> {
    let filter = ResourceFilter::from_query(&request.query);
    let page = list_resources(&state.db, &filter, request.query.get("page")).await?;
    let technologies = Technology::all(&state.db).await?;
    let categories = Category::all(&state.db).await?;

    let urls = urls(&state);
    let items: Vec<_> = page
        .items
        .iter()
        .map(|resource| Linked::new(&urls, RESOURCES, resource.id, resource))
        .collect();

    let mut context = base_context(&state, "resources")?;
    insert(&mut context, "resources", &items)?;
    insert_page(&mut context, &page, &urls.list(RESOURCES), &request.query)?;
    insert(
        &mut context,
        "all_technologies",
        &choices(&technologies, filter.technology.id().as_slice()),
    )?;
    insert(
        &mut context,
        "all_categories",
        &choices(&categories, filter.category.id().as_slice()),
    )?;
    insert(
        &mut context,
        "filters",
        &Filters {
            search: request.query.get("search").unwrap_or(""),
            technology: request.query.get("technology").unwrap_or(""),
            category: request.query.get("category").unwrap_or(""),
            active: filter.is_active(),
        },
    )?;
    Ok(View::render(LIST_TEMPLATE, context))
}

/// Validate and persist. `Some(form)` comes back when the input must be redisplayed.
async fn save(db: &Db, data: &FormData, instance: Option<i64>) -> Result<Option<FormState>> {
    let input = match ResourceForm::validate(db, data, instance).await?.into_result() {
        Ok(input) => input,
        Err(AppError::Validation(errors)) => {
            return Ok(Some(FormState::bound::<ResourceForm>(data, errors)));
        }
        Err(e) => return Err(e),
    };
    match instance {
        Some(id) => Resource::update(db, id, &input).await?,
        None => Resource::create(db, &input, Utc::now()).await?,
    };
    Ok(None)
}

/// The submitted or stored values of a resource, shaped like a form submission.
fn initial_data(resource: &Resource) -> FormData {
    let mut data = FormData::new();
    data.push("title", &resource.title);
    data.push("url", resource.url.clone().unwrap_or_default());
    data.push("description", &resource.description);
    if let Some(technology) = &resource.technology {
        data.push("technology", technology.id.to_string());
    }
    for category in &resource.categories {
        data.push("categories", category.id.to_string());
    }
    data
}

async fn form_page(
    state: &AppState,
    template: &str,
    section: &str,
    form: FormState,
    resource: Option<&Resource>,
) -> Result<View> {
    let technologies = Technology::all(&state.db).await?;
    let categories = Category::all(&state.db).await?;
    let technology: Vec<i64> = form.value("technology").trim().parse::<i64>().into_iter().collect();
    let selected: Vec<i64> = form
        .values_of("categories")
        .iter()
        .filter_map(|raw| raw.trim().parse().ok())
        .collect();

    let mut context = base_context(state, section)?;
    insert(&mut context, "form", &form)?;
    insert(&mut context, "all_technologies", &choices(&technologies, &technology))?;
    insert(&mut context, "all_categories", &choices(&categories, &selected))?;
    if let Some(resource) = resource {
        let linked = Linked::new(&urls(state), RESOURCES, resource.id, resource);
        insert(&mut context, "object", &linked)?;
        insert(&mut context, "resource", &linked)?;
    }
    Ok(View::render(template, context))
}

pub async fn create(request: Request, state: AppState) -> Result<View> {
    let form = if request.is_post() {
        match save(&state.db, &request.form, None).await? {
            None => return Ok(View::redirect(urls(&state).list(RESOURCES))),
            Some(form) => form,
        }
    } else {
        FormState::unbound::<ResourceForm>()
    };
    form_page(&state, CREATE_TEMPLATE, "add_resource", form, None).await
}

/// Edit title, url, description, technology and categories. `created_at` is never touched.
pub async fn update(request: Request, state: AppState) -> Result<View> {
    let id = request.param_id("id")?;
    let resource = Resource::get(&state.db, id).await?;
    let form = if request.is_post() {
        match save(&state.db, &request.form, Some(id)).await? {
            None => return Ok(View::redirect(urls(&state).list(RESOURCES))),
            Some(form) => form,
        }
    } else {
        FormState::bound::<ResourceForm>(&initial_data(&resource), FieldErrors::default())
    };
    form_page(&state, UPDATE_TEMPLATE, "resources", form, Some(&resource)).await
}

/// GET asks for confirmation, POST deletes.
pub async fn delete(request: Request, state: AppState) -> Result<View> {
    let id = request.param_id("id")?;
    let urls = urls(&state);
    if request.is_post() {
        Resource::delete(&state.db, id).await?;
        return Ok(View::redirect(urls.list(RESOURCES)));
    }
    let resource = Resource::get(&state.db, id).await?;
    let mut context = base_context(&state, "resources")?;
    insert(
        &mut context,
        "object",
        &Linked::new(&urls, RESOURCES, resource.id, &resource),
    )?;
    Ok(View::render(DELETE_TEMPLATE, context))
}
