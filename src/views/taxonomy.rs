//! List, create, update and delete pages shared by technologies and categories.

use crate::error::{AppError, Result};
use crate::forms::{FieldErrors, Form, FormData, FormState, NameForm};
use crate::models::Taxonomy;
use crate::orm::Db;
use crate::pagination::{Paginator, TAXONOMY_PER_PAGE};
use crate::router::{AppState, Request};
use crate::views::{base_context, insert, insert_page, urls, Linked, View};

/// Where a taxonomy's pages live and what they are called.
pub trait TaxonomyPage: Taxonomy {
    /// URL segment, sidebar section and list context key, e.g. `categories`.
    const SLUG: &'static str;
    const LIST_TEMPLATE: &'static str;
    const CREATE_TEMPLATE: &'static str;
    const UPDATE_TEMPLATE: &'static str;
    const DELETE_TEMPLATE: &'static str;
}

/// Ordered by name, ten per page, with a blank inline create form.
pub async fn list<T: TaxonomyPage>(request: Request, state: AppState) -> Result<View> {
    let paginator = Paginator::new(T::count(&state.db).await?, TAXONOMY_PER_PAGE);
    let number = paginator.validate_number(request.query.get("page"))?;
    let items = T::page(&state.db, paginator.offset(number), paginator.per_page).await?;
    let page = paginator.page(number, items);

    let urls = urls(&state);
    let linked: Vec<_> = page
        .items
        .iter()
        .map(|item| Linked::new(&urls, T::SLUG, item.id(), item))
        .collect();

    let mut context = base_context(&state, T::SLUG)?;
    insert(&mut context, T::SLUG, &linked)?;
    insert_page(&mut context, &page, &urls.list(T::SLUG), &request.query)?;
    insert(&mut context, "form", &FormState::unbound::<NameForm<T>>())?;
    Ok(View::render(T::LIST_TEMPLATE, context))
}

/// Validate and persist a name. `Some(form)` comes back when the input must be redisplayed,
/// including when a concurrent insert claimed the name first.
async fn save<T: TaxonomyPage>(
    db: &Db,
    data: &FormData,
    instance: Option<i64>,
) -> Result<Option<FormState>> {
    let name = match NameForm::<T>::validate(db, data, instance).await?.into_result() {
        Ok(name) => name,
        Err(AppError::Validation(errors)) => {
            return Ok(Some(FormState::bound::<NameForm<T>>(data, errors)));
        }
        Err(e) => return Err(e),
    };
    let saved = match instance {
        Some(id) => T::update(db, id, &name).await,
        None => T::create(db, &name).await,
    };
    match saved {
        Ok(_) => Ok(None),
        Err(AppError::Validation(errors)) => Ok(Some(FormState::bound::<NameForm<T>>(data, errors))),
        Err(e) => Err(e),
    }
}

pub async fn create<T: TaxonomyPage>(request: Request, state: AppState) -> Result<View> {
    let form = if request.is_post() {
        match save::<T>(&state.db, &request.form, None).await? {
            None => return Ok(View::redirect(urls(&state).list(T::SLUG))),
            Some(form) => form,
        }
    } else {
        FormState::unbound::<NameForm<T>>()
    };
    let mut context = base_context(&state, T::SLUG)?;
    insert(&mut context, "form", &form)?;
    Ok(View::render(T::CREATE_TEMPLATE, context))
}

pub async fn update<T: TaxonomyPage>(request: Request, state: AppState) -> Result<View> {
    let id = request.param_id("id")?;
    let object = T::get(&state.db, id).await?;
    let form = if request.is_post() {
        match save::<T>(&state.db, &request.form, Some(id)).await? {
            None => return Ok(View::redirect(urls(&state).list(T::SLUG))),
            Some(form) => form,
        }
    } else {
        let initial = FormData::from_pairs([("name", object.name())]);
        FormState::bound::<NameForm<T>>(&initial, FieldErrors::default())
    };
    let mut context = base_context(&state, T::SLUG)?;
    insert(&mut context, "form", &form)?;
    insert(
        &mut context,
        "object",
        &Linked::new(&urls(&state), T::SLUG, id, &object),
    )?;
    Ok(View::render(T::UPDATE_TEMPLATE, context))
}

/// GET asks for confirmation, POST deletes. Resources that used the record are kept.
pub async fn delete<T: TaxonomyPage>(request: Request, state: AppState) -> Result<View> {
    let id = request.param_id("id")?;
    let urls = urls(&state);
    if request.is_post() {
        T::delete(&state.db, id).await?;
        return Ok(View::redirect(urls.list(T::SLUG)));
    }
    let object = T::get(&state.db, id).await?;
    let mut context = base_context(&state, T::SLUG)?;
    insert(&mut context, "object", &Linked::new(&urls, T::SLUG, id, &object))?;
    Ok(View::render(T::DELETE_TEMPLATE, context))
}
