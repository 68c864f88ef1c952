use crate::error::Result;
use crate::models::Category;
use crate::router::{AppState, Request};
use crate::urls::CATEGORIES;
use crate::views::taxonomy::{self, TaxonomyPage};
use crate::views::View;

impl TaxonomyPage for Category {
    const SLUG: &'static str = CATEGORIES;
    const LIST_TEMPLATE: &'static str = "resourcehub/categories/index.html";
    const CREATE_TEMPLATE: &'static str = "resourcehub/categories/category-form.html";
    const UPDATE_TEMPLATE: &'static str = "resourcehub/categories/update.html";
    const DELETE_TEMPLATE: &'static str = "resourcehub/categories/delete.html";
}

pub async fn list(request: Request, state: AppState) -> Result<View> {
    taxonomy::list::<Category>(request, state).await
}

pub async fn create(request: Request, state: AppState) -> Result<View> {
    taxonomy::create::<Category>(request, state).await
}

pub async fn update(request: Request, state: AppState) -> Result<View> {
    taxonomy::update::<Category>(request, state).await
}

/// Deleting a category only unlinks it from its resources.
pub async fn delete(request: Request, state: AppState) -> Result<View> {
    taxonomy::delete::<Category>(request, state).await
}
