use crate::error::Result;
use crate::models::Technology;
use crate::router::{AppState, Request};
use crate::urls::TECHNOLOGIES;
use crate::views::taxonomy::{self, TaxonomyPage};
use crate::views::View;

impl TaxonomyPage for Technology {
    const SLUG: &'static str = TECHNOLOGIES;
    const LIST_TEMPLATE: &'static str = "resourcehub/technologies/index.html";
    const CREATE_TEMPLATE: &'static str = "resourcehub/technologies/create.html";
    const UPDATE_TEMPLATE: &'static str = "resourcehub/technologies/update.html";
    const DELETE_TEMPLATE: &'static str = "resourcehub/technologies/delete.html";
}

pub async fn list(request: Request, state: AppState) -> Result<View> {
    taxonomy::list::<Technology>(request, state).await
}

pub async fn create(request: Request, state: AppState) -> Result<View> {
    taxonomy::create::<Technology>(request, state).await
}

pub async fn update(request: Request, state: AppState) -> Result<View> {
    taxonomy::update::<Technology>(request, state).await
}

/// Resources that used the technology keep existing with no technology.
pub async fn delete(request: Request, state: AppState) -> Result<View> {
    taxonomy::delete::<Technology>(request, state).await
}
