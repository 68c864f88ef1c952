//! Named routes, all mounted under the configured prefix.
//!
//! `register` wires the route table into a `Router`; `Urls` builds the same
//! paths for redirects and template links.

use serde::Serialize;

use crate::route;
use crate::router::Router;
use crate::settings::normalize_prefix;
use crate::views::{categories, dashboard, resources, technologies};

pub const RESOURCES: &str = "resources";
pub const CATEGORIES: &str = "categories";
pub const TECHNOLOGIES: &str = "technologies";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Urls {
    prefix: String,
}

/// Sidebar and header links handed to every page as `urls`.
#[derive(Debug, Clone, Serialize)]
pub struct NavUrls {
    pub dashboard: String,
    pub resources: String,
    pub create_resource: String,
    pub categories: String,
    pub create_category: String,
    pub technologies: String,
    pub create_technology: String,
}

impl Urls {
    pub fn new(prefix: &str) -> Self {
        Urls {
            prefix: normalize_prefix(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn dashboard(&self) -> String {
        format!("{}/", self.prefix)
    }

    pub fn list(&self, slug: &str) -> String {
        format!("{}/{}/", self.prefix, slug)
    }

    pub fn create(&self, slug: &str) -> String {
        format!("{}/{}/create/", self.prefix, slug)
    }

    pub fn update(&self, slug: &str, id: i64) -> String {
        format!("{}/{}/{}/update/", self.prefix, slug, id)
    }

    pub fn delete(&self, slug: &str, id: i64) -> String {
        format!("{}/{}/{}/delete/", self.prefix, slug, id)
    }

    /// Route pattern for `path` under the prefix.
    pub fn pattern(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }

    pub fn nav(&self) -> NavUrls {
        NavUrls {
            dashboard: self.dashboard(),
            resources: self.list(RESOURCES),
            create_resource: self.create(RESOURCES),
            categories: self.list(CATEGORIES),
            create_category: self.create(CATEGORIES),
            technologies: self.list(TECHNOLOGIES),
            create_technology: self.create(TECHNOLOGIES),
        }
    }
}

/// Register every page under `urls.prefix()`.
pub fn register(router: &mut Router, urls: &Urls) {
    route!(router,
        [Get] urls.pattern("/") => { dashboard::home },

        [Get] urls.pattern("/resources/") => { resources::list },
        [Get, Post] urls.pattern("/resources/create/") => { resources::create },
        [Get, Post] urls.pattern("/resources/:id/update/") => { resources::update },
        [Get, Post] urls.pattern("/resources/:id/delete/") => { resources::delete },

        [Get] urls.pattern("/categories/") => { categories::list },
        [Get, Post] urls.pattern("/categories/create/") => { categories::create },
        [Get, Post] urls.pattern("/categories/:id/update/") => { categories::update },
        [Get, Post] urls.pattern("/categories/:id/delete/") => { categories::delete },

        [Get] urls.pattern("/technologies/") => { technologies::list },
        [Get, Post] urls.pattern("/technologies/create/") => { technologies::create },
        [Get, Post] urls.pattern("/technologies/:id/update/") => { technologies::update },
        [Get, Post] urls.pattern("/technologies/:id/delete/") => { technologies::delete },
    );
    log::debug!(
        "Registered {} routes under `{}`",
        router.routes.len(),
        urls.prefix()
    );
}
