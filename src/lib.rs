pub mod error;
pub mod forms;
pub mod models;
pub mod orm;
pub mod pagination;
pub mod query;
pub mod router;
pub mod settings;
pub mod stats;
pub mod template;
pub mod urls;
pub mod views;

inventory::collect!(crate::orm::Migration);
