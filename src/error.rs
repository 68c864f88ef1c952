use thiserror::Error;

use crate::forms::FieldErrors;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("template error: {0}")]
    Template(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    /// HTTP status this error is reported with when it escapes a view.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Database(_) | AppError::Template(_) => 500,
        }
    }

    /// Turn a store-level uniqueness violation on `field` into a validation error.
    pub fn from_unique_violation(err: sqlx::Error, field: &str, message: &str) -> Self {
        let is_unique = matches!(
            &err,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation()
        );
        if is_unique {
            let mut errors = FieldErrors::default();
            errors.add(field, message);
            AppError::Validation(errors)
        } else {
            AppError::Database(err)
        }
    }
}
