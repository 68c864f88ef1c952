//! Form decoding and validation.
//!
//! A form turns submitted `FormData` into either cleaned, typed input or a map of
//! per-field error messages. Nothing is persisted here; views decide what to do
//! with a valid result.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Category, ResourceInput, Taxonomy, Technology};
use crate::orm::Db;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_URL: &str = "Enter a valid URL.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// Ordered, multi-valued key/value pairs from a query string or url-encoded body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pairs: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Self {
        Self::parse_bytes(input.as_bytes())
    }

    pub fn parse_bytes(input: &[u8]) -> Self {
        FormData {
            pairs: url::form_urlencoded::parse(input)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        FormData {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Last value submitted for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value for `key` with surrounding whitespace removed; blank counts as absent.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Copy without `key` and without blank values, e.g. to rebuild filter links around `page`.
    pub fn without(&self, key: &str) -> FormData {
        FormData {
            pairs: self
                .pairs
                .iter()
                .filter(|(k, v)| k != key && !v.trim().is_empty())
                .cloned()
                .collect(),
        }
    }

    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// First error message per field, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    /// Record `message` for `field` unless the field already has an error.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Outcome of validating a form: errors, and the cleaned value when there are none.
#[derive(Debug, Clone)]
pub struct FormResult<T> {
    pub errors: FieldErrors,
    pub cleaned_data: Option<T>,
}

impl<T> FormResult<T> {
    fn finish(errors: FieldErrors, cleaned: impl FnOnce() -> Option<T>) -> Self {
        let cleaned_data = if errors.is_empty() { cleaned() } else { None };
        FormResult {
            errors,
            cleaned_data,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.cleaned_data.is_some()
    }

    pub fn into_result(self) -> Result<T> {
        match self.cleaned_data {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => Err(AppError::Validation(self.errors)),
        }
    }
}

#[async_trait::async_trait]
pub trait Form {
    type Output: Send;

    /// Field names in display order.
    const FIELDS: &'static [&'static str];

    /// Validate `data`. `instance` is the id of the record being edited, if any,
    /// so uniqueness checks can ignore it.
    async fn validate(
        db: &Db,
        data: &FormData,
        instance: Option<i64>,
    ) -> Result<FormResult<Self::Output>>;
}

fn max_length_message(max: usize, actual: usize) -> String {
    format!(
        "Ensure this value has at most {} characters (it has {}).",
        max, actual
    )
}

/// Trimmed text field with an optional length limit.
fn clean_text(
    data: &FormData,
    field: &str,
    required: bool,
    max_length: Option<usize>,
    errors: &mut FieldErrors,
) -> Option<String> {
    let Some(value) = data.get_trimmed(field) else {
        if required {
            errors.add(field, REQUIRED);
        }
        return None;
    };
    if let Some(max) = max_length {
        let len = value.chars().count();
        if len > max {
            errors.add(field, max_length_message(max, len));
            return None;
        }
    }
    Some(value.to_string())
}

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^(?:https?|ftps?)://
        (?:[^\s:@/]+(?::[^\s:@/]*)?@)?
        (?:
            (?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(?:\.(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}
          | \[[0-9a-f:.]+\]
          | localhost
          | [a-z\x{00a1}-\x{ffff}0-9](?:[a-z\x{00a1}-\x{ffff}0-9-]{0,61}[a-z\x{00a1}-\x{ffff}0-9])?
            (?:\.[a-z\x{00a1}-\x{ffff}0-9](?:[a-z\x{00a1}-\x{ffff}0-9-]{0,61}[a-z\x{00a1}-\x{ffff}0-9])?)*
            \.(?:[a-z\x{00a1}-\x{ffff}]{2,63}|xn--[a-z0-9]{1,59})\.?
        )
        (?::\d{1,5})?
        (?:[/?\#]\S*)?
        $",
    )
    .expect("URL pattern compiles")
});

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme pattern compiles"));

/// Normalize and validate a URL. Values without a scheme of their own are assumed to be `http://`.
pub fn clean_url(raw: &str) -> std::result::Result<String, &'static str> {
    let value = raw.trim();
    let candidate = if SCHEME_RE.is_match(value) {
        value.to_string()
    } else {
        format!("http://{}", value)
    };
    if URL_RE.is_match(&candidate) {
        Ok(candidate)
    } else {
        Err(INVALID_URL)
    }
}

/// Validates the name field shared by technologies and categories.
pub struct NameForm<T>(PhantomData<T>);

pub type TechnologyForm = NameForm<Technology>;
pub type CategoryForm = NameForm<Category>;

pub const NAME_MAX_LENGTH: usize = 100;

#[async_trait::async_trait]
impl<T: Taxonomy> Form for NameForm<T> {
    type Output = String;

    const FIELDS: &'static [&'static str] = &["name"];

    async fn validate(
        db: &Db,
        data: &FormData,
        instance: Option<i64>,
    ) -> Result<FormResult<String>> {
        let mut errors = FieldErrors::default();
        let name = clean_text(data, "name", true, Some(NAME_MAX_LENGTH), &mut errors);
        if let Some(name) = &name {
            if T::name_taken(db, name, instance).await? {
                errors.add("name", T::unique_message());
            }
        }
        Ok(FormResult::finish(errors, || name))
    }
}

pub struct ResourceForm;

pub const TITLE_MAX_LENGTH: usize = 200;
pub const URL_MAX_LENGTH: usize = 2000;

#[async_trait::async_trait]
impl Form for ResourceForm {
    type Output = ResourceInput;

    const FIELDS: &'static [&'static str] =
        &["title", "url", "description", "technology", "categories"];

    async fn validate(
        db: &Db,
        data: &FormData,
        _instance: Option<i64>,
    ) -> Result<FormResult<ResourceInput>> {
        let mut errors = FieldErrors::default();

        let title = clean_text(data, "title", true, Some(TITLE_MAX_LENGTH), &mut errors);

        let url = match data.get_trimmed("url") {
            None => None,
            Some(raw) => match clean_url(raw) {
                Ok(url) if url.chars().count() > URL_MAX_LENGTH => {
                    errors.add("url", max_length_message(URL_MAX_LENGTH, url.chars().count()));
                    None
                }
                Ok(url) => Some(url),
                Err(message) => {
                    errors.add("url", message);
                    None
                }
            },
        };

        let description = clean_text(data, "description", true, None, &mut errors);

        let technology_id = match data.get_trimmed("technology") {
            None => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) if Technology::exists(db, id).await? => Some(id),
                _ => {
                    errors.add("technology", INVALID_CHOICE);
                    None
                }
            },
        };

        let mut category_ids: Vec<i64> = Vec::new();
        for raw in data.get_all("categories") {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match raw.parse::<i64>() {
                Ok(id) if Category::exists(db, id).await? => {
                    if !category_ids.contains(&id) {
                        category_ids.push(id);
                    }
                }
                _ => {
                    errors.add(
                        "categories",
                        format!(
                            "Select a valid choice. {} is not one of the available choices.",
                            raw
                        ),
                    );
                }
            }
        }

        Ok(FormResult::finish(errors, || {
            Some(ResourceInput {
                title: title?,
                url,
                description: description?,
                technology_id,
                category_ids,
            })
        }))
    }
}

/// Submitted values and errors of a bound form, as handed to templates for redisplay.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FormState {
    pub values: BTreeMap<String, String>,
    pub multi: BTreeMap<String, Vec<String>>,
    pub errors: FieldErrors,
    pub has_errors: bool,
}

impl FormState {
    /// State of a form bound to submitted data.
    pub fn bound<F: Form>(data: &FormData, errors: FieldErrors) -> Self {
        let mut state = FormState::default();
        for field in F::FIELDS {
            state
                .values
                .insert(field.to_string(), data.get(field).unwrap_or("").to_string());
            state.multi.insert(
                field.to_string(),
                data.get_all(field).into_iter().map(str::to_string).collect(),
            );
        }
        state.has_errors = !errors.is_empty();
        state.errors = errors;
        state
    }

    /// Blank form, for create pages.
    pub fn unbound<F: Form>() -> Self {
        Self::bound::<F>(&FormData::new(), FieldErrors::default())
    }

    pub fn value(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn values_of(&self, field: &str) -> &[String] {
        self.multi.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}
