//! Page-number pagination.
//!
//! Page 1 always exists, even for an empty collection. Any other page outside
//! `1..=num_pages`, or a page value that is not a number (or `last`), is a 404.

use serde::Serialize;

use crate::error::{AppError, Result};

pub const RESOURCES_PER_PAGE: i64 = 6;
pub const TAXONOMY_PER_PAGE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub count: i64,
    pub per_page: i64,
}

impl Paginator {
    pub fn new(count: i64, per_page: i64) -> Self {
        Paginator {
            count: count.max(0),
            per_page: per_page.max(1),
        }
    }

    pub fn num_pages(&self) -> i64 {
        if self.count == 0 {
            1
        } else {
            (self.count + self.per_page - 1) / self.per_page
        }
    }

    /// Resolve the raw `page` query value to a valid page number.
    pub fn validate_number(&self, raw: Option<&str>) -> Result<i64> {
        let raw = raw.map(str::trim).unwrap_or("");
        let number = match raw {
            "" => 1,
            "last" => self.num_pages(),
            other => other
                .parse::<i64>()
                .map_err(|_| AppError::not_found(format!("page `{}`", other)))?,
        };
        if number < 1 || number > self.num_pages() {
            return Err(AppError::not_found(format!("page {}", number)));
        }
        Ok(number)
    }

    pub fn offset(&self, number: i64) -> i64 {
        (number - 1) * self.per_page
    }

    pub fn page<T>(&self, number: i64, items: Vec<T>) -> Page<T> {
        let num_pages = self.num_pages();
        let (start_index, end_index) = if self.count == 0 {
            (0, 0)
        } else {
            (
                self.offset(number) + 1,
                (self.offset(number) + self.per_page).min(self.count),
            )
        };
        Page {
            items,
            info: PageInfo {
                number,
                num_pages,
                count: self.count,
                per_page: self.per_page,
                has_next: number < num_pages,
                has_previous: number > 1,
                has_other_pages: num_pages > 1,
                next_page_number: (number < num_pages).then_some(number + 1),
                previous_page_number: (number > 1).then_some(number - 1),
                start_index,
                end_index,
            },
        }
    }
}

/// Where a page sits in the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub per_page: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub has_other_pages: bool,
    pub next_page_number: Option<i64>,
    pub previous_page_number: Option<i64>,
    /// 1-based position of the first item on the page, 0 when the collection is empty.
    pub start_index: i64,
    pub end_index: i64,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub info: PageInfo,
}

impl<T> Page<T> {
    pub fn is_paginated(&self) -> bool {
        self.info.has_other_pages
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirteen_items_make_three_pages_of_six() {
        let p = Paginator::new(13, RESOURCES_PER_PAGE);
        assert_eq!(p.num_pages(), 3);
        assert_eq!(p.validate_number(Some("3")).unwrap(), 3);
        assert_eq!(p.offset(3), 12);
        assert!(matches!(
            p.validate_number(Some("4")),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn blank_and_last_pages() {
        let p = Paginator::new(25, TAXONOMY_PER_PAGE);
        assert_eq!(p.validate_number(None).unwrap(), 1);
        assert_eq!(p.validate_number(Some("")).unwrap(), 1);
        assert_eq!(p.validate_number(Some("last")).unwrap(), 3);
        assert!(p.validate_number(Some("two")).is_err());
        assert!(p.validate_number(Some("0")).is_err());
        assert!(p.validate_number(Some("-1")).is_err());
    }

    #[test]
    fn empty_collection_has_first_page_only() {
        let p = Paginator::new(0, RESOURCES_PER_PAGE);
        assert_eq!(p.num_pages(), 1);
        assert_eq!(p.validate_number(Some("1")).unwrap(), 1);
        assert!(p.validate_number(Some("2")).is_err());
        let page = p.page::<()>(1, vec![]);
        assert_eq!((page.info.start_index, page.info.end_index), (0, 0));
        assert!(!page.info.has_next && !page.info.has_previous);
        assert!(!page.is_paginated());
    }

    #[test]
    fn page_bounds() {
        let p = Paginator::new(13, 6);
        let page = p.page(3, vec![13]);
        assert_eq!((page.info.start_index, page.info.end_index), (13, 13));
        assert_eq!(page.info.previous_page_number, Some(2));
        assert_eq!(page.info.next_page_number, None);
        assert!(page.is_paginated());
    }
}
