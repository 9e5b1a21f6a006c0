//! Shared pagination utilities
//!
//! List endpoints return a bare JSON array and describe paging in headers:
//! `X-Total-Count` carries the total number of items and `Link` carries the
//! `next`, `prev`, `last` and `first` page URIs.
//!
//! # Examples
//!
//! ```rust,ignore
//! use cura_server::features::shared::pagination::PageRequest;
//!
//! let request = PageRequest::new(Some(1), Some(20));
//! let page = request.slice(events);
//! let headers = page.headers("/api/audits/entity/changes", &[("entityType", "Gene".into())]);
//! ```

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Page request parameters
///
/// `page` is 0-based. Without `size` the whole result is one page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl PageRequest {
    pub fn new(page: Option<i64>, size: Option<i64>) -> Self {
        Self { page, size }
    }

    /// Validate pagination parameters
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.page.is_some_and(|page| page < 0) {
            return Err("Page must not be negative");
        }
        if self.size.is_some_and(|size| size < 1) {
            return Err("Size must be greater than 0");
        }
        Ok(())
    }

    /// Cut one page out of an already ordered result
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let number = usize::try_from(self.page.unwrap_or(0)).unwrap_or(0);
        let size = self
            .size
            .and_then(|size| usize::try_from(size).ok())
            .filter(|&size| size > 0)
            .unwrap_or(total.max(1));

        let items = items
            .into_iter()
            .skip(number.saturating_mul(size))
            .take(size)
            .collect();

        Page {
            items,
            number,
            size,
            total,
        }
    }
}

/// One page of a list result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 0-based page number
    pub number: usize,
    pub size: usize,
    /// Items across all pages
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.size)
    }

    /// `X-Total-Count` and `Link` headers for this page
    ///
    /// `params` are the request's own query parameters, repeated in every
    /// link ahead of `page` and `size`.
    pub fn headers(&self, path: &str, params: &[(&str, String)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(TOTAL_COUNT_HEADER),
            HeaderValue::from(self.total),
        );

        let link = self.link_header(path, params);
        if let Ok(value) = HeaderValue::from_str(&link) {
            headers.insert(axum::http::header::LINK, value);
        }
        headers
    }

    fn link_header(&self, path: &str, params: &[(&str, String)]) -> String {
        let last = self.total_pages().saturating_sub(1);
        let uri = |page: usize| {
            let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            query.push(format!("page={page}"));
            query.push(format!("size={}", self.size));
            format!("<{}?{}>", path, query.join("&"))
        };

        let mut links = Vec::new();
        if self.number < last {
            links.push(format!("{}; rel=\"next\"", uri(self.number + 1)));
        }
        if self.number > 0 {
            links.push(format!("{}; rel=\"prev\"", uri(self.number - 1)));
        }
        links.push(format!("{}; rel=\"last\"", uri(last)));
        links.push(format!("{}; rel=\"first\"", uri(0)));
        links.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(PageRequest::new(Some(0), Some(20)).validate().is_ok());
        assert!(PageRequest::new(Some(-1), None).validate().is_err());
        assert!(PageRequest::new(None, Some(0)).validate().is_err());
    }

    #[test]
    fn test_default_is_one_page_with_everything() {
        let page = PageRequest::default().slice((0..7).collect::<Vec<_>>());
        assert_eq!(page.items.len(), 7);
        assert_eq!(page.total_pages(), 1);
    }

    #[test]
    fn test_slice_middle_page() {
        let page = PageRequest::new(Some(1), Some(3)).slice((0..7).collect::<Vec<_>>());
        assert_eq!(page.items, vec![3, 4, 5]);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let page = PageRequest::new(Some(5), Some(3)).slice((0..7).collect::<Vec<_>>());
        assert!(page.items.is_empty());
        assert_eq!(page.total, 7);
    }

    #[test]
    fn test_empty_result() {
        let page = PageRequest::default().slice(Vec::<i32>::new());
        assert_eq!(page.total_pages(), 0);
        let headers = page.headers("/items", &[]);
        assert_eq!(headers[TOTAL_COUNT_HEADER], "0");
    }

    #[test]
    fn test_link_header() {
        let page = PageRequest::new(Some(1), Some(3)).slice((0..7).collect::<Vec<_>>());
        let headers = page.headers("/api/items", &[("type", "Gene".to_string())]);

        let link = headers[axum::http::header::LINK].to_str().unwrap();
        assert!(link.contains("</api/items?type=Gene&page=2&size=3>; rel=\"next\""));
        assert!(link.contains("</api/items?type=Gene&page=0&size=3>; rel=\"prev\""));
        assert!(link.contains("</api/items?type=Gene&page=2&size=3>; rel=\"last\""));
        assert!(link.contains("</api/items?type=Gene&page=0&size=3>; rel=\"first\""));
        assert_eq!(headers[TOTAL_COUNT_HEADER], "7");
    }
}
