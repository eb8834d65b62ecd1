//! Page arithmetic plus the `Link` and `X-*` response headers for list
//! endpoints.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, HeaderName, HeaderValue, header, request::Parts},
};
use url::form_urlencoded;

use crate::config::PaginationConfig;

pub const X_PAGE: HeaderName = HeaderName::from_static("x-page");
pub const X_PER_PAGE: HeaderName = HeaderName::from_static("x-per-page");
pub const X_TOTAL: HeaderName = HeaderName::from_static("x-total");
pub const X_TOTAL_PAGES: HeaderName = HeaderName::from_static("x-total-pages");
pub const X_NEXT_PAGE: HeaderName = HeaderName::from_static("x-next-page");
pub const X_PREV_PAGE: HeaderName = HeaderName::from_static("x-prev-page");

/// The paging half of a list request: the raw `page`/`per_page` values plus
/// what is needed to rebuild the request URL in `Link` headers.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub host: Option<String>,
    pub path: String,
    /// Query parameters other than `page` and `per_page`, in request order.
    pub other_params: Vec<(String, String)>,
}

impl PageRequest {
    pub fn from_parts(parts: &Parts) -> Self {
        let mut request = PageRequest {
            host: parts
                .headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
                .or_else(|| parts.uri.authority().map(|a| a.to_string())),
            path: parts.uri.path().to_string(),
            ..Default::default()
        };

        let query = parts.uri.query().unwrap_or_default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                // non-numeric values count as absent
                "page" => request.page = value.parse().ok(),
                "per_page" => request.per_page = value.parse().ok(),
                _ => request.other_params.push((key.into_owned(), value.into_owned())),
            }
        }
        request
    }

    /// `http://<host><path>`, falling back to `base_url` when the request
    /// carried no host.
    pub fn page_url(&self, base_url: &str) -> String {
        match &self.host {
            Some(host) => format!("http://{}{}", host, self.path),
            None => format!("{}{}", base_url.trim_end_matches('/'), self.path),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PageRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PageRequest::from_parts(parts))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub total: i64,
    pub total_pages: i64,
    pub page: i64,
    pub per_page: i64,
    pub next_page: Option<i64>,
    pub prev_page: Option<i64>,
}

impl Pagination {
    pub fn new(total: i64, page: Option<i64>, per_page: Option<i64>, config: PaginationConfig) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let per_page = per_page
            .filter(|p| *p > 0)
            .unwrap_or(i64::from(config.default_per_page))
            .min(i64::from(config.max_per_page.max(1)));

        let total = total.max(0);
        let total_pages = ((total + per_page - 1) / per_page).max(1);

        Self {
            total,
            total_pages,
            page,
            per_page,
            next_page: (page < total_pages).then(|| page + 1),
            prev_page: (page > 1).then(|| page - 1),
        }
    }

    pub fn from_request(total: i64, request: &PageRequest, config: PaginationConfig) -> Self {
        Self::new(total, request.page, request.per_page, config)
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    /// Saturates for absurd page numbers; the store just returns no rows.
    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Relations in the order next, last, first, prev.
    pub fn link_header(&self, url: &str, other_params: &[(String, String)]) -> String {
        let link = |page: i64, rel: &str| {
            let mut query = form_urlencoded::Serializer::new(String::new());
            for (key, value) in other_params {
                query.append_pair(key, value);
            }
            query.append_pair("per_page", &self.per_page.to_string());
            query.append_pair("page", &page.to_string());
            format!("<{}?{}>; rel={}", url, query.finish(), rel)
        };

        let mut links = Vec::with_capacity(4);
        if let Some(next) = self.next_page {
            links.push(link(next, "next"));
        }
        links.push(link(self.total_pages, "last"));
        links.push(link(1, "first"));
        if let Some(prev) = self.prev_page {
            links.push(link(prev, "prev"));
        }
        links.join(", ")
    }

    pub fn headers(&self, request: &PageRequest, base_url: &str) -> HeaderMap {
        let optional = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_default();
        let link = self.link_header(&request.page_url(base_url), &request.other_params);

        let mut headers = HeaderMap::new();
        for (name, value) in [
            (X_PAGE, self.page.to_string()),
            (X_PER_PAGE, self.per_page.to_string()),
            (X_TOTAL, self.total.to_string()),
            (X_TOTAL_PAGES, self.total_pages.to_string()),
            (X_NEXT_PAGE, optional(self.next_page)),
            (X_PREV_PAGE, optional(self.prev_page)),
            (header::LINK, link),
        ] {
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(name, value);
            }
        }
        headers
    }
}
