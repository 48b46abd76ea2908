//! Paginated listings
//!
//! Upstream list endpoints use one of two conventions: an `offset`/`limit`
//! counter, or a server supplied "next" link in a `*_links` array. Pages are
//! requested strictly in sequence since each request depends on the previous
//! response.

use super::client::CloudClient;
use serde_json::Value;

/// Safety ceiling for upstreams that keep returning full pages
const MAX_PAGES: usize = 1000;

/// Pagination convention used by a list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// `?offset=N&limit=P`, advancing N by P
    Offset,
    /// `?limit=P`, then follow `<links_key>[0].href`
    NextLink { links_key: String },
}

/// A list endpoint to walk
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub url: String,
    /// Key holding the item array in each page
    pub items_key: String,
    pub pagination: Pagination,
}

impl ListRequest {
    pub fn offset(url: String, items_key: &str) -> Self {
        Self {
            url,
            items_key: items_key.to_string(),
            pagination: Pagination::Offset,
        }
    }

    pub fn next_link(url: String, items_key: &str, links_key: &str) -> Self {
        Self {
            url,
            items_key: items_key.to_string(),
            pagination: Pagination::NextLink {
                links_key: links_key.to_string(),
            },
        }
    }
}

/// Append query parameters to a URL that may already carry some
pub fn with_query(url: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query)
}

fn first_page_url(list: &ListRequest, page_size: usize) -> String {
    match list.pagination {
        Pagination::Offset => with_query(
            &list.url,
            &[("offset", "0".to_string()), ("limit", page_size.to_string())],
        ),
        Pagination::NextLink { .. } => with_query(&list.url, &[("limit", page_size.to_string())]),
    }
}

/// Work out where the next page lives, or `None` when the listing is done
fn next_page_url(
    list: &ListRequest,
    page: &Value,
    items_on_page: usize,
    page_size: usize,
    offset: &mut usize,
) -> Option<String> {
    if items_on_page < page_size {
        return None;
    }

    match &list.pagination {
        Pagination::Offset => {
            *offset += page_size;
            Some(with_query(
                &list.url,
                &[("offset", offset.to_string()), ("limit", page_size.to_string())],
            ))
        }
        Pagination::NextLink { links_key } => page
            .get(links_key)
            .and_then(|links| links.get(0))
            .and_then(|link| link.get("href"))
            .and_then(|href| href.as_str())
            .map(str::to_string),
    }
}

/// Fetch every item of a paginated listing.
///
/// A failed or malformed page ends the walk; whatever was collected so far is
/// returned, so a failed first page yields an empty list.
pub async fn fetch_paginated(client: &CloudClient, list: &ListRequest, page_size: usize) -> Vec<Value> {
    let page_size = page_size.max(1);
    let mut all_items = Vec::new();
    let mut offset = 0;
    let mut url = first_page_url(list, page_size);

    for page_number in 0..MAX_PAGES {
        let Some(page) = client.get(&url).await else {
            tracing::warn!("Listing {} stopped at page {}: no data", list.url, page_number);
            break;
        };

        let Some(items) = page.get(&list.items_key).and_then(|v| v.as_array()) else {
            tracing::warn!(
                "Listing {} page {} has no '{}' array",
                list.url,
                page_number,
                list.items_key
            );
            break;
        };

        let count = items.len();
        all_items.extend(items.iter().cloned());

        match next_page_url(list, &page, count, page_size, &mut offset) {
            Some(next) => url = next,
            None => break,
        }
    }

    tracing::debug!("Listing {} returned {} items", list.url, all_items.len());
    all_items
}
