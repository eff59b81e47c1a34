//! Cursor pagination.
//!
//! A page token is the hex form of the big-endian row id that starts the
//! next page. Every list query follows the same convention:
//!
//! ```text
//! WHERE id >= decode(token) ORDER BY id LIMIT page_size + 1
//! ```
//!
//! If `page_size + 1` rows come back, the last one only seeds the next token
//! and is trimmed from the results. Inserts after the cursor never shift rows
//! already returned; deletes before it can shrink a page.

use serde::{Deserialize, Serialize};

/// Default number of results per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Upper bound on `page_size`.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Encode a row id into an opaque page token.
pub fn encode_token(id: u64) -> String {
    hex::encode(id.to_be_bytes())
}

/// Decode a page token back into the row id it was built from.
///
/// Empty or malformed tokens decode to `0`, which starts from the beginning.
pub fn decode_token(token: &str) -> u64 {
    if token.is_empty() {
        return 0;
    }
    match hex::decode(token) {
        Ok(bytes) => match <[u8; 8]>::try_from(bytes.as_slice()) {
            Ok(raw) => u64::from_be_bytes(raw),
            Err(_) => 0,
        },
        Err(_) => 0,
    }
}

/// Page request carried by every list operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, rename = "pageToken")]
    pub page_token: String,
    #[serde(default, rename = "pageSize")]
    pub page_size: usize,
}

impl Pagination {
    pub fn new(page_token: impl Into<String>, page_size: usize) -> Self {
        Self {
            page_token: page_token.into(),
            page_size,
        }
    }

    /// Page size clamped to `[DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE]`.
    pub fn size(&self) -> usize {
        self.page_size.clamp(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    /// Lower bound (inclusive) for the next query.
    pub fn cursor(&self) -> u64 {
        decode_token(&self.page_token)
    }

    /// How many rows the store should fetch: one extra to detect a next page.
    pub fn fetch_limit(&self) -> usize {
        self.size() + 1
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    #[serde(rename = "nextPageToken", skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Build a page from up to `page_size + 1` rows sorted by ascending id.
    pub fn from_rows(
        mut rows: Vec<T>,
        total_size: u64,
        pg: &Pagination,
        id_of: impl Fn(&T) -> u64,
    ) -> Self {
        let size = pg.size();
        let next_page_token = if rows.len() > size {
            let token = encode_token(id_of(&rows[size]));
            rows.truncate(size);
            Some(token)
        } else {
            None
        };
        Self {
            results: rows,
            total_size,
            next_page_token,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            total_size: self.total_size,
            next_page_token: self.next_page_token,
        }
    }
}
