//! Forward-only cursor pagination.
//!
//! Key-range listings use the last returned key as the cursor, encoded as
//! URL-safe unpadded base64. Collection membership is a stored sequence
//! rather than a key range, so its cursor encodes a decimal offset instead.
//! Clients treat both as opaque.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use folio_types::config::PaginationConfig;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::engine::KvRead;
use crate::error::{Result, StoreError, ensure_active};

/// Listing request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    /// Requested page size; zero selects the default.
    #[serde(default)]
    pub limit: usize,
    /// Opaque resume position; empty starts at the beginning.
    #[serde(default)]
    pub cursor: String,
}

impl PageParams {
    /// First page of `limit` items.
    pub fn first(limit: usize) -> Self {
        Self { limit, cursor: String::new() }
    }

    /// Page of `limit` items resuming at `cursor`.
    pub fn after(limit: usize, cursor: impl Into<String>) -> Self {
        Self { limit, cursor: cursor.into() }
    }

    /// Clamps the limit into `1..=max_limit`, substituting the default for
    /// zero, and checks that the cursor decodes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a malformed cursor.
    pub fn validate(&self, config: &PaginationConfig) -> Result<Self> {
        decode_cursor(&self.cursor)?;
        let limit = match self.limit {
            0 => config.default_limit,
            n => n.min(config.max_limit),
        };
        Ok(Self { limit, cursor: self.cursor.clone() })
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Whether another page follows.
    pub has_more: bool,
    /// Cursor for the next page, present when `has_more`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Total matching items, when cheaply known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl<T> Page<T> {
    /// A page with no items and nothing after it.
    pub fn empty() -> Self {
        Self { items: Vec::new(), has_more: false, next_cursor: None, total: None }
    }

    /// Converts every item, keeping the page position.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next_cursor: self.next_cursor,
            total: self.total,
        }
    }
}

/// Encodes a resume key. The empty key encodes to the empty cursor.
pub fn encode_cursor(key: &[u8]) -> String {
    if key.is_empty() {
        return String::new();
    }
    URL_SAFE_NO_PAD.encode(key)
}

/// Decodes a cursor produced by [`encode_cursor`].
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] if the cursor is not valid base64.
pub fn decode_cursor(cursor: &str) -> Result<Vec<u8>> {
    if cursor.is_empty() {
        return Ok(Vec::new());
    }
    URL_SAFE_NO_PAD.decode(cursor).map_err(|_| StoreError::invalid("malformed cursor"))
}

/// Encodes a sequence offset as a cursor.
pub fn encode_offset_cursor(offset: usize) -> String {
    encode_cursor(offset.to_string().as_bytes())
}

/// Decodes an offset cursor. The empty cursor is offset zero.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] if the cursor does not hold an offset.
pub fn decode_offset_cursor(cursor: &str) -> Result<usize> {
    let bytes = decode_cursor(cursor)?;
    if bytes.is_empty() {
        return Ok(0);
    }
    std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::invalid("malformed cursor"))
}

/// Pages through a key prefix.
///
/// `accept` turns an entry into an item or rejects it (tombstoned, not
/// visible); rejected entries do not count toward the limit. Scans at most
/// `limit + 1` accepted entries: the extra one only sets `has_more`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] for a malformed cursor,
/// [`StoreError::Cancelled`] if `cancel` fires, or whatever `accept` returns.
pub fn scan_page<R, T, F>(
    txn: &R,
    prefix: &[u8],
    params: &PageParams,
    config: &PaginationConfig,
    cancel: &CancellationToken,
    mut accept: F,
) -> Result<Page<T>>
where
    R: KvRead,
    F: FnMut(&[u8], &[u8]) -> Result<Option<T>>,
{
    ensure_active(cancel)?;
    let params = params.validate(config)?;
    let cursor = decode_cursor(&params.cursor)?;
    let mut start = if cursor.is_empty() { prefix.to_vec() } else { cursor.clone() };
    let chunk = params.limit + 1;

    let mut items = Vec::with_capacity(params.limit);
    let mut last_key: Option<Vec<u8>> = None;
    let mut has_more = false;

    'scan: loop {
        let entries = txn.scan_from(prefix, &start, chunk)?;
        let exhausted = entries.len() < chunk;
        if let Some((last, _)) = entries.last() {
            start = last.clone();
            start.push(0);
        }
        for (key, value) in &entries {
            ensure_active(cancel)?;
            if !cursor.is_empty() && *key == cursor {
                continue;
            }
            let Some(item) = accept(key, value)? else {
                continue;
            };
            if items.len() == params.limit {
                has_more = true;
                break 'scan;
            }
            items.push(item);
            last_key = Some(key.clone());
        }
        if exhausted {
            break;
        }
    }

    let next_cursor = if has_more { last_key.as_deref().map(encode_cursor) } else { None };
    Ok(Page { items, has_more, next_cursor, total: None })
}

/// Pages through an in-memory, already ordered sequence using an offset
/// cursor.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] for a malformed cursor.
pub fn paginate_sequence<T: Clone>(
    items: &[T],
    params: &PageParams,
    config: &PaginationConfig,
) -> Result<Page<T>> {
    let params = params.validate(config)?;
    let offset = decode_offset_cursor(&params.cursor)?.min(items.len());
    let end = offset.saturating_add(params.limit).min(items.len());
    let has_more = end < items.len();
    Ok(Page {
        items: items[offset..end].to_vec(),
        has_more,
        next_cursor: has_more.then(|| encode_offset_cursor(end)),
        total: Some(items.len()),
    })
}

/// Pages through a sorted, duplicate-free ID list using the last returned ID
/// as the cursor.
///
/// Resuming is by value, not position, so IDs inserted or removed between
/// requests never cause an item to be skipped or repeated.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] for a malformed cursor.
pub fn paginate_sorted_ids(
    ids: &[String],
    params: &PageParams,
    config: &PaginationConfig,
) -> Result<Page<String>> {
    let params = params.validate(config)?;
    let cursor = decode_cursor(&params.cursor)?;
    let start = if cursor.is_empty() {
        0
    } else {
        ids.partition_point(|id| id.as_bytes() <= cursor.as_slice())
    };
    let end = start.saturating_add(params.limit).min(ids.len());
    let has_more = end < ids.len();
    let items = ids[start..end].to_vec();
    let next_cursor = if has_more { items.last().map(|id| encode_cursor(id.as_bytes())) } else { None };
    Ok(Page { items, has_more, next_cursor, total: Some(ids.len()) })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::engine::StorageEngine;

    fn config() -> PaginationConfig {
        PaginationConfig::default()
    }

    #[test]
    fn test_validate_clamps_limit() {
        let cfg = config();
        assert_eq!(PageParams::first(0).validate(&cfg).unwrap().limit, 100);
        assert_eq!(PageParams::first(5).validate(&cfg).unwrap().limit, 5);
        assert_eq!(PageParams::first(5000).validate(&cfg).unwrap().limit, 1000);
        assert!(matches!(
            PageParams::after(10, "!!!").validate(&cfg),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_empty_cursor_roundtrip() {
        assert_eq!(encode_cursor(b""), "");
        assert_eq!(decode_cursor("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_offset_cursor("").unwrap(), 0);
        assert_eq!(decode_offset_cursor(&encode_offset_cursor(42)).unwrap(), 42);
        assert!(decode_offset_cursor(&encode_cursor(b"abc")).is_err());
    }

    fn seeded(keys: &[&str]) -> StorageEngine {
        let engine = StorageEngine::in_memory().expect("open");
        let mut txn = engine.write().expect("write");
        for key in keys {
            txn.put(key.as_bytes(), key.as_bytes()).expect("put");
        }
        txn.commit().expect("commit");
        engine
    }

    fn accept_all(key: &[u8], _value: &[u8]) -> Result<Option<String>> {
        Ok(Some(String::from_utf8(key.to_vec()).unwrap()))
    }

    #[test]
    fn test_scan_page_walks_prefix() {
        let engine = seeded(&["a:1", "a:2", "a:3", "a:4", "a:5", "b:1"]);
        let txn = engine.read().expect("read");
        let cancel = CancellationToken::new();

        let first = scan_page(&txn, b"a:", &PageParams::first(2), &config(), &cancel, accept_all).unwrap();
        assert_eq!(first.items, vec!["a:1", "a:2"]);
        assert!(first.has_more);
        assert_eq!(decode_cursor(first.next_cursor.as_deref().unwrap()).unwrap(), b"a:2");

        let second = scan_page(
            &txn,
            b"a:",
            &PageParams::after(2, first.next_cursor.unwrap()),
            &config(),
            &cancel,
            accept_all,
        )
        .unwrap();
        assert_eq!(second.items, vec!["a:3", "a:4"]);

        let last = scan_page(
            &txn,
            b"a:",
            &PageParams::after(2, second.next_cursor.unwrap()),
            &config(),
            &cancel,
            accept_all,
        )
        .unwrap();
        assert_eq!(last.items, vec!["a:5"]);
        assert!(!last.has_more);
        assert_eq!(last.next_cursor, None);
    }

    #[test]
    fn test_exact_fit_has_no_more() {
        let engine = seeded(&["a:1", "a:2"]);
        let txn = engine.read().expect("read");
        let page = scan_page(&txn, b"a:", &PageParams::first(2), &config(), &CancellationToken::new(), accept_all)
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more);
    }

    #[test]
    fn test_rejected_entries_do_not_count() {
        let engine = seeded(&["a:1", "a:2", "a:3", "a:4"]);
        let txn = engine.read().expect("read");
        let odd_only = |key: &[u8], _: &[u8]| -> Result<Option<String>> {
            let s = String::from_utf8(key.to_vec()).unwrap();
            Ok(s.ends_with(['1', '3']).then_some(s))
        };
        let page = scan_page(&txn, b"a:", &PageParams::first(1), &config(), &CancellationToken::new(), odd_only)
            .unwrap();
        assert_eq!(page.items, vec!["a:1"]);
        assert!(page.has_more);
    }

    #[test]
    fn test_cancelled_scan() {
        let engine = seeded(&["a:1"]);
        let txn = engine.read().expect("read");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scan_page(&txn, b"a:", &PageParams::first(1), &config(), &cancel, accept_all);
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[test]
    fn test_paginate_sequence() {
        let ids: Vec<u32> = (0..5).collect();
        let first = paginate_sequence(&ids, &PageParams::first(2), &config()).unwrap();
        assert_eq!(first.items, vec![0, 1]);
        assert_eq!(first.total, Some(5));
        let next = PageParams::after(2, first.next_cursor.unwrap());
        let second = paginate_sequence(&ids, &next, &config()).unwrap();
        assert_eq!(second.items, vec![2, 3]);
        let tail = paginate_sequence(&ids, &PageParams::after(2, second.next_cursor.unwrap()), &config())
            .unwrap();
        assert_eq!(tail.items, vec![4]);
        assert!(!tail.has_more);
    }

    #[test]
    fn test_paginate_sorted_ids_resumes_by_value() {
        let ids: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let first = paginate_sorted_ids(&ids, &PageParams::first(2), &config()).unwrap();
        assert_eq!(first.items, vec!["a", "b"]);

        // "b" disappears and "bb" appears before the next request.
        let changed: Vec<String> = ["a", "bb", "c", "d"].iter().map(|s| s.to_string()).collect();
        let next = PageParams::after(2, first.next_cursor.unwrap());
        let second = paginate_sorted_ids(&changed, &next, &config()).unwrap();
        assert_eq!(second.items, vec!["bb", "c"]);
        assert!(second.has_more);
    }

    proptest! {
        #[test]
        fn prop_cursor_roundtrip(key in proptest::collection::vec(any::<u8>(), 1..64)) {
            prop_assert_eq!(decode_cursor(&encode_cursor(&key)).unwrap(), key);
        }

        #[test]
        fn prop_pagination_is_exhaustive(count in 0usize..40, limit in 1usize..7) {
            let keys: Vec<String> = (0..count).map(|i| format!("k:{i:03}")).collect();
            let engine = seeded(&keys.iter().map(String::as_str).collect::<Vec<_>>());
            let txn = engine.read().expect("read");
            let cancel = CancellationToken::new();
            let mut seen = Vec::new();
            let mut params = PageParams::first(limit);
            loop {
                let page = scan_page(&txn, b"k:", &params, &config(), &cancel, accept_all).unwrap();
                prop_assert!(page.items.len() <= limit);
                seen.extend(page.items);
                match page.next_cursor {
                    Some(cursor) => params = PageParams::after(limit, cursor),
                    None => break,
                }
            }
            prop_assert_eq!(seen, keys);
        }
    }
}
