//! Shape-tolerant extraction over untyped backend responses.
//!
//! Backend endpoints disagree on where the "real" rows live: some return a
//! bare array, some wrap it in `data`, some in a domain name
//! (`{"rentals": [...]}`), some in a paginated envelope, and a few wrap
//! twice (`{"data": {"items": [...]}}`). Rather than hardcoding each
//! endpoint, [`extract_collection`] searches the payload with a small,
//! ordered policy:
//!
//! 1. An array is the answer if every element is an object (or it is empty).
//!    Arrays of scalars are never the answer, and arrays are not searched.
//! 2. In an object, the [`ExtractionPolicy::priority_keys`] are probed in
//!    order; the first one whose value yields a collection wins.
//! 3. Otherwise every remaining property is scanned in document order.
//! 4. Each step into an object spends one unit of the depth budget, so
//!    at most [`ExtractionPolicy::max_depth`] envelopes are unwrapped.
//!
//! [`extract_asset_urls`] walks the same kind of payload but collects media
//! references instead of rows.

use std::collections::HashSet;

use serde_json::Value;

use crate::models::ExtractionResult;

/// Default number of envelope levels that may be unwrapped.
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Default envelope key probe order.
pub const DEFAULT_PRIORITY_KEYS: &[&str] = &[
    "data",
    "organizations",
    "properties",
    "rentals",
    "campaigns",
    "users",
    "roles",
    "items",
    "results",
    "rows",
    "records",
    "list",
    "docs",
    "content",
    "payload",
    "result",
    "response",
];

/// Keys whose string values are treated as asset locations even without a
/// recognizable media extension.
const URL_KEYS: &[&str] = &[
    "src",
    "href",
    "image",
    "images",
    "photo",
    "photos",
    "picture",
    "thumbnail",
    "thumbnails",
    "file",
    "files",
    "filename",
    "avatar",
    "logo",
    "cover",
    "banner",
    "media",
    "attachment",
    "attachments",
    "gallery",
];

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "avif", "heic", "ico", "tif", "tiff",
    "mp4", "webm", "mov", "m4v", "pdf",
];

const MEDIA_SEGMENTS: &[&str] = &["/uploads/", "/images/", "/media/", "/storage/", "/files/"];

const MAX_REFERENCE_LEN: usize = 2048;

/// Search policy for [`extract_collection_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPolicy {
    /// Envelope keys probed before the fallback scan, most likely first.
    pub priority_keys: Vec<String>,
    /// Maximum number of nested objects unwrapped on the way to the array.
    pub max_depth: usize,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            priority_keys: DEFAULT_PRIORITY_KEYS.iter().map(|k| k.to_string()).collect(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ExtractionPolicy {
    /// Append an endpoint-specific envelope key after the existing ones.
    pub fn with_priority_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.priority_keys.contains(&key) {
            self.priority_keys.push(key);
        }
        self
    }

    fn is_priority_key(&self, key: &str) -> bool {
        self.priority_keys.iter().any(|k| k == key)
    }
}

/// Locate the record collection in `raw` using the default policy.
pub fn extract_collection(raw: &Value) -> ExtractionResult {
    extract_collection_with(raw, &ExtractionPolicy::default())
}

/// Locate the record collection in `raw` using `policy`.
///
/// Never fails: a payload with no plausible collection is
/// [`ExtractionResult::NotFound`].
pub fn extract_collection_with(raw: &Value, policy: &ExtractionPolicy) -> ExtractionResult {
    match find_collection(raw, policy, policy.max_depth) {
        Some(items) => ExtractionResult::RecordCollection(
            items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
        ),
        None => {
            tracing::debug!("no record collection found in payload");
            ExtractionResult::NotFound
        }
    }
}

fn find_collection<'a>(
    value: &'a Value,
    policy: &ExtractionPolicy,
    budget: usize,
) -> Option<&'a [Value]> {
    match value {
        Value::Array(items) => {
            if items.iter().all(Value::is_object) {
                Some(items.as_slice())
            } else {
                None
            }
        }
        Value::Object(map) => {
            if budget == 0 {
                return None;
            }
            let budget = budget - 1;

            for key in &policy.priority_keys {
                if let Some(found) = map
                    .get(key)
                    .and_then(|child| find_collection(child, policy, budget))
                {
                    return Some(found);
                }
            }

            map.iter()
                .filter(|(key, _)| !policy.is_priority_key(key))
                .find_map(|(_, child)| find_collection(child, policy, budget))
        }
        _ => None,
    }
}

/// Collect up to `limit` distinct media references from `raw`, in document
/// order.
///
/// String leaves qualify when [`looks_like_media`] accepts them. Strings
/// stored under url-ish keys (`url`, `path`, `src`, `image`, `*_url`, …)
/// qualify when they look like any path or URL. Array elements inherit the
/// key of the array that holds them, so `"photos": ["a.jpg", "b"]` treats
/// both entries as locations.
///
/// The traversal uses an explicit worklist rather than recursion, so very
/// wide or deep payloads cost at most one stack entry per node. JSON values
/// are trees, so the visited set only has to de-duplicate the URLs.
pub fn extract_asset_urls(raw: &Value, limit: usize) -> Vec<String> {
    let mut found = Vec::new();
    if limit == 0 {
        return found;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut worklist: Vec<(Option<&str>, &Value)> = vec![(None, raw)];

    while let Some((key, value)) = worklist.pop() {
        match value {
            Value::String(s) => {
                let candidate = s.trim();
                let qualifies = match key {
                    Some(k) if is_url_key(k) => looks_like_location(candidate),
                    _ => looks_like_media(candidate),
                };
                if qualifies && seen.insert(candidate) {
                    found.push(candidate.to_string());
                    if found.len() >= limit {
                        break;
                    }
                }
            }
            Value::Array(items) => {
                for item in items.iter().rev() {
                    worklist.push((key, item));
                }
            }
            Value::Object(map) => {
                for (k, v) in map.iter().rev() {
                    worklist.push((Some(k.as_str()), v));
                }
            }
            _ => {}
        }
    }

    found
}

/// Whether `s` looks like a reference to an image, video, or document.
pub fn looks_like_media(s: &str) -> bool {
    if !is_plausible_reference(s) {
        return false;
    }
    if s.starts_with("data:image/") {
        return true;
    }

    let path = strip_query_and_fragment(s).to_ascii_lowercase();
    if MEDIA_SEGMENTS.iter().any(|seg| path.contains(seg)) && !path.ends_with('/') {
        return true;
    }

    match extension(&path) {
        Some(ext) => MEDIA_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn looks_like_location(s: &str) -> bool {
    if !is_plausible_reference(s) {
        return false;
    }
    if looks_like_media(s) {
        return true;
    }
    let path = strip_query_and_fragment(s);
    path.contains('/') || extension(path).is_some()
}

fn is_plausible_reference(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_REFERENCE_LEN
        && !s.chars().any(|c| c == '\n' || c == '\r' || c == '\t')
}

fn is_url_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.ends_with("url")
        || lower.ends_with("path")
        || lower.ends_with("src")
        || URL_KEYS.contains(&lower.as_str())
}

fn strip_query_and_fragment(s: &str) -> &str {
    let end = s.find(['?', '#']).unwrap_or(s.len());
    &s[..end]
}

/// File extension of the last path segment, if it has a short alphanumeric one.
fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    if ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}
