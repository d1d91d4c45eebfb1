//! Multi-candidate asset resolution.
//!
//! Uploaded media has been stored under more than one path convention over
//! the backend's lifetime, and a stored reference (`"abc.jpg"`,
//! `"/uploads/rentals/abc.jpg"`, or a full URL) does not say which one
//! produced it. [`AssetLocations::candidates`] turns a reference into an
//! ordered guess list; the presentation layer shows the first guess and
//! walks forward through a [`CandidateCursor`] each time a load fails,
//! ending on a placeholder once the list is exhausted.
//!
//! # Candidate order
//!
//! | Reference | First candidate | Then |
//! |-----------|-----------------|------|
//! | `https://host/a/abc.jpg` | the URL itself | `{origin}/{subpath}/abc.jpg` per subpath |
//! | `/a/abc.jpg` or `a/abc.jpg` | `{origin}/a/abc.jpg` | `{origin}/{subpath}/abc.jpg` per subpath |
//! | `abc.jpg` | (none) | `{origin}/{subpath}/abc.jpg` per subpath |
//! | `data:` / `blob:` URI | the URI itself | (none) |
//!
//! Duplicates are dropped, keeping the first occurrence.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

/// The environment-specific inputs to candidate generation: one origin
/// and the known upload directories, most likely first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocations {
    base_origin: String,
    storage_subpaths: Vec<String>,
}

impl AssetLocations {
    /// Build locations from an `http(s)` origin and at least one subpath.
    ///
    /// Trailing slashes on the origin and surrounding slashes on subpaths are
    /// removed. Repeated subpaths keep their first position.
    pub fn new<I, S>(base_origin: &str, storage_subpaths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let base_origin = base_origin.trim().trim_end_matches('/');
        if !(base_origin.starts_with("http://") || base_origin.starts_with("https://")) {
            bail!(
                "asset base origin must start with http:// or https://, got '{}'",
                base_origin
            );
        }
        let host = base_origin
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        if host.is_empty() {
            bail!("asset base origin has no host: '{}'", base_origin);
        }

        let mut subpaths: Vec<String> = Vec::new();
        for raw in storage_subpaths {
            let subpath = raw.as_ref().trim().trim_matches('/');
            if subpath.is_empty() {
                bail!("storage subpaths must not be empty");
            }
            if !subpaths.iter().any(|s| s == subpath) {
                subpaths.push(subpath.to_string());
            }
        }
        if subpaths.is_empty() {
            bail!("at least one storage subpath is required");
        }

        Ok(Self {
            base_origin: base_origin.to_string(),
            storage_subpaths: subpaths,
        })
    }

    pub fn base_origin(&self) -> &str {
        &self.base_origin
    }

    pub fn storage_subpaths(&self) -> &[String] {
        &self.storage_subpaths
    }

    /// Generate the ordered candidate URLs for `reference`.
    pub fn candidates(&self, reference: &str) -> CandidateList {
        let mut list = CandidateList::default();

        let reference = reference.trim().replace('\\', "/");
        if reference.is_empty() {
            return list;
        }

        match AssetReference::classify(&reference) {
            AssetReference::Inline(uri) => {
                list.push(uri.to_string());
                return list;
            }
            AssetReference::Absolute(url) => list.push(url),
            AssetReference::RootRelative(path) => {
                list.push(format!("{}/{}", self.base_origin, path.trim_start_matches('/')));
            }
            AssetReference::Filename(_) => {}
        }

        if let Some(name) = file_name(&reference) {
            for subpath in &self.storage_subpaths {
                list.push(format!("{}/{}/{}", self.base_origin, subpath, name));
            }
        }

        // Degenerate names (`..`, `?v=1`) still get their plain rooted form.
        if list.is_empty() {
            if let Some(subpath) = self.storage_subpaths.first() {
                list.push(format!("{}/{}/{}", self.base_origin, subpath, reference));
            }
        }

        list
    }
}

/// Free-function form of [`AssetLocations::candidates`].
pub fn candidates(reference: &str, locations: &AssetLocations) -> CandidateList {
    locations.candidates(reference)
}

/// How a raw reference string is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetReference<'a> {
    /// `data:` or `blob:` URI, usable only as-is.
    Inline(&'a str),
    /// Scheme-qualified URL (protocol-relative references gain `https:`).
    Absolute(String),
    /// A path to prefix with the origin.
    RootRelative(&'a str),
    /// A filename with no directory information.
    Filename(&'a str),
}

impl<'a> AssetReference<'a> {
    pub fn classify(reference: &'a str) -> Self {
        let lower = reference.to_ascii_lowercase();
        if lower.starts_with("data:") || lower.starts_with("blob:") {
            AssetReference::Inline(reference)
        } else if let Some(rest) = reference.strip_prefix("//") {
            AssetReference::Absolute(format!("https://{}", rest))
        } else if has_scheme(reference) {
            AssetReference::Absolute(reference.to_string())
        } else if reference.contains('/') {
            AssetReference::RootRelative(reference)
        } else {
            AssetReference::Filename(reference)
        }
    }
}

fn has_scheme(reference: &str) -> bool {
    match reference.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Last path segment of a reference, ignoring query string and fragment.
fn file_name(reference: &str) -> Option<&str> {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    let without_query = &reference[..end];

    let path = if has_scheme(without_query) || without_query.starts_with("//") {
        let after_scheme = without_query
            .split_once("//")
            .map(|(_, rest)| rest)
            .unwrap_or(without_query);
        // Host-only URLs carry no filename.
        after_scheme.split_once('/').map(|(_, path)| path)?
    } else {
        without_query
    };

    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Some(name),
        _ => None,
    }
}

/// Ordered, duplicate-free candidate URLs for one asset reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CandidateList(Vec<String>);

impl CandidateList {
    fn push(&mut self, url: String) {
        if !self.0.contains(&url) {
            self.0.push(url);
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn into_cursor(self) -> CandidateCursor {
        CandidateCursor::new(self)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> IntoIterator for &'a CandidateList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// What the presentation layer should render for one asset instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState<'a> {
    Showing(&'a str),
    Placeholder,
}

/// Forward-only position in a [`CandidateList`].
///
/// Each asset instance owns one cursor. A failed load moves it forward; it
/// never moves back, so no candidate is tried twice for the same instance.
#[derive(Debug, Clone)]
pub struct CandidateCursor {
    candidates: CandidateList,
    position: usize,
}

impl CandidateCursor {
    pub fn new(candidates: CandidateList) -> Self {
        Self {
            candidates,
            position: 0,
        }
    }

    /// The candidate currently displayed, or `None` once exhausted.
    pub fn current(&self) -> Option<&str> {
        self.candidates.0.get(self.position).map(String::as_str)
    }

    /// Record a load failure for the current candidate and move to the next.
    pub fn advance(&mut self) -> Option<&str> {
        if self.position < self.candidates.len() {
            tracing::debug!(
                failed = %self.candidates.0[self.position],
                "asset candidate failed to load"
            );
            self.position += 1;
        }
        self.current()
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.candidates.len()
    }

    /// Candidates that already failed, in the order they were tried.
    pub fn tried(&self) -> &[String] {
        &self.candidates.0[..self.position.min(self.candidates.len())]
    }

    /// Candidates not yet tried, including the current one.
    pub fn remaining(&self) -> &[String] {
        &self.candidates.0[self.position.min(self.candidates.len())..]
    }

    pub fn state(&self) -> AssetState<'_> {
        match self.current() {
            Some(url) => AssetState::Showing(url),
            None => AssetState::Placeholder,
        }
    }
}

/// Answers whether a candidate URL actually loads.
///
/// The application crate implements this over HTTP; tests use in-memory
/// fakes.
#[async_trait]
pub trait AssetProbe: Send + Sync {
    async fn loads(&self, url: &str) -> bool;
}

/// Walk `candidates` in order and return the first one that loads.
///
/// Returns `None` when every candidate fails, which callers render as the
/// placeholder state.
pub async fn resolve_first<P>(candidates: CandidateList, probe: &P) -> Option<String>
where
    P: AssetProbe + ?Sized,
{
    let mut cursor = candidates.into_cursor();
    while let Some(url) = cursor.current() {
        if probe.loads(url).await {
            return Some(url.to_string());
        }
        cursor.advance();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn locations() -> AssetLocations {
        AssetLocations::new(
            "https://api.example.com/",
            ["uploads/rentals", "/uploads/properties/", "uploads"],
        )
        .unwrap()
    }

    #[test]
    fn absolute_url_comes_first_then_rerooted_variants() {
        let list = locations().candidates("https://host/uploads/rentals/abc.jpg");
        assert_eq!(
            list.as_slice(),
            &[
                "https://host/uploads/rentals/abc.jpg",
                "https://api.example.com/uploads/rentals/abc.jpg",
                "https://api.example.com/uploads/properties/abc.jpg",
                "https://api.example.com/uploads/abc.jpg",
            ]
        );
    }

    #[test]
    fn absolute_url_on_base_origin_is_not_duplicated() {
        let list = locations().candidates("https://api.example.com/uploads/rentals/abc.jpg?v=3");
        assert_eq!(
            list.as_slice(),
            &[
                "https://api.example.com/uploads/rentals/abc.jpg?v=3",
                "https://api.example.com/uploads/rentals/abc.jpg",
                "https://api.example.com/uploads/properties/abc.jpg",
                "https://api.example.com/uploads/abc.jpg",
            ]
        );

        let exact = locations().candidates("https://api.example.com/uploads/abc.jpg");
        assert_eq!(exact.len(), 3);
        assert_eq!(exact.first(), Some("https://api.example.com/uploads/abc.jpg"));
    }

    #[test]
    fn bare_filename_gets_one_candidate_per_subpath() {
        let list = locations().candidates("abc.jpg");
        assert_eq!(
            list.as_slice(),
            &[
                "https://api.example.com/uploads/rentals/abc.jpg",
                "https://api.example.com/uploads/properties/abc.jpg",
                "https://api.example.com/uploads/abc.jpg",
            ]
        );
        assert!(!list.iter().any(|u| u == "https://api.example.com/abc.jpg"));
    }

    #[test]
    fn root_relative_path_is_prefixed_with_origin() {
        let list = locations().candidates("/media/legacy/abc.jpg");
        assert_eq!(list.first(), Some("https://api.example.com/media/legacy/abc.jpg"));
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn partial_path_is_treated_as_root_relative() {
        let list = locations().candidates("uploads\\properties\\abc.jpg");
        assert_eq!(
            list.as_slice(),
            &[
                "https://api.example.com/uploads/properties/abc.jpg",
                "https://api.example.com/uploads/rentals/abc.jpg",
                "https://api.example.com/uploads/abc.jpg",
            ]
        );
    }

    #[test]
    fn protocol_relative_is_absolute() {
        let list = locations().candidates("//cdn.example.com/x/abc.png");
        assert_eq!(list.first(), Some("https://cdn.example.com/x/abc.png"));
    }

    #[test]
    fn inline_uris_are_returned_alone() {
        let list = locations().candidates("data:image/png;base64,AAAA");
        assert_eq!(list.as_slice(), &["data:image/png;base64,AAAA"]);
    }

    #[test]
    fn empty_and_host_only_references() {
        assert!(locations().candidates("   ").is_empty());
        let host_only = locations().candidates("https://cdn.example.com");
        assert_eq!(host_only.as_slice(), &["https://cdn.example.com"]);
        let dir = locations().candidates("/uploads/");
        assert_eq!(dir.as_slice(), &["https://api.example.com/uploads/"]);
    }

    #[test]
    fn degenerate_filenames_keep_one_rooted_candidate() {
        for (reference, expected) in [
            ("..", "https://api.example.com/uploads/rentals/.."),
            ("?v=1", "https://api.example.com/uploads/rentals/?v=1"),
            (" #frag ", "https://api.example.com/uploads/rentals/#frag"),
        ] {
            let list = locations().candidates(reference);
            assert_eq!(list.as_slice(), &[expected], "reference {:?}", reference);
        }
    }

    #[test]
    fn locations_reject_bad_config() {
        assert!(AssetLocations::new("ftp://x", ["uploads"]).is_err());
        assert!(AssetLocations::new("https://x.test", Vec::<String>::new()).is_err());
        assert!(AssetLocations::new("https://x.test", ["/"]).is_err());
        let deduped = AssetLocations::new("https://x.test", ["a", "/a/", "b"]).unwrap();
        assert_eq!(deduped.storage_subpaths(), &["a", "b"]);
    }

    #[test]
    fn cursor_only_moves_forward() {
        let mut cursor = locations().candidates("abc.jpg").into_cursor();
        assert_eq!(
            cursor.state(),
            AssetState::Showing("https://api.example.com/uploads/rentals/abc.jpg")
        );
        assert!(cursor.tried().is_empty());

        assert_eq!(
            cursor.advance(),
            Some("https://api.example.com/uploads/properties/abc.jpg")
        );
        assert_eq!(cursor.tried().len(), 1);
        assert_eq!(cursor.remaining().len(), 2);

        cursor.advance();
        assert_eq!(cursor.advance(), None);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.state(), AssetState::Placeholder);

        // Further failures are no-ops.
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.tried().len(), 3);
        assert!(cursor.remaining().is_empty());
    }

    #[test]
    fn empty_list_starts_as_placeholder() {
        let cursor = CandidateList::default().into_cursor();
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.state(), AssetState::Placeholder);
    }

    struct FakeProbe {
        available: Vec<&'static str>,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AssetProbe for FakeProbe {
        async fn loads(&self, url: &str) -> bool {
            self.asked.lock().unwrap().push(url.to_string());
            self.available.iter().any(|a| *a == url)
        }
    }

    #[tokio::test]
    async fn resolve_first_stops_at_first_loading_candidate() {
        let probe = FakeProbe {
            available: vec![
                "https://api.example.com/uploads/properties/abc.jpg",
                "https://api.example.com/uploads/abc.jpg",
            ],
            asked: Mutex::new(Vec::new()),
        };
        let found = resolve_first(locations().candidates("abc.jpg"), &probe).await;
        assert_eq!(
            found.as_deref(),
            Some("https://api.example.com/uploads/properties/abc.jpg")
        );
        assert_eq!(probe.asked.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn resolve_first_returns_none_when_exhausted() {
        let probe = FakeProbe {
            available: vec![],
            asked: Mutex::new(Vec::new()),
        };
        assert_eq!(resolve_first(locations().candidates("abc.jpg"), &probe).await, None);
        assert_eq!(probe.asked.lock().unwrap().len(), 3);
    }
}
