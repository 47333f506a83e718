//! Pattern registry for content-addressable CDN and object-storage URLs.
//!
//! Both helpers build their eligibility decision from the same `PatternSet`,
//! constructed once at startup from `AppConfig::patterns` and shared
//! read-only afterwards. A URL is eligible when any pattern matches the full
//! request URL, query string included.

use regex::Regex;

/// Built-in URL shapes, used when no pattern list is configured.
///
/// Every entry pins the content digest in the path so that the query string
/// carries nothing but the signature.
pub const DEFAULT_PATTERNS: &[&str] = &[
    // Docker Hub blob CDN
    r"^https?://production\.cloudflare\.docker\.com/registry-v2/docker/registry/v2/blobs/sha256/[0-9a-f]{2}/[0-9a-f]{64}/data(\?.*)?$",
    // Quay CDN edge nodes
    r"^https?://cdn[0-9]*\.quay\.io/sha256/[0-9a-f]{2}/[0-9a-f]{64}(\?.*)?$",
    // GitHub container registry blob host
    r"^https?://pkg-containers\.githubusercontent\.com/ghcr1/blobs/sha256:[0-9a-f]{64}(\?.*)?$",
    // S3 path-style
    r"^https?://s3([.-][a-z0-9-]+)?\.amazonaws\.com/[a-z0-9][a-z0-9.-]*/(.+/)?blobs/sha256/[0-9a-f]{2}/[0-9a-f]{64}/data(\?.*)?$",
    // S3 virtual-hosted-style
    r"^https?://[a-z0-9][a-z0-9.-]*\.s3([.-][a-z0-9-]+)?\.amazonaws\.com/(.+/)?blobs/sha256/[0-9a-f]{2}/[0-9a-f]{64}/data(\?.*)?$",
    // Google Cloud Storage
    r"^https?://storage\.googleapis\.com/[a-z0-9._-]+/(.+/)?(blobs/sha256/[0-9a-f]{2}/[0-9a-f]{64}/data|containers/images/sha256:[0-9a-f]{64})(\?.*)?$",
    // Azure blob storage
    r"^https?://[a-z0-9]+\.blob\.core\.windows\.net/(.+/)?blobs/sha256/[0-9a-f]{2}/[0-9a-f]{64}/data(\?.*)?$",
];

/// Error type for pattern compilation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("pattern #{index} is empty")]
    Empty { index: usize },

    #[error("pattern #{index} ({pattern}) does not compile: {reason}")]
    Invalid { index: usize, pattern: String, reason: String },
}

/// Ordered, immutable set of compiled URL patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile the given patterns, keeping their order.
    ///
    /// # Errors
    ///
    /// Returns `PatternError` for the first pattern that is empty or does not compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .enumerate()
            .map(|(index, p)| {
                let p = p.as_ref().trim();
                if p.is_empty() {
                    return Err(PatternError::Empty { index });
                }
                Regex::new(p).map_err(|e| PatternError::Invalid { index, pattern: p.to_string(), reason: e.to_string() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Index of the first pattern matching `url`, if any.
    pub fn find(&self, url: &str) -> Option<usize> {
        self.patterns.iter().position(|re| re.is_match(url))
    }

    /// Whether `url` is eligible for store-id normalization and header adaptation.
    pub fn is_match(&self, url: &str) -> bool {
        self.find(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Source text of every pattern, in configured order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}

/// The URL up to, not including, its query string or fragment.
///
/// This is the store-id of an authorized URL, and the form URLs are logged in
/// so that signatures stay out of logs.
pub fn strip_query(url: &str) -> &str {
    match url.find(['?', '#']) {
        Some(idx) => &url[..idx],
        None => url,
    }
}
