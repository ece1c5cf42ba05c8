//! Vox Content Fetching
//!
//! Resolves manifest, stage, and translation identifiers to structured JSON.
//!
//! Identifiers are opaque to the rest of the player. This crate decides how
//! to reach them: direct URLs are fetched as-is, content-addressed
//! identifiers go through a list of gateways tried in order, and everything
//! else is a path under the static CDN base.

mod dir;
mod http;

pub use dir::DirFetcher;
pub use http::{HttpFetcher, SourceConfig};

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

/// Prefix used by content-addressed references.
pub const IPFS_SCHEME: &str = "ipfs://";

/// Errors that can occur while fetching content.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The source answered with 404.
    #[error("content not found: {url}")]
    NotFound {
        /// The URL or path that was requested.
        url: String,
    },

    /// The source answered with a non-success status other than 404.
    #[error("content request to {url} failed with status {status}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The request never produced a response.
    #[error("network error fetching {url}: {message}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// Transport error description.
        message: String,
    },

    /// The body was not valid JSON.
    #[error("invalid JSON from {url}: {message}")]
    InvalidJson {
        /// The URL or path the body came from.
        url: String,
        /// Parser error description.
        message: String,
    },

    /// Every configured gateway failed for a content-addressed identifier.
    #[error("all {attempts} gateways failed for '{identifier}' (last error: {last})")]
    Exhausted {
        /// The content identifier.
        identifier: String,
        /// Number of gateways tried.
        attempts: usize,
        /// The error reported by the last gateway.
        last: String,
    },

    /// The identifier cannot be served by this fetcher.
    #[error("unsupported content identifier: '{identifier}'")]
    UnsupportedIdentifier {
        /// The rejected identifier.
        identifier: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Local file system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContentError {
    /// Returns `true` if the content is known not to exist (as opposed to
    /// being temporarily unreachable).
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::UnsupportedIdentifier { .. }
        )
    }
}

/// Result type for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;

/// Capability for resolving an identifier to structured content.
///
/// Implementations must be cheap to share; the player holds one behind an
/// `Arc` for the whole session.
pub trait ContentFetcher: Send + Sync {
    /// Fetches and parses the JSON document behind `identifier`.
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Value>>;
}

impl<T: ContentFetcher + ?Sized> ContentFetcher for Arc<T> {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Value>> {
        (**self).fetch(identifier)
    }
}

/// How an identifier should be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    /// A full `http://` or `https://` URL.
    Url(&'a str),
    /// A content-addressed reference, without the `ipfs://` prefix.
    ContentAddressed(&'a str),
    /// A path relative to the static content base.
    Path(&'a str),
}

impl<'a> Identifier<'a> {
    /// Classifies a raw identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use vox_content::Identifier;
    ///
    /// assert_eq!(
    ///     Identifier::classify("https://cdn.example/a.json"),
    ///     Identifier::Url("https://cdn.example/a.json")
    /// );
    /// assert_eq!(
    ///     Identifier::classify("ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi"),
    ///     Identifier::ContentAddressed("bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi")
    /// );
    /// assert_eq!(
    ///     Identifier::classify("/schemas/manifest.json"),
    ///     Identifier::Path("schemas/manifest.json")
    /// );
    /// ```
    #[must_use]
    pub fn classify(raw: &'a str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Self::Url(raw);
        }
        if let Some(cid) = raw.strip_prefix(IPFS_SCHEME) {
            return Self::ContentAddressed(cid.trim_start_matches('/'));
        }
        if looks_like_cid(raw) {
            return Self::ContentAddressed(raw);
        }
        Self::Path(raw.trim_start_matches('/'))
    }
}

/// Returns `true` for bare CIDv0 (`Qm…`, 46 chars) and CIDv1 (`bafy…`)
/// identifiers, optionally followed by a path.
fn looks_like_cid(raw: &str) -> bool {
    let root = raw.split('/').next().unwrap_or_default();
    if !root.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    (root.starts_with("Qm") && root.len() == 46) || (root.starts_with("bafy") && root.len() >= 50)
}

/// Joins a base URL and a relative path with exactly one slash between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turns media references (images, audio) into fetchable URLs.
///
/// Content-addressed references resolve against the first gateway, since
/// media elements cannot retry across gateways on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResolver {
    cdn_base: String,
    gateway: Option<String>,
}

impl MediaResolver {
    /// Creates a resolver for the given CDN base and gateway list.
    #[must_use]
    pub fn new(cdn_base: impl Into<String>, gateways: &[String]) -> Self {
        Self {
            cdn_base: cdn_base.into(),
            gateway: gateways.first().cloned(),
        }
    }

    /// Resolves a media reference to a URL.
    ///
    /// Returns `None` for empty references, and for content-addressed
    /// references when no gateway is configured.
    ///
    /// # Examples
    ///
    /// ```
    /// use vox_content::MediaResolver;
    ///
    /// let resolver = MediaResolver::new(
    ///     "https://cdn.example/content/",
    ///     &["https://ipfs.io/ipfs/".to_string()],
    /// );
    /// assert_eq!(
    ///     resolver.resolve("ipfs://QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG/cat.png").as_deref(),
    ///     Some("https://ipfs.io/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG/cat.png")
    /// );
    /// assert_eq!(
    ///     resolver.resolve("audio/hola.mp3").as_deref(),
    ///     Some("https://cdn.example/content/audio/hola.mp3")
    /// );
    /// ```
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<String> {
        if reference.trim().is_empty() {
            return None;
        }
        match Identifier::classify(reference) {
            Identifier::Url(url) => Some(url.to_string()),
            Identifier::ContentAddressed(cid) => {
                self.gateway.as_deref().map(|gateway| join_url(gateway, cid))
            }
            Identifier::Path(path) => Some(join_url(&self.cdn_base, path)),
        }
    }
}
