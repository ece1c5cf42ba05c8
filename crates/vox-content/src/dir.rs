//! Local directory content source.

use std::path::{Component, Path, PathBuf};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::{ContentError, ContentFetcher, Identifier, Result};

/// Serves content from a local directory.
///
/// Paths and content-addressed identifiers are both looked up relative to
/// the root; a CID is tried as-is and then with a `.json` extension. Full
/// URLs are rejected.
#[derive(Debug, Clone)]
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    /// Creates a fetcher rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, identifier: &str) -> Result<Vec<PathBuf>> {
        let relative = match Identifier::classify(identifier) {
            Identifier::Url(_) => {
                return Err(ContentError::UnsupportedIdentifier {
                    identifier: identifier.to_string(),
                })
            }
            Identifier::ContentAddressed(cid) => cid,
            Identifier::Path(path) => path,
        };

        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ContentError::UnsupportedIdentifier {
                identifier: identifier.to_string(),
            });
        }

        let exact = self.root.join(relative);
        let mut candidates = vec![exact.clone()];
        if exact.extension().is_none() {
            candidates.push(exact.with_extension("json"));
        }
        Ok(candidates)
    }

    async fn read(&self, identifier: &str) -> Result<Value> {
        let candidates = self.candidates(identifier)?;

        for path in &candidates {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => {
                    debug!(path = %path.display(), "Read local content");
                    return serde_json::from_str(&contents).map_err(|e| {
                        ContentError::InvalidJson {
                            url: path.display().to_string(),
                            message: e.to_string(),
                        }
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ContentError::Io(e)),
            }
        }

        Err(ContentError::NotFound {
            url: self.root.join(identifier.trim_start_matches('/')).display().to_string(),
        })
    }
}

impl ContentFetcher for DirFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.read(identifier))
    }
}
