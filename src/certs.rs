//! Trust-anchor lookup
//!
//! Anchors are PEM files named after the host they cover, e.g.
//! `<cert_dir>/example.com.pem`. A host without its own file inherits the
//! anchor of its closest parent domain: `sub.example.com` tries
//! `sub.example.com.pem`, then `example.com.pem`, then `com.pem`.

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::FetchError;

const ANCHOR_EXTENSION: &str = ".pem";

/// Read-only view of wherever anchor files live.
pub trait AnchorStore: Send + Sync {
    fn contains(&self, name: &str) -> bool;
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// Anchors stored as files in one directory.
#[derive(Debug, Clone)]
pub struct DirAnchorStore {
    root: PathBuf,
}

impl DirAnchorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names are plain file names; anything that could leave the directory is refused.
    fn path_for(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        Some(self.root.join(name))
    }
}

impl AnchorStore for DirAnchorStore {
    fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_some_and(|path| path.is_file())
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        let path = self.path_for(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("bad anchor name: {}", name))
        })?;
        std::fs::read(path)
    }
}

/// Anchor file names to probe for `host`, most specific first.
pub fn candidate_anchor_names(host: &str) -> Vec<String> {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.iter().any(|label| label.is_empty()) {
        return Vec::new();
    }

    (0..labels.len())
        .map(|skip| format!("{}{}", labels[skip..].join("."), ANCHOR_EXTENSION))
        .collect()
}

/// Cached outcome of the lookup, kept on each managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnchorResolution {
    #[default]
    Unresolved,
    File(String),
    NoMatch,
}

impl AnchorResolution {
    pub fn file_name(&self) -> Option<&str> {
        match self {
            AnchorResolution::File(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorOrigin {
    File(String),
    Fallback,
}

/// What the transport should trust for one connection.
#[derive(Debug, Clone)]
pub enum TrustAnchor {
    Pem { origin: AnchorOrigin, pem: Bytes },
    Insecure,
}

impl TrustAnchor {
    pub fn is_insecure(&self) -> bool {
        matches!(self, TrustAnchor::Insecure)
    }
}

#[derive(Clone)]
pub struct CertificateResolver {
    store: Arc<dyn AnchorStore>,
    allow_insecure: bool,
}

impl CertificateResolver {
    pub fn new(store: Arc<dyn AnchorStore>, allow_insecure: bool) -> Self {
        Self {
            store,
            allow_insecure,
        }
    }

    /// First anchor file that exists for `host` or one of its parent domains.
    pub fn resolve_filename(&self, host: &str) -> Option<String> {
        candidate_anchor_names(host)
            .into_iter()
            .find(|name| self.store.contains(name))
    }

    /// Pick the anchor for a connection to `host`.
    ///
    /// `cached` is resolved on first use and left alone afterwards, so an
    /// explicit update stays in effect. An unreadable file falls through to
    /// `fallback`, then to insecure mode when allowed.
    pub fn anchor_for(
        &self,
        host: &str,
        cached: &mut AnchorResolution,
        fallback: Option<&Bytes>,
    ) -> Result<TrustAnchor, FetchError> {
        if *cached == AnchorResolution::Unresolved {
            *cached = match self.resolve_filename(host) {
                Some(name) => AnchorResolution::File(name),
                None => AnchorResolution::NoMatch,
            };
            debug!(host, resolution = ?cached, "Trust anchor resolved");
        }

        if let AnchorResolution::File(name) = &*cached {
            match self.store.read(name) {
                Ok(pem) => {
                    return Ok(TrustAnchor::Pem {
                        origin: AnchorOrigin::File(name.clone()),
                        pem: Bytes::from(pem),
                    });
                }
                Err(e) => warn!(host, file = %name, error = %e, "Trust anchor file unreadable"),
            }
        }

        self.fallback_anchor(host, fallback)
    }

    /// Anchor for a one-shot job; nothing is cached between jobs.
    pub fn anchor_for_job(&self, host: &str) -> Result<TrustAnchor, FetchError> {
        let mut resolution = AnchorResolution::Unresolved;
        self.anchor_for(host, &mut resolution, None)
    }

    fn fallback_anchor(&self, host: &str, fallback: Option<&Bytes>) -> Result<TrustAnchor, FetchError> {
        if let Some(pem) = fallback {
            debug!(host, "Using caller-supplied fallback anchor");
            return Ok(TrustAnchor::Pem {
                origin: AnchorOrigin::Fallback,
                pem: pem.clone(),
            });
        }

        if self.allow_insecure {
            warn!(host, "No trust anchor found, connecting without certificate validation");
            Ok(TrustAnchor::Insecure)
        } else {
            Err(FetchError::Tls(format!("no trust anchor for {}", host)))
        }
    }
}
