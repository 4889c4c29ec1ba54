use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, RolloutError};

/// Resource kinds the rollout knows how to place.
///
/// Manifests with any other kind still load; the endpoint resolver is the
/// one that refuses them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    ReplicationController,
    Service,
    Other(String),
}

impl ResourceKind {
    /// True for kinds whose controller owns pods that must be drained first
    pub fn runs_pods(&self) -> bool {
        matches!(self, Self::ReplicationController)
    }
}

impl From<&str> for ResourceKind {
    fn from(kind: &str) -> Self {
        match kind {
            "ReplicationController" => Self::ReplicationController,
            "Service" => Self::Service,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ReplicationController => f.write_str("ReplicationController"),
            Self::Service => f.write_str("Service"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestHeader {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: HeaderMetadata,
}

#[derive(Deserialize, Default)]
struct HeaderMetadata {
    #[serde(default)]
    name: String,
}

/// A single resource definition read from the workspace
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    api_version: String,
    kind: ResourceKind,
    name: String,
    raw: Vec<u8>,
}

impl Manifest {
    /// Reads `{workspace}/{file}`.
    pub fn from_workspace(workspace: impl AsRef<Path>, file: &str) -> Result<Self> {
        Self::from_file(workspace.as_ref().join(file))
    }

    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let raw = fs::read(&path).map_err(|source| RolloutError::FileRead {
            path: path.clone(),
            source,
        })?;
        let manifest = Self::parse(&path, raw)?;
        debug!(
            path = %path.display(),
            kind = %manifest.kind,
            name = %manifest.name,
            "loaded manifest"
        );
        Ok(manifest)
    }

    /// Parses a manifest body, keeping the bytes as they were read.
    pub fn parse(path: &Path, raw: Vec<u8>) -> Result<Self> {
        let header: ManifestHeader =
            serde_json::from_slice(&raw).map_err(|source| RolloutError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;

        if header.metadata.name.is_empty() {
            return Err(RolloutError::MissingName(path.to_path_buf()));
        }

        Ok(Self {
            api_version: header.api_version,
            kind: ResourceKind::from(header.kind.as_str()),
            name: header.metadata.name,
            raw,
        })
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw
    }
}
