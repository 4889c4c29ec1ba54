use crate::error::{Result, RolloutError};
use crate::manifest::{Manifest, ResourceKind};

const CORE_API_PREFIX: &str = "api/v1";

/// Collection URL for `kind` under the given API server and namespace.
pub fn resolve(kind: &ResourceKind, api_server: &str, namespace: &str) -> Result<String> {
    let collection = match kind {
        ResourceKind::ReplicationController => "replicationcontrollers",
        ResourceKind::Service => "services",
        ResourceKind::Other(other) => return Err(RolloutError::UnsupportedKind(other.clone())),
    };

    Ok(format!(
        "{}/{CORE_API_PREFIX}/namespaces/{namespace}/{collection}",
        api_server.trim_end_matches('/')
    ))
}

/// Addresses of one manifest's resource; derived per reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    pub collection_url: String,
    pub resource_url: String,
}

impl ResourceLocator {
    pub fn for_manifest(manifest: &Manifest, api_server: &str, namespace: &str) -> Result<Self> {
        let collection_url = resolve(manifest.kind(), api_server, namespace)?;
        let resource_url = format!("{collection_url}/{}", manifest.name());
        Ok(Self {
            collection_url,
            resource_url,
        })
    }
}
