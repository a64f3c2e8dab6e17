//! Debug bypass: a set's resources listed individually, untransformed.

use serde::Serialize;
use std::sync::Arc;

use super::{ProcessError, url};
use crate::resource::ResourceMode;
use crate::set::{ResourceSet, ResourceType};
use crate::utils::hash;

#[derive(Debug, Clone, Serialize)]
pub struct DebugListing {
    pub set: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub resources: Vec<DebugResource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugResource {
    pub path: String,
    pub mode: ResourceMode,
    /// Where a page should load the resource from.
    pub url: String,
    #[serde(skip)]
    pub content: Arc<[u8]>,
}

pub(super) fn listing(set: &ResourceSet) -> Result<DebugListing, ProcessError> {
    let resources = set
        .resources()
        .iter()
        .map(|resource| -> Result<DebugResource, ProcessError> {
            let content: Arc<[u8]> = resource.read()?.into();
            let url = if resource.is_in_same_application() {
                url::resource_url(resource.path(), &hash::fingerprint(&*content))
            } else {
                resource.path().to_string()
            };
            Ok(DebugResource {
                path: resource.path().to_string(),
                mode: resource.mode(),
                url,
                content,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DebugListing {
        set: set.name().to_string(),
        resource_type: set.resource_type(),
        resources,
    })
}
