use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::project::Health;
use crate::descriptors::ServiceDescriptor;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub health: Health,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCreateRequest {
    pub service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl From<&ServiceDescriptor> for ServiceCreateRequest {
    fn from(descriptor: &ServiceDescriptor) -> Self {
        Self {
            service_id: descriptor.id.clone(),
            image: descriptor.image.clone(),
            env: descriptor.env.clone(),
            scale: descriptor.scale,
        }
    }
}

/// Registers a local source directory with a running instance
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub service_id: String,
    pub source: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EnvVariable {
    pub name: String,
    pub value: String,
}
