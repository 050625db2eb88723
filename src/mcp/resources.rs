//! MCP Resources Support
//!
//! Read-only data sources addressed by URI. Each server owns one
//! [`ResourceRegistry`]; entries are added during construction and live for
//! the life of the server.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// A resource exposed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Resource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Resource contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>, // base64 encoded
}

impl ResourceContents {
    /// Text contents for `uri`.
    pub fn text(uri: impl Into<String>, mime_type: Option<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type,
            text: Some(text.into()),
            blob: None,
        }
    }
}

/// Result of resources/list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Params of resources/read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

/// Result of resources/read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Produces the contents of one resource.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, resource: &Resource) -> Result<Vec<ResourceContents>>;
}

struct RegisteredResource {
    resource: Resource,
    reader: Arc<dyn ResourceReader>,
}

/// Resource registry, in registration order.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<RegisteredResource>,
    index: HashMap<String, usize>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. A URI can be registered only once.
    pub fn register<R: ResourceReader + 'static>(&mut self, resource: Resource, reader: R) -> Result<()> {
        if self.index.contains_key(&resource.uri) {
            return Err(Error::DuplicateResource(resource.uri));
        }
        debug!("Registered resource: {}", resource.uri);
        self.index.insert(resource.uri.clone(), self.resources.len());
        self.resources.push(RegisteredResource {
            resource,
            reader: Arc::new(reader),
        });
        Ok(())
    }

    /// All resource descriptors in registration order.
    pub fn list(&self) -> ListResourcesResult {
        ListResourcesResult {
            resources: self.resources.iter().map(|r| r.resource.clone()).collect(),
            next_cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Read a resource by URI.
    ///
    /// Unknown URIs are an error; a panicking reader is reported as an
    /// internal error.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_trait::async_trait;
    /// use mcp_bridge::mcp::resources::*;
    ///
    /// struct Motd;
    ///
    /// #[async_trait]
    /// impl ResourceReader for Motd {
    ///     async fn read(&self, r: &Resource) -> mcp_bridge::Result<Vec<ResourceContents>> {
    ///         Ok(vec![ResourceContents::text(r.uri.clone(), None, "welcome")])
    ///     }
    /// }
    ///
    /// let mut registry = ResourceRegistry::new();
    /// registry.register(Resource::new("mem://motd", "motd"), Motd).unwrap();
    ///
    /// # tokio_test::block_on(async {
    /// let result = registry.read("mem://motd").await.unwrap();
    /// assert_eq!(result.contents[0].text.as_deref(), Some("welcome"));
    /// assert!(registry.read("mem://other").await.is_err());
    /// # });
    /// ```
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        let entry = self
            .index
            .get(uri)
            .map(|&i| &self.resources[i])
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))?;

        match AssertUnwindSafe(entry.reader.read(&entry.resource))
            .catch_unwind()
            .await
        {
            Ok(contents) => Ok(ReadResourceResult { contents: contents? }),
            Err(_) => {
                error!("Resource reader for {} panicked", uri);
                Err(Error::Internal(format!("reading {} failed unexpectedly", uri)))
            }
        }
    }
}
