//! The provider contract.
//!
//! The engine depends only on these four operations; it never sees a
//! provider's wider API surface.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{ObservedResource, ResourceSpec, TagMap};

/// Narrow contract every provider implements.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Lists resources whose name starts with `name_prefix`.
    async fn list_resources(&self, name_prefix: &str) -> Result<Vec<ObservedResource>>;

    /// Creates a resource and returns its provider id.
    ///
    /// Implementations must be idempotent per name: creating a name that
    /// already exists returns the existing id.
    async fn create_resource(&self, spec: &ResourceSpec) -> Result<String>;

    /// Replaces the tag map of an existing resource.
    async fn update_tags(&self, id: &str, tags: &TagMap) -> Result<()>;

    /// Destroys a resource.
    async fn destroy_resource(&self, id: &str) -> Result<()>;

    /// Gets the provider name.
    fn provider_name(&self) -> &'static str;
}
