//! File-backed simulated provider.
//!
//! The local provider keeps its inventory in a JSON file, so a fleet can be
//! planned, applied and re-planned across runs without any cloud account.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ProviderError, Result};

use super::client::Provider;
use super::types::{ObservedResource, ResourceSpec, TagMap};

/// On-disk inventory layout.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Inventory {
    /// Resources keyed by id.
    resources: BTreeMap<String, ObservedResource>,
}

/// File-backed provider.
#[derive(Debug)]
pub struct LocalProvider {
    /// Path to the inventory file.
    path: PathBuf,
    /// In-memory copy of the inventory.
    inventory: Mutex<Inventory>,
}

impl LocalProvider {
    /// Opens the inventory at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let inventory = if path.exists() {
            debug!("Loading inventory from: {}", path.display());
            let content = fs::read_to_string(&path).await.map_err(|e| {
                ProviderError::inventory(format!("Failed to read inventory: {e}"))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                ProviderError::inventory(format!("Failed to parse inventory: {e}"))
            })?
        } else {
            debug!("Inventory does not exist yet: {}", path.display());
            Inventory::default()
        };

        Ok(Self {
            path,
            inventory: Mutex::new(inventory),
        })
    }

    /// Returns the inventory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of resources in the inventory.
    pub async fn len(&self) -> usize {
        self.inventory.lock().await.resources.len()
    }

    /// Returns true if the inventory holds no resources.
    pub async fn is_empty(&self) -> bool {
        self.inventory.lock().await.resources.is_empty()
    }

    /// Writes the inventory to disk atomically.
    ///
    /// Callers stage changes on a copy and swap it in only after this
    /// succeeds, so memory never holds what the file does not.
    async fn persist(&self, inventory: &Inventory) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                ProviderError::inventory(format!("Failed to create inventory directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(inventory)
            .map_err(|e| ProviderError::inventory(format!("Failed to serialize inventory: {e}")))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| ProviderError::inventory(format!("Failed to create inventory file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| ProviderError::inventory(format!("Failed to write inventory: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| ProviderError::inventory(format!("Failed to sync inventory: {e}")))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| ProviderError::inventory(format!("Failed to rename inventory: {e}")))?;

        Ok(())
    }
}

/// Generates an instance-style identifier.
fn generate_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("i-{}", &raw[..17])
}

#[async_trait]
impl Provider for LocalProvider {
    async fn list_resources(&self, name_prefix: &str) -> Result<Vec<ObservedResource>> {
        let inventory = self.inventory.lock().await;

        let mut found: Vec<ObservedResource> = inventory
            .resources
            .values()
            .filter(|r| r.name.starts_with(name_prefix))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        debug!("Listed {} resource(s) with prefix '{name_prefix}'", found.len());
        Ok(found)
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<String> {
        let mut inventory = self.inventory.lock().await;

        if let Some(existing) = inventory.resources.values().find(|r| r.name == spec.name) {
            debug!("Resource {} already exists as {}", spec.name, existing.id);
            return Ok(existing.id.clone());
        }

        let id = generate_id();
        let mut next = inventory.clone();
        next.resources.insert(id.clone(), ObservedResource::from_spec(spec, &id));
        self.persist(&next).await?;
        *inventory = next;

        info!("Created resource: {} (ID: {id})", spec.name);
        Ok(id)
    }

    async fn update_tags(&self, id: &str, tags: &TagMap) -> Result<()> {
        let mut inventory = self.inventory.lock().await;

        let mut next = inventory.clone();
        let resource = next
            .resources
            .get_mut(id)
            .ok_or_else(|| ProviderError::ResourceNotFound { id: id.to_string() })?;
        resource.tags.clone_from(tags);
        self.persist(&next).await?;
        *inventory = next;

        info!("Updated tags on resource: {id}");
        Ok(())
    }

    async fn destroy_resource(&self, id: &str) -> Result<()> {
        let mut inventory = self.inventory.lock().await;

        let mut next = inventory.clone();
        if next.resources.remove(id).is_none() {
            return Err(ProviderError::ResourceNotFound { id: id.to_string() }.into());
        }
        self.persist(&next).await?;
        *inventory = next;

        info!("Destroyed resource: {id}");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(name: &str, instance_type: &str) -> ResourceSpec {
        ResourceSpec {
            name: name.to_string(),
            environment: String::from("dev"),
            instance_type: instance_type.to_string(),
            tags: TagMap::from([(String::from("Name"), name.to_string())]),
        }
    }

    async fn create_test_provider() -> (LocalProvider, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let provider = LocalProvider::open(temp_dir.path().join("inventory.json"))
            .await
            .expect("Failed to open provider");
        (provider, temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (provider, _temp) = create_test_provider().await;

        let id = provider.create_resource(&spec("dev-01", "t3.micro")).await.unwrap();
        provider.create_resource(&spec("prod-01", "m5.large")).await.unwrap();

        assert!(id.starts_with("i-"));
        assert_eq!(id.len(), 19);

        let dev = provider.list_resources("dev").await.unwrap();
        assert_eq!(dev.len(), 1);
        assert_eq!(dev[0].id, id);
        assert_eq!(dev[0].instance_type, "t3.micro");
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_name() {
        let (provider, _temp) = create_test_provider().await;

        let first = provider.create_resource(&spec("dev-01", "t3.micro")).await.unwrap();
        let second = provider.create_resource(&spec("dev-01", "t3.micro")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.len().await, 1);
    }

    #[tokio::test]
    async fn test_inventory_survives_reopen() {
        let (provider, temp) = create_test_provider().await;
        let id = provider.create_resource(&spec("dev-01", "t3.micro")).await.unwrap();
        drop(provider);

        let reopened = LocalProvider::open(temp.path().join("inventory.json")).await.unwrap();
        let listed = reopened.list_resources("dev").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[tokio::test]
    async fn test_update_tags_and_destroy() {
        let (provider, _temp) = create_test_provider().await;
        let id = provider.create_resource(&spec("dev-01", "t3.micro")).await.unwrap();

        let tags = TagMap::from([(String::from("Owner"), String::from("infra"))]);
        provider.update_tags(&id, &tags).await.unwrap();
        let listed = provider.list_resources("dev").await.unwrap();
        assert_eq!(listed[0].tags, tags);

        provider.destroy_resource(&id).await.unwrap();
        assert!(provider.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_inventory_unchanged() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let provider = LocalProvider::open(blocker.join("inventory.json")).await.unwrap();

        assert!(provider.create_resource(&spec("dev-01", "t3.micro")).await.is_err());
        assert!(provider.list_resources("dev-").await.unwrap().is_empty());
        assert!(provider.create_resource(&spec("dev-01", "t3.micro")).await.is_err());
        assert!(provider.is_empty().await);
        assert!(!provider.path().exists());
    }

    #[tokio::test]
    async fn test_missing_resource_errors() {
        let (provider, _temp) = create_test_provider().await;

        assert!(provider.destroy_resource("i-missing").await.is_err());
        assert!(provider.update_tags("i-missing", &TagMap::new()).await.is_err());
    }
}
