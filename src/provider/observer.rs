//! Observer for fetching actual state from a provider.
//!
//! Each environment owns a disjoint name prefix, so environments are fetched
//! concurrently with no shared state between the calls.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EnvironmentConfig;
use crate::error::{ProviderError, Result};

use super::client::Provider;
use super::types::ObservedResource;

/// Observed resources keyed by environment name.
pub type ObservedState = BTreeMap<String, Vec<ObservedResource>>;

/// Fetches observed resources per environment.
pub struct ResourceObserver<'a> {
    /// Provider to query.
    provider: &'a dyn Provider,
    /// Bound on each listing call.
    timeout: Duration,
}

impl<'a> ResourceObserver<'a> {
    /// Creates a new observer.
    #[must_use]
    pub const fn new(provider: &'a dyn Provider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Lists the resources that belong to one naming prefix.
    ///
    /// The provider is asked for `<prefix>-` and the answer is narrowed to
    /// names of the form `<prefix>-<digits>`, so `web` never claims
    /// `web-api-01`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails or the call times out.
    pub async fn fetch_prefix(&self, prefix: &str) -> Result<Vec<ObservedResource>> {
        let query = format!("{prefix}-");

        let listed = tokio::time::timeout(self.timeout, self.provider.list_resources(&query))
            .await
            .map_err(|_| {
                ProviderError::timeout("list_resources", query.clone(), self.timeout.as_secs())
            })??;

        let owned: Vec<ObservedResource> =
            listed.into_iter().filter(|r| r.belongs_to(prefix)).collect();

        debug!("Observed {} resource(s) for prefix '{prefix}'", owned.len());
        Ok(owned)
    }

    /// Fetches every environment concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first provider error; observed state must be complete
    /// before a diff is meaningful.
    pub async fn fetch_all(
        &self,
        environments: &BTreeMap<String, EnvironmentConfig>,
    ) -> Result<ObservedState> {
        info!(
            "Observing {} environment(s) on provider '{}'",
            environments.len(),
            self.provider.provider_name()
        );

        let fetches = environments.iter().map(|(name, env)| async move {
            let resources = self.fetch_prefix(&env.prefix).await?;
            Ok::<_, crate::error::FleetformError>((name.clone(), resources))
        });

        let observed: ObservedState = try_join_all(fetches).await?.into_iter().collect();

        debug!(
            "Observed {} resource(s) in total",
            observed.values().map(Vec::len).sum::<usize>()
        );
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationPolicy;
    use crate::error::FleetformError;
    use crate::provider::{LocalProvider, ResourceSpec, TagMap};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Provider whose listings never answer in time.
    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        async fn list_resources(&self, _name_prefix: &str) -> Result<Vec<ObservedResource>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }

        async fn create_resource(&self, spec: &ResourceSpec) -> Result<String> {
            Ok(format!("i-{}", spec.name))
        }

        async fn update_tags(&self, _id: &str, _tags: &TagMap) -> Result<()> {
            Ok(())
        }

        async fn destroy_resource(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "stalled"
        }
    }

    fn env(prefix: &str) -> EnvironmentConfig {
        EnvironmentConfig {
            count: 1,
            prefix: prefix.to_string(),
            instance_types: vec![String::from("t3.micro")],
            environment_tag: None,
            allocation: AllocationPolicy::Cycle,
            tags: TagMap::new(),
        }
    }

    fn spec(name: &str) -> ResourceSpec {
        ResourceSpec {
            name: name.to_string(),
            environment: String::new(),
            instance_type: String::from("t3.micro"),
            tags: TagMap::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_all_separates_environments() {
        let temp = TempDir::new().unwrap();
        let provider = LocalProvider::open(temp.path().join("inventory.json")).await.unwrap();
        for name in ["web-01", "web-02", "web-api-01", "db-01"] {
            provider.create_resource(&spec(name)).await.unwrap();
        }

        let environments = BTreeMap::from([
            (String::from("web"), env("web")),
            (String::from("api"), env("web-api")),
            (String::from("db"), env("db")),
            (String::from("cache"), env("cache")),
        ]);

        let observer = ResourceObserver::new(&provider, Duration::from_secs(5));
        let observed = observer.fetch_all(&environments).await.unwrap();

        assert_eq!(observed["web"].len(), 2);
        assert_eq!(observed["api"].len(), 1);
        assert_eq!(observed["api"][0].name, "web-api-01");
        assert_eq!(observed["db"].len(), 1);
        assert!(observed["cache"].is_empty());
    }

    #[tokio::test]
    async fn test_stalled_listing_times_out() {
        let environments = BTreeMap::from([(String::from("web"), env("web"))]);
        let observer = ResourceObserver::new(&StalledProvider, Duration::from_millis(50));

        let started = std::time::Instant::now();
        let err = observer.fetch_all(&environments).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(err.is_retryable());
        match err {
            FleetformError::Provider(ProviderError::Timeout { operation, target, .. }) => {
                assert_eq!(operation, "list_resources");
                assert_eq!(target, "web-");
            }
            other => panic!("expected a timeout, got {other}"),
        }
    }
}
