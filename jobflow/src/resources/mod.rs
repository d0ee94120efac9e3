//! Zone and region expansion.
//!
//! Location lists may mix literal names with prefixes ending in `*`
//! (`us-*`). Prefixes are matched against the project's full listing, which
//! is fetched at most once per location kind and only when a prefix is
//! present.

use async_trait::async_trait;
use std::fmt;
use tracing::debug;

use crate::config::RunConfig;
use crate::errors::{ConfigError, JobflowError};

/// Zone used when neither zones nor regions are configured.
pub const DEFAULT_ZONE: &str = "us-east1-d";

/// The kind of location being listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKind {
    /// Compute zones.
    Zones,
    /// Compute regions.
    Regions,
}

impl LocationKind {
    /// The collection name used by the compute API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zones => "zones",
            Self::Regions => "regions",
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lists every location of a kind available to a project.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocationLister: Send + Sync {
    /// Returns all location names of `kind` for `project`.
    async fn list(&self, project: &str, kind: LocationKind) -> Result<Vec<String>, JobflowError>;
}

/// Expands `items`, replacing each `prefix*` entry with the listed names
/// that start with `prefix`.
///
/// Literal entries come first in their given order, followed by matches in
/// listing order. Each listed name is added at most once.
pub async fn expand_prefixes(
    lister: &dyn LocationLister,
    project: &str,
    kind: LocationKind,
    items: &[String],
) -> Result<Vec<String>, ConfigError> {
    let mut prefixes = Vec::new();
    let mut results = Vec::new();
    for item in items {
        match item.strip_suffix('*') {
            Some(prefix) => prefixes.push(prefix),
            None => results.push(item.clone()),
        }
    }

    if prefixes.is_empty() {
        return Ok(results);
    }

    let listed = lister
        .list(project, kind)
        .await
        .map_err(|e| ConfigError::lookup(kind.as_str(), e.to_string()))?;
    debug!(%kind, listed = listed.len(), prefixes = ?prefixes, "Expanding location prefixes");

    results.extend(
        listed
            .into_iter()
            .filter(|name| prefixes.iter().any(|prefix| name.starts_with(prefix))),
    );
    Ok(results)
}

/// The resolved placement of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locations {
    /// Allowed zones.
    pub zones: Vec<String>,
    /// Allowed regions.
    pub regions: Vec<String>,
}

impl Locations {
    /// Expands the configured zones or regions, falling back to
    /// [`DEFAULT_ZONE`] when nothing remains.
    pub async fn resolve(
        config: &RunConfig,
        lister: &dyn LocationLister,
    ) -> Result<Self, ConfigError> {
        if !config.zones.is_empty() && !config.regions.is_empty() {
            return Err(ConfigError::ConflictingLocations);
        }

        let mut locations = Self::default();
        if !config.regions.is_empty() {
            locations.regions =
                expand_prefixes(lister, &config.project, LocationKind::Regions, &config.regions)
                    .await?;
        }
        if !config.zones.is_empty() {
            locations.zones =
                expand_prefixes(lister, &config.project, LocationKind::Zones, &config.zones)
                    .await?;
        }
        if locations.zones.is_empty() && locations.regions.is_empty() {
            locations.zones.push(DEFAULT_ZONE.to_string());
        }
        Ok(locations)
    }
}

/// A lister for runs that never use prefixes. Any listing is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoListing;

#[async_trait]
impl LocationLister for NoListing {
    async fn list(&self, _project: &str, kind: LocationKind) -> Result<Vec<String>, JobflowError> {
        Err(ConfigError::lookup(kind.as_str(), "no location lister configured").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_literals_skip_listing() {
        let mut lister = MockLocationLister::new();
        lister.expect_list().never();

        let zones = expand_prefixes(
            &lister,
            "p",
            LocationKind::Zones,
            &strings(&["us-east1-b", "europe-west1-c"]),
        )
        .await
        .unwrap();
        assert_eq!(zones, strings(&["us-east1-b", "europe-west1-c"]));
    }

    #[tokio::test]
    async fn test_prefixes_share_one_listing() {
        let mut lister = MockLocationLister::new();
        lister
            .expect_list()
            .with(eq("p"), eq(LocationKind::Zones))
            .times(1)
            .returning(|_, _| Ok(strings(&["asia-east1-a", "us-east1-b", "us-west1-a", "europe-west1-b"])));

        let zones = expand_prefixes(
            &lister,
            "p",
            LocationKind::Zones,
            &strings(&["us-*", "asia-east1-a", "europe-*"]),
        )
        .await
        .unwrap();
        assert_eq!(
            zones,
            strings(&["asia-east1-a", "us-east1-b", "us-west1-a", "europe-west1-b"])
        );
    }

    #[tokio::test]
    async fn test_listing_failure_is_lookup_error() {
        let mut lister = MockLocationLister::new();
        lister
            .expect_list()
            .returning(|_, _| Err(JobflowError::Config(ConfigError::Invalid("boom".to_string()))));

        let err = expand_prefixes(&lister, "p", LocationKind::Regions, &strings(&["us-*"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Lookup { ref what, .. } if what == "regions"));
    }

    #[tokio::test]
    async fn test_default_zone() {
        let locations = Locations::resolve(&RunConfig::new("p"), &NoListing).await.unwrap();
        assert_eq!(locations.zones, vec![DEFAULT_ZONE]);
        assert!(locations.regions.is_empty());
    }

    #[tokio::test]
    async fn test_regions_without_default_zone() {
        let config = RunConfig::new("p").with_regions(["us-central1"]);
        let locations = Locations::resolve(&config, &NoListing).await.unwrap();
        assert_eq!(locations.regions, vec!["us-central1"]);
        assert!(locations.zones.is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_locations() {
        let config = RunConfig::new("p")
            .with_zones(["us-east1-b"])
            .with_regions(["us-east1"]);
        let err = Locations::resolve(&config, &NoListing).await.unwrap_err();
        assert_eq!(err, ConfigError::ConflictingLocations);
    }

    #[tokio::test]
    async fn test_prefix_without_lister_fails() {
        let config = RunConfig::new("p").with_zones(["us-*"]);
        let err = Locations::resolve(&config, &NoListing).await.unwrap_err();
        assert!(matches!(err, ConfigError::Lookup { .. }));
    }
}
