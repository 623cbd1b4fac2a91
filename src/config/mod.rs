pub mod secrets;

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use serde::Deserialize;

pub use secrets::{ResolvedSecret, SecretSource};

use crate::{
    layout::{KeyLayout, DEFAULT_NAMESPACE},
    provider::DEFAULT_API_URL,
    vault_error, Result,
};

pub const DEFAULT_STORAGE_CLASS: &str = "DEEP_ARCHIVE";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_storage_class() -> String {
    DEFAULT_STORAGE_CLASS.to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("tmp/")
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub team_id: String,
    pub api_key: SecretSource,
    /// Region of the provider's backup bucket. Unset means the AWS SDK's
    /// own region resolution (`AWS_REGION`, profile), never `storage.region`.
    #[serde(default)]
    pub s3_region: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StorageCredentials {
    pub access_key_id: SecretSource,
    pub secret_access_key: SecretSource,
}

/// Connection settings for the archive's own S3 account.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub credentials: Option<StorageCredentials>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSection {
    pub bucket: String,
    /// Cluster name to bucket, for clusters archived outside `bucket`.
    #[serde(default)]
    pub regional_buckets: BTreeMap<String, String>,
    #[serde(default)]
    pub migration_buckets: Vec<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl ArchiveSection {
    pub fn bucket_for(&self, cluster: &str) -> &str {
        self.regional_buckets
            .get(cluster)
            .map(String::as_str)
            .unwrap_or(&self.bucket)
    }

    /// Buckets the migration walks: the configured list, or the default
    /// bucket followed by every regional bucket.
    pub fn migration_buckets(&self) -> Vec<String> {
        if !self.migration_buckets.is_empty() {
            return self.migration_buckets.clone();
        }
        let mut seen = BTreeSet::new();
        std::iter::once(&self.bucket)
            .chain(self.regional_buckets.values())
            .filter(|bucket| seen.insert(bucket.as_str()))
            .cloned()
            .collect()
    }

    pub fn key_layout(&self) -> KeyLayout {
        KeyLayout::new(&self.namespace)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MonitoringSection {
    /// Clusters that never signal completion.
    #[serde(default)]
    pub staging_clusters: Vec<String>,
    /// Cluster name to check-in URL.
    #[serde(default)]
    pub snitches: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    #[serde(default)]
    pub provider: Option<ProviderSection>,
    #[serde(default)]
    pub storage: StorageSection,
    pub archive: ArchiveSection,
    #[serde(default)]
    pub monitoring: MonitoringSection,
}

impl VaultConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            vault_error!(InvalidParameter {
                description: format!("Failed to read config file {}: {}", path.display(), e),
            })
        })?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(yaml_str: &str) -> Result<Self> {
        let config: VaultConfig = serde_yaml::from_str(yaml_str).map_err(|e| {
            vault_error!(InvalidParameter {
                description: format!("Failed to parse config YAML: {}", e),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |description: &str| {
            Err(vault_error!(InvalidParameter {
                description: description.to_string(),
            }))
        };
        if self.archive.bucket.trim().is_empty() {
            return invalid("archive.bucket must not be empty");
        }
        if self.archive.namespace.trim().is_empty() {
            return invalid("archive.namespace must not be empty");
        }
        if self.archive.namespace.contains('/') {
            return invalid("archive.namespace must be a single key segment without '/'");
        }
        if self.archive.storage_class.trim().is_empty() {
            return invalid("archive.storage_class must not be empty");
        }
        if self.archive.regional_buckets.values().any(|b| b.trim().is_empty()) {
            return invalid("archive.regional_buckets entries must not be empty");
        }
        if let Some(provider) = &self.provider {
            if !(provider.api_url.starts_with("https://") || provider.api_url.starts_with("http://"))
            {
                return invalid("provider.api_url must be an http(s) URL");
            }
            if provider.team_id.trim().is_empty() {
                return invalid("provider.team_id must not be empty");
            }
        }
        if let Some((cluster, _)) = self
            .monitoring
            .snitches
            .iter()
            .find(|(_, url)| !url.starts_with("https://") && !url.starts_with("http://"))
        {
            return Err(vault_error!(InvalidParameter {
                description: format!("monitoring.snitches.{cluster} must be an http(s) URL"),
            }));
        }
        Ok(())
    }

    pub fn provider(&self) -> Result<&ProviderSection> {
        self.provider.as_ref().ok_or_else(|| {
            vault_error!(InvalidParameter {
                description: "provider section is required for this command".to_string(),
            })
        })
    }
}
