//! Client for the CrunchyBridge platform API.

use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{vault_error, Result};

pub const DEFAULT_API_URL: &str = "https://api.crunchybridge.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
}

/// Temporary credentials scoped to one cluster's backup repository.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AwsBackupCredentials {
    pub s3_bucket: String,
    pub s3_key: String,
    pub s3_key_secret: String,
    pub s3_token: String,
}

impl std::fmt::Debug for AwsBackupCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsBackupCredentials")
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_key", &self.s3_key)
            .field("s3_key_secret", &"<redacted>")
            .field("s3_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackupToken {
    pub aws: AwsBackupCredentials,
    pub cluster_id: String,
    pub stanza: String,
}

impl BackupToken {
    /// Key prefix of this cluster's repository in the provider bucket,
    /// without a trailing `/`.
    pub fn repository_root(&self) -> String {
        format!("{}/{}", self.cluster_id, self.stanza)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Backup {
    pub name: String,
}

#[derive(Deserialize)]
struct ClusterList {
    clusters: Vec<Cluster>,
}

#[derive(Deserialize)]
struct BackupList {
    backups: Vec<Backup>,
}

/// The provider calls the copy orchestrator depends on.
pub trait ProviderApi {
    fn list_clusters(&self) -> Result<Vec<Cluster>>;
    fn create_backup_token(&self, cluster_id: &str) -> Result<BackupToken>;
    /// Backups newest first.
    fn list_backups(&self, cluster_id: &str) -> Result<Vec<Backup>>;
}

pub struct BridgeClient {
    http: Client,
    api_url: String,
    team_id: String,
    api_key: String,
}

impl BridgeClient {
    pub fn new(api_url: &str, team_id: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            team_id: team_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> Result<T> {
        debug!("Calling {url}");
        let response = request.bearer_auth(&self.api_key).send()?;
        let response = check_status(response, url)?;
        Ok(response.json::<T>()?)
    }
}

impl ProviderApi for BridgeClient {
    fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let url = format!("{}/clusters", self.api_url);
        let request = self
            .http
            .get(&url)
            .query(&[("team_id", self.team_id.as_str())]);
        Ok(self.send::<ClusterList>(request, &url)?.clusters)
    }

    fn create_backup_token(&self, cluster_id: &str) -> Result<BackupToken> {
        let url = format!("{}/clusters/{cluster_id}/backup-tokens", self.api_url);
        self.send(self.http.post(&url), &url)
    }

    fn list_backups(&self, cluster_id: &str) -> Result<Vec<Backup>> {
        let url = format!("{}/clusters/{cluster_id}/backups", self.api_url);
        let request = self
            .http
            .get(&url)
            .query(&[("order", "desc"), ("order_field", "name")]);
        Ok(self.send::<BackupList>(request, &url)?.backups)
    }
}

pub(crate) fn check_status(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(vault_error!(UpstreamStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }))
    }
}

pub fn find_cluster(api: &dyn ProviderApi, name: &str) -> Result<Cluster> {
    api.list_clusters()?
        .into_iter()
        .find(|cluster| cluster.name == name)
        .ok_or_else(|| {
            vault_error!(ClusterNotFound {
                cluster: name.to_string(),
            })
        })
}

/// First backup whose name starts with the `YYYYMMDD` stamp.
pub fn find_backup(backups: &[Backup], cluster: &str, stamp: &str) -> Result<Backup> {
    backups
        .iter()
        .find(|backup| backup.name.starts_with(stamp))
        .cloned()
        .ok_or_else(|| {
            vault_error!(BackupNotFound {
                cluster: cluster.to_string(),
                target: stamp.to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http_fixture::HttpFixture, VaultError};

    const TOKEN_BODY: &str = r#"{
        "aws": {
            "s3_bucket": "provider-bucket",
            "s3_key": "AKIA",
            "s3_key_secret": "secret",
            "s3_token": "session"
        },
        "cluster_id": "cb-1",
        "stanza": "abc123",
        "expires_at": "2023-09-16T02:00:00Z"
    }"#;

    struct FakeProvider {
        clusters: Vec<Cluster>,
    }

    impl ProviderApi for FakeProvider {
        fn list_clusters(&self) -> Result<Vec<Cluster>> {
            Ok(self.clusters.clone())
        }

        fn create_backup_token(&self, _cluster_id: &str) -> Result<BackupToken> {
            Ok(serde_json::from_str(TOKEN_BODY).unwrap())
        }

        fn list_backups(&self, _cluster_id: &str) -> Result<Vec<Backup>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_backup_token_deserializes() {
        let token: BackupToken = serde_json::from_str(TOKEN_BODY).unwrap();
        assert_eq!(token.aws.s3_bucket, "provider-bucket");
        assert_eq!(token.repository_root(), "cb-1/abc123");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret\""), "{rendered}");
        assert!(!rendered.contains("session"), "{rendered}");
    }

    #[test]
    fn test_backup_token_rejects_missing_fields() {
        let body = r#"{"aws": {"s3_bucket": "b"}, "cluster_id": "cb-1", "stanza": "s"}"#;
        assert!(serde_json::from_str::<BackupToken>(body).is_err());
    }

    #[test]
    fn test_find_cluster_by_exact_name() {
        let provider = FakeProvider {
            clusters: vec![
                Cluster {
                    id: "cb-1".to_string(),
                    name: "Cluster 1".to_string(),
                },
                Cluster {
                    id: "cb-2".to_string(),
                    name: "Cluster 2".to_string(),
                },
            ],
        };
        assert_eq!(find_cluster(&provider, "Cluster 1").unwrap().id, "cb-1");
        let err = find_cluster(&provider, "Cluster").unwrap_err();
        assert!(matches!(err, VaultError::ClusterNotFound { ref cluster, .. } if cluster == "Cluster"));
    }

    #[test]
    fn test_find_backup_by_stamp_prefix() {
        let backups = vec![
            Backup {
                name: "20230917-010002F".to_string(),
            },
            Backup {
                name: "20230916-010001F".to_string(),
            },
        ];
        assert_eq!(
            find_backup(&backups, "c1", "20230916").unwrap().name,
            "20230916-010001F"
        );
        let err = find_backup(&backups, "c1", "20230902").unwrap_err();
        assert!(matches!(err, VaultError::BackupNotFound { .. }));
    }

    #[test]
    fn test_client_sends_bearer_and_team() {
        let fixture = HttpFixture::serve(vec![(
            200,
            r#"{"clusters": [{"id": "cb-1", "name": "aspireprod", "team_id": "t"}]}"#.to_string(),
        )]);
        let client = BridgeClient::new(&fixture.base_url, "team-1", "api-key").unwrap();
        let clusters = client.list_clusters().unwrap();
        assert_eq!(
            clusters,
            vec![Cluster {
                id: "cb-1".to_string(),
                name: "aspireprod".to_string(),
            }]
        );
        let requests = fixture.finish();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/clusters?team_id=team-1");
        assert_eq!(requests[0].header("authorization"), Some("Bearer api-key"));
    }

    #[test]
    fn test_client_token_and_backups() {
        let fixture = HttpFixture::serve(vec![
            (200, TOKEN_BODY.to_string()),
            (200, r#"{"backups": [{"name": "20230916-010001F"}]}"#.to_string()),
        ]);
        let client = BridgeClient::new(&fixture.base_url, "team-1", "api-key").unwrap();
        let token = client.create_backup_token("cb-1").unwrap();
        assert_eq!(token.stanza, "abc123");
        let backups = client.list_backups("cb-1").unwrap();
        assert_eq!(backups[0].name, "20230916-010001F");

        let requests = fixture.finish();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/clusters/cb-1/backup-tokens");
        assert_eq!(
            requests[1].path,
            "/clusters/cb-1/backups?order=desc&order_field=name"
        );
    }

    #[test]
    fn test_client_fails_on_non_success() {
        let fixture = HttpFixture::serve(vec![(403, r#"{"message": "forbidden"}"#.to_string())]);
        let client = BridgeClient::new(&fixture.base_url, "team-1", "bad-key").unwrap();
        let err = client.list_clusters().unwrap_err();
        match err {
            VaultError::UpstreamStatus { status, ref url, .. } => {
                assert_eq!(status, 403);
                assert!(url.ends_with("/clusters"), "{url}");
            }
            other => panic!("unexpected error: {other}"),
        }
        fixture.finish();
    }
}
