//! Completion check-in for the copy job monitor.

use std::{collections::BTreeMap, time::Duration};

use log::{info, warn};
use reqwest::blocking::Client;

use crate::{provider::check_status, Result};

const CHECK_IN_TIMEOUT: Duration = Duration::from_secs(30);
const CHECK_IN_MESSAGE: &str = "Completed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckIn {
    Sent,
    /// The cluster is a staging cluster.
    Skipped,
    /// No monitor is configured for the cluster.
    Unmapped,
}

pub struct Snitch {
    http: Client,
    urls: BTreeMap<String, String>,
    staging_clusters: Vec<String>,
}

impl Snitch {
    pub fn new(urls: BTreeMap<String, String>, staging_clusters: Vec<String>) -> Result<Self> {
        let http = Client::builder().timeout(CHECK_IN_TIMEOUT).build()?;
        Ok(Self {
            http,
            urls,
            staging_clusters,
        })
    }

    pub fn check_in(&self, cluster: &str) -> Result<CheckIn> {
        if self.staging_clusters.iter().any(|staging| staging == cluster) {
            info!("Not signalling completion for staging cluster {cluster}");
            return Ok(CheckIn::Skipped);
        }
        let Some(url) = self.urls.get(cluster) else {
            warn!("No completion monitor configured for cluster {cluster}");
            return Ok(CheckIn::Unmapped);
        };
        info!("Signalling completion for cluster {cluster}");
        let response = self
            .http
            .post(url)
            .form(&[("m", CHECK_IN_MESSAGE)])
            .send()?;
        check_status(response, url)?;
        Ok(CheckIn::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http_fixture::HttpFixture, VaultError};

    fn snitch(url: &str) -> Snitch {
        Snitch::new(
            BTreeMap::from([("aspireprod".to_string(), format!("{url}/abc123"))]),
            vec!["aspirestaging".to_string(), "aspiredu-stg".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_check_in_posts_completed_form() {
        let fixture = HttpFixture::serve(vec![(202, String::new())]);
        assert_eq!(snitch(&fixture.base_url).check_in("aspireprod").unwrap(), CheckIn::Sent);
        let requests = fixture.finish();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/abc123");
        assert_eq!(requests[0].body, "m=Completed");
        assert_eq!(
            requests[0].header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_staging_and_unmapped_clusters_send_nothing() {
        let snitch = snitch("http://127.0.0.1:9");
        assert_eq!(snitch.check_in("aspirestaging").unwrap(), CheckIn::Skipped);
        assert_eq!(snitch.check_in("aspiredu-stg").unwrap(), CheckIn::Skipped);
        assert_eq!(snitch.check_in("aspiredu-au").unwrap(), CheckIn::Unmapped);
    }

    #[test]
    fn test_check_in_failure_is_an_error() {
        let fixture = HttpFixture::serve(vec![(500, String::new())]);
        let err = snitch(&fixture.base_url).check_in("aspireprod").unwrap_err();
        assert!(matches!(err, VaultError::UpstreamStatus { status: 500, .. }));
        fixture.finish();
    }
}
