use std::{path::PathBuf, sync::Arc};

use clap::Args;

use crate::{
    config::{StorageSection, VaultConfig},
    provider::{BackupToken, BridgeClient},
    storage::S3ObjectStore,
    utils::s3::{build_s3_client, static_credentials},
    Result,
};

#[derive(Args, Debug, Clone)]
/// Common command-line arguments used in all of the binaries.
pub struct CommonArgs {
    /// Path to the configuration YAML file.
    #[arg(short = 'f', long = "config")]
    pub config: PathBuf,
}

pub fn load_config(common: &CommonArgs) -> Result<VaultConfig> {
    VaultConfig::load_from_file(&common.config)
}

/// Client for the archive's own S3 account.
pub fn archive_client(
    storage: &StorageSection,
    runtime: &Arc<tokio::runtime::Runtime>,
) -> Result<aws_sdk_s3::Client> {
    let credentials = match &storage.credentials {
        Some(credentials) => {
            let access_key_id = credentials
                .access_key_id
                .resolve("storage.credentials.access_key_id")?;
            let secret_access_key = credentials
                .secret_access_key
                .resolve("storage.credentials.secret_access_key")?;
            Some(static_credentials(
                access_key_id.expose(),
                secret_access_key.expose(),
                None,
            ))
        }
        None => None,
    };
    build_s3_client(
        runtime,
        storage.profile.as_deref(),
        storage.endpoint.as_deref(),
        storage.region.as_deref(),
        credentials,
    )
}

pub fn archive_store(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    runtime: &Arc<tokio::runtime::Runtime>,
) -> S3ObjectStore {
    S3ObjectStore::new(client.clone(), bucket.to_string(), Arc::clone(runtime))
}

pub fn provider_client(config: &VaultConfig) -> Result<BridgeClient> {
    let provider = config.provider()?;
    let api_key = provider.api_key.resolve("provider.api_key")?;
    BridgeClient::new(&provider.api_url, &provider.team_id, api_key.expose())
}

/// Store over the provider's bucket, scoped by a backup token's
/// temporary credentials. `region` is `provider.s3_region`; the token
/// carries none.
pub fn provider_store(
    token: &BackupToken,
    region: Option<&str>,
    runtime: &Arc<tokio::runtime::Runtime>,
) -> Result<S3ObjectStore> {
    let credentials = static_credentials(
        &token.aws.s3_key,
        &token.aws.s3_key_secret,
        Some(&token.aws.s3_token),
    );
    let client = build_s3_client(runtime, None, None, region, Some(credentials))?;
    Ok(S3ObjectStore::new(
        client,
        token.aws.s3_bucket.clone(),
        Arc::clone(runtime),
    ))
}
