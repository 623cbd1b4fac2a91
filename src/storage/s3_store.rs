use std::sync::Arc;

use aws_sdk_s3::{
    error::DisplayErrorContext,
    primitives::{ByteStream, DateTime as S3DateTime},
    types::{Delete, MetadataDirective, ObjectIdentifier, StorageClass},
};
use log::debug;

use super::{ObjectPage, ObjectStore, Placement};
use crate::{vault_error, Result};

type S3Client = aws_sdk_s3::Client;

/// [`ObjectStore`] over one S3 bucket.
///
/// Calls block the current thread on a dedicated single-threaded runtime.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    runtime: Arc<tokio::runtime::Runtime>,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: String, runtime: Arc<tokio::runtime::Runtime>) -> Self {
        Self {
            client,
            bucket,
            runtime,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn s3_expires(placement: &Placement) -> S3DateTime {
    S3DateTime::from_secs(placement.expires.timestamp())
}

impl ObjectStore for S3ObjectStore {
    fn list_common_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        let mut prefixes = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .runtime
                .block_on(
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(prefix)
                        .delimiter("/")
                        .set_continuation_token(token.take())
                        .send(),
                )
                .map_err(|err| {
                    vault_error!(StorageError {
                        description: format!(
                            "Failed to list prefixes under s3://{}/{prefix}: {}",
                            self.bucket,
                            DisplayErrorContext(&err)
                        ),
                    })
                })?;
            prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|common| common.prefix().map(str::to_string)),
            );
            token = output.next_continuation_token().map(str::to_string);
            if output.is_truncated() != Some(true) || token.is_none() {
                break;
            }
        }
        Ok(prefixes)
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: i32,
    ) -> Result<ObjectPage> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .max_keys(max_keys)
                    .set_continuation_token(continuation.map(str::to_string))
                    .send(),
            )
            .map_err(|err| {
                vault_error!(StorageError {
                    description: format!(
                        "Failed to list objects under s3://{}/{prefix}: {}",
                        self.bucket,
                        DisplayErrorContext(&err)
                    ),
                })
            })?;
        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let next_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        Ok(ObjectPage { keys, next_token })
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Fetching s3://{}/{}", self.bucket, key);
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|err| {
                    vault_error!(StorageError {
                        description: format!(
                            "Failed to fetch s3://{}/{key}: {}",
                            self.bucket,
                            DisplayErrorContext(&err)
                        ),
                    })
                })?;
            let bytes = output.body.collect().await.map_err(|err| {
                vault_error!(StorageError {
                    description: format!("Failed to read object body of {key}: {err}"),
                })
            })?;
            Ok(bytes.to_vec())
        })
    }

    fn put_object(&self, key: &str, data: Vec<u8>, placement: Option<&Placement>) -> Result<()> {
        debug!("Uploading s3://{}/{}", self.bucket, key);
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));
        if let Some(placement) = placement {
            request = request
                .expires(s3_expires(placement))
                .storage_class(StorageClass::from(placement.storage_class.as_str()));
        }
        self.runtime.block_on(request.send()).map_err(|err| {
            vault_error!(StorageError {
                description: format!(
                    "Failed to upload s3://{}/{key}: {}",
                    self.bucket,
                    DisplayErrorContext(&err)
                ),
            })
        })?;
        Ok(())
    }

    fn copy_object(&self, source_key: &str, dest_key: &str, placement: &Placement) -> Result<()> {
        debug!("Copying s3://{0}/{1} to s3://{0}/{2}", self.bucket, source_key, dest_key);
        let request = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, source_key))
            .key(dest_key)
            .metadata_directive(MetadataDirective::Replace)
            .expires(s3_expires(placement))
            .storage_class(StorageClass::from(placement.storage_class.as_str()));
        self.runtime.block_on(request.send()).map_err(|err| {
            vault_error!(StorageError {
                description: format!(
                    "Failed to copy {source_key} to {dest_key} in {}: {}",
                    self.bucket,
                    DisplayErrorContext(&err)
                ),
            })
        })?;
        Ok(())
    }

    fn delete_objects(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let identifiers = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| {
                vault_error!(StorageError {
                    description: format!("Failed to build delete request: {err}"),
                })
            })?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|err| {
                vault_error!(StorageError {
                    description: format!("Failed to build delete request: {err}"),
                })
            })?;
        let output = self
            .runtime
            .block_on(
                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(delete)
                    .send(),
            )
            .map_err(|err| {
                vault_error!(StorageError {
                    description: format!(
                        "Failed to delete {} objects from {}: {}",
                        keys.len(),
                        self.bucket,
                        DisplayErrorContext(&err)
                    ),
                })
            })?;
        if let Some(failed) = output.errors().first() {
            return Err(vault_error!(StorageError {
                description: format!(
                    "Failed to delete {} of {} objects from {}, first {}: {}",
                    output.errors().len(),
                    keys.len(),
                    self.bucket,
                    failed.key().unwrap_or("<unknown>"),
                    failed.message().unwrap_or("no message")
                ),
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::{
        operation::{
            copy_object::CopyObjectOutput, delete_objects::DeleteObjectsOutput,
            get_object::GetObjectOutput, list_objects_v2::ListObjectsV2Output,
            put_object::PutObjectOutput,
        },
        types::{CommonPrefix, Error as S3ObjectError, Object},
    };
    use aws_smithy_mocks::{mock, mock_client, Rule};
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::utils::s3::create_runtime;

    fn prepare_store(rules: &[Rule]) -> S3ObjectStore {
        S3ObjectStore::new(
            mock_client!(aws_sdk_s3, rules),
            "test-bucket".to_string(),
            create_runtime().unwrap(),
        )
    }

    fn placement() -> Placement {
        Placement {
            expires: Utc.with_ymd_and_hms(2026, 9, 16, 0, 0, 0).unwrap(),
            storage_class: "ONEZONE_IA".to_string(),
        }
    }

    #[test]
    fn test_list_common_prefixes() {
        let rule = mock!(S3Client::list_objects_v2)
            .match_requests(|req| {
                req.prefix() == Some("crunchybridge/") && req.delimiter() == Some("/")
            })
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .common_prefixes(CommonPrefix::builder().prefix("crunchybridge/c1/").build())
                    .common_prefixes(CommonPrefix::builder().prefix("crunchybridge/v2/").build())
                    .is_truncated(false)
                    .build()
            });
        let store = prepare_store(&[rule]);
        let prefixes = store.list_common_prefixes("crunchybridge/").unwrap();
        assert_eq!(prefixes, vec!["crunchybridge/c1/", "crunchybridge/v2/"]);
    }

    #[test]
    fn test_list_page_returns_continuation() {
        let rule = mock!(S3Client::list_objects_v2)
            .match_requests(|req| req.max_keys() == Some(1000) && req.continuation_token().is_none())
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .contents(Object::builder().key("p/a").build())
                    .contents(Object::builder().key("p/b").build())
                    .is_truncated(true)
                    .next_continuation_token("next")
                    .build()
            });
        let store = prepare_store(&[rule]);
        let page = store.list_page("p/", None, 1000).unwrap();
        assert_eq!(page.keys, vec!["p/a", "p/b"]);
        assert_eq!(page.next_token.as_deref(), Some("next"));
    }

    #[test]
    fn test_get_object() {
        let rule = mock!(S3Client::get_object).then_output(|| {
            GetObjectOutput::builder()
                .body(ByteStream::from_static(b"[backup]"))
                .build()
        });
        let store = prepare_store(&[rule]);
        assert_eq!(store.get_object("p/backup.manifest").unwrap(), b"[backup]");
    }

    #[test]
    fn test_put_object_sets_placement() {
        let rule = mock!(S3Client::put_object)
            .match_requests(|req| {
                req.storage_class() == Some(&StorageClass::OnezoneIa)
                    && req.expires().is_some()
            })
            .then_output(|| PutObjectOutput::builder().build());
        let store = prepare_store(&[rule]);
        store
            .put_object("v2/c1/file", b"data".to_vec(), Some(&placement()))
            .unwrap();
    }

    #[test]
    fn test_copy_object_replaces_metadata() {
        let rule = mock!(S3Client::copy_object)
            .match_requests(|req| {
                req.copy_source() == Some("test-bucket/crunchybridge/c1/backup/abc/backup.info")
                    && req.key() == Some("crunchybridge/v2/c1/20230916/backup/abc/backup.info")
                    && req.metadata_directive() == Some(&MetadataDirective::Replace)
                    && req.storage_class() == Some(&StorageClass::OnezoneIa)
            })
            .then_output(|| CopyObjectOutput::builder().build());
        let store = prepare_store(&[rule]);
        store
            .copy_object(
                "crunchybridge/c1/backup/abc/backup.info",
                "crunchybridge/v2/c1/20230916/backup/abc/backup.info",
                &placement(),
            )
            .unwrap();
    }

    #[test]
    fn test_delete_objects_reports_partial_failure() {
        let rule = mock!(S3Client::delete_objects).then_output(|| {
            DeleteObjectsOutput::builder()
                .errors(
                    S3ObjectError::builder()
                        .key("p/b")
                        .message("Access Denied")
                        .build(),
                )
                .build()
        });
        let store = prepare_store(&[rule]);
        let err = store
            .delete_objects(&["p/a".to_string(), "p/b".to_string()])
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("Failed to delete 1 of 2 objects from test-bucket, first p/b: Access Denied"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_delete_objects_skips_empty_batch() {
        let store = prepare_store(&[]);
        assert!(store.delete_objects(&[]).is_ok());
    }
}
