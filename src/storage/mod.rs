use chrono::{DateTime, Utc};
use log::debug;

use crate::Result;

mod s3_store;

pub use s3_store::S3ObjectStore;

#[cfg(test)]
pub(crate) mod mem_store;

/// Objects requested per listing round trip.
pub const LIST_PAGE_SIZE: i32 = 1000;

/// Maximum keys accepted by one batch delete request.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Expiry and storage tier applied to written objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub expires: DateTime<Utc>,
    pub storage_class: String,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Token for the following page; `None` on the last page.
    pub next_token: Option<String>,
}

/// Abstraction over the bucket operations the archive tools rely on.
///
/// Every instance is scoped to a single bucket.
pub trait ObjectStore {
    /// Immediate sub-prefixes of `prefix`, grouped on `/`.
    fn list_common_prefixes(&self, prefix: &str) -> Result<Vec<String>>;
    /// Up to `max_keys` object keys under `prefix`, resuming at `continuation`.
    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: i32,
    ) -> Result<ObjectPage>;
    fn get_object(&self, key: &str) -> Result<Vec<u8>>;
    fn put_object(&self, key: &str, data: Vec<u8>, placement: Option<&Placement>) -> Result<()>;
    /// Server-side copy within the bucket.
    fn copy_object(&self, source_key: &str, dest_key: &str, placement: &Placement) -> Result<()>;
    /// Deletes at most [`DELETE_BATCH_SIZE`] keys in one request.
    fn delete_objects(&self, keys: &[String]) -> Result<()>;
}

/// Lazily walks every object under a prefix, one listing call per page.
pub struct ObjectPages<'a> {
    store: &'a dyn ObjectStore,
    prefix: String,
    page_size: i32,
    token: Option<String>,
    done: bool,
}

impl<'a> ObjectPages<'a> {
    pub fn new(store: &'a dyn ObjectStore, prefix: &str) -> Self {
        Self::with_page_size(store, prefix, LIST_PAGE_SIZE)
    }

    pub fn with_page_size(store: &'a dyn ObjectStore, prefix: &str, page_size: i32) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
            page_size,
            token: None,
            done: false,
        }
    }
}

impl Iterator for ObjectPages<'_> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self
            .store
            .list_page(&self.prefix, self.token.as_deref(), self.page_size)
        {
            Ok(page) => {
                self.token = page.next_token;
                self.done = self.token.is_none();
                Some(Ok(page.keys))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Every object key under `prefix`.
pub fn list_all_keys(store: &dyn ObjectStore, prefix: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for page in ObjectPages::new(store, prefix) {
        keys.extend(page?);
    }
    Ok(keys)
}

/// Deletes every object under `prefix`, one batch request per listed page.
/// Returns the number of keys deleted.
pub fn delete_prefix(store: &dyn ObjectStore, prefix: &str) -> Result<usize> {
    let mut deleted = 0;
    for page in ObjectPages::new(store, prefix) {
        let keys = page?;
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            debug!("Deleting {} objects under {}", batch.len(), prefix);
            store.delete_objects(batch)?;
            deleted += batch.len();
        }
    }
    Ok(deleted)
}
