use std::{cell::RefCell, collections::BTreeMap};

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub placement: Option<Placement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRecord {
    pub source_key: String,
    pub dest_key: String,
    pub placement: Placement,
}

/// Bucket kept in memory that records every mutating call.
#[derive(Default)]
pub struct MemStore {
    objects: RefCell<BTreeMap<String, StoredObject>>,
    copies: RefCell<Vec<CopyRecord>>,
    delete_batches: RefCell<Vec<Vec<String>>>,
    list_calls: RefCell<usize>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects.borrow_mut().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                placement: None,
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.borrow().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.borrow().get(key).cloned()
    }

    pub fn copies(&self) -> Vec<CopyRecord> {
        self.copies.borrow().clone()
    }

    pub fn delete_batches(&self) -> Vec<Vec<String>> {
        self.delete_batches.borrow().clone()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.borrow()
    }
}

impl ObjectStore for MemStore {
    fn list_common_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        *self.list_calls.borrow_mut() += 1;
        let mut prefixes: Vec<String> = Vec::new();
        for key in self.objects.borrow().keys() {
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            if let Some(end) = rest.find('/') {
                let common = format!("{}{}", prefix, &rest[..=end]);
                if prefixes.last() != Some(&common) {
                    prefixes.push(common);
                }
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
        *self.list_calls.borrow_mut() += 1;
        let max_keys = usize::try_from(max_keys).unwrap_or(0);
        let objects = self.objects.borrow();
        let mut matching = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.map_or(true, |token| key.as_str() > token));
        let keys: Vec<String> = matching.by_ref().take(max_keys).cloned().collect();
        let next_token = match (matching.next(), keys.last()) {
            (Some(_), Some(last)) => Some(last.clone()),
            _ => None,
        };
        Ok(ObjectPage { keys, next_token })
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        match self.objects.borrow().get(key) {
            Some(object) => Ok(object.data.clone()),
            None => Err(crate::vault_error!(StorageError {
                description: format!("Object {} not found", key),
            })),
        }
    }

    fn put_object(&self, key: &str, data: Vec<u8>, placement: Option<&Placement>) -> Result<()> {
        self.objects.borrow_mut().insert(
            key.to_string(),
            StoredObject {
                data,
                placement: placement.cloned(),
            },
        );
        Ok(())
    }

    fn copy_object(&self, source_key: &str, dest_key: &str, placement: &Placement) -> Result<()> {
        let data = self.get_object(source_key)?;
        self.put_object(dest_key, data, Some(placement))?;
        self.copies.borrow_mut().push(CopyRecord {
            source_key: source_key.to_string(),
            dest_key: dest_key.to_string(),
            placement: placement.clone(),
        });
        Ok(())
    }

    fn delete_objects(&self, keys: &[String]) -> Result<()> {
        let mut objects = self.objects.borrow_mut();
        for key in keys {
            objects.remove(key);
        }
        self.delete_batches.borrow_mut().push(keys.to_vec());
        Ok(())
    }
}
