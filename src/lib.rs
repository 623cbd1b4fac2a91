pub mod cli;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod manifest;
pub mod migrate;
pub mod provider;
pub mod retention;
pub mod schedule;
pub mod seed;
pub mod snitch;
pub mod storage;
pub mod transfer;
pub mod utils;

#[cfg(test)]
mod http_fixture;

pub use bridgevault_macros::error_context;
pub use error::{Error, ErrorLocation, ErrorMeta, Result, ResultExt, VaultError};
