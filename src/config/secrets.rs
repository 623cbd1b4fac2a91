use std::{fs::File, io::Read, path::PathBuf};

use base64::{engine::general_purpose::STANDARD as b64_engine, Engine};
use serde::Deserialize;

use crate::{vault_error, Result, ResultExt};

const MAX_SECRET_BYTES: usize = 8192;

/// Where a credential comes from, written as a one-key map in YAML:
///
/// ```yaml
/// api_key:
///   env: CRUNCHY_API_KEY
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    File(PathBuf),
    Env(String),
    Base64(String),
    Value(String),
}

impl std::fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::File(path) => f.debug_tuple("File").field(path).finish(),
            SecretSource::Env(var) => f.debug_tuple("Env").field(var).finish(),
            SecretSource::Base64(_) => f.debug_tuple("Base64").field(&"[REDACTED]").finish(),
            SecretSource::Value(_) => f.debug_tuple("Value").field(&"[REDACTED]").finish(),
        }
    }
}

/// Resolved secret text ready for use by the API and storage clients.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    value: String,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl ResolvedSecret {
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl SecretSource {
    /// Loads the secret. `name` only appears in error messages.
    pub fn resolve(&self, name: &str) -> Result<ResolvedSecret> {
        let bytes = match self {
            SecretSource::File(path) => load_file_source(name, path)?,
            SecretSource::Env(var) => load_env_source(name, var)?,
            SecretSource::Base64(data) => b64_engine.decode(data.trim()).map_err(|e| {
                vault_error!(InvalidParameter {
                    description: format!("{name}: invalid base64: {e}"),
                })
            })?,
            SecretSource::Value(value) => value.clone().into_bytes(),
        };
        validate_secret_bytes(name, &bytes)?;
        let value = String::from_utf8(bytes).map_err(|_| {
            vault_error!(InvalidParameter {
                description: format!("{name}: secret is not valid UTF-8"),
            })
        })?;
        let value = value.trim_end_matches(['\r', '\n']).to_string();
        if value.is_empty() {
            return Err(vault_error!(InvalidParameter {
                description: format!("{name}: secret is empty"),
            }));
        }
        Ok(ResolvedSecret { value })
    }
}

fn validate_secret_bytes(name: &str, bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_SECRET_BYTES {
        return Err(vault_error!(InvalidParameter {
            description: format!(
                "{name}: secret data exceeds maximum allowed size of {MAX_SECRET_BYTES} bytes"
            ),
        }));
    }
    Ok(())
}

fn load_file_source(name: &str, path: &PathBuf) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| {
        vault_error!(InvalidParameter {
            description: format!("{name}: failed to open '{}': {e}", path.display()),
        })
    })?;
    let mut buf = Vec::new();
    file.take((MAX_SECRET_BYTES + 1) as u64)
        .read_to_end(&mut buf)
        .context(format!("{name}: failed to read '{}'", path.display()))?;
    Ok(buf)
}

fn load_env_source(name: &str, var: &str) -> Result<Vec<u8>> {
    let value = std::env::var(var).map_err(|e| {
        vault_error!(InvalidParameter {
            description: format!("{name}: failed to read environment variable '{var}': {e}"),
        })
    })?;
    Ok(value.into_bytes())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn resolve_inline_value() {
        let secret = SecretSource::Value("token".to_string())
            .resolve("provider.api_key")
            .unwrap();
        assert_eq!(secret.expose(), "token");
    }

    #[test]
    fn resolve_file_strips_trailing_newline() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();
        let secret = SecretSource::File(file.path().to_path_buf())
            .resolve("provider.api_key")
            .unwrap();
        assert_eq!(secret.expose(), "from-file");
    }

    #[test]
    fn resolve_base64() {
        let secret = SecretSource::Base64("aGVsbG8=".to_string())
            .resolve("storage.credentials.secret_access_key")
            .unwrap();
        assert_eq!(secret.expose(), "hello");
    }

    #[test]
    fn resolve_missing_env_names_the_secret() {
        let error = SecretSource::Env("BRIDGEVAULT_TEST_UNSET_VARIABLE".to_string())
            .resolve("provider.api_key")
            .unwrap_err();
        let message = format!("{error}");
        assert!(message.contains("provider.api_key: failed to read environment variable"));
    }

    #[test]
    fn resolve_rejects_empty_and_oversize() {
        assert!(SecretSource::Value(String::new()).resolve("x").is_err());
        let error = SecretSource::Value("a".repeat(MAX_SECRET_BYTES + 1))
            .resolve("x")
            .unwrap_err();
        assert!(format!("{error}").contains("exceeds maximum allowed size"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let source = SecretSource::Value("hunter2".to_string());
        assert!(!format!("{source:?}").contains("hunter2"));
        let resolved = source.resolve("x").unwrap();
        assert!(!format!("{resolved:?}").contains("hunter2"));
        let env = SecretSource::Env("CRUNCHY_API_KEY".to_string());
        assert_eq!(format!("{env:?}"), "Env(\"CRUNCHY_API_KEY\")");
    }

    #[test]
    fn parse_from_yaml_map() {
        let source: SecretSource = serde_yaml::from_str("env: CRUNCHY_API_KEY").unwrap();
        assert_eq!(source, SecretSource::Env("CRUNCHY_API_KEY".to_string()));
        assert!(serde_yaml::from_str::<SecretSource>("vault: x").is_err());
    }
}
