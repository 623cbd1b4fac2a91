pub type Error = VaultError;
pub type Result<T> = std::result::Result<T, Error>;

/// A macro to simplify the creation of `VaultError` variants.
/// It automatically injects source code metadata (file and line) into every error.
#[macro_export]
macro_rules! vault_error {
    // Case 1: Handles variants with named fields.
    // (e.g., vault_error!(Variant { field1: value1, field2 }))
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {{
        $crate::VaultError::$variant {
            $($field $(: $value)?,)*
            meta: $crate::ErrorMeta::new($crate::ErrorLocation::new(file!(), line!())),
        }
    }};
    // Case 2: Handles variants without additional fields
    // (e.g., vault_error!(Timeout))
    ($variant:ident) => {{
        $crate::VaultError::$variant {
            meta: $crate::ErrorMeta::new($crate::ErrorLocation::new(file!(), line!())),
        }
    }};
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorLocation {
    file: &'static str,
    line: u32,
}

impl ErrorLocation {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl Default for ErrorLocation {
    fn default() -> Self {
        Self {
            file: "<unknown>",
            line: 0,
        }
    }
}

impl std::fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone)]
pub struct ErrorMeta {
    pub location: ErrorLocation,
    pub contexts: Vec<(String, ErrorLocation)>,
}

impl ErrorMeta {
    pub fn new(location: ErrorLocation) -> Self {
        Self {
            location,
            contexts: Vec::new(),
        }
    }
}

impl Default for ErrorMeta {
    #[track_caller]
    fn default() -> Self {
        let location = std::panic::Location::caller();
        Self::new(ErrorLocation::new(location.file(), location.line()))
    }
}

impl std::fmt::Display for ErrorMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            return write!(f, "(at {})", self.location);
        }
        if self.contexts.is_empty() {
            return Ok(());
        }
        let mut iter = self.contexts.iter().rev();
        if let Some(context) = iter.next() {
            write!(f, "{} (at {})", context.0, context.1)?;
        }
        for context in iter {
            write!(f, "\n  - caused by: {} (at {})", context.0, context.1)?;
        }
        write!(f, "\n  - caused by: ")?;
        Ok(())
    }
}

/// Generates the central VaultError enum.
macro_rules! vault_error_variants {
    ($( $variant:ident { $( $(#[$field_attr:meta])* $field:ident : $ty:ty ),* $(,)? } => $message:expr ),* $(,)?) => {
        #[derive(thiserror::Error, Debug)]
        pub enum VaultError {
            $(
                #[error($message)]
                $variant {
                    $( $(#[$field_attr])* $field: $ty, )*
                },
            )*
        }

        impl VaultError {
            /// Provides mutable access to the internal error context/metadata.
            fn contexts_mut(&mut self) -> &mut Vec<(String, ErrorLocation)> {
                match self {
                    $( VaultError::$variant { meta, .. } => &mut meta.contexts, )*
                }
            }
        }
    };
}

vault_error_variants! {
    ClusterNotFound {
        cluster: String,
        meta: ErrorMeta,
    } => "{meta}Cluster '{cluster}' not found in provider listing {meta:#}",
    BackupNotFound {
        cluster: String,
        target: String,
        meta: ErrorMeta,
    } => "{meta}No backup of cluster '{cluster}' matches target {target} {meta:#}",
    MalformedManifest {
        description: String,
        meta: ErrorMeta,
    } => "{meta}Malformed backup manifest: {description} {meta:#}",
    TooManyDirectoriesForDeletion {
        group: String,
        count: usize,
        limit: usize,
        meta: ErrorMeta,
    } => "{meta}Refusing to delete {count} backup directories under {group} (limit {limit} without clean-up) {meta:#}",
    NotEligibleDay {
        date: chrono::NaiveDate,
        meta: ErrorMeta,
    } => "{meta}{date} is not a first or third Saturday {meta:#}",
    InvalidDate {
        value: String,
        meta: ErrorMeta,
    } => "{meta}Invalid date '{value}': expected YYYYMMDD {meta:#}",
    HttpError {
        #[source]
        source: reqwest::Error,
        meta: ErrorMeta,
    } => "{meta}HTTP error: {source} {meta:#}",
    UpstreamStatus {
        status: u16,
        url: String,
        meta: ErrorMeta,
    } => "{meta}Upstream {url} returned status {status} {meta:#}",
    StorageError {
        description: String,
        meta: ErrorMeta,
    } => "{meta}Storage error: {description} {meta:#}",
    IoError {
        #[source]
        source: std::io::Error,
        meta: ErrorMeta,
    } => "{meta}I/O error: {source} {meta:#}",
    InvalidParameter {
        description: String,
        meta: ErrorMeta,
    } => "{meta}Invalid parameter error: {description} {meta:#}",
}

/// Automatically implements From<ExternalError> for VaultError.
macro_rules! vault_error_from {
    ($( #[from] $variant:ident ( $field:ident : $ty:ty ) ),* $(,)?) => {
        $(
            impl From<$ty> for VaultError {
                #[track_caller]
                fn from($field: $ty) -> Self {
                    let location = std::panic::Location::caller();
                    VaultError::$variant {
                        $field,
                        meta: ErrorMeta::new(ErrorLocation::new(location.file(), location.line())),
                    }
                }
            }
        )*
    };
}

vault_error_from! {
    #[from] IoError(source: std::io::Error),
    #[from] HttpError(source: reqwest::Error),
}

impl VaultError {
    #[track_caller]
    pub fn context(self, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        self.context_at(message, location)
    }

    pub fn context_at(
        mut self,
        message: impl Into<String>,
        location: &'static std::panic::Location<'static>,
    ) -> Self {
        self.contexts_mut().push((
            message.into(),
            ErrorLocation::new(location.file(), location.line()),
        ));
        self
    }
}

/// Extension trait to add context to Results.
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<VaultError>,
{
    #[track_caller]
    fn context(self, message: impl Into<String>) -> Result<T> {
        let location = std::panic::Location::caller();
        self.map_err(|e| e.into().context_at(message, location))
    }
}
