//! Transfer error types and diagnostics.
//!
//! Every failure in export or import aborts the whole operation; there is no
//! partial-success mode. Aggregated variants carry the complete list of
//! offending paths so a single error is enough to act on.

use std::io;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error raised by manifest validation, export, or import.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum TransferError {
    #[error("invalid manifest: {message}")]
    #[diagnostic(
        code(uapf::manifest::schema),
        help("manifest.json needs `name`, `version`, `workflows` and `resources`")
    )]
    Schema { message: String },

    #[error("invalid reference `{path}` in `{field}`: {reason}")]
    #[diagnostic(code(uapf::manifest::reference))]
    Reference {
        field: String,
        path: String,
        reason: String,
    },

    #[error("manifest.json not found {location}")]
    #[diagnostic(code(uapf::manifest::missing))]
    ManifestMissing { location: String },

    #[error("ref not found: `{reference}`")]
    #[diagnostic(code(uapf::export::ref_not_found))]
    RefNotFound { reference: String },

    #[error("{} referenced path(s) missing", .paths.len())]
    #[diagnostic(
        code(uapf::package::missing_reference),
        help("every `workflows[].path` and `resources[].path` must name a regular file")
    )]
    ReferencedPathMissing { paths: Vec<String> },

    #[error("submodules cannot be packaged: `{path}`")]
    #[diagnostic(code(uapf::export::submodule))]
    SubmoduleUnsupported { path: String },

    #[error("malformed archive: {message}")]
    #[diagnostic(code(uapf::import::archive_format))]
    ArchiveFormat { message: String },

    #[error("{what} exceeds the limit of {limit} bytes")]
    #[diagnostic(code(uapf::import::size_limit))]
    SizeLimitExceeded { what: String, limit: u64 },

    #[error("unsafe path `{path}`: {reason}")]
    #[diagnostic(code(uapf::path::unsafe_path))]
    Path { path: String, reason: String },

    #[error("{} file(s) already exist on the target branch", .paths.len())]
    #[diagnostic(
        code(uapf::import::conflict),
        help("import into an empty prefix or remove the colliding files first")
    )]
    Conflict { paths: Vec<String> },

    #[error("commit failed: {message}")]
    #[diagnostic(code(uapf::import::commit))]
    Commit { message: String },

    #[error("repository error: {message}")]
    #[diagnostic(code(uapf::repository))]
    Repository { message: String },

    #[error("{context}")]
    #[diagnostic(code(uapf::io))]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("operation cancelled")]
    #[diagnostic(code(uapf::cancelled))]
    Cancelled,
}

impl TransferError {
    pub fn schema(message: impl Into<String>) -> Self {
        TransferError::Schema {
            message: message.into(),
        }
    }

    pub fn archive_format(message: impl Into<String>) -> Self {
        TransferError::ArchiveFormat {
            message: message.into(),
        }
    }

    pub fn commit(message: impl Into<String>) -> Self {
        TransferError::Commit {
            message: message.into(),
        }
    }

    pub fn repository(message: impl Into<String>) -> Self {
        TransferError::Repository {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        TransferError::Io {
            context: context.into(),
            source,
        }
    }

    /// Build a `ReferencedPathMissing` error with its paths sorted and deduplicated.
    pub fn missing_references(mut paths: Vec<String>) -> Self {
        paths.sort();
        paths.dedup();
        TransferError::ReferencedPathMissing { paths }
    }

    /// Build a `Conflict` error with its paths sorted and deduplicated.
    pub fn conflicts(mut paths: Vec<String>) -> Self {
        paths.sort();
        paths.dedup();
        TransferError::Conflict { paths }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string());

        if let Some(code) = MietteDiagnostic::code(self) {
            diag = diag.with_code(code.to_string());
        }

        match self {
            TransferError::ReferencedPathMissing { paths } => {
                for path in paths {
                    diag = diag.with_context(format!("missing: {}", path));
                }
            }
            TransferError::Conflict { paths } => {
                for path in paths {
                    diag = diag.with_context(format!("exists: {}", path));
                }
            }
            TransferError::ManifestMissing { location } => {
                let hint = if location.starts_with("at the archive root") {
                    suggestions::ARCHIVE_LAYOUT
                } else {
                    suggestions::NO_MANIFEST
                };
                diag = diag.with_suggestion(hint);
            }
            TransferError::SubmoduleUnsupported { .. } => {
                diag = diag.with_suggestion(
                    "Vendor the submodule contents into the repository before exporting",
                );
            }
            TransferError::SizeLimitExceeded { .. } => {
                diag = diag.with_suggestion(
                    "Raise `import.max_archive_size` in .uapf/config.toml if the package is trusted",
                );
            }
            TransferError::Io { source, .. } => {
                diag = diag.with_context(source.to_string());
            }
            _ => {}
        }

        if let Some(help) = MietteDiagnostic::help(self) {
            diag = diag.with_suggestion(help.to_string());
        }

        diag
    }
}

impl From<zip::result::ZipError> for TransferError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(source) => {
                TransferError::io("failed to read archive data", source)
            }
            other => TransferError::archive_format(other.to_string()),
        }
    }
}

impl From<git2::Error> for TransferError {
    fn from(err: git2::Error) -> Self {
        TransferError::repository(err.message().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_references_are_sorted() {
        let err = TransferError::missing_references(vec![
            "workflows/b.bpmn".to_string(),
            "resources/a.json".to_string(),
            "workflows/b.bpmn".to_string(),
        ]);

        match &err {
            TransferError::ReferencedPathMissing { paths } => {
                assert_eq!(paths, &["resources/a.json", "workflows/b.bpmn"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "2 referenced path(s) missing");
    }

    #[test]
    fn test_conflict_diagnostic_lists_every_path() {
        let err = TransferError::conflicts(vec![
            "pkg/workflows/a.bpmn".to_string(),
            "pkg/manifest.json".to_string(),
        ]);

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("uapf::import::conflict"));
        assert!(output.contains("exists: pkg/manifest.json"));
        assert!(output.contains("exists: pkg/workflows/a.bpmn"));
        assert!(output.contains("help: consider:"));
    }

    #[test]
    fn test_zip_io_error_maps_to_io() {
        let err: TransferError =
            zip::result::ZipError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof")).into();
        assert!(matches!(err, TransferError::Io { .. }));

        let err: TransferError = zip::result::ZipError::FileNotFound.into();
        assert!(matches!(err, TransferError::ArchiveFormat { .. }));
    }
}
