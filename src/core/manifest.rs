//! manifest.json parsing, schema validation, and reference extraction.
//!
//! The manifest is the index document of a process package. It declares the
//! package identity and the workflow/resource files the package consists of.
//! Validation happens in two steps that both export and import run:
//!
//! 1. [`validate`] checks structure only (required fields and their shapes).
//! 2. [`Manifest::references`] runs every declared path through the archive
//!    path codec and returns the ordered, deduplicated reference set.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::archive_path;
use crate::core::error::TransferError;

/// File name of the manifest at the package root.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Extension used for exported package archives.
pub const ARCHIVE_EXTENSION: &str = "uapf";

/// The parsed manifest.json document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest name
    pub name: String,

    /// Manifest version
    pub version: String,

    /// Optional package identity that overrides `name`/`version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageInfo>,

    /// Workflow and decision definitions
    pub workflows: Vec<FileRef>,

    /// Supporting resource files
    pub resources: Vec<FileRef>,

    /// Opaque key/value pairs, preserved in declaration order
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Package identity from the `package` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub maintainers: Vec<String>,
}

/// A `{path, type}` file reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,

    #[serde(rename = "type")]
    pub kind: String,
}

/// Structurally validate manifest bytes and parse them.
///
/// Only shapes are checked here; path safety is the job of
/// [`Manifest::references`].
pub fn validate(bytes: &[u8]) -> Result<Manifest, TransferError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| TransferError::schema(format!("not valid JSON: {}", e)))?;

    let root = value
        .as_object()
        .ok_or_else(|| TransferError::schema("document must be a JSON object"))?;

    require_string(root, "name", "name")?;
    require_string(root, "version", "version")?;

    if let Some(package) = root.get("package") {
        let package = package
            .as_object()
            .ok_or_else(|| TransferError::schema("`package` must be an object"))?;
        for field in ["name", "version", "summary"] {
            optional_string(package, field, &format!("package.{}", field))?;
        }
        if let Some(maintainers) = package.get("maintainers") {
            let list = maintainers.as_array().ok_or_else(|| {
                TransferError::schema("`package.maintainers` must be an array of strings")
            })?;
            if let Some(idx) = list.iter().position(|m| !m.is_string()) {
                return Err(TransferError::schema(format!(
                    "`package.maintainers[{}]` must be a string",
                    idx
                )));
            }
        }
    }

    require_file_refs(root, "workflows")?;
    require_file_refs(root, "resources")?;

    if let Some(metadata) = root.get("metadata") {
        if !metadata.is_object() {
            return Err(TransferError::schema("`metadata` must be an object"));
        }
    }

    serde_json::from_value(value).map_err(|e| TransferError::schema(e.to_string()))
}

fn require_string(obj: &Map<String, Value>, key: &str, label: &str) -> Result<(), TransferError> {
    match obj.get(key) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(TransferError::schema(format!("`{}` must be a string", label))),
        None => Err(TransferError::schema(format!(
            "missing required field `{}`",
            label
        ))),
    }
}

fn optional_string(obj: &Map<String, Value>, key: &str, label: &str) -> Result<(), TransferError> {
    match obj.get(key) {
        None | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(TransferError::schema(format!("`{}` must be a string", label))),
    }
}

fn require_file_refs(obj: &Map<String, Value>, key: &str) -> Result<(), TransferError> {
    let list = match obj.get(key) {
        Some(Value::Array(list)) => list,
        Some(_) => return Err(TransferError::schema(format!("`{}` must be an array", key))),
        None => {
            return Err(TransferError::schema(format!(
                "missing required field `{}`",
                key
            )))
        }
    };

    for (idx, item) in list.iter().enumerate() {
        let label = format!("{}[{}]", key, idx);
        let entry = item
            .as_object()
            .ok_or_else(|| TransferError::schema(format!("`{}` must be an object", label)))?;
        require_string(entry, "path", &format!("{}.path", label))?;
        require_string(entry, "type", &format!("{}.type", label))?;
    }

    Ok(())
}

impl Manifest {
    /// Load and validate a manifest from a file.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let bytes = std::fs::read(path).map_err(|e| {
            TransferError::io(format!("failed to read manifest: {}", path.display()), e)
        })?;
        validate(&bytes)
    }

    /// Parse manifest content.
    pub fn parse(content: &str) -> Result<Self, TransferError> {
        validate(content.as_bytes())
    }

    /// Extract the reference set: every `workflows[].path` then every
    /// `resources[].path`, canonicalized, deduplicated in first-seen order.
    ///
    /// A single unsafe path fails the whole extraction.
    pub fn references(&self) -> Result<Vec<String>, TransferError> {
        let declared = self
            .workflows
            .iter()
            .enumerate()
            .map(|(idx, r)| (format!("workflows[{}].path", idx), r))
            .chain(
                self.resources
                    .iter()
                    .enumerate()
                    .map(|(idx, r)| (format!("resources[{}].path", idx), r)),
            );

        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for (field, file_ref) in declared {
            let canonical =
                archive_path::normalize(&file_ref.path).map_err(|e| TransferError::Reference {
                    field,
                    path: file_ref.path.clone(),
                    reason: e.kind.to_string(),
                })?;

            if seen.insert(canonical.clone()) {
                paths.push(canonical);
            }
        }

        Ok(paths)
    }

    /// Package name: `package.name`, falling back to `name`.
    pub fn package_name(&self) -> Option<&str> {
        self.package
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty())
            .or_else(|| Some(self.name.as_str()).filter(|n| !n.is_empty()))
    }

    /// Package version: `package.version`, falling back to `version`.
    pub fn package_version(&self) -> Option<&str> {
        self.package
            .as_ref()
            .map(|p| p.version.as_str())
            .filter(|v| !v.is_empty())
            .or_else(|| Some(self.version.as_str()).filter(|v| !v.is_empty()))
    }

    /// Archive file name: `{name}_{version}.uapf`, with the repository name
    /// standing in for a missing package name and the version segment
    /// omitted when empty.
    pub fn archive_filename(&self, repo_name: &str) -> String {
        let name = sanitize_file_component(self.package_name().unwrap_or(repo_name));
        match self.package_version() {
            Some(version) => format!(
                "{}_{}.{}",
                name,
                sanitize_file_component(version),
                ARCHIVE_EXTENSION
            ),
            None => format!("{}.{}", name, ARCHIVE_EXTENSION),
        }
    }

    /// Commit message used when an import does not supply one.
    pub fn default_import_message(&self, fallback_name: &str) -> String {
        let name = self.package_name().unwrap_or(fallback_name);
        match self.package_version() {
            Some(version) => format!("Import UAPF package {}@{}", name, version),
            None => format!("Import UAPF package {}", name),
        }
    }
}

fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '-',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"{
        "name": "claims",
        "version": "2.1.0",
        "workflows": [
            {"path": "workflows/intake.bpmn", "type": "bpmn"},
            {"path": "decisions/route.dmn", "type": "dmn"}
        ],
        "resources": [
            {"path": "forms/intake.json", "type": "form"}
        ],
        "metadata": {"zeta": 1, "alpha": {"nested": true}, "mid": "x"}
    }"#;

    fn schema_message(content: &str) -> String {
        match Manifest::parse(content).unwrap_err() {
            TransferError::Schema { message } => message,
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_basic_manifest() {
        let manifest = Manifest::parse(BASIC).unwrap();
        assert_eq!(manifest.name, "claims");
        assert_eq!(manifest.version, "2.1.0");
        assert_eq!(manifest.workflows.len(), 2);
        assert_eq!(manifest.workflows[1].kind, "dmn");
        assert!(manifest.package.is_none());
    }

    #[test]
    fn test_metadata_keeps_declaration_order() {
        let manifest = Manifest::parse(BASIC).unwrap();
        let keys: Vec<_> = manifest.metadata.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        let reparsed: Manifest =
            serde_json::from_str(&serde_json::to_string(&manifest).unwrap()).unwrap();
        assert_eq!(reparsed.metadata, manifest.metadata);
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(schema_message(r#"{"version": "1", "workflows": [], "resources": []}"#)
            .contains("`name`"));
        assert!(schema_message(r#"{"name": "x", "version": "1", "resources": []}"#)
            .contains("`workflows`"));
        assert!(schema_message(r#"{"name": "x", "version": 1, "workflows": [], "resources": []}"#)
            .contains("`version` must be a string"));
    }

    #[test]
    fn test_reference_shapes_are_checked() {
        let msg = schema_message(
            r#"{"name": "x", "version": "1", "workflows": [{"path": "a.bpmn"}], "resources": []}"#,
        );
        assert!(msg.contains("workflows[0].type"));

        let msg = schema_message(
            r#"{"name": "x", "version": "1", "workflows": [], "resources": ["a.json"]}"#,
        );
        assert!(msg.contains("resources[0]"));
    }

    #[test]
    fn test_package_and_metadata_shapes() {
        let msg = schema_message(
            r#"{"name": "x", "version": "1", "workflows": [], "resources": [],
                "package": {"maintainers": ["a", 3]}}"#,
        );
        assert!(msg.contains("package.maintainers[1]"));

        let msg = schema_message(
            r#"{"name": "x", "version": "1", "workflows": [], "resources": [], "metadata": []}"#,
        );
        assert!(msg.contains("`metadata`"));

        assert!(schema_message("[1, 2]").contains("JSON object"));
        assert!(schema_message("{not json").contains("not valid JSON"));
    }

    #[test]
    fn test_references_dedup_preserves_order() {
        let manifest = Manifest::parse(
            r#"{"name": "x", "version": "1",
                "workflows": [
                    {"path": "b.bpmn", "type": "bpmn"},
                    {"path": "./a.bpmn", "type": "bpmn"},
                    {"path": "b.bpmn", "type": "bpmn"}
                ],
                "resources": [
                    {"path": "a.bpmn", "type": "other"},
                    {"path": "res/c.json", "type": "json"}
                ]}"#,
        )
        .unwrap();

        let refs = manifest.references().unwrap();
        assert_eq!(refs, vec!["b.bpmn", "a.bpmn", "res/c.json"]);
        assert_eq!(manifest.references().unwrap(), refs);
    }

    #[test]
    fn test_unsafe_reference_fails_whole_extraction() {
        let manifest = Manifest::parse(
            r#"{"name": "x", "version": "1",
                "workflows": [{"path": "ok.bpmn", "type": "bpmn"}],
                "resources": [{"path": "../secrets.txt", "type": "text"}]}"#,
        )
        .unwrap();

        match manifest.references().unwrap_err() {
            TransferError::Reference { field, path, .. } => {
                assert_eq!(field, "resources[0].path");
                assert_eq!(path, "../secrets.txt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_archive_filename() {
        let manifest = Manifest::parse(
            r#"{"name": "ignored", "version": "9", "workflows": [], "resources": [],
                "package": {"name": "demo", "version": "1.0"}}"#,
        )
        .unwrap();
        assert_eq!(manifest.archive_filename("repoX"), "demo_1.0.uapf");

        let manifest =
            Manifest::parse(r#"{"name": "", "version": "", "workflows": [], "resources": []}"#)
                .unwrap();
        assert_eq!(manifest.archive_filename("repoX"), "repoX.uapf");

        let manifest = Manifest::parse(
            r#"{"name": "base", "version": "3", "workflows": [], "resources": [],
                "package": {"name": "", "summary": "only summary"}}"#,
        )
        .unwrap();
        assert_eq!(manifest.archive_filename("repoX"), "base_3.uapf");
    }

    #[test]
    fn test_default_import_message() {
        let manifest = Manifest::parse(BASIC).unwrap();
        assert_eq!(
            manifest.default_import_message("repo"),
            "Import UAPF package claims@2.1.0"
        );

        let manifest =
            Manifest::parse(r#"{"name": "bare", "version": "", "workflows": [], "resources": []}"#)
                .unwrap();
        assert_eq!(
            manifest.default_import_message("repo"),
            "Import UAPF package bare"
        );
    }
}
