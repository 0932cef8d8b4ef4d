//! Test fixtures for common test scenarios.
//!
//! Manifest documents, hand-built zip archives (including hostile ones the
//! exporter would never write), and on-disk package directories.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A manifest document with the given references.
pub fn manifest_json(name: &str, version: &str, workflows: &[&str], resources: &[&str]) -> String {
    let refs = |paths: &[&str], kind: &str| -> Vec<serde_json::Value> {
        paths
            .iter()
            .map(|p| serde_json::json!({ "path": p, "type": kind }))
            .collect()
    };

    let doc = serde_json::json!({
        "name": name,
        "version": version,
        "workflows": refs(workflows, "bpmn"),
        "resources": refs(resources, "form"),
        "metadata": {}
    });
    serde_json::to_string_pretty(&doc).unwrap()
}

/// Write files (creating parent directories) under `root`.
pub fn write_files(root: &Path, files: &[(&str, &[u8])]) {
    for (path, content) in files {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// Builds zip archives entry by entry, names taken verbatim.
pub struct ZipBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        ZipBuilder {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    pub fn file(self, name: &str, content: &[u8]) -> Self {
        self.entry(name, content, 0o644)
    }

    pub fn executable(self, name: &str, content: &[u8]) -> Self {
        self.entry(name, content, 0o755)
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.zip
            .add_directory(name, SimpleFileOptions::default())
            .unwrap();
        self
    }

    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        self.zip
            .add_symlink(name, target, SimpleFileOptions::default())
            .unwrap();
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.zip.finish().unwrap().into_inner()
    }

    fn entry(mut self, name: &str, content: &[u8], mode: u32) -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode);
        self.zip.start_file(name, options).unwrap();
        self.zip.write_all(content).unwrap();
        self
    }
}

impl Default for ZipBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open archive bytes for reading.
pub fn zip_archive(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
    ZipArchive::new(Cursor::new(bytes)).unwrap()
}

/// Every entry of an archive as `(name, content, unix mode)`, in archive order.
pub fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>, Option<u32>)> {
    let mut archive = zip_archive(bytes.to_vec());
    (0..archive.len())
        .map(|idx| {
            let mut file = archive.by_index(idx).unwrap();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (file.name().to_string(), content, file.unix_mode())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_builder_round_trip() {
        let bytes = ZipBuilder::new()
            .file("a.txt", b"a")
            .executable("run.sh", b"#!/bin/sh\n")
            .finish();

        let entries = read_zip(&bytes);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "a.txt");
        assert_eq!(entries[0].1, b"a");
        assert_eq!(entries[1].2.unwrap() & 0o111, 0o111);
    }

    #[test]
    fn test_manifest_json_validates() {
        let doc = manifest_json("demo", "1.0", &["a.bpmn"], &["f.json"]);
        let manifest = crate::core::manifest::validate(doc.as_bytes()).unwrap();
        assert_eq!(manifest.workflows[0].path, "a.bpmn");
        assert_eq!(manifest.resources[0].kind, "form");
    }
}
