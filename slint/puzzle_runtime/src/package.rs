//! Puzzle bundles: a directory with `puzzle.json` and an `index.html` entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::io;
use std::path::Path;
use thiserror::Error;

pub const PACKAGE_INFO_FILE: &str = "puzzle.json";
pub const PACKAGE_ENTRY_FILE: &str = "index.html";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("bundle is not a directory: {0}")]
    BundleNotDirectory(String),
    #[error("puzzle info is not a file: {0}")]
    InfoNotFile(String),
    #[error("io error at {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("invalid puzzle info: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Read access to wherever bundles live.
pub trait PackageLoader {
    fn stat(&self, path: &str) -> Result<EntryKind, PackageError>;
    fn read_to_string(&self, path: &str) -> Result<String, PackageError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl PackageLoader for FsLoader {
    fn stat(&self, path: &str) -> Result<EntryKind, PackageError> {
        let metadata = std::fs::metadata(Path::new(path)).map_err(|source| PackageError::Io {
            path: path.to_string(),
            source,
        })?;

        Ok(if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }

    fn read_to_string(&self, path: &str) -> Result<String, PackageError> {
        std::fs::read_to_string(Path::new(path)).map_err(|source| PackageError::Io {
            path: path.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzlePackageInfo {
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default)]
    pub coming_soon: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PuzzlePackage {
    pub info: PuzzlePackageInfo,
    pub base_url: String,
    pub entry_html: Option<String>,
}

impl PuzzlePackage {
    pub fn open(bundle: &str, loader: &dyn PackageLoader) -> Result<Self, PackageError> {
        if loader.stat(bundle)? == EntryKind::File {
            return Err(PackageError::BundleNotDirectory(bundle.to_string()));
        }

        let info_path = path_join(bundle, PACKAGE_INFO_FILE);
        if loader.stat(&info_path)? == EntryKind::Directory {
            return Err(PackageError::InfoNotFile(info_path));
        }

        let info = serde_json::from_str(&loader.read_to_string(&info_path)?)?;
        Ok(Self {
            info,
            base_url: bundle.to_string(),
            entry_html: None,
        })
    }

    pub fn load_entry(&mut self, loader: &dyn PackageLoader) -> Result<&str, PackageError> {
        let html = loader.read_to_string(&path_join(&self.base_url, PACKAGE_ENTRY_FILE))?;
        Ok(self.entry_html.insert(html).as_str())
    }

    /// Host state a host would inject for a first session of this puzzle.
    pub fn default_host_state(&self, preview: bool) -> Value {
        json!({
            "preview": preview,
            "config": self.info.config.clone().unwrap_or_else(|| Value::Object(Map::new())),
            "data": self.info.data.clone().unwrap_or(Value::Null),
        })
    }
}

pub fn path_join(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_bundle(dir: &Path, info: &str) {
        fs::write(dir.join(PACKAGE_INFO_FILE), info).expect("write info");
        fs::write(dir.join(PACKAGE_ENTRY_FILE), "<main id=\"puzzle\"></main>").expect("write entry");
    }

    fn dir_str(dir: &tempfile::TempDir) -> String {
        dir.path().to_str().expect("utf-8 temp path").to_string()
    }

    #[test]
    fn joins_with_a_single_separator() {
        assert_eq!(path_join("bundles/snake", "puzzle.json"), "bundles/snake/puzzle.json");
        assert_eq!(path_join("bundles/snake/", "puzzle.json"), "bundles/snake/puzzle.json");
    }

    #[test]
    fn opens_bundle_and_loads_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_bundle(
            dir.path(),
            r#"{"name":"snake","displayName":"Snake","version":"1.0.0","config":{"speed":3}}"#,
        );

        let mut package = PuzzlePackage::open(&dir_str(&dir), &FsLoader).expect("open bundle");
        assert_eq!(package.info.name, "snake");
        assert_eq!(package.info.display_name, "Snake");
        assert!(!package.info.coming_soon);
        assert!(package.entry_html.is_none());

        let html = package.load_entry(&FsLoader).expect("load entry").to_string();
        assert!(html.contains("puzzle"));
        assert_eq!(package.entry_html.as_deref(), Some(html.as_str()));
    }

    #[test]
    fn default_host_state_uses_package_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_bundle(dir.path(), r#"{"name":"pong","displayName":"Pong","config":{"speed":3}}"#);

        let package = PuzzlePackage::open(&dir_str(&dir), &FsLoader).expect("open bundle");
        assert_eq!(
            package.default_host_state(true),
            json!({"preview": true, "config": {"speed": 3}, "data": null})
        );
    }

    #[test]
    fn file_bundle_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("bundle.zip");
        fs::write(&file, b"zip").expect("write file");

        let err = PuzzlePackage::open(file.to_str().expect("utf-8"), &FsLoader)
            .expect_err("file is not a bundle");
        assert!(matches!(err, PackageError::BundleNotDirectory(_)));
    }

    #[test]
    fn directory_info_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join(PACKAGE_INFO_FILE)).expect("mkdir");

        let err = PuzzlePackage::open(&dir_str(&dir), &FsLoader).expect_err("info is a dir");
        assert!(matches!(err, PackageError::InfoNotFile(_)));
    }

    #[test]
    fn missing_info_and_bad_json_are_errors() {
        let empty = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            PuzzlePackage::open(&dir_str(&empty), &FsLoader),
            Err(PackageError::Io { .. })
        ));

        let broken = tempfile::tempdir().expect("tempdir");
        write_bundle(broken.path(), r#"{"name":"sudoku"}"#);
        assert!(matches!(
            PuzzlePackage::open(&dir_str(&broken), &FsLoader),
            Err(PackageError::Json(_))
        ));
    }
}
