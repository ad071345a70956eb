//! Data model for datasets, listings, diffs and the option sets accepted by
//! provider operations.

use crate::error::{ZcmError, ZcmResult};
use crate::property::PropertyValue;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Properties requested by `list` when the caller names none.
pub const DEFAULT_LIST_PROPERTIES: &[&str] = &["name", "used", "avail", "refer", "mountpoint"];

/// Kind of a dataset, derived from its `type` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Filesystem,
    Volume,
    Snapshot,
}

impl DatasetKind {
    /// Literal used by the tool's `type` property.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Filesystem => "filesystem",
            DatasetKind::Volume => "volume",
            DatasetKind::Snapshot => "snapshot",
        }
    }
}

impl FromStr for DatasetKind {
    type Err = ZcmError;

    fn from_str(value: &str) -> ZcmResult<Self> {
        match value {
            "filesystem" => Ok(DatasetKind::Filesystem),
            "volume" => Ok(DatasetKind::Volume),
            "snapshot" => Ok(DatasetKind::Snapshot),
            other => Err(ZcmError::Parse(format!("unknown dataset type `{other}`"))),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type filter accepted by `list -t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    All,
    Filesystem,
    Snapshot,
    Volume,
}

impl TypeFilter {
    /// Value passed to `list -t`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeFilter::All => "all",
            TypeFilter::Filesystem => "filesystem",
            TypeFilter::Snapshot => "snapshot",
            TypeFilter::Volume => "volume",
        }
    }
}

impl FromStr for TypeFilter {
    type Err = ZcmError;

    fn from_str(value: &str) -> ZcmResult<Self> {
        match value {
            "all" => Ok(TypeFilter::All),
            "filesystem" => Ok(TypeFilter::Filesystem),
            "snapshot" => Ok(TypeFilter::Snapshot),
            "volume" => Ok(TypeFilter::Volume),
            other => Err(ZcmError::Validation(format!(
                "unsupported type filter `{other}` (expected all, filesystem, snapshot or volume)"
            ))),
        }
    }
}

/// One row of `list` output, keyed by property name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DatasetRecord {
    properties: BTreeMap<String, PropertyValue>,
}

impl DatasetRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a typed column.
    pub fn insert(&mut self, property: impl Into<String>, value: PropertyValue) {
        self.properties.insert(property.into(), value);
    }

    /// Typed value of `property`, if that column was requested.
    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }

    /// The `name` column, when it was requested and is textual.
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(PropertyValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Columns in property-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.properties.iter()
    }
}

/// Change reported by `zfs diff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    Renamed,
}

impl ChangeType {
    /// Map the diff change column (`+`, `-`, `M`, `R`).
    pub fn from_code(code: &str) -> ZcmResult<Self> {
        match code {
            "+" => Ok(ChangeType::Added),
            "-" => Ok(ChangeType::Removed),
            "M" => Ok(ChangeType::Modified),
            "R" => Ok(ChangeType::Renamed),
            other => Err(ZcmError::Parse(format!("unknown diff change code `{other}`"))),
        }
    }
}

/// File type column printed by `zfs diff -F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
    Device,
    Door,
    Fifo,
    Link,
    Portal,
    Socket,
}

impl FileType {
    /// Map the single-character file type column printed by `diff -F`.
    pub fn from_code(code: &str) -> ZcmResult<Self> {
        match code {
            "F" => Ok(FileType::File),
            "/" => Ok(FileType::Directory),
            "B" | "C" => Ok(FileType::Device),
            ">" => Ok(FileType::Door),
            "|" => Ok(FileType::Fifo),
            "@" => Ok(FileType::Link),
            "P" => Ok(FileType::Portal),
            "=" => Ok(FileType::Socket),
            other => Err(ZcmError::Parse(format!("unknown diff file type `{other}`"))),
        }
    }
}

/// A single change between a snapshot and a later state of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRecord {
    pub timestamp: NaiveDateTime,
    pub change: ChangeType,
    pub file_type: Option<FileType>,
    pub path: PathBuf,
}

/// Arguments to `create`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub parent: Option<String>,
    pub mountpoint: Option<PathBuf>,
    pub compression: Option<String>,
    pub recursive: bool,
    pub management_path: Option<PathBuf>,
}

/// Arguments to `clone`.
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub parent: Option<String>,
    pub mountpoint: Option<PathBuf>,
}

/// Property changes applied by `set`, one tool call per populated field.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub readonly: Option<bool>,
    pub mountpoint: Option<PathBuf>,
    pub management_path: Option<PathBuf>,
}

impl SetOptions {
    /// True when no attribute would be changed.
    pub fn is_empty(&self) -> bool {
        self.readonly.is_none() && self.mountpoint.is_none() && self.management_path.is_none()
    }
}

/// Arguments to `destroy`.
#[derive(Debug, Clone)]
pub struct DestroyOptions {
    pub recursive: bool,
    /// Block until space is reclaimed.
    pub synchronous: bool,
}

impl Default for DestroyOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            synchronous: true,
        }
    }
}

/// Arguments to `list`. Built fresh per call.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub name: Option<String>,
    pub type_filter: Option<TypeFilter>,
    pub recursive: bool,
    pub properties: Vec<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            name: None,
            type_filter: None,
            recursive: false,
            properties: DEFAULT_LIST_PROPERTIES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl ListOptions {
    /// List one dataset with the default columns.
    pub fn for_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Arguments to `diff`.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Snapshot to compare against; `None` compares against the dataset's
    /// own origin snapshot (`-E`).
    pub origin_snapshot: Option<String>,
    pub include_file_types: bool,
    pub recursive: bool,
}
