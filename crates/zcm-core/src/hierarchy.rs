//! Dataset naming rules and hierarchy helpers: composing `parent/name`,
//! splitting `dataset@label`, walking ancestors and detecting clone lineage.

use crate::dataset::{CreateOptions, ListOptions, TypeFilter};
use crate::error::{ZcmError, ZcmResult};
use crate::property::PropertyValue;
use crate::provider::DatasetProvider;
use log::{debug, info};
use regex::Regex;
use std::sync::OnceLock;

fn component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.:% -]+$").expect("component pattern is a valid regex")
    })
}

/// Reject empty values before any subprocess is spawned.
pub fn require(field: &str, value: &str) -> ZcmResult<()> {
    if value.trim().is_empty() {
        return Err(ZcmError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Check a filesystem or volume name (`pool/a/b`).
pub fn validate_dataset_name(name: &str) -> ZcmResult<()> {
    require("dataset name", name)?;
    if name.contains('@') {
        return Err(ZcmError::Validation(format!(
            "`{name}` is a snapshot name, expected a filesystem or volume"
        )));
    }
    for component in name.split('/') {
        if !component_pattern().is_match(component) {
            return Err(ZcmError::Validation(format!(
                "invalid component `{component}` in dataset name `{name}`"
            )));
        }
    }
    Ok(())
}

/// Check a snapshot name (`pool/a@label`).
pub fn validate_snapshot_name(name: &str) -> ZcmResult<()> {
    let (dataset, label) = split_snapshot(name).ok_or_else(|| {
        ZcmError::Validation(format!("`{name}` is not of the form dataset@label"))
    })?;
    validate_dataset_name(dataset)?;
    validate_label(label)
}

/// Check a snapshot label (the part after `@`).
pub fn validate_label(label: &str) -> ZcmResult<()> {
    require("snapshot label", label)?;
    if !component_pattern().is_match(label) {
        return Err(ZcmError::Validation(format!(
            "invalid snapshot label `{label}`"
        )));
    }
    Ok(())
}

/// Join an optional parent with a child name.
pub fn join_name(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => {
            format!("{}/{}", parent.trim_end_matches('/'), name)
        }
        _ => name.to_string(),
    }
}

/// Compose `dataset@label`.
pub fn snapshot_name(dataset: &str, label: &str) -> String {
    format!("{dataset}@{label}")
}

/// Split `dataset@label` into its halves.
pub fn split_snapshot(name: &str) -> Option<(&str, &str)> {
    let (dataset, label) = name.split_once('@')?;
    if dataset.is_empty() || label.is_empty() {
        return None;
    }
    Some((dataset, label))
}

/// Pool segment of a dataset name.
pub fn pool_from_dataset(dataset: &str) -> Option<&str> {
    let candidate = dataset.split(['/', '@']).next()?;
    if candidate.is_empty() {
        None
    } else {
        Some(candidate)
    }
}

/// A name with no `/` is a pool root, which always pre-exists.
pub fn is_pool_root(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('@')
}

/// Ancestors of `name`, outermost first, excluding the pool root and `name`.
pub fn ancestors(name: &str) -> Vec<String> {
    let components: Vec<&str> = name.split('/').collect();
    (2..components.len())
        .map(|depth| components[..depth].join("/"))
        .collect()
}

/// Create every missing ancestor of `name` as a plain filesystem.
///
/// Returns the ancestors that were created, outermost first.
pub fn ensure_ancestors<P>(provider: &P, name: &str) -> ZcmResult<Vec<String>>
where
    P: DatasetProvider + ?Sized,
{
    let mut created = Vec::new();
    for ancestor in ancestors(name) {
        if provider.exists(&ancestor) {
            debug!("ancestor {ancestor} already present");
            continue;
        }
        if let Some(done) = provider.create(&ancestor, &CreateOptions::default())? {
            info!("created missing ancestor {done}");
            created.push(done);
        }
    }
    Ok(created)
}

/// Where a dataset sits relative to others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lineage {
    /// `dataset@label`.
    Snapshot { dataset: String, label: String },
    /// Writable dataset depending on `origin` until promoted.
    Clone { origin: String },
    /// Filesystem or volume with no origin.
    Independent,
}

/// Work out the lineage of `name`. Snapshots are recognised from the name
/// alone; everything else needs an `origin` query.
pub fn lineage<P>(provider: &P, name: &str) -> ZcmResult<Lineage>
where
    P: DatasetProvider + ?Sized,
{
    if let Some((dataset, label)) = split_snapshot(name) {
        return Ok(Lineage::Snapshot {
            dataset: dataset.to_string(),
            label: label.to_string(),
        });
    }
    Ok(match provider.origin(name)? {
        Some(origin) => Lineage::Clone { origin },
        None => Lineage::Independent,
    })
}

/// Filesystems in the same pool whose origin is `snapshot`.
pub fn dependent_clones<P>(provider: &P, snapshot: &str) -> Vec<String>
where
    P: DatasetProvider + ?Sized,
{
    let Some(pool) = pool_from_dataset(snapshot) else {
        return Vec::new();
    };
    let options = ListOptions {
        name: Some(pool.to_string()),
        type_filter: Some(TypeFilter::Filesystem),
        recursive: true,
        properties: vec!["name".to_string(), "origin".to_string()],
    };
    provider
        .list(&options)
        .into_iter()
        .filter(|record| {
            matches!(record.get("origin"), Some(PropertyValue::Text(origin)) if origin == snapshot)
        })
        .filter_map(|record| record.name().map(str::to_string))
        .collect()
}
