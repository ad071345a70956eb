//! Helpers for turning `zfs` CLI output into typed records.

use std::path::{Path, PathBuf};
use zcm_core::dataset::{ChangeType, DatasetRecord, DiffRecord, FileType};
use zcm_core::error::{ZcmError, ZcmResult};
use zcm_core::property::{local_datetime_from_epoch, type_property};

/// Zip one `list -Hp` row against the requested property names.
pub(crate) fn parse_list_row(line: &str, properties: &[String]) -> DatasetRecord {
    let mut record = DatasetRecord::new();
    for (property, raw) in properties.iter().zip(line.split('\t')) {
        record.insert(property.clone(), type_property(property, raw));
    }
    record
}

/// Pull the value column out of `get -Hp` output (`name\tproperty\tvalue\tsource`).
pub(crate) fn parse_get_value(output: &str) -> ZcmResult<&str> {
    let line = output
        .lines()
        .find(|line| !line.is_empty())
        .ok_or_else(|| ZcmError::Parse("get returned no rows".to_string()))?;
    line.split('\t')
        .nth(2)
        .ok_or_else(|| ZcmError::Parse(format!("get row has fewer than three fields: `{line}`")))
}

/// Parse one `diff -H -t [-F]` row. The path is everything after the fixed
/// columns, re-joined so embedded tabs survive.
pub(crate) fn parse_diff_line(line: &str, include_file_types: bool) -> ZcmResult<DiffRecord> {
    let fields: Vec<&str> = line.split('\t').collect();
    let path_index = if include_file_types { 3 } else { 2 };
    if fields.len() <= path_index {
        return Err(ZcmError::Parse(format!("short diff row: `{line}`")));
    }

    let timestamp = local_datetime_from_epoch(fields[0])
        .ok_or_else(|| ZcmError::Parse(format!("bad diff timestamp `{}`", fields[0])))?;
    let change = ChangeType::from_code(fields[1])?;
    let file_type = if include_file_types {
        Some(FileType::from_code(fields[2])?)
    } else {
        None
    };

    Ok(DiffRecord {
        timestamp,
        change,
        file_type,
        path: PathBuf::from(fields[path_index..].join("\t")),
    })
}

/// Rewrite `path` relative to `mountpoint`; paths outside it are kept as-is.
pub(crate) fn relativize(path: &Path, mountpoint: &Path) -> PathBuf {
    match path.strip_prefix(mountpoint) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}
