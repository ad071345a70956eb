use crate::dataset::{
    CloneOptions, CreateOptions, DatasetKind, DatasetRecord, DestroyOptions, DiffOptions,
    DiffRecord, ListOptions, SetOptions,
};
use crate::error::ZcmResult;
use crate::property::PropertyValue;
use std::path::Path;

/// Abstraction over dataset lifecycle commands.
///
/// Implementations are a thin, stateless surface over the underlying tool:
/// every call re-queries it and nothing is cached between calls. Failures of
/// the tool propagate unmodified, except for the existence probes (`list`,
/// `exists`, `is_filesystem`, `is_snapshot`) which degrade to empty/false.
pub trait DatasetProvider {
    /// Lazily-consumed `list` rows. Dropping it early stops the tool.
    type ListStream: Iterator<Item = ZcmResult<DatasetRecord>>;
    /// Lazily-consumed diff records. Dropping it early stops the tool.
    type DiffStream: Iterator<Item = ZcmResult<DiffRecord>>;

    /// Create a filesystem and return its full name, or `None` when the
    /// target is a pool root (never created).
    fn create(&self, name: &str, options: &CreateOptions) -> ZcmResult<Option<String>>;

    /// Clone `from_snapshot` into `parent/name` and return the clone name.
    fn clone_snapshot(
        &self,
        name: &str,
        from_snapshot: &str,
        options: &CloneOptions,
    ) -> ZcmResult<String>;

    /// Apply each populated field with its own `set` call.
    fn set(&self, name: &str, options: &SetOptions) -> ZcmResult<String>;

    /// Drop the local value of `property` so it is inherited again.
    fn inherit(&self, name: &str, property: &str) -> ZcmResult<()>;

    /// Read a single named property.
    fn get(&self, name: &str, property: &str) -> ZcmResult<PropertyValue>;

    /// Take `dataset@label`, optionally across all descendants.
    fn snapshot(&self, label: &str, dataset: &str, recursive: bool) -> ZcmResult<String>;

    fn destroy(&self, name: &str, options: &DestroyOptions) -> ZcmResult<()>;

    /// Promote a clone. Its former origin filesystem becomes a clone in turn.
    fn promote(&self, name: &str) -> ZcmResult<()>;

    fn rename(&self, old_name: &str, new_name: &str) -> ZcmResult<()>;

    fn mount(&self, name: &str) -> ZcmResult<()>;

    fn unmount(&self, name: &str) -> ZcmResult<()>;

    /// Best-effort listing: any failure yields an empty vector.
    fn list(&self, options: &ListOptions) -> Vec<DatasetRecord>;

    /// Streaming listing whose errors propagate.
    fn list_stream(&self, options: &ListOptions) -> ZcmResult<Self::ListStream>;

    fn exists(&self, name: &str) -> bool;

    fn is_filesystem(&self, name: &str) -> bool;

    fn is_snapshot(&self, name: &str) -> bool;

    /// Stream changes of `name` relative to a snapshot. Not restartable.
    fn diff(&self, name: &str, options: &DiffOptions) -> ZcmResult<Self::DiffStream>;

    /// Write a send stream of `snapshot` to `output`, returning bytes written.
    fn send(
        &self,
        snapshot: &str,
        output: &Path,
        incremental_from: Option<&str>,
    ) -> ZcmResult<u64>;

    /// Kind derived from the `type` property.
    fn kind(&self, name: &str) -> ZcmResult<DatasetKind> {
        match self.get(name, "type")? {
            PropertyValue::Text(value) => value.parse(),
            other => Err(crate::error::ZcmError::Parse(format!(
                "type of {name} reported as `{other}`"
            ))),
        }
    }

    /// Origin snapshot of a clone, `None` for anything else.
    fn origin(&self, name: &str) -> ZcmResult<Option<String>> {
        match self.get(name, "origin")? {
            PropertyValue::Absent => Ok(None),
            value => Ok(Some(value.to_string())),
        }
    }
}
