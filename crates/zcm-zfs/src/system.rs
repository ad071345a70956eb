//! System-backed `DatasetProvider`. Every operation shells out to the `zfs`
//! binary exactly once per tool call; nothing is cached or retried.

use crate::command::{CommandRunner, LineStream};
use crate::parse::{parse_diff_line, parse_get_value, parse_list_row, relativize};
use log::debug;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zcm_core::config::ZcmConfig;
use zcm_core::dataset::{
    CloneOptions, CreateOptions, DatasetRecord, DestroyOptions, DiffOptions, DiffRecord,
    ListOptions, SetOptions, TypeFilter,
};
use zcm_core::error::{ZcmError, ZcmResult};
use zcm_core::hierarchy::{
    ensure_ancestors, is_pool_root, join_name, require, snapshot_name, validate_dataset_name,
    validate_label, validate_snapshot_name,
};
use zcm_core::property::{type_property, PropertyValue, MANAGEMENT_PATH_PROPERTY};
use zcm_core::provider::DatasetProvider;

/// Default locations we probe when looking for a `zfs` binary on the host.
pub const DEFAULT_ZFS_PATHS: &[&str] = &[
    "/sbin/zfs",
    "/usr/sbin/zfs",
    "/usr/local/sbin/zfs",
    "/bin/zfs",
];

/// `DatasetProvider` that shells out to the native `zfs` CLI.
#[derive(Debug, Clone)]
pub struct SystemZfs {
    runner: CommandRunner,
}

impl SystemZfs {
    /// Build a provider from configuration, falling back to discovery.
    pub fn from_config(config: &ZcmConfig) -> ZcmResult<Self> {
        let timeout = config.zfs_timeout();
        match config.zfs_binary_path() {
            Some(path) => Self::with_path(path, timeout),
            None => Self::discover(timeout),
        }
    }

    /// Use an explicit `zfs` binary.
    pub fn with_path(path: PathBuf, timeout: Option<Duration>) -> ZcmResult<Self> {
        if !path.exists() {
            return Err(ZcmError::InvalidConfig(format!(
                "binary not found at {}",
                path.display()
            )));
        }
        Ok(Self {
            runner: CommandRunner::new(path, timeout),
        })
    }

    /// Walk through `DEFAULT_ZFS_PATHS` until a binary is found.
    pub fn discover(timeout: Option<Duration>) -> ZcmResult<Self> {
        for candidate in DEFAULT_ZFS_PATHS {
            let p = Path::new(candidate);
            if p.exists() {
                return Self::with_path(p.to_path_buf(), timeout);
            }
        }
        Err(ZcmError::InvalidConfig(format!(
            "unable to locate zfs binary; tried {:?}",
            DEFAULT_ZFS_PATHS
        )))
    }

    /// Path of the `zfs` binary this provider invokes.
    pub fn binary(&self) -> &Path {
        self.runner.binary()
    }

    fn run(&self, verb: &str, args: &[&str], options: &[String]) -> ZcmResult<String> {
        let option_refs: Vec<&str> = options.iter().map(String::as_str).collect();
        self.runner.run_checked(verb, args, &option_refs)
    }

    /// Run a probe, turning any failure into `None`.
    fn try_query<T>(&self, what: &str, query: impl FnOnce() -> ZcmResult<T>) -> Option<T> {
        match query() {
            Ok(value) => Some(value),
            Err(err) => {
                debug!("{what} treated as empty: {err}");
                None
            }
        }
    }

    fn list_args(options: &ListOptions) -> ZcmResult<Vec<String>> {
        if options.properties.is_empty() {
            return Err(ZcmError::Validation(
                "list needs at least one property".to_string(),
            ));
        }
        if options.properties.iter().any(|p| p == "all") {
            return Err(ZcmError::Validation(
                "list does not support the `all` property".to_string(),
            ));
        }

        let mut args = vec![
            "-Hp".to_string(),
            "-o".to_string(),
            options.properties.join(","),
        ];
        if let Some(filter) = options.type_filter {
            args.push("-t".to_string());
            args.push(filter.as_str().to_string());
        }
        if options.recursive {
            args.push("-r".to_string());
        }
        if let Some(name) = &options.name {
            args.push(name.clone());
        }
        Ok(args)
    }
}

/// Lazily parsed `list` rows.
pub struct ListStream {
    lines: LineStream,
    properties: Vec<String>,
}

impl Iterator for ListStream {
    type Item = ZcmResult<DatasetRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.is_empty() => continue,
                Ok(line) => return Some(Ok(parse_list_row(&line, &self.properties))),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Lazily parsed diff records, relative to the mountpoint when one applies.
pub struct DiffStream {
    lines: LineStream,
    include_file_types: bool,
    mountpoint: Option<PathBuf>,
}

impl Iterator for DiffStream {
    type Item = ZcmResult<DiffRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) if line.is_empty() => continue,
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            let record = parse_diff_line(&line, self.include_file_types).map(|mut record| {
                if let Some(mountpoint) = &self.mountpoint {
                    record.path = relativize(&record.path, mountpoint);
                }
                record
            });
            return Some(record);
        }
    }
}

impl DatasetProvider for SystemZfs {
    type ListStream = ListStream;
    type DiffStream = DiffStream;

    fn create(&self, name: &str, options: &CreateOptions) -> ZcmResult<Option<String>> {
        require("dataset name", name)?;
        let full = join_name(options.parent.as_deref(), name);
        if is_pool_root(&full) {
            debug!("{full} is a pool root; nothing to create");
            return Ok(None);
        }
        validate_dataset_name(&full)?;

        if options.recursive {
            ensure_ancestors(self, &full)?;
        }

        let mut props = Vec::new();
        if let Some(compression) = &options.compression {
            props.push(format!("compression={compression}"));
        }
        if let Some(mountpoint) = &options.mountpoint {
            props.push(format!("mountpoint={}", mountpoint.display()));
        }
        if let Some(path) = &options.management_path {
            props.push(format!("{MANAGEMENT_PATH_PROPERTY}={}", path.display()));
        }

        self.run("create", &[full.as_str()], &props)?;
        Ok(Some(full))
    }

    fn clone_snapshot(
        &self,
        name: &str,
        from_snapshot: &str,
        options: &CloneOptions,
    ) -> ZcmResult<String> {
        require("clone name", name)?;
        require("source snapshot", from_snapshot)?;
        validate_snapshot_name(from_snapshot)?;
        let target = join_name(options.parent.as_deref(), name);
        validate_dataset_name(&target)?;

        let mut props = Vec::new();
        if let Some(mountpoint) = &options.mountpoint {
            props.push(format!("mountpoint={}", mountpoint.display()));
        }

        self.run("clone", &[from_snapshot, target.as_str()], &props)?;
        Ok(target)
    }

    fn set(&self, name: &str, options: &SetOptions) -> ZcmResult<String> {
        require("dataset name", name)?;
        let mut assignments = Vec::new();
        if let Some(readonly) = options.readonly {
            assignments.push(format!("readonly={}", if readonly { "on" } else { "off" }));
        }
        if let Some(mountpoint) = &options.mountpoint {
            assignments.push(format!("mountpoint={}", mountpoint.display()));
        }
        if let Some(path) = &options.management_path {
            assignments.push(format!("{MANAGEMENT_PATH_PROPERTY}={}", path.display()));
        }

        let mut output = String::new();
        for assignment in &assignments {
            output.push_str(&self.run("set", &[assignment.as_str(), name], &[])?);
        }
        Ok(output)
    }

    fn inherit(&self, name: &str, property: &str) -> ZcmResult<()> {
        require("dataset name", name)?;
        require("property name", property)?;
        self.run("inherit", &[property, name], &[])?;
        Ok(())
    }

    fn get(&self, name: &str, property: &str) -> ZcmResult<PropertyValue> {
        require("dataset name", name)?;
        require("property name", property)?;
        if property == "all" {
            return Err(ZcmError::Validation(
                "get queries a single named property; `all` is not supported".to_string(),
            ));
        }
        let out = self.run("get", &["-Hp", property, name], &[])?;
        let raw = parse_get_value(&out)?;
        Ok(type_property(property, raw))
    }

    fn snapshot(&self, label: &str, dataset: &str, recursive: bool) -> ZcmResult<String> {
        validate_label(label)?;
        validate_dataset_name(dataset)?;
        let full = snapshot_name(dataset, label);
        if recursive {
            self.run("snapshot", &["-r", full.as_str()], &[])?;
        } else {
            self.run("snapshot", &[full.as_str()], &[])?;
        }
        Ok(full)
    }

    fn destroy(&self, name: &str, options: &DestroyOptions) -> ZcmResult<()> {
        require("dataset name", name)?;
        let mut args = Vec::new();
        if options.recursive {
            args.push("-r");
        }
        if options.synchronous {
            args.push("-s");
        }
        args.push(name);
        self.run("destroy", &args, &[])?;
        Ok(())
    }

    fn promote(&self, name: &str) -> ZcmResult<()> {
        require("dataset name", name)?;
        self.run("promote", &[name], &[])?;
        Ok(())
    }

    fn rename(&self, old_name: &str, new_name: &str) -> ZcmResult<()> {
        require("current name", old_name)?;
        require("new name", new_name)?;
        self.run("rename", &[old_name, new_name], &[])?;
        Ok(())
    }

    fn mount(&self, name: &str) -> ZcmResult<()> {
        require("dataset name", name)?;
        self.run("mount", &[name], &[])?;
        Ok(())
    }

    fn unmount(&self, name: &str) -> ZcmResult<()> {
        require("dataset name", name)?;
        self.run("unmount", &[name], &[])?;
        Ok(())
    }

    fn list(&self, options: &ListOptions) -> Vec<DatasetRecord> {
        self.try_query("list", || {
            self.list_stream(options)?
                .collect::<ZcmResult<Vec<DatasetRecord>>>()
        })
        .unwrap_or_default()
    }

    fn list_stream(&self, options: &ListOptions) -> ZcmResult<ListStream> {
        let args = Self::list_args(options)?;
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let lines = self.runner.stream("list", &arg_refs, &[])?;
        Ok(ListStream {
            lines,
            properties: options.properties.clone(),
        })
    }

    fn exists(&self, name: &str) -> bool {
        let options = ListOptions {
            name: Some(name.to_string()),
            type_filter: Some(TypeFilter::All),
            recursive: false,
            properties: vec!["name".to_string()],
        };
        self.list(&options).len() == 1
    }

    fn is_filesystem(&self, name: &str) -> bool {
        self.try_query("is_filesystem", || self.get(name, "type"))
            .map(|kind| kind.as_text() == Some("filesystem"))
            .unwrap_or(false)
    }

    fn is_snapshot(&self, name: &str) -> bool {
        self.try_query("is_snapshot", || self.get(name, "type"))
            .map(|kind| kind.as_text() == Some("snapshot"))
            .unwrap_or(false)
    }

    fn diff(&self, name: &str, options: &DiffOptions) -> ZcmResult<DiffStream> {
        require("dataset name", name)?;

        let mountpoint = if self.is_filesystem(name) {
            match self.get(name, "mountpoint")? {
                PropertyValue::Path(path) if path.is_absolute() => Some(path),
                _ => None,
            }
        } else {
            None
        };

        let mut args = vec!["-H", "-t"];
        if options.include_file_types {
            args.push("-F");
        }
        if options.recursive {
            args.push("-r");
        }
        match options.origin_snapshot.as_deref() {
            Some(origin) => args.push(origin),
            None => args.push("-E"),
        }
        args.push(name);

        let lines = self.runner.stream("diff", &args, &[])?;
        Ok(DiffStream {
            lines,
            include_file_types: options.include_file_types,
            mountpoint,
        })
    }

    fn send(
        &self,
        snapshot: &str,
        output: &Path,
        incremental_from: Option<&str>,
    ) -> ZcmResult<u64> {
        validate_snapshot_name(snapshot)?;
        let mut args = Vec::new();
        if let Some(from) = incremental_from {
            require("incremental source", from)?;
            args.push("-i");
            args.push(from);
        }
        args.push(snapshot);

        let mut writer = BufWriter::new(File::create(output)?);
        let result = self
            .runner
            .run_to_writer("send", &args, &[], &mut writer)
            .and_then(|bytes| {
                writer.flush()?;
                Ok(bytes)
            });
        if result.is_err() {
            drop(writer);
            let _ = fs::remove_file(output);
        }
        result
    }
}
