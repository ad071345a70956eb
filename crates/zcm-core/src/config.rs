use crate::dataset::DEFAULT_LIST_PROPERTIES;
use crate::error::{ZcmError, ZcmResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the `zfs` tool is located and invoked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ZfsCfg {
    /// Explicit path to the `zfs` binary. Discovered when unset.
    #[serde(default)]
    pub binary_path: Option<String>,

    /// Optional ceiling on buffered invocations. Unset means wait for exit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Defaults applied by front-ends when the caller leaves a value unset.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Defaults {
    #[serde(default)]
    pub compression: Option<String>,

    #[serde(default = "default_list_properties")]
    pub list_properties: Vec<String>,

    #[serde(default = "default_destroy_synchronous")]
    pub destroy_synchronous: bool,
}

fn default_list_properties() -> Vec<String> {
    DEFAULT_LIST_PROPERTIES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_destroy_synchronous() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            compression: None,
            list_properties: default_list_properties(),
            destroy_synchronous: default_destroy_synchronous(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ZcmConfig {
    #[serde(default)]
    pub zfs: ZfsCfg,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(skip)]
    pub path: PathBuf,
}

impl ZcmConfig {
    /// Load a config file. `.toml` files parse as TOML, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> ZcmResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut cfg = if matches!(path.extension().and_then(|ext| ext.to_str()), Some(ext) if ext.eq_ignore_ascii_case("toml"))
        {
            toml::from_str::<Self>(&contents)?
        } else {
            serde_yaml::from_str::<Self>(&contents)?
        };

        cfg.path = path.to_path_buf();

        if cfg.defaults.list_properties.is_empty() {
            return Err(ZcmError::InvalidConfig(
                "defaults.list_properties must name at least one property".to_string(),
            ));
        }

        Ok(cfg)
    }

    /// Collect every problem with the config instead of stopping at the first.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if let Some(path) = self.zfs_binary_path() {
            if !path.exists() {
                issues.push(format!("zfs.binary_path {} does not exist", path.display()));
            }
        }

        if self.zfs.timeout_secs == Some(0) {
            issues.push("zfs.timeout_secs must be greater than zero when set".to_string());
        }

        if self.defaults.list_properties.is_empty() {
            issues.push("defaults.list_properties must not be empty".to_string());
        }

        if self
            .defaults
            .list_properties
            .iter()
            .any(|p| p.trim().is_empty() || p.contains(','))
        {
            issues.push("defaults.list_properties entries must be single property names".to_string());
        }

        if self.defaults.list_properties.iter().any(|p| p == "all") {
            issues.push("defaults.list_properties must not contain `all`".to_string());
        }

        issues
    }

    /// Explicit binary path, or `None` to fall back to discovery.
    pub fn zfs_binary_path(&self) -> Option<PathBuf> {
        self.zfs.binary_path.as_ref().map(PathBuf::from)
    }

    /// Ceiling for buffered tool calls, if one is configured.
    pub fn zfs_timeout(&self) -> Option<Duration> {
        self.zfs.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_toml_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zcm.toml");
        fs::write(
            &path,
            r#"
[zfs]
binary_path = "/sbin/zfs"

[defaults]
compression = "lz4"
"#,
        )
        .unwrap();

        let cfg = ZcmConfig::load(&path).unwrap();
        assert_eq!(cfg.zfs_binary_path(), Some(PathBuf::from("/sbin/zfs")));
        assert_eq!(cfg.zfs_timeout(), None);
        assert_eq!(cfg.defaults.compression.as_deref(), Some("lz4"));
        assert_eq!(cfg.defaults.list_properties, DEFAULT_LIST_PROPERTIES);
        assert!(cfg.defaults.destroy_synchronous);
        assert_eq!(cfg.path, path);
    }

    #[test]
    fn load_yaml_when_extension_is_not_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zcm.yaml");
        fs::write(
            &path,
            "zfs:\n  timeout_secs: 30\ndefaults:\n  list_properties: [name, origin]\n  destroy_synchronous: false\n",
        )
        .unwrap();

        let cfg = ZcmConfig::load(&path).unwrap();
        assert_eq!(cfg.zfs_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.defaults.list_properties, vec!["name", "origin"]);
        assert!(!cfg.defaults.destroy_synchronous);
    }

    #[test]
    fn empty_list_properties_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zcm.toml");
        fs::write(&path, "[defaults]\nlist_properties = []\n").unwrap();
        assert!(matches!(
            ZcmConfig::load(&path),
            Err(ZcmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_reports_every_issue() {
        let mut cfg = ZcmConfig::default();
        assert!(cfg.validate().is_empty());

        cfg.zfs.binary_path = Some("/definitely/not/here/zfs".into());
        cfg.zfs.timeout_secs = Some(0);
        cfg.defaults.list_properties = vec!["name,used".into(), "all".into()];
        let issues = cfg.validate();
        assert_eq!(issues.len(), 4, "{issues:?}");
    }
}
