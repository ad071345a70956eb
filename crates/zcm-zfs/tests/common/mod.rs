#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tempfile::{tempdir, TempDir};
use zcm_zfs::SystemZfs;

pub const FAKE_ZFS_SCRIPT: &str = include_str!("../fixtures/fake_zfs.py");

/// A throwaway `zfs` stand-in with its own state directory.
pub struct FakeZfs {
    pub provider: SystemZfs,
    dir: TempDir,
    _guard: MutexGuard<'static, ()>,
}

impl FakeZfs {
    pub fn new() -> Self {
        let guard = test_lock();
        let dir = tempdir().unwrap();
        let script = dir.path().join("zfs");
        fs::write(&script, FAKE_ZFS_SCRIPT).unwrap();
        make_executable(&script).unwrap();
        let provider = SystemZfs::with_path(script, None).unwrap();
        Self {
            provider,
            dir,
            _guard: guard,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn out_file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Every argument vector the fake has seen, oldest first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        match fs::read_to_string(self.dir.path().join("calls.log")) {
            Ok(text) => text
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn calls_for(&self, verb: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|call| call.first().map(String::as_str) == Some(verb))
            .collect()
    }
}

/// Serialises tests so a freshly written script is never exec'd while another
/// thread still holds a write handle to it.
fn test_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn make_executable(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}
