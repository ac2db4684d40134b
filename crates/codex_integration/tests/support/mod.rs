#![allow(dead_code)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

pub fn write_script(dir: &Path, name: &str, script: &str, mode: u32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, script).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(mode);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

pub fn write_fake_codex(dir: &Path, script: &str) -> PathBuf {
    write_script(dir, "codex", script, 0o755)
}

pub const VERSION_OK: &str = r#"#!/bin/sh
set -eu
case "${1:-}" in
  --version) echo "codex-cli 0.46.0" ;;
  *) echo "args: $*" ;;
esac
"#;
