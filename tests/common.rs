#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::Path;

/// Installs the env_logger backend once per test binary.
pub fn init_logging() {
    let _ = datatree::logging::try_init();
}

/// Writes a mapping descriptor for `source -> target` under `root`, using
/// the primary canonical filename.
pub fn write_descriptor(root: &Path, source: &str, target: &str, descriptor: &Value) {
    let dir = root.join(source).join(target);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.json"),
        serde_json::to_string_pretty(descriptor).unwrap(),
    )
    .unwrap();
}

/// Same, but under the `static/` candidate filename.
pub fn write_static_descriptor(root: &Path, source: &str, target: &str, descriptor: &Value) {
    let dir = root.join(source).join(target).join("static");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.json"),
        serde_json::to_string_pretty(descriptor).unwrap(),
    )
    .unwrap();
}
