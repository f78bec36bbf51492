//! Purpose: Shared device-path defaults and presence checks.
//! Exports: `default_device_path`, `device_present`.
//! Role: Keep the CLI, the daemon, and the client agreeing on where the device lives.
//! Invariants: Default device path remains `~/.intstack/int_stack`.
//! Invariants: A device is present only while a socket exists at its path.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

pub const DEVICE_NAME: &str = "int_stack";

pub fn default_device_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".intstack").join(DEVICE_NAME)
}

pub fn device_present(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{default_device_path, device_present};
    use std::os::unix::net::UnixListener;

    #[test]
    fn default_path_lives_under_home() {
        let path = default_device_path();
        assert!(path.ends_with(".intstack/int_stack"));
    }

    #[test]
    fn only_sockets_count_as_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing");
        assert!(!device_present(&missing));

        let regular = dir.path().join("regular");
        std::fs::write(&regular, b"not a device").expect("write");
        assert!(!device_present(&regular));

        let socket = dir.path().join("int_stack");
        let _listener = UnixListener::bind(&socket).expect("bind");
        assert!(device_present(&socket));
    }
}
