// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{io, os::unix::net::UnixStream, path::Path, path::PathBuf};

/// Whether something accepts connections on `path`.
pub fn is_listening<P: AsRef<Path>>(path: P) -> io::Result<bool> {
    if !path.as_ref().exists() {
        return Ok(false);
    }
    Ok(UnixStream::connect(path).is_ok())
}

/// Unlinks a socket file left behind by a dead collector. A live listener
/// on the path is left alone and reported as an `AddrInUse` error.
pub fn cleanup_stale<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(());
    }
    if is_listening(path)? {
        return Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("collector already listening on {}", path.display()),
        ));
    }
    std::fs::remove_file(path)
}

/// Default socket path for a collector hosted by the process `pid`.
pub fn collector_socket_path(pid: u32) -> PathBuf {
    std::env::temp_dir().join(format!("taist-collector-{pid}.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_not_listening() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_listening(dir.path().join("absent.sock")).unwrap());
    }

    #[test]
    fn stale_file_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        // A plain file stands in for a socket whose owner died.
        std::fs::write(&path, b"").unwrap();
        cleanup_stale(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn live_listener_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let err = cleanup_stale(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        assert!(path.exists());
    }

    #[test]
    fn default_path_is_per_process() {
        assert_ne!(collector_socket_path(1), collector_socket_path(2));
    }
}
