//! Filesystem probes used by pre-checks and path validation.
//!
//! All queries run against the nearest existing ancestor of the target, since
//! the install directory usually does not exist yet.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Closest ancestor of `path` (including itself) that exists.
pub fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
}

/// Free bytes available to unprivileged users on the filesystem holding
/// `path`.
#[cfg(unix)]
pub fn available_space(path: &Path) -> io::Result<u64> {
    let anchor = nearest_existing_ancestor(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no existing ancestor for {}", path.display()),
        )
    })?;
    let stat = nix::sys::statvfs::statvfs(&anchor).map_err(io::Error::from)?;
    #[allow(clippy::unnecessary_cast)] // field widths differ between targets
    let bytes = (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64);
    Ok(bytes)
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free space detection not available on this OS",
    ))
}

/// Try to create and remove a file in `dir`. The error kind tells apart
/// permission problems from everything else.
pub fn probe_writable(dir: &Path) -> io::Result<()> {
    let probe = dir.join(format!(".setupflow-probe-{}", std::process::id()));
    OpenOptions::new().write(true).create_new(true).open(&probe)?;
    fs::remove_file(&probe)
}
