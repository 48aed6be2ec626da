//! Resolution of bare executable names to runnable files.
//!
//! Test executables ship as native libraries (`lib<name>.so`) inside a single
//! directory, so resolving a name is a path join. Before anything runs, the
//! prepare step checks that the files are there and executable.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Maps a bare executable identifier (e.g. `qjs`) to a path.
#[cfg_attr(test, mockall::automock)]
pub trait ExecutableResolver: Send + Sync {
    fn resolve(&self, name: &str) -> PathBuf;
}

/// Resolver for executables packaged as `lib<name>.so` in one directory.
#[derive(Debug, Clone)]
pub struct NativeDirResolver {
    native_dir: PathBuf,
}

impl NativeDirResolver {
    pub fn new(native_dir: impl Into<PathBuf>) -> Self {
        Self {
            native_dir: native_dir.into(),
        }
    }
}

impl ExecutableResolver for NativeDirResolver {
    fn resolve(&self, name: &str) -> PathBuf {
        self.native_dir.join(format!("lib{name}.so"))
    }
}

/// Checks that every named executable resolves to a regular file that can be run.
///
/// On Unix a missing execute bit is added rather than treated as an error,
/// since packaging tools commonly strip it from `.so` files.
///
/// # Errors
///
/// Returns an error if a resolved path is missing, is not a regular file, or
/// its permissions cannot be fixed.
pub fn ensure_executables<R, S>(resolver: &R, names: &[S]) -> Result<()>
where
    R: ExecutableResolver + ?Sized,
    S: AsRef<str>,
{
    for name in names {
        let name = name.as_ref();
        let path = resolver.resolve(name);
        let metadata = fs::metadata(&path)
            .with_context(|| format!("Can't load executable {name}: {}", path.display()))?;
        if !metadata.is_file() {
            bail!("Executable {name} is not a regular file: {}", path.display());
        }
        make_executable(&path, metadata)?;
        debug!("Executable {name} ready at {}", path.display());
    }
    info!("{} executables ready", names.len());
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path, metadata: fs::Metadata) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = metadata.permissions();
    let mode = permissions.mode();
    if mode & 0o111 == 0 {
        permissions.set_mode(mode | 0o755);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("Failed to mark {} executable", path.display()))?;
        debug!("Added execute permission to {}", path.display());
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path, _metadata: fs::Metadata) -> Result<()> {
    Ok(())
}
