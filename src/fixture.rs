//! Fixture tree synchronisation.
//!
//! The fixture archive ships next to a marker file named
//! `testassets-<crc32>.crc32`. The name of the marker last extracted is kept
//! in `testassets.name`; when the two differ the fixture tree is rebuilt from
//! the archive.

use crate::log_broadcaster::LogBroadcaster;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use regex::Regex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Command;
use zip::ZipArchive;

const MARKER_FILE: &str = "testassets.name";
const FIXTURE_DIR: &str = "testassets";
const ZIP_ARCHIVE: &str = "testassets.zip";
const TAR_ARCHIVE: &str = "testassets.tar.gz";

/// Keeps `<data_dir>/testassets` in sync with the packaged fixture archive.
#[derive(Debug, Clone)]
pub struct FixtureSync {
    assets_dir: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

/// Outcome of [`FixtureSync::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    Extracted,
}

impl FixtureSync {
    pub fn new(assets_dir: PathBuf, data_dir: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            assets_dir,
            data_dir,
            cache_dir,
        }
    }

    /// Directory the fixture tree is extracted into; test executables run here.
    pub fn fixture_dir(&self) -> PathBuf {
        self.data_dir.join(FIXTURE_DIR)
    }

    fn marker_path(&self) -> PathBuf {
        self.data_dir.join(MARKER_FILE)
    }

    /// Finds the packaged marker name. When several match, the last one in
    /// sorted order wins.
    fn packaged_marker(&self) -> Result<String> {
        let pattern = Regex::new(r"^testassets-.*\.crc32$")?;
        let listing_error = || format!("Can't list assets in {}", self.assets_dir.display());
        let mut markers = Vec::new();
        for entry in fs::read_dir(&self.assets_dir).with_context(listing_error)? {
            let entry = entry.with_context(listing_error)?;
            // non UTF-8 names can't match the marker pattern
            if let Ok(name) = entry.file_name().into_string() {
                if pattern.is_match(&name) {
                    markers.push(name);
                }
            }
        }
        markers.sort();
        match markers.pop() {
            Some(marker) => Ok(marker),
            None => bail!("Can't find test assets"),
        }
    }

    /// Makes sure the fixture tree matches the packaged archive.
    ///
    /// Progress is reported through `log` the same way test output is.
    ///
    /// # Errors
    ///
    /// * no marker file is packaged
    /// * the fixture directory cannot be recreated
    /// * the archive is missing or fails to extract
    /// * the marker cannot be stored
    pub fn ensure(&self, log: &LogBroadcaster) -> Result<SyncStatus> {
        let stored = fs::read_to_string(self.marker_path()).ok();
        let actual = self.packaged_marker()?;

        if stored.as_deref() == Some(actual.as_str()) {
            log.append("All test assets are UP-TO-DATE");
            debug!("Fixture marker {actual} unchanged");
            return Ok(SyncStatus::UpToDate);
        }

        log.append("Need exact assets");
        log.append(format!("except = {}", stored.as_deref().unwrap_or("null")));
        log.append(format!("actual = {actual}"));

        let fixture_dir = self.fixture_dir();
        if fixture_dir.exists() {
            fs::remove_dir_all(&fixture_dir).with_context(|| {
                format!("Can't remove old test assets: {}", fixture_dir.display())
            })?;
        }
        fs::create_dir_all(&fixture_dir).context("Can't create test assets dir")?;

        self.extract_into(&fixture_dir)?;

        fs::write(self.marker_path(), &actual)
            .with_context(|| format!("Can't store {}", self.marker_path().display()))?;

        log.append("All test assets are copied");
        info!("Fixture tree rebuilt from {actual}");
        Ok(SyncStatus::Extracted)
    }

    /// Copies the archive into the cache directory and unpacks it.
    fn extract_into(&self, fixture_dir: &Path) -> Result<()> {
        let (archive_name, zip) = if self.assets_dir.join(ZIP_ARCHIVE).is_file() {
            (ZIP_ARCHIVE, true)
        } else if self.assets_dir.join(TAR_ARCHIVE).is_file() {
            (TAR_ARCHIVE, false)
        } else {
            bail!(
                "No fixture archive ({ZIP_ARCHIVE} or {TAR_ARCHIVE}) in {}",
                self.assets_dir.display()
            );
        };

        fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Can't create {}", self.cache_dir.display()))?;
        let temp_archive = self.cache_dir.join(archive_name);
        fs::copy(self.assets_dir.join(archive_name), &temp_archive)
            .with_context(|| format!("Can't copy {archive_name}"))?;

        let result = if zip {
            extract_zip(&temp_archive, fixture_dir)
        } else {
            extract_tar(&temp_archive, fixture_dir)
        };
        let _ = fs::remove_file(&temp_archive);
        result.with_context(|| format!("Failed to extract {archive_name}"))
    }
}

fn extract_zip(archive: &Path, fixture_dir: &Path) -> Result<()> {
    debug!("Unzipping {} into {}", archive.display(), fixture_dir.display());
    let file = File::open(archive).with_context(|| format!("Can't open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file)?;
    zip.extract(fixture_dir)?;
    debug!("{} entries extracted", zip.len());
    Ok(())
}

fn extract_tar(archive: &Path, fixture_dir: &Path) -> Result<()> {
    let mut command = Command::new("tar");
    command.arg("xzf").arg(archive).arg("-C").arg(fixture_dir);
    debug!("Extracting fixtures: {:?}", command);
    let output = command.output().context("Failed to run tar")?;
    if !output.status.success() {
        bail!("{}", String::from_utf8_lossy(&output.stderr).trim());
    }
    Ok(())
}
