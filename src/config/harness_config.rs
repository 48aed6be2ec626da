//! Represents the harness configuration file.

use crate::config::cli_args::CliArgs;
use crate::utils;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// This struct is deserialized from `harness.toml` using `utils::read_toml_from_file`.
/// It contains the following fields:
/// - `native_dir`: Directory holding the `lib<name>.so` test executables.
/// - `assets_dir`: Directory holding `testassets.zip` (or `.tar.gz`) and its `.crc32` marker.
/// - `data_dir`: Writable directory; fixtures are extracted to `<data_dir>/testassets`.
/// - `cache_dir`: Scratch directory for the archive copy (defaults to `<data_dir>/cache`).
/// - `report`: Optional path of a Markdown summary written after the run.
/// - `executables`: Executables checked before the first test runs.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub native_dir: Option<PathBuf>,
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub report: Option<PathBuf>,
    #[serde(default)]
    pub executables: Option<Vec<String>>,
}

/// Executables loaded before any test runs unless configured otherwise.
pub const DEFAULT_EXECUTABLES: [&str; 3] = ["patch_test", "qjs", "qjsbn"];

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub native_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub report: Option<PathBuf>,
    pub executables: Vec<String>,
}

impl HarnessConfig {
    /// 从文件中读取
    pub fn from_file(path: &Path) -> Result<Self> {
        utils::read_toml_from_file(path)
    }

    /// Loads the file named by `--config`, or `harness.toml` if it exists.
    pub fn load(args: &CliArgs) -> Result<Self> {
        match &args.config {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(CliArgs::DEFAULT_CONFIG);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Applies command line overrides and fills in defaults.
    ///
    /// Directories are made absolute against the current directory, since test
    /// executables are launched from inside the fixture tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a required directory is given neither in the file
    /// nor on the command line, or cannot be made absolute.
    pub fn resolve(self, args: &CliArgs) -> Result<Settings> {
        let Some(native_dir) = args.native_dir.clone().or(self.native_dir) else {
            bail!("native_dir is not set (use --native-dir or the config file)");
        };
        let Some(assets_dir) = args.assets_dir.clone().or(self.assets_dir) else {
            bail!("assets_dir is not set (use --assets-dir or the config file)");
        };
        let Some(data_dir) = args.data_dir.clone().or(self.data_dir) else {
            bail!("data_dir is not set (use --data-dir or the config file)");
        };
        let native_dir = absolute(native_dir)?;
        let assets_dir = absolute(assets_dir)?;
        let data_dir = absolute(data_dir)?;
        let cache_dir = absolute(self.cache_dir.unwrap_or_else(|| data_dir.join("cache")))?;
        let executables = self.executables.unwrap_or_else(|| {
            DEFAULT_EXECUTABLES.iter().map(|s| s.to_string()).collect()
        });

        Ok(Settings {
            native_dir,
            assets_dir,
            data_dir,
            cache_dir,
            report: args.report.clone().or(self.report),
            executables,
        })
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).with_context(|| format!("Can't resolve path {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("qjs-harness").chain(argv.iter().copied()))
    }

    #[test]
    fn test_parse_full_config() {
        let config: HarnessConfig = toml::from_str(
            r#"
native_dir = "/data/app/lib/arm64"
assets_dir = "/data/app/assets"
data_dir = "/data/data/qjs"
report = "summary.md"
executables = ["qjs"]
"#,
        )
        .unwrap();
        let settings = config.resolve(&args(&[])).unwrap();
        assert_eq!(settings.native_dir, PathBuf::from("/data/app/lib/arm64"));
        assert_eq!(settings.cache_dir, PathBuf::from("/data/data/qjs/cache"));
        assert_eq!(settings.report, Some(PathBuf::from("summary.md")));
        assert_eq!(settings.executables, vec!["qjs"]);
    }

    #[test]
    fn test_relative_directories_become_absolute() {
        let settings = HarnessConfig::default()
            .resolve(&args(&[
                "--native-dir",
                "lib/",
                "--assets-dir",
                "assets",
                "--data-dir",
                "data",
            ]))
            .unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(settings.native_dir, cwd.join("lib"));
        assert_eq!(settings.assets_dir, cwd.join("assets"));
        assert_eq!(settings.data_dir, cwd.join("data"));
        assert_eq!(settings.cache_dir, cwd.join("data/cache"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let config: HarnessConfig =
            toml::from_str("native_dir = \"/a\"\nassets_dir = \"/b\"\ndata_dir = \"/c\"\n").unwrap();
        let settings = config
            .resolve(&args(&["--native-dir", "/x", "--report", "r.md"]))
            .unwrap();
        assert_eq!(settings.native_dir, PathBuf::from("/x"));
        assert_eq!(settings.assets_dir, PathBuf::from("/b"));
        assert_eq!(settings.report, Some(PathBuf::from("r.md")));
        assert_eq!(settings.executables, DEFAULT_EXECUTABLES.to_vec());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let err = HarnessConfig::default()
            .resolve(&args(&["--native-dir", "/x"]))
            .unwrap_err();
        assert!(err.to_string().contains("assets_dir"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<HarnessConfig>("timeout = 5\n").is_err());
    }
}
