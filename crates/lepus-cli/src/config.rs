//! Configuration file parsing for lepus.toml.

use anyhow::Context;
use lepus_compiler::{CompileOptions, Namespace, SdkVersion};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file names searched for, in order
const CONFIG_NAMES: &[&str] = &["lepus.toml", ".lepusrc.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Compiler settings
    #[serde(default)]
    pub compile: CompileConfig,
}

/// `[compile]` table.
#[derive(Debug, Default, Deserialize)]
pub struct CompileConfig {
    /// Target SDK version; empty or "null" targets the newest
    pub sdk_version: Option<String>,

    /// Host-provided global names, in index order
    #[serde(default)]
    pub globals: Vec<String>,

    /// Builtin namespace replacing the default Lepus builtins
    pub builtins: Option<Vec<String>>,
}

impl Config {
    /// Build compiler options, letting command-line values win
    pub fn compile_options(
        &self,
        sdk_version: Option<&str>,
        extra_globals: &[String],
    ) -> anyhow::Result<CompileOptions> {
        let mut options = CompileOptions::new();

        if let Some(version) = sdk_version.or(self.compile.sdk_version.as_deref()) {
            let version: SdkVersion = version.parse()?;
            options = options.with_sdk_version(version);
        }
        options = options.with_globals(
            self.compile
                .globals
                .iter()
                .chain(extra_globals)
                .cloned(),
        );
        if let Some(builtins) = &self.compile.builtins {
            options = options.with_builtins(builtins.iter().cloned().collect::<Namespace>());
        }
        Ok(options)
    }
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_config_file(&cwd)),
    };

    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        _ => Ok(Config::default()),
    }
}

/// Search for a configuration file in `start` and its parent directories.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.compile.sdk_version.is_none());
        assert!(config.compile.globals.is_empty());

        let options = config.compile_options(None, &[]).unwrap();
        assert_eq!(options, CompileOptions::default());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[compile]
sdk_version = "2.6"
globals = ["SystemInfo", "__globalProps"]
builtins = ["Math"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.compile.sdk_version.as_deref(), Some("2.6"));

        let options = config.compile_options(None, &[]).unwrap();
        assert_eq!(options.sdk_version, SdkVersion::new(2, 6, 0));
        assert_eq!(options.globals.search("__globalProps"), Some(1));
        assert_eq!(options.builtins.search("Math"), Some(0));
        assert_eq!(options.builtins.search("JSON"), None);
    }

    #[test]
    fn test_flags_override_file() {
        let toml = r#"
[compile]
sdk_version = "1.0"
globals = ["a"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let options = config
            .compile_options(Some("2.8"), &["b".to_string()])
            .unwrap();
        assert_eq!(options.sdk_version, SdkVersion::new(2, 8, 0));
        assert_eq!(options.globals.search("a"), Some(0));
        assert_eq!(options.globals.search("b"), Some(1));
    }

    #[test]
    fn test_bad_version() {
        let config = Config::default();
        assert!(config.compile_options(Some("two"), &[]).is_err());
    }

    #[test]
    fn test_find_config_walks_up() {
        let root = std::env::temp_dir().join(format!("lepusc-config-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("lepus.toml"), "[compile]\n").unwrap();

        assert_eq!(find_config_file(&nested), Some(root.join("lepus.toml")));
        let config = load_config(Some(&root.join("lepus.toml"))).unwrap();
        assert!(config.compile.globals.is_empty());

        std::fs::remove_dir_all(&root).unwrap();
    }
}
