// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application configuration: an optional `.linebreak/config` ini file
//! supplying defaults for the CLI flags, merged with CLI precedence.

use ini::Ini;
use std::path::Path;

/// Directory name the agent looks for its config file in, relative to the
/// working directory given on the command line.
pub const CONFIG_DIR: &str = ".linebreak";
/// File name within [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config";

/// Agent defaults, as given on the CLI or read from a config file. `None`
/// fields mean "unset"; [`AppConfig::merge`] lets the CLI's values win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub address: Option<String>,
    pub display_name: Option<String>,
}

impl AppConfig {
    /// Loads `{directory}/{CONFIG_DIR}/{CONFIG_FILE}` if it exists. Returns
    /// `None` when there is no file to read: an absent config file is not
    /// an error.
    #[must_use]
    pub fn from_config_file(directory: &Path) -> Option<Self> {
        let config_file = directory.join(CONFIG_DIR).join(CONFIG_FILE);
        if !config_file.exists() {
            return None;
        }
        let conf = Ini::load_from_file(&config_file).ok()?;
        let section = conf.general_section();
        Some(Self {
            address: section.get("address").map(str::to_string),
            display_name: section.get("display_name").map(str::to_string),
        })
    }

    /// Returns `self` (the CLI-derived config) with any field it left unset
    /// filled in from `file`. CLI values always win over the file's.
    #[must_use]
    pub fn merge(self, file: Option<Self>) -> Self {
        let Some(file) = file else { return self };
        Self {
            address: self.address.or(file.address),
            display_name: self.display_name.or(file.display_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn merge_prefers_cli_values_over_file() {
        let cli = AppConfig { address: Some("9000".to_string()), display_name: None };
        let file = AppConfig {
            address: Some("localhost:1234".to_string()),
            display_name: Some("from-file".to_string()),
        };
        let merged = cli.merge(Some(file));
        assert_eq!(merged.address.as_deref(), Some("9000"));
        assert_eq!(merged.display_name.as_deref(), Some("from-file"));
    }

    #[test]
    fn merge_with_no_file_is_a_no_op() {
        let cli = AppConfig { address: Some("9000".to_string()), display_name: None };
        let merged = cli.clone().merge(None);
        assert_eq!(merged, cli);
    }

    #[test]
    fn from_config_file_returns_none_when_absent() {
        let dir = std::env::temp_dir().join("linebreak-agent-config-test-absent");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        assert!(AppConfig::from_config_file(&dir).is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn from_config_file_reads_general_section() {
        let dir = std::env::temp_dir().join("linebreak-agent-config-test-present");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join(CONFIG_DIR)).unwrap();
        fs::write(
            dir.join(CONFIG_DIR).join(CONFIG_FILE),
            "address=4242\ndisplay_name=bob\n",
        )
        .unwrap();

        let config = AppConfig::from_config_file(&dir).unwrap();
        assert_eq!(config.address.as_deref(), Some("4242"));
        assert_eq!(config.display_name.as_deref(), Some("bob"));
        let _ = fs::remove_dir_all(&dir);
    }
}
