// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::io;

use serde::{Deserialize, Serialize};

/// Config is the model of the deploy configuration file. It only holds defaults: every value in
/// it can be replaced by a command line flag, and the file itself is optional.
///
/// ```toml
/// [defaults]
/// username = "deploy"
/// cluster = "ceph"
/// overwrite_conf = false
///
/// [ssh]
/// options = ["-o", "StrictHostKeyChecking=accept-new"]
///
/// [install]
/// notsplit_packages = ["ceph-mon", "ceph-osd"]
/// ```
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct Defaults {
    pub username: Option<String>,
    pub cluster: Option<String>,
    pub overwrite_conf: Option<bool>,
    pub ceph_conf: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SshConfig {
    #[serde(default = "default_ssh_program")]
    pub program: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            program: default_ssh_program(),
            options: Vec::new(),
        }
    }
}

fn default_ssh_program() -> String {
    crate::default_ssh_program()
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct InstallConfig {
    /// Replaces the per-distro list of components still shipped in the umbrella package.
    pub notsplit_packages: Option<Vec<String>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read \"{path}\": {err}")]
    Io { path: String, err: io::Error },

    #[error("could not parse \"{path}\": {err}")]
    Parse {
        path: String,
        err: Box<toml::de::Error>,
    },

    #[error("cannot load config file \"{path}\": {err}; has the cluster config been generated?")]
    MissingCephConf { path: String, err: io::Error },

    #[error("cannot read monitor keyring \"{path}\": {err}; has the keyring been generated?")]
    MissingKeyring { path: String, err: io::Error },
}

impl Config {
    /// Load the configuration file at `path`, or at the default location if no path is given.
    ///
    /// A missing file at the default location is not an error; a missing file that was asked
    /// for explicitly is.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_string(), true),
            None => (crate::default_config_path(), false),
        };

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Config::default());
            }
            Err(err) => return Err(ConfigError::Io { path, err }),
        };

        Self::from_str(&contents).map_err(|err| ConfigError::Parse {
            path,
            err: Box::new(err),
        })
    }

    pub fn from_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// Read the raw cluster config file that will be distributed to hosts: `ceph_conf` if given,
/// otherwise `<cluster>.conf` in the working directory.
pub fn load_ceph_conf(cluster: &str, ceph_conf: Option<&str>) -> Result<String, ConfigError> {
    let path = match ceph_conf {
        Some(path) => path.to_string(),
        None => format!("{cluster}.conf"),
    };
    std::fs::read_to_string(&path).map_err(|err| ConfigError::MissingCephConf { path, err })
}

/// Read `<cluster>.mon.keyring` from the working directory.
pub fn load_monitor_keyring(cluster: &str) -> Result<String, ConfigError> {
    let path = format!("{cluster}.mon.keyring");
    std::fs::read_to_string(&path).map_err(|err| ConfigError::MissingKeyring { path, err })
}

/// Option names in the cluster config may use spaces, underscores or dashes interchangeably.
fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Look up `key` in `section` of an INI-style cluster config.
pub fn conf_value(raw: &str, section: &str, key: &str) -> Option<String> {
    let key = normalize_key(key);
    let mut in_section = false;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == section;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if normalize_key(k) == key {
                return Some(v.trim().to_string());
            }
        }
    }

    None
}

/// Hosts named by `mon_initial_members` in the `[global]` section.
pub fn mon_initial_members(raw: &str) -> Vec<String> {
    conf_value(raw, "global", "mon_initial_members")
        .map(|members| {
            members
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|m| !m.is_empty())
                .map(|m| m.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let config = Config::from_str("").unwrap();
        assert!(config.defaults.cluster.is_none());
        assert_eq!(config.ssh.program, "ssh");
        assert!(config.install.notsplit_packages.is_none());
    }

    #[test]
    fn parse_config() {
        let config = Config::from_str(
            r#"
            [defaults]
            username = "deploy"
            overwrite_conf = true

            [ssh]
            options = ["-p", "2222"]

            [install]
            notsplit_packages = ["ceph-mon"]
            "#,
        )
        .unwrap();
        assert_eq!(config.defaults.username.as_deref(), Some("deploy"));
        assert_eq!(config.defaults.overwrite_conf, Some(true));
        assert_eq!(config.ssh.options, vec!["-p", "2222"]);
        assert_eq!(
            config.install.notsplit_packages,
            Some(vec!["ceph-mon".to_string()])
        );
    }

    #[test]
    fn unknown_explicit_path_is_an_error() {
        assert!(matches!(
            Config::load(Some("/nonexistent/cephdeploy.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn initial_members() {
        let raw = "[global]\nfsid = 1234\nmon initial members = node1, node2 node3\n\n[mon]\nmon_initial_members = other\n";
        assert_eq!(mon_initial_members(raw), vec!["node1", "node2", "node3"]);
        assert_eq!(conf_value(raw, "mon", "mon-initial-members").as_deref(), Some("other"));
        assert_eq!(conf_value(raw, "global", "missing"), None);
    }
}
