// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Classification of a target host's operating system.
//!
//! A [`Distro`] is built once at the start of a host's flow and passed explicitly to everything
//! that needs to know what kind of host it is talking to.

use std::fmt;

use log::debug;

use crate::{
    init::{detect_init, InitSystem},
    packages::Packager,
    remote::{Remote, RemoteError},
};

const OS_RELEASE: &str = "/etc/os-release";
const REDHAT_RELEASE: &str = "/etc/redhat-release";

#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("[{host}] platform is not supported: {name} {release}")]
    Unsupported {
        host: String,
        name: String,
        release: String,
    },

    #[error("[{host}] could not determine platform: {reason}")]
    Unknown { host: String, reason: String },
}

/// The OS families this tool knows how to drive. Each family carries its own answers for init
/// system detection and package management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    /// RHEL, CentOS and rebuilds.
    RedHat,
    Fedora,
    /// Debian and Ubuntu.
    Debian,
    /// openSUSE and SLES.
    Suse,
}

impl OsFamily {
    /// Map an os-release `ID` to its family.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rhel" | "redhat" | "centos" | "rocky" | "almalinux" | "ol" | "oracle"
            | "scientific" | "virtuozzo" => Some(OsFamily::RedHat),
            "fedora" => Some(OsFamily::Fedora),
            "debian" | "ubuntu" => Some(OsFamily::Debian),
            "sles" | "sled" => Some(OsFamily::Suse),
            name if name.starts_with("opensuse") => Some(OsFamily::Suse),
            _ => None,
        }
    }

    /// The first major release of this family that boots with systemd.
    pub fn first_systemd_release(&self) -> u32 {
        match self {
            OsFamily::RedHat => 7,
            OsFamily::Fedora => 15,
            OsFamily::Debian => 8,
            OsFamily::Suse => 12,
        }
    }

    /// Where the packaged `ceph.target` unit lives once ceph is installed.
    pub fn ceph_target_path(&self) -> &'static str {
        match self {
            OsFamily::Debian => "/lib/systemd/system/ceph.target",
            _ => "/usr/lib/systemd/system/ceph.target",
        }
    }

    pub fn packager(&self) -> Packager {
        match self {
            OsFamily::RedHat => Packager::Yum,
            OsFamily::Fedora => Packager::Dnf,
            OsFamily::Debian => Packager::Apt,
            OsFamily::Suse => Packager::Zypper,
        }
    }

    /// Components that are still shipped inside the umbrella `ceph` package on this family.
    pub fn notsplit_packages(&self) -> Vec<String> {
        ["ceph-mon", "ceph-osd", "ceph-mds"]
            .iter()
            .map(|p| p.to_string())
            .collect()
    }
}

/// A major.minor release number. Missing or non-numeric parts read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Release {
    pub major: u32,
    pub minor: u32,
}

impl Release {
    pub fn parse(version: &str) -> Self {
        let mut parts = version
            .split('.')
            .map(|part| part.trim().parse::<u32>().unwrap_or(0));
        Release {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
        }
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What a host says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Lowercase distribution id, e.g. "centos" or "ubuntu".
    pub name: String,
    pub release: Release,
    pub codename: String,
}

/// Parse the contents of `/etc/os-release`.
pub fn parse_os_release(contents: &str) -> Option<Platform> {
    let mut name = None;
    let mut version = String::new();
    let mut codename = String::new();
    let mut ubuntu_codename = String::new();

    for line in contents.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key {
            "ID" => name = Some(value.to_lowercase()),
            "VERSION_ID" => version = value.to_string(),
            "VERSION_CODENAME" => codename = value.to_string(),
            "UBUNTU_CODENAME" => ubuntu_codename = value.to_string(),
            _ => {}
        }
    }

    if codename.is_empty() {
        codename = ubuntu_codename;
    }

    Some(Platform {
        name: name?,
        release: Release::parse(&version),
        codename,
    })
}

/// Parse `/etc/redhat-release`, found on hosts that predate os-release, e.g.
/// "CentOS release 6.10 (Final)".
pub fn parse_redhat_release(contents: &str) -> Option<Platform> {
    let line = contents.lines().next()?.trim();
    let (before, after) = line.split_once(" release ")?;
    let name = match before.to_lowercase() {
        n if n.starts_with("centos") => "centos".to_string(),
        n if n.starts_with("red hat") => "rhel".to_string(),
        n if n.starts_with("scientific") => "scientific".to_string(),
        n => n.split_whitespace().next()?.to_string(),
    };
    let mut rest = after.split_whitespace();
    let version = rest.next()?;
    let codename = rest
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c| c == '(' || c == ')')
        .to_string();

    Some(Platform {
        name,
        release: Release::parse(version),
        codename,
    })
}

/// Everything this tool needs to know about a host's operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distro {
    pub family: OsFamily,
    pub platform: Platform,
    pub init: InitSystem,
}

impl Distro {
    /// Query the host once and classify it.
    pub async fn detect(remote: &dyn Remote) -> Result<Self, DetectError> {
        let host = remote.hostname().to_string();
        let platform = Self::platform(remote).await?;
        debug!("[{host}] platform: {platform:?}");

        let Some(family) = OsFamily::from_name(&platform.name) else {
            return Err(DetectError::Unsupported {
                host,
                name: platform.name,
                release: platform.release.to_string(),
            });
        };

        let init = detect_init(remote, family, &platform).await?;

        Ok(Distro {
            family,
            platform,
            init,
        })
    }

    async fn platform(remote: &dyn Remote) -> Result<Platform, DetectError> {
        let host = remote.hostname().to_string();
        if remote.path_exists(OS_RELEASE).await? {
            let contents = remote.read_file(OS_RELEASE).await?;
            return parse_os_release(&contents).ok_or(DetectError::Unknown {
                host,
                reason: format!("{OS_RELEASE} has no ID field"),
            });
        }
        if remote.path_exists(REDHAT_RELEASE).await? {
            let contents = remote.read_file(REDHAT_RELEASE).await?;
            return parse_redhat_release(&contents).ok_or(DetectError::Unknown {
                host,
                reason: format!("could not parse {REDHAT_RELEASE}"),
            });
        }
        Err(DetectError::Unknown {
            host,
            reason: format!("neither {OS_RELEASE} nor {REDHAT_RELEASE} exists"),
        })
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.platform.name, self.platform.release, self.platform.codename, self.init
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_release_centos() {
        let platform = parse_os_release(
            "NAME=\"CentOS Linux\"\nVERSION=\"7 (Core)\"\nID=\"centos\"\nID_LIKE=\"rhel fedora\"\nVERSION_ID=\"7\"\n",
        )
        .unwrap();
        assert_eq!(platform.name, "centos");
        assert_eq!(platform.release, Release { major: 7, minor: 0 });
        assert_eq!(OsFamily::from_name(&platform.name), Some(OsFamily::RedHat));
    }

    #[test]
    fn os_release_ubuntu_codename() {
        let platform = parse_os_release(
            "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"14.04\"\nUBUNTU_CODENAME=trusty\n",
        )
        .unwrap();
        assert_eq!(platform.release, Release { major: 14, minor: 4 });
        assert_eq!(platform.codename, "trusty");
    }

    #[test]
    fn os_release_without_id() {
        assert_eq!(parse_os_release("NAME=Something\n"), None);
    }

    #[test]
    fn redhat_release() {
        let platform = parse_redhat_release("CentOS release 6.10 (Final)\n").unwrap();
        assert_eq!(platform.name, "centos");
        assert_eq!(platform.release, Release { major: 6, minor: 10 });
        assert_eq!(platform.codename, "Final");
    }

    #[test]
    fn families() {
        assert_eq!(OsFamily::from_name("opensuse-leap"), Some(OsFamily::Suse));
        assert_eq!(OsFamily::from_name("arch"), None);
        assert_eq!(OsFamily::Debian.packager(), Packager::Apt);
    }
}
