// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

use log::debug;

use crate::{
    distro::{OsFamily, Platform},
    remote::{Remote, RemoteError},
};

/// The service manager a host runs. Decides which commands start the monitor daemon and names the
/// init marker in the monitor's data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    Sysvinit,
    Upstart,
}

impl InitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitSystem::Systemd => "systemd",
            InitSystem::Sysvinit => "sysvinit",
            InitSystem::Upstart => "upstart",
        }
    }
}

impl fmt::Display for InitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify the init system of a host.
///
/// The checks run in a fixed order and the first match wins:
///
/// 1. PID 1 is systemd.
/// 2. Ubuntu releases before 15 use upstart.
/// 3. Releases older than the family's first systemd release use sysvinit.
/// 4. Without the `ceph.target` unit installed, fall back to sysvinit.
/// 5. Otherwise systemd.
///
/// The running init check comes first because some hosts (XenServer and similar appliances) report an
/// old major release while actually running systemd. The unit-file check last catches hosts that
/// ship systemd tooling without booting through it.
pub async fn detect_init(
    remote: &dyn Remote,
    family: OsFamily,
    platform: &Platform,
) -> Result<InitSystem, RemoteError> {
    if remote.is_systemd().await? {
        debug!("[{}] PID 1 is systemd", remote.hostname());
        return Ok(InitSystem::Systemd);
    }

    if family == OsFamily::Debian && platform.name == "ubuntu" && platform.release.major < 15 {
        return Ok(InitSystem::Upstart);
    }

    if platform.release.major < family.first_systemd_release() {
        return Ok(InitSystem::Sysvinit);
    }

    if !remote.path_exists(family.ceph_target_path()).await? {
        debug!(
            "[{}] {} is absent, assuming sysvinit",
            remote.hostname(),
            family.ceph_target_path()
        );
        return Ok(InitSystem::Sysvinit);
    }

    Ok(InitSystem::Systemd)
}
