// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::collections::BTreeSet;

use log::info;

use crate::remote::{Remote, RemoteError};

/// The package that still carries every component that has not been split out of it.
pub const UMBRELLA_PACKAGE: &str = "ceph";

/// Every installable component, in the order they are listed to the user.
pub const COMPONENTS: [&str; 5] = [
    "ceph-mon",
    "ceph-osd",
    "ceph-mds",
    "ceph-radosgw",
    "ceph-common",
];

/// Resolve component names to the packages that provide them.
///
/// A component listed in `notsplit` has not been split from the umbrella package yet, so the
/// umbrella package is installed in its place. Every other component is its own package.
pub fn map_components<S: AsRef<str>>(notsplit: &[S], components: &[S]) -> BTreeSet<String> {
    components
        .iter()
        .map(|component| {
            let component = component.as_ref();
            if notsplit.iter().any(|p| p.as_ref() == component) {
                UMBRELLA_PACKAGE.to_string()
            } else {
                component.to_string()
            }
        })
        .collect()
}

/// Package managers, one per OS family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packager {
    Yum,
    Dnf,
    Apt,
    Zypper,
}

impl Packager {
    fn base_argv(&self) -> Vec<&'static str> {
        match self {
            Packager::Yum => vec!["yum", "-y", "-q"],
            Packager::Dnf => vec!["dnf", "-y", "-q"],
            Packager::Apt => vec![
                "env",
                "DEBIAN_FRONTEND=noninteractive",
                "DEBIAN_PRIORITY=critical",
                "apt-get",
                "--assume-yes",
                "-q",
            ],
            Packager::Zypper => vec!["zypper", "--non-interactive", "--quiet"],
        }
    }

    pub fn install_argv<'a>(&self, packages: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let mut argv: Vec<&'a str> = self.base_argv();
        if *self == Packager::Apt {
            argv.push("--no-install-recommends");
        }
        argv.push("install");
        argv.extend(packages);
        argv
    }

    pub fn remove_argv<'a>(&self, packages: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        let mut argv: Vec<&'a str> = self.base_argv();
        if *self == Packager::Apt {
            argv.push("-f");
        }
        argv.push("remove");
        argv.extend(packages);
        argv
    }

    pub async fn install(
        &self,
        remote: &dyn Remote,
        packages: &BTreeSet<String>,
    ) -> Result<(), RemoteError> {
        info!(
            "[{}] installing packages: {}",
            remote.hostname(),
            packages.iter().cloned().collect::<Vec<_>>().join(" ")
        );
        let argv = self.install_argv(packages.iter().map(|p| p.as_str()));
        remote.run_checked(&argv, None).await?;
        Ok(())
    }

    pub async fn remove(
        &self,
        remote: &dyn Remote,
        packages: &BTreeSet<String>,
    ) -> Result<(), RemoteError> {
        info!(
            "[{}] removing packages: {}",
            remote.hostname(),
            packages.iter().cloned().collect::<Vec<_>>().join(" ")
        );
        let argv = self.remove_argv(packages.iter().map(|p| p.as_str()));
        remote.run_checked(&argv, None).await?;
        Ok(())
    }
}
