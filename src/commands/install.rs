// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use std::collections::BTreeSet;

use {
    clap::Args,
    futures::future,
    log::{error, info},
};

use crate::{
    commands::{handled_error, DeployContext, Handle, HandledResult},
    distro::Distro,
    mon::ceph_version,
    packages::{self, COMPONENTS},
};

#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Install the monitor component.
    #[arg(long)]
    mon: bool,

    /// Install the OSD component.
    #[arg(long)]
    osd: bool,

    /// Install the metadata server component.
    #[arg(long)]
    mds: bool,

    /// Install the rados gateway component.
    #[arg(long)]
    rgw: bool,

    /// Install the command line client only.
    #[arg(long)]
    cli: bool,

    #[arg(required = true)]
    hosts: Vec<String>,
}

impl InstallArgs {
    /// The components asked for on the command line; all of them if none was.
    fn components(&self) -> Vec<String> {
        let flags = [
            (self.mon, "ceph-mon"),
            (self.osd, "ceph-osd"),
            (self.mds, "ceph-mds"),
            (self.rgw, "ceph-radosgw"),
            (self.cli, "ceph-common"),
        ];
        let selected: Vec<String> = flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, component)| component.to_string())
            .collect();

        if selected.is_empty() {
            COMPONENTS.iter().map(|c| c.to_string()).collect()
        } else {
            selected
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct UninstallArgs {
    #[arg(required = true)]
    hosts: Vec<String>,
}

/// Which components are still shipped in the umbrella package on this distro.
fn notsplit_packages(context: &DeployContext, distro: &Distro) -> Vec<String> {
    match &context.config.install.notsplit_packages {
        Some(packages) => packages.clone(),
        None => distro.family.notsplit_packages(),
    }
}

fn report(results: &[HandledResult<()>], action: &str) -> HandledResult<()> {
    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        error!("Failed to {action} on {failed} hosts");
        return handled_error();
    }
    Ok(())
}

pub async fn install(context: &DeployContext, args: &InstallArgs) -> HandledResult<()> {
    let components = args.components();
    info!("Installing {} on {}", components.join(" "), args.hosts.join(" "));

    let results = future::join_all(
        args.hosts
            .iter()
            .map(|host| install_one(context, &components, host)),
    )
    .await;

    report(&results, "install")
}

async fn install_one(
    context: &DeployContext,
    components: &[String],
    host: &str,
) -> HandledResult<()> {
    let remote = context.connect(host);
    let distro = Distro::detect(&remote)
        .await
        .handle_err(|e| error!("[{host}] {e}"))?;
    info!("[{host}] distro info: {distro}");

    let packages = packages::map_components(&notsplit_packages(context, &distro), components);
    distro
        .family
        .packager()
        .install(&remote, &packages)
        .await
        .handle_err(|e| error!("{e}"))?;

    ceph_version(&remote)
        .await
        .handle_err(|e| error!("{e}"))?;
    Ok(())
}

pub async fn uninstall(context: &DeployContext, args: &UninstallArgs) -> HandledResult<()> {
    info!("Uninstalling on {}", args.hosts.join(" "));

    let results = future::join_all(args.hosts.iter().map(|host| uninstall_one(context, host))).await;

    report(&results, "uninstall")
}

async fn uninstall_one(context: &DeployContext, host: &str) -> HandledResult<()> {
    let remote = context.connect(host);
    let distro = Distro::detect(&remote)
        .await
        .handle_err(|e| error!("[{host}] {e}"))?;
    info!("[{host}] distro info: {distro}");

    let components: Vec<String> = COMPONENTS.iter().map(|c| c.to_string()).collect();
    let mut packages = packages::map_components(&notsplit_packages(context, &distro), &components);
    packages.insert(packages::UMBRELLA_PACKAGE.to_string());

    distro
        .family
        .packager()
        .remove(&remote, &packages)
        .await
        .handle_err(|e| error!("{e}"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::commands::{Cli, Commands};

    fn install_args(argv: &[&str]) -> super::InstallArgs {
        match Cli::parse_from(argv).command {
            Commands::Install(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn components_default_to_all() {
        let args = install_args(&["ceph-deploy", "install", "node1"]);
        assert_eq!(args.components().len(), super::COMPONENTS.len());
    }

    #[test]
    fn selected_components() {
        let args = install_args(&["ceph-deploy", "install", "--mon", "--cli", "node1", "node2"]);
        assert_eq!(args.components(), vec!["ceph-mon", "ceph-common"]);
        assert_eq!(args.hosts, vec!["node1", "node2"]);
    }
}
