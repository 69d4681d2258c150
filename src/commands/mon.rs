// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use {
    clap::{Args, Subcommand},
    futures::future,
    log::{debug, error, info},
};

use crate::{
    commands::{handled_error, DeployContext, Handle, HandledResult},
    config,
    distro::Distro,
    mon::{self as provision, MonArgs as ProvisionArgs},
};

#[derive(Args, Debug, Clone)]
pub struct MonArgs {
    #[command(subcommand)]
    action: MonAction,
}

#[derive(Subcommand, Debug, Clone)]
enum MonAction {
    /// Deploy the initial monitors of a new cluster.
    Create {
        /// Hosts to deploy on. Defaults to mon_initial_members from the cluster config.
        hosts: Vec<String>,
    },
    /// Add a monitor to a running cluster.
    Add { host: String },
}

pub async fn mon(context: &DeployContext, args: &MonArgs) -> HandledResult<()> {
    let conf_data = config::load_ceph_conf(&context.cluster, context.ceph_conf.as_deref())
        .handle_err(|e| error!("{e}"))?;
    let monitor_keyring =
        config::load_monitor_keyring(&context.cluster).handle_err(|e| error!("{e}"))?;

    let provision_args = ProvisionArgs {
        cluster: context.cluster.clone(),
        overwrite_conf: context.overwrite_conf,
        conf_data,
    };

    match &args.action {
        MonAction::Create { hosts } => {
            let hosts = if hosts.is_empty() {
                config::mon_initial_members(&provision_args.conf_data)
            } else {
                hosts.clone()
            };
            if hosts.is_empty() {
                error!("no hosts given and no mon_initial_members in the cluster config");
                return handled_error();
            }
            debug!("Deploying mon, cluster {} hosts {}", context.cluster, hosts.join(" "));

            let results = future::join_all(hosts.iter().map(|host| {
                deploy_one(context, &provision_args, &monitor_keyring, host, false)
            }))
            .await;

            let failed = results.iter().filter(|r| r.is_err()).count();
            if failed > 0 {
                error!("Failed to create {failed} monitors");
                return handled_error();
            }
            Ok(())
        }
        MonAction::Add { host } => {
            debug!("Adding mon to cluster {}, host {host}", context.cluster);
            deploy_one(context, &provision_args, &monitor_keyring, host, true).await
        }
    }
}

async fn deploy_one(
    context: &DeployContext,
    args: &ProvisionArgs,
    monitor_keyring: &str,
    host: &str,
    add: bool,
) -> HandledResult<()> {
    info!("[{host}] deploying mon to {host}");
    let remote = context.connect(host);

    let distro = Distro::detect(&remote)
        .await
        .handle_err(|e| error!("[{host}] {e}"))?;
    info!("[{host}] distro info: {distro}");

    let result = if add {
        provision::mon_add(&remote, &distro, args, monitor_keyring).await
    } else {
        provision::mon_create(&remote, &distro, args, monitor_keyring).await
    };
    result.handle_err(|e| error!("{e}"))?;

    // The version is informational; failing to read it does not fail the deploy.
    if let Err(e) = provision::ceph_version(&remote).await {
        debug!("[{host}] could not read ceph version: {e}");
    }
    Ok(())
}
