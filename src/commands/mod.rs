// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

pub mod install;
pub mod mon;

use {
    install::{InstallArgs, UninstallArgs},
    mon::MonArgs,
};

use {
    clap::{Parser, Subcommand},
    log::{error, info},
};

use crate::{config::Config, logging, remote::ssh::SshRemote};

/// A `HandledError` represents an error that has already been handled. When you call a function
/// that returns a `HandledError` or `HandledResult`, you don't need to do anything with that error,
/// other than just be aware that it happened, and return it on to your caller.
///
/// `main()` has a special responsibility: since its "caller" is, in a certain sense, the operating
/// system, `main()` must return a nonzero exit status when it gets a `HandledError`.
///
/// The primary way to construct a `HandledError` is with the `handle_err()` function, which turns a
/// generic error into a `HandledError` and runs caller-provided code to report it, normally by
/// logging it.
#[derive(Debug, PartialEq)]
pub struct HandledError {}

pub type HandledResult<T> = std::result::Result<T, HandledError>;

pub fn handled_error() -> HandledResult<()> {
    HandledResult::Err(HandledError {})
}

pub trait Handle<T, F> {
    fn handle_err(self, handler: F) -> HandledResult<T>;
}

impl<T, E, F: FnOnce(E)> Handle<T, F> for std::result::Result<T, E> {
    /// Handle an error by running the provided `handler` code, giving it the error.
    ///
    /// Then, return a `HandledResult`, so that transitive callers of this function know that they
    /// do not need to do anything further to handle the error.
    fn handle_err(self, handler: F) -> HandledResult<T> {
        self.map_err(|e| {
            handler(e);
            HandledError {}
        })
    }
}

/// Cluster names end up in file names and unit instance names, so they are restricted to a
/// letter followed by letters and digits.
fn alphanumeric(s: &str) -> Result<String, String> {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err("argument must start with a letter".to_string()),
    }
    if chars.all(|c| c.is_ascii_alphanumeric()) {
        Ok(s.to_string())
    } else {
        Err("argument must be alphanumeric".to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "ceph-deploy", version, about, long_about = None)]
pub struct Cli {
    /// The username to connect to the remote host as.
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Overwrite an existing, different, cluster config on remote hosts.
    #[arg(long, global = true)]
    pub overwrite_conf: bool,

    /// Name of the cluster.
    #[arg(long, global = true, value_parser = alphanumeric)]
    pub cluster: Option<String>,

    /// Use (or reuse) a given ceph.conf file instead of <cluster>.conf.
    #[arg(long, global = true)]
    pub ceph_conf: Option<String>,

    /// Path of the deploy configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy monitors.
    Mon(MonArgs),
    /// Install ceph packages on remote hosts.
    Install(InstallArgs),
    /// Remove ceph packages from remote hosts.
    Uninstall(UninstallArgs),
}

/// The effective settings of one invocation: command line flags layered over the configuration
/// file, layered over built-in defaults.
#[derive(Debug)]
pub struct DeployContext {
    pub cluster: String,
    pub username: Option<String>,
    pub overwrite_conf: bool,
    pub ceph_conf: Option<String>,
    pub config: Config,
}

impl DeployContext {
    pub fn resolve(cli: &Cli, config: Config) -> Self {
        let defaults = config.defaults.clone();
        DeployContext {
            cluster: cli
                .cluster
                .clone()
                .or(defaults.cluster)
                .unwrap_or_else(crate::default_cluster),
            username: cli.username.clone().or(defaults.username),
            overwrite_conf: cli.overwrite_conf || defaults.overwrite_conf.unwrap_or(false),
            ceph_conf: cli.ceph_conf.clone().or(defaults.ceph_conf),
            config,
        }
    }

    /// Open a connection to `host` with the configured user and ssh settings.
    pub fn connect(&self, host: &str) -> SshRemote {
        SshRemote::new(host, self.username.as_deref(), &self.config.ssh)
    }

    fn log_flags(&self, cli: &Cli) {
        info!("ceph-deploy options:");
        let flags: [(&str, String); 7] = [
            ("username", format!("{:?}", self.username)),
            ("overwrite_conf", self.overwrite_conf.to_string()),
            ("cluster", self.cluster.clone()),
            ("ceph_conf", format!("{:?}", self.ceph_conf)),
            ("config", format!("{:?}", cli.config)),
            ("verbose", cli.verbose.to_string()),
            ("quiet", cli.quiet.to_string()),
        ];
        for (key, value) in flags {
            info!(" {key:<30}: {value}");
        }
        info!(" {:<30}: {:?}", "command", cli.command);
    }
}

pub fn main(cli: &Cli) -> HandledResult<()> {
    // Logging is not up yet, so this one error goes straight to stderr.
    let config = Config::load(cli.config.as_deref())
        .handle_err(|e| eprintln!("Error loading configuration: {e}"))?;
    let context = DeployContext::resolve(cli, config);

    logging::init(logging::console_level(cli.verbose, cli.quiet), &context.cluster)
        .handle_err(|e| eprintln!("Error opening log file: {e}"))?;

    info!(
        "Invoked ({}): {}",
        env!("CARGO_PKG_VERSION"),
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    context.log_flags(cli);

    let rt = tokio::runtime::Runtime::new()
        .handle_err(|e| error!("Error launching tokio runtime: {e}"))?;

    rt.block_on(async {
        match &cli.command {
            Commands::Mon(args) => mon::mon(&context, args).await,
            Commands::Install(args) => install::install(&context, args).await,
            Commands::Uninstall(args) => install::uninstall(&context, args).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_names() {
        assert!(alphanumeric("ceph").is_ok());
        assert!(alphanumeric("test2").is_ok());
        assert!(alphanumeric("2test").is_err());
        assert!(alphanumeric("my-cluster").is_err());
        assert!(alphanumeric("").is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from(["ceph-deploy", "--cluster", "test", "mon", "add", "node1"]);
        let config = Config::from_str(
            "[defaults]\ncluster = \"other\"\nusername = \"deploy\"\noverwrite_conf = true\n",
        )
        .unwrap();
        let context = DeployContext::resolve(&cli, config);

        assert_eq!(context.cluster, "test");
        assert_eq!(context.username.as_deref(), Some("deploy"));
        assert!(context.overwrite_conf);
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["ceph-deploy", "-v", "-q", "uninstall", "node1"]).is_err());
        assert!(Cli::try_parse_from(["ceph-deploy", "--cluster", "a-b", "uninstall", "x"]).is_err());
    }
}
