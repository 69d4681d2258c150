// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

use clap::Parser;

use cephdeploy_lib::commands::{self, Cli};

/// The ceph-deploy binary provisions cluster daemons on remote hosts. Logging is set up by
/// `commands::main` once the cluster name, which names the log file, is known.
fn main() {
    let args = Cli::parse();

    if commands::main(&args).is_err() {
        std::process::exit(1);
    }
}
