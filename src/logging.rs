// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! The per-cluster log file keeps a full debug record of every run, whatever the console shows.
//! `-v` and `-q` only change what reaches stderr.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
};

use {
    env_logger::{fmt::Formatter, Env, Target, WriteStyle},
    log::{LevelFilter, Log, Metadata, Record},
};

/// Name of the log file kept in the working directory for `cluster`.
pub fn log_file_name(cluster: &str) -> String {
    format!("ceph-deploy-{cluster}.log")
}

/// Console verbosity from the `-v` and `-q` flags.
pub fn console_level(verbose: bool, quiet: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    }
}

fn format_line(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    writeln!(
        buf,
        "[{}][{}][{:<6}] {}",
        buf.timestamp(),
        record.target(),
        record.level(),
        record.args()
    )
}

/// Sends each record to stderr and to the log file, each behind its own filter.
pub struct DeployLogger {
    console: env_logger::Logger,
    file: env_logger::Logger,
}

impl DeployLogger {
    /// The file filter is debug unless `CEPH_DEPLOY_LOG` says otherwise.
    pub fn new(console: LevelFilter, file: File) -> Self {
        DeployLogger {
            console: env_logger::Builder::new()
                .filter_level(console)
                .target(Target::Stderr)
                .format(format_line)
                .build(),
            file: env_logger::Builder::from_env(
                Env::default().filter_or(crate::LOG_ENV, LevelFilter::Debug.to_string()),
            )
            .target(Target::Pipe(Box::new(file)))
            .write_style(WriteStyle::Never)
            .format(format_line)
            .build(),
        }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.console.filter().max(self.file.filter())
    }
}

impl Log for DeployLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.file.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.console.log(record);
        self.file.log(record);
    }

    fn flush(&self) {
        self.console.flush();
        self.file.flush();
    }
}

/// Install the global logger for `cluster`, showing `console` and above on stderr.
pub fn init(console: LevelFilter, cluster: &str) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_name(cluster))?;

    let logger = DeployLogger::new(console, file);
    log::set_max_level(logger.max_level());
    log::set_boxed_logger(Box::new(logger)).map_err(io::Error::other)
}
