// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

pub mod aggregate;
pub mod interfaces;

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zkvot_core::{aggregator::DEFAULT_CONCURRENCY_LIMIT, DriveMode};
use zkvot_lib::election::ElectionParams;
use zkvot_proofdb::ProofCacheOpts;

use crate::interfaces::{HostError, HostResult};

fn default_max_log() -> usize {
    7
}

fn default_config_path() -> PathBuf {
    PathBuf::from("host/config/config.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Default, Clone, Serialize, Deserialize, Debug, Parser)]
#[command(
    name = "zkvot",
    about = "Aggregates zkvot vote proofs into a single election tally proof",
    long_about = None
)]
#[serde(default)]
pub struct Opts {
    #[arg(long, require_equals = true, default_value = "host/config/config.json")]
    #[serde(default = "default_config_path")]
    /// Path to a config file holding the election parameters and any of the
    /// options below. Command line values override its contents
    pub config_path: PathBuf,

    #[arg(long, require_equals = true)]
    /// JSON array of vote proofs to aggregate
    pub votes_path: Option<PathBuf>,

    #[arg(long, require_equals = true)]
    /// Where to write the root aggregate proof and run report
    pub output_path: Option<PathBuf>,

    #[arg(long, require_equals = true)]
    /// Persist aggregate proofs in this SQLite file. In-memory when unset
    pub sqlite_file: Option<PathBuf>,

    #[arg(long, require_equals = true)]
    /// Limit the number of nodes proven at once
    /// [default: 4]
    pub concurrency_limit: Option<usize>,

    #[arg(long, require_equals = true)]
    /// Node scheduling: `sequential` or `parallel`
    /// [default: parallel]
    pub mode: Option<DriveMode>,

    #[arg(long, require_equals = true)]
    pub log_path: Option<PathBuf>,

    #[arg(long, require_equals = true, default_value = "7")]
    #[serde(default = "default_max_log")]
    pub max_log: usize,

    #[arg(long, require_equals = true, env = "RUST_LOG", default_value = "info")]
    #[serde(default = "default_log_level")]
    /// Set the log level
    pub log_level: String,

    #[arg(skip)]
    /// Election to aggregate for. Config file only
    pub election: Option<ElectionParams>,
}

impl Opts {
    /// Read the options from a file and merge it with the current options.
    pub fn merge_from_file(&mut self) -> HostResult<()> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        let mut config: Value = serde_json::from_reader(reader)?;
        let this = serde_json::to_value(&self)?;
        merge(&mut config, &this);

        *self = serde_json::from_value(config)?;
        Ok(())
    }

    pub fn election_params(&self) -> HostResult<ElectionParams> {
        self.election.ok_or_else(|| {
            HostError::InvalidConfig(format!(
                "no election parameters in {}",
                self.config_path.display()
            ))
        })
    }

    pub fn proof_cache_opts(&self) -> ProofCacheOpts {
        ProofCacheOpts {
            sqlite_file: self.sqlite_file.clone(),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit.unwrap_or(DEFAULT_CONCURRENCY_LIMIT)
    }

    pub fn mode(&self) -> DriveMode {
        self.mode.unwrap_or_default()
    }
}

/// Merges two json's together, overwriting `a` with the values of `b`
fn merge(a: &mut Value, b: &Value) {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                merge(a.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (a, b) if !b.is_null() => *a = b.clone(),
        // If b is null, just keep a (which means do nothing).
        _ => {}
    }
}
