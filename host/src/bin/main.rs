// Zkvot
// Copyright (c) 2024 Taiko Labs
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{Builder, Rotation},
};
use tracing_subscriber::FmtSubscriber;
use zkvot_host::{aggregate, interfaces::HostResult, Opts};

#[tokio::main]
async fn main() -> HostResult<()> {
    dotenv::dotenv().ok();
    let opts = parse_opts()?;
    let _guard = subscribe_log(&opts.log_path, &opts.log_level, opts.max_log)?;
    debug!("Args:\n{:#?}", opts);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight proofs");
            on_signal.cancel();
        }
    });

    let output = aggregate::run(&opts, cancel).await?;
    info!(
        "Election {} tally: {} votes {:?}",
        output.election_id, output.total_count, output.results
    );
    Ok(())
}

fn parse_opts() -> HostResult<Opts> {
    // Read the command line arguments;
    let mut opts = Opts::parse();
    // Read the config file.
    opts.merge_from_file()?;

    Ok(opts)
}

fn subscribe_log(
    log_path: &Option<PathBuf>,
    log_level: &String,
    max_log: usize,
) -> HostResult<Option<WorkerGuard>> {
    let subscriber_builder = FmtSubscriber::builder().with_env_filter(log_level);
    match log_path {
        Some(ref log_path) => {
            let file_appender = Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix("zkvot.log")
                .max_log_files(max_log)
                .build(log_path)
                .context("initializing rolling file appender failed")?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let subscriber = subscriber_builder.json().with_writer(non_blocking).finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("setting the global subscriber failed")?;
            Ok(Some(guard))
        }
        None => {
            let subscriber = subscriber_builder.finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("setting the global subscriber failed")?;
            Ok(None)
        }
    }
}
