pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod item;
pub mod notify;
pub mod render;
pub mod store;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args);
  let args = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    args.verbose,
    args.quiet
  )?;

  info!(
    verbose = args.verbose,
    quiet = args.quiet,
    "starting ledgerdash"
  );
  debug!(overrides = ?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    args.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      args
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      args.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    datastore::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let env = commands::CommandEnv {
    storage: Arc::new(storage),
    cfg,
    renderer,
    clock: Arc::new(
      datetime::SystemClock
    )
  };

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  runtime.block_on(commands::dispatch(
    &env,
    args.command
  ))?;

  info!("done");
  Ok(())
}
