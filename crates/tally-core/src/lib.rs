pub mod cli;
pub mod commands;
pub mod config;
pub mod confirm;
pub mod datetime;
pub mod ids;
pub mod notify;
pub mod persist;
pub mod projection;
pub mod render;
pub mod snapshot;
pub mod store;
pub mod todo;

use std::ffi::OsString;
use std::io;

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
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tally"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.tallyrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    persist::FileKvStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at \
         {}",
        data_dir.display()
      )
    })?;
  let notifier =
    notify::HookNotifier::new(
      &cfg, &data_dir
    );
  let store = store::TodoStore::new(
    storage, notifier
  )
  .with_policy(cfg.save_policy()?);

  let mut session =
    commands::Session::open(store);
  let renderer =
    render::Renderer::new(&cfg)?;
  let command =
    cli.command.unwrap_or_else(|| {
      cli::Command::List(
        cli::ListArgs::default()
      )
    });

  let notices = commands::dispatch(
    &mut session,
    &cfg,
    &renderer,
    &mut confirm::PromptConfirm::stdio(),
    io::stdout().lock(),
    command
  )?;

  for notice in notices {
    eprintln!("warning: {notice}");
  }

  info!("done");
  Ok(())
}
