use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use keyturn::config::{Args, RotationConfig};
use keyturn::credentials::{IamAccessKeySource, caller_identity_user};
use keyturn::github::select_store;
use keyturn::rotate::{ActionsReporter, Reporter, RotationOutcome, TracingReporter, rotate};

fn main() {
    init_tracing();

    let reporter: Box<dyn Reporter> = if std::env::var_os("GITHUB_ACTIONS").is_some() {
        Box::new(ActionsReporter)
    } else {
        Box::new(TracingReporter)
    };

    match try_run(reporter.as_ref()) {
        Ok(RotationOutcome::Completed) => {}
        Ok(RotationOutcome::Failed) => process::exit(1),
        Err(err) => {
            reporter.set_failed(&format!("{err:#}"));
            process::exit(1);
        }
    }
}

fn try_run(reporter: &dyn Reporter) -> anyhow::Result<RotationOutcome> {
    let args = Args::parse();

    let iam_user = match args.iam_user.clone() {
        Some(user) => user,
        None => caller_identity_user()
            .context("failed to derive the IAM user from the caller identity")?,
    };

    let config = RotationConfig::resolve(args, iam_user)?;
    let store = select_store(&config)?;
    let source = IamAccessKeySource::from_env(config.iam_user.as_str());

    Ok(rotate(&config, store.as_ref(), &source, reporter))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
