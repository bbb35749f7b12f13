use tracing::{error, info};

use crate::config::RotationConfig;
use crate::credentials::AccessKeySource;
use crate::error::{Error, Result};
use crate::github::SecretStore;
use crate::seal;

/// Provider-imposed ceiling on concurrent access keys per IAM user.
const MAX_ACCESS_KEYS: usize = 2;

/// Terminal result of one rotation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    Completed,
    Failed,
}

/// Progress and failure reporting, injected so the engine stays testable
/// without a real logging sink.
pub trait Reporter {
    fn info(&self, message: &str);
    fn set_failed(&self, message: &str);
}

/// Routes reports through `tracing`.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn set_failed(&self, message: &str) {
        error!("{message}");
    }
}

/// Emits GitHub Actions workflow commands so failures annotate the run.
pub struct ActionsReporter;

impl Reporter for ActionsReporter {
    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn set_failed(&self, message: &str) {
        println!("::error::{message}");
    }
}

/// Rotates the configured IAM user's access keys and publishes the new pair
/// to the secret store.
///
/// All failures are funneled through the reporter's failure channel; the
/// only observable outcomes are the side effects (a created key, two
/// upserted records, a deleted key) and the returned outcome.
pub fn rotate(
    config: &RotationConfig,
    store: &dyn SecretStore,
    source: &dyn AccessKeySource,
    reporter: &dyn Reporter,
) -> RotationOutcome {
    match run(config, store, source, reporter) {
        Ok(()) => {
            reporter.info(&format!(
                "access keys for IAM user {} rotated",
                config.iam_user
            ));
            RotationOutcome::Completed
        }
        Err(err @ (Error::OverCapacity { .. } | Error::RetryExhausted { .. })) => {
            reporter.set_failed(&err.to_string());
            RotationOutcome::Failed
        }
        Err(err) => {
            reporter.set_failed(&format!(
                "rotating access keys for IAM user {} failed: {err}",
                config.iam_user
            ));
            RotationOutcome::Failed
        }
    }
}

fn run(
    config: &RotationConfig,
    store: &dyn SecretStore,
    source: &dyn AccessKeySource,
    reporter: &dyn Reporter,
) -> Result<()> {
    let user = &config.iam_user;
    let mut freed_capacity = false;
    loop {
        reporter.info("checking current access keys");
        let existing = source.list()?;

        if existing.len() >= MAX_ACCESS_KEYS {
            // A prior run died between creating and deleting, or keys were
            // created externally. Free capacity, then re-read the state
            // rather than continuing on the stale list. One recovery pass
            // only; still being at the cap afterwards means something else
            // keeps filling the slots.
            if freed_capacity {
                return Err(Error::RetryExhausted { user: user.clone() });
            }
            let oldest = existing[0].clone();
            reporter.info(&format!(
                "IAM user {user} already has {MAX_ACCESS_KEYS} access keys; deleting oldest key {oldest} before rotating"
            ));
            source.delete(&oldest).map_err(|err| Error::OverCapacity {
                user: user.clone(),
                source: Box::new(err),
            })?;
            freed_capacity = true;
            continue;
        }

        return replace_key(config, store, source, reporter, existing.first().cloned());
    }
}

fn replace_key(
    config: &RotationConfig,
    store: &dyn SecretStore,
    source: &dyn AccessKeySource,
    reporter: &dyn Reporter,
    previous: Option<String>,
) -> Result<()> {
    reporter.info("provisioning new access key");
    let pair = source.create()?;

    reporter.info("fetching store public key");
    let store_key = store.public_key()?;

    // Both records are sealed under the same freshly fetched key and
    // published before the old key is touched.
    let sealed_id = seal::seal(pair.id.as_bytes(), &store_key.key)?;
    let sealed_secret = seal::seal(pair.secret.as_bytes(), &store_key.key)?;

    reporter.info(&format!("upserting secret {}", config.access_key_id_name));
    store.upsert(&config.access_key_id_name, &sealed_id, &store_key.key_id)?;

    reporter.info(&format!(
        "upserting secret {}",
        config.secret_access_key_name
    ));
    store.upsert(
        &config.secret_access_key_name,
        &sealed_secret,
        &store_key.key_id,
    )?;

    if let Some(previous) = previous {
        reporter.info(&format!("deleting previous access key {previous}"));
        source.delete(&previous)?;
    }
    Ok(())
}
