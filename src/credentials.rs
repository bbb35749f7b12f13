use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_iam::error::{DisplayErrorContext, SdkError};
use aws_sdk_sts::Client as StsClient;

use crate::error::{Error, Result};
use crate::rt;

const DEFAULT_REGION: &str = "us-east-1";

/// Freshly issued key material. The secret value lives only in process
/// memory between creation and sealing.
pub struct AccessKeyPair {
    pub id: String,
    pub secret: String,
}

/// Source of access keys for one IAM user.
///
/// `list` returns identifiers ordered oldest first; the rotation engine
/// relies on index 0 being the key to retire.
pub trait AccessKeySource {
    fn list(&self) -> Result<Vec<String>>;
    fn create(&self) -> Result<AccessKeyPair>;
    fn delete(&self, id: &str) -> Result<()>;
}

/// [`AccessKeySource`] backed by AWS IAM.
#[derive(Clone)]
pub struct IamAccessKeySource {
    client: IamClient,
    user_name: String,
}

impl IamAccessKeySource {
    pub fn new(client: IamClient, user_name: impl Into<String>) -> Self {
        Self {
            client,
            user_name: user_name.into(),
        }
    }

    /// Builds a source from ambient AWS configuration, bound to one user.
    pub fn from_env(user_name: impl Into<String>) -> Self {
        let shared = rt::sync_await(shared_config());
        Self::new(IamClient::new(&shared), user_name)
    }
}

impl AccessKeySource for IamAccessKeySource {
    fn list(&self) -> Result<Vec<String>> {
        let client = self.client.clone();
        let user = self.user_name.clone();
        rt::sync_await(async move {
            let output = client
                .list_access_keys()
                .user_name(&user)
                .send()
                .await
                .map_err(|err| provider_error("list_access_keys", &user, err))?;
            let mut metadata = output.access_key_metadata().to_vec();
            // IAM does not document an ordering; sort so index 0 is oldest.
            metadata.sort_by_key(|meta| meta.create_date().cloned());
            Ok(metadata
                .iter()
                .filter_map(|meta| meta.access_key_id().map(str::to_string))
                .collect())
        })
    }

    fn create(&self) -> Result<AccessKeyPair> {
        let client = self.client.clone();
        let user = self.user_name.clone();
        rt::sync_await(async move {
            let output = client
                .create_access_key()
                .user_name(&user)
                .send()
                .await
                .map_err(|err| provider_error("create_access_key", &user, err))?;
            let key = output.access_key().ok_or_else(|| {
                Error::Credentials(format!(
                    "create_access_key for IAM user {user} returned no key material"
                ))
            })?;
            Ok(AccessKeyPair {
                id: key.access_key_id().to_string(),
                secret: key.secret_access_key().to_string(),
            })
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        let client = self.client.clone();
        let user = self.user_name.clone();
        let id = id.to_string();
        rt::sync_await(async move {
            client
                .delete_access_key()
                .user_name(&user)
                .access_key_id(&id)
                .send()
                .await
                .map_err(|err| provider_error("delete_access_key", &user, err))?;
            Ok(())
        })
    }
}

/// Resolves the IAM user name from the caller identity when none was
/// configured, for runs that authenticate as the user being rotated.
pub fn caller_identity_user() -> Result<String> {
    rt::sync_await(async {
        let shared = shared_config().await;
        let client = StsClient::new(&shared);
        let output = client.get_caller_identity().send().await.map_err(|err| {
            Error::Credentials(format!(
                "get_caller_identity failed: {}",
                DisplayErrorContext(&err)
            ))
        })?;
        let arn = output.arn().ok_or_else(|| {
            Error::Config("caller identity has no arn; set the IAM user explicitly".into())
        })?;
        user_from_arn(arn).map(str::to_string).ok_or_else(|| {
            Error::Config(format!(
                "cannot derive an IAM user name from caller arn {arn}; set the IAM user explicitly"
            ))
        })
    })
}

async fn shared_config() -> aws_config::SdkConfig {
    let region = RegionProviderChain::default_provider().or_else(DEFAULT_REGION);
    aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .load()
        .await
}

fn provider_error<E, R>(operation: &str, user: &str, err: SdkError<E, R>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    Error::Credentials(format!(
        "{operation} for IAM user {user} failed: {}",
        DisplayErrorContext(&err)
    ))
}

fn user_from_arn(arn: &str) -> Option<&str> {
    arn.split('/').nth(1).filter(|segment| !segment.is_empty())
}
