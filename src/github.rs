use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::{RotationConfig, StoreTarget};
use crate::error::{Error, Result};
use crate::rt;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("keyturn/", env!("CARGO_PKG_VERSION"));

/// Public key material advertised by a secret store. Fetched fresh on every
/// rotation since the store may rotate it.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreKey {
    /// Base64-encoded X25519 public key.
    pub key: String,
    /// Identifier the store uses to match ciphertexts to the key.
    pub key_id: String,
}

/// Store of named, encrypted secret records.
pub trait SecretStore {
    fn public_key(&self) -> Result<StoreKey>;
    fn upsert(&self, name: &str, encrypted_value: &str, key_id: &str) -> Result<()>;
}

/// Selects the store variant the configuration asks for. All variants share
/// the same client; the rotation engine never sees which one is in use.
pub fn select_store(config: &RotationConfig) -> Result<Box<dyn SecretStore>> {
    let client = GithubClient::new(&config.api_url, &config.github_token)?;
    Ok(match &config.store {
        StoreTarget::Organization { organization } => {
            Box::new(OrganizationSecrets::new(client, organization))
        }
        StoreTarget::Environment {
            owner,
            repo,
            environment,
        } => Box::new(EnvironmentSecrets::new(client, owner, repo, environment)),
        StoreTarget::Repository { owner, repo } => {
            Box::new(RepositorySecrets::new(client, owner, repo))
        }
    })
}

/// Thin synchronous facade over the GitHub REST API.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    token: String,
    api_url: String,
}

impl GithubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(API_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|err| Error::Store(format!("failed to build GitHub client: {err}")))?;
        let api_url: String = api_url.into();
        Ok(Self {
            client,
            token: token.into(),
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    fn get_public_key(&self, path: &str) -> Result<StoreKey> {
        let client = self.client.clone();
        let url = format!("{}{path}", self.api_url);
        let token = self.token.clone();
        rt::sync_await(async move {
            let response = client
                .get(&url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|err| Error::Store(format!("GET {url} failed: {err}")))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Store(format!(
                    "fetching public key from {url} failed with status {status}"
                )));
            }
            response
                .json::<StoreKey>()
                .await
                .map_err(|err| Error::Store(format!("decoding public key response failed: {err}")))
        })
    }

    fn put_secret(&self, path: &str, body: Value) -> Result<()> {
        let client = self.client.clone();
        let url = format!("{}{path}", self.api_url);
        let token = self.token.clone();
        rt::sync_await(async move {
            let response = client
                .put(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await
                .map_err(|err| Error::Store(format!("PUT {url} failed: {err}")))?;
            let status = response.status();
            if status == StatusCode::CREATED || status == StatusCode::NO_CONTENT {
                return Ok(());
            }
            let detail = response.text().await.unwrap_or_default();
            Err(Error::Store(format!(
                "upsert to {url} failed with status {status}: {detail}"
            )))
        })
    }
}

fn upsert_body(encrypted_value: &str, key_id: &str) -> Value {
    json!({ "encrypted_value": encrypted_value, "key_id": key_id })
}

/// Repository-scoped Actions secrets, the default target.
pub struct RepositorySecrets {
    client: GithubClient,
    owner: String,
    repo: String,
}

impl RepositorySecrets {
    pub fn new(client: GithubClient, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    fn public_key_path(&self) -> String {
        format!("/repos/{}/{}/actions/secrets/public-key", self.owner, self.repo)
    }

    fn secret_path(&self, name: &str) -> String {
        format!("/repos/{}/{}/actions/secrets/{name}", self.owner, self.repo)
    }
}

impl SecretStore for RepositorySecrets {
    fn public_key(&self) -> Result<StoreKey> {
        self.client.get_public_key(&self.public_key_path())
    }

    fn upsert(&self, name: &str, encrypted_value: &str, key_id: &str) -> Result<()> {
        self.client
            .put_secret(&self.secret_path(name), upsert_body(encrypted_value, key_id))
    }
}

/// Secrets scoped to one deployment environment of a repository.
pub struct EnvironmentSecrets {
    client: GithubClient,
    owner: String,
    repo: String,
    environment: String,
}

impl EnvironmentSecrets {
    pub fn new(
        client: GithubClient,
        owner: impl Into<String>,
        repo: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            client,
            owner: owner.into(),
            repo: repo.into(),
            environment: environment.into(),
        }
    }

    fn public_key_path(&self) -> String {
        format!(
            "/repos/{}/{}/environments/{}/secrets/public-key",
            self.owner, self.repo, self.environment
        )
    }

    fn secret_path(&self, name: &str) -> String {
        format!(
            "/repos/{}/{}/environments/{}/secrets/{name}",
            self.owner, self.repo, self.environment
        )
    }
}

impl SecretStore for EnvironmentSecrets {
    fn public_key(&self) -> Result<StoreKey> {
        self.client.get_public_key(&self.public_key_path())
    }

    fn upsert(&self, name: &str, encrypted_value: &str, key_id: &str) -> Result<()> {
        self.client
            .put_secret(&self.secret_path(name), upsert_body(encrypted_value, key_id))
    }
}

/// Organization-wide Actions secrets.
pub struct OrganizationSecrets {
    client: GithubClient,
    organization: String,
}

impl OrganizationSecrets {
    pub fn new(client: GithubClient, organization: impl Into<String>) -> Self {
        Self {
            client,
            organization: organization.into(),
        }
    }

    fn public_key_path(&self) -> String {
        format!("/orgs/{}/actions/secrets/public-key", self.organization)
    }

    fn secret_path(&self, name: &str) -> String {
        format!("/orgs/{}/actions/secrets/{name}", self.organization)
    }
}

impl SecretStore for OrganizationSecrets {
    fn public_key(&self) -> Result<StoreKey> {
        self.client.get_public_key(&self.public_key_path())
    }

    fn upsert(&self, name: &str, encrypted_value: &str, key_id: &str) -> Result<()> {
        // Org-level upserts must carry a visibility; every repository may
        // read the rotated credentials.
        let mut body = upsert_body(encrypted_value, key_id);
        body["visibility"] = json!("all");
        self.client.put_secret(&self.secret_path(name), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GithubClient {
        GithubClient::new("https://api.github.com/", "test-token").expect("client")
    }

    #[test]
    fn trailing_slash_is_stripped_from_api_url() {
        assert_eq!(client().api_url, "https://api.github.com");
    }

    #[test]
    fn repository_paths() {
        let store = RepositorySecrets::new(client(), "acme", "infra");
        assert_eq!(
            store.public_key_path(),
            "/repos/acme/infra/actions/secrets/public-key"
        );
        assert_eq!(
            store.secret_path("AWS_ACCESS_KEY_ID"),
            "/repos/acme/infra/actions/secrets/AWS_ACCESS_KEY_ID"
        );
    }

    #[test]
    fn environment_paths() {
        let store = EnvironmentSecrets::new(client(), "acme", "infra", "production");
        assert_eq!(
            store.public_key_path(),
            "/repos/acme/infra/environments/production/secrets/public-key"
        );
        assert_eq!(
            store.secret_path("AWS_SECRET_ACCESS_KEY"),
            "/repos/acme/infra/environments/production/secrets/AWS_SECRET_ACCESS_KEY"
        );
    }

    #[test]
    fn organization_paths() {
        let store = OrganizationSecrets::new(client(), "acme");
        assert_eq!(
            store.public_key_path(),
            "/orgs/acme/actions/secrets/public-key"
        );
        assert_eq!(
            store.secret_path("AWS_ACCESS_KEY_ID"),
            "/orgs/acme/actions/secrets/AWS_ACCESS_KEY_ID"
        );
    }

    #[test]
    fn upsert_body_carries_key_id() {
        let body = upsert_body("c2VhbGVk", "key-1");
        assert_eq!(body["encrypted_value"], "c2VhbGVk");
        assert_eq!(body["key_id"], "key-1");
        assert!(body.get("visibility").is_none());
    }
}
