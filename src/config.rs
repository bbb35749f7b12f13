use clap::Parser;

use crate::error::{Error, Result};

/// Command-line and environment inputs. Every flag can also come from the
/// environment so a scheduled workflow can configure the run with `env:`.
#[derive(Debug, Parser)]
#[command(
    name = "keyturn",
    version,
    about = "Rotate an IAM user's access keys into GitHub Actions secrets"
)]
pub struct Args {
    /// IAM user whose access keys are rotated; derived from the caller
    /// identity when omitted
    #[arg(long, env = "KEYTURN_IAM_USER")]
    pub iam_user: Option<String>,

    /// Secret name that receives the new access key id
    #[arg(
        long,
        env = "KEYTURN_ACCESS_KEY_ID_NAME",
        default_value = "AWS_ACCESS_KEY_ID"
    )]
    pub access_key_id_name: String,

    /// Secret name that receives the new secret access key
    #[arg(
        long,
        env = "KEYTURN_SECRET_ACCESS_KEY_NAME",
        default_value = "AWS_SECRET_ACCESS_KEY"
    )]
    pub secret_access_key_name: String,

    /// GitHub token with secrets write access on the target scope
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Target repository in owner/repo form
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// Deployment environment receiving the secrets instead of the repository
    #[arg(long, env = "KEYTURN_ENVIRONMENT")]
    pub environment: Option<String>,

    /// Organization receiving the secrets; wins over the repository scopes
    #[arg(long, env = "KEYTURN_ORGANIZATION")]
    pub organization: Option<String>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub api_url: String,
}

/// Validated, immutable input bundle for one rotation run.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub iam_user: String,
    pub access_key_id_name: String,
    pub secret_access_key_name: String,
    pub github_token: String,
    pub api_url: String,
    pub store: StoreTarget,
}

/// Which GitHub secret store receives the rotated pair. Exactly one variant
/// is selected per run: organization over environment over repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Organization {
        organization: String,
    },
    Environment {
        owner: String,
        repo: String,
        environment: String,
    },
    Repository {
        owner: String,
        repo: String,
    },
}

impl RotationConfig {
    /// Validates the raw inputs. `iam_user` is resolved by the caller since
    /// deriving it may need an STS lookup.
    pub fn resolve(args: Args, iam_user: String) -> Result<Self> {
        if args.access_key_id_name == args.secret_access_key_name {
            return Err(Error::Config(format!(
                "the two secret names must differ, both are {:?}",
                args.access_key_id_name
            )));
        }
        let store = StoreTarget::resolve(args.organization, args.repository, args.environment)?;
        Ok(Self {
            iam_user,
            access_key_id_name: args.access_key_id_name,
            secret_access_key_name: args.secret_access_key_name,
            github_token: args.github_token,
            api_url: args.api_url,
            store,
        })
    }
}

impl StoreTarget {
    fn resolve(
        organization: Option<String>,
        repository: Option<String>,
        environment: Option<String>,
    ) -> Result<Self> {
        if let Some(organization) = organization.filter(|value| !value.is_empty()) {
            return Ok(Self::Organization { organization });
        }
        let (owner, repo) = split_repository(repository)?;
        if let Some(environment) = environment.filter(|value| !value.is_empty()) {
            return Ok(Self::Environment {
                owner,
                repo,
                environment,
            });
        }
        Ok(Self::Repository { owner, repo })
    }
}

fn split_repository(repository: Option<String>) -> Result<(String, String)> {
    let repository = repository.filter(|value| !value.is_empty()).ok_or_else(|| {
        Error::Config("a repository in owner/repo form is required unless an organization is set".into())
    })?;
    match repository.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(Error::Config(format!(
            "repository {repository:?} is not in owner/repo form"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_wins_over_other_scopes() {
        let target = StoreTarget::resolve(
            Some("acme".into()),
            Some("acme/infra".into()),
            Some("production".into()),
        )
        .expect("resolve");
        assert_eq!(
            target,
            StoreTarget::Organization {
                organization: "acme".into()
            }
        );
    }

    #[test]
    fn environment_wins_over_repository() {
        let target =
            StoreTarget::resolve(None, Some("acme/infra".into()), Some("production".into()))
                .expect("resolve");
        assert_eq!(
            target,
            StoreTarget::Environment {
                owner: "acme".into(),
                repo: "infra".into(),
                environment: "production".into()
            }
        );
    }

    #[test]
    fn repository_is_the_default_scope() {
        let target = StoreTarget::resolve(None, Some("acme/infra".into()), None).expect("resolve");
        assert_eq!(
            target,
            StoreTarget::Repository {
                owner: "acme".into(),
                repo: "infra".into()
            }
        );
    }

    #[test]
    fn empty_organization_falls_through() {
        let target = StoreTarget::resolve(Some(String::new()), Some("acme/infra".into()), None)
            .expect("resolve");
        assert!(matches!(target, StoreTarget::Repository { .. }));
    }

    #[test]
    fn repository_is_required_without_organization() {
        let err = StoreTarget::resolve(None, None, None).unwrap_err();
        assert!(err.to_string().contains("owner/repo"));
    }

    #[test]
    fn malformed_repository_is_rejected() {
        for bad in ["infra", "/infra", "acme/", ""] {
            assert!(StoreTarget::resolve(None, Some(bad.into()), None).is_err(), "{bad:?}");
        }
    }
}
