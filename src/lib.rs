//! Rotates an AWS IAM user's access key pair and publishes the new pair,
//! sealed-box encrypted, to GitHub Actions secrets while retiring the old
//! pair. One user is rotated per invocation; IAM caps a user at two
//! concurrent access keys, which is the invariant the engine works around.

pub mod config;
pub mod credentials;
pub mod error;
pub mod github;
pub mod rotate;
pub mod rt;
pub mod seal;

pub use config::{RotationConfig, StoreTarget};
pub use credentials::{AccessKeyPair, AccessKeySource, IamAccessKeySource};
pub use error::{Error, Result};
pub use github::{SecretStore, StoreKey, select_store};
pub use rotate::{ActionsReporter, Reporter, RotationOutcome, TracingReporter, rotate};
