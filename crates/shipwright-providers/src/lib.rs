//! Clients for the external systems a release talks to.
//!
//! Each client sits behind a trait ([`ForgeClient`], [`ObjectStore`],
//! [`RegistryProvisioner`]) so release providers can be exercised against
//! in-memory fakes.

pub mod aws;
pub mod docker;
pub mod ecr;
pub mod error;
pub mod github;
pub mod s3;
pub mod secrets;

pub use aws::load_aws_config;
pub use docker::DockerCli;
pub use ecr::{EcrProvisioner, RegistryProvisioner, RepositoryTags};
pub use error::{AwsError, AwsResult, ForgeError, ForgeResult};
pub use github::{ForgeClient, ForgeRelease, GitHubClient, NewRelease, PrComment, ReleaseAsset};
pub use s3::{ListPage, ObjectStore, S3Store};
pub use secrets::{AwsSecretStore, EnvSecretStore, default_stores};
