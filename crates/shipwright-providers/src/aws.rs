//! Shared AWS SDK configuration.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

/// Load credentials and region from the default provider chain, optionally
/// overriding the region.
pub async fn load_aws_config(region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        debug!(region = %region, "Using configured AWS region");
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}
