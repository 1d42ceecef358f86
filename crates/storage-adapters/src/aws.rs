//! Shared AWS SDK configuration for the DynamoDB and S3 adapters.

use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Loads credentials and region from the standard provider chain, falling
/// back to `region` when the environment names none.
pub async fn load_sdk_config(region: Option<String>) -> SdkConfig {
    let fallback = region.unwrap_or_else(|| "us-east-2".to_string());
    let region_provider = RegionProviderChain::default_provider().or_else(Region::new(fallback));
    aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await
}
