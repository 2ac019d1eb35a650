//! Download and upload locators handed to workers

use serde::{Deserialize, Serialize};

/// Produces the URLs a worker uses to fetch bits and store its output.
pub trait BlobUrlGenerator: Send + Sync {
    fn package_download_url(&self, package_key: &str) -> String;
    fn droplet_upload_url(&self, target_guid: &str) -> String;
    fn buildpack_cache_download_url(&self, app_guid: &str) -> String;
    fn buildpack_cache_upload_url(&self, app_guid: &str) -> String;
}

/// URL generator rooted at a fixed base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticUrlGenerator {
    base_url: String,
}

impl StaticUrlGenerator {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl BlobUrlGenerator for StaticUrlGenerator {
    fn package_download_url(&self, package_key: &str) -> String {
        format!("{}/packages/{}", self.base_url, package_key)
    }

    fn droplet_upload_url(&self, target_guid: &str) -> String {
        format!("{}/droplets/{}/upload", self.base_url, target_guid)
    }

    fn buildpack_cache_download_url(&self, app_guid: &str) -> String {
        format!("{}/buildpack_cache/{}/download", self.base_url, app_guid)
    }

    fn buildpack_cache_upload_url(&self, app_guid: &str) -> String {
        format!("{}/buildpack_cache/{}/upload", self.base_url, app_guid)
    }
}
