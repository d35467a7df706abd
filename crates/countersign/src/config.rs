/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Configuration for the signing pipeline.
//!
//! ```rust,ignore
//! let config = SigningConfig::builder()
//!     .tsa_url(Some("https://tsa.example.com/timestamp".parse()?))
//!     .timestamp_policy(TimestampPolicy::Required)
//!     .build();
//! ```

use crate::signing::TimestampPolicy;
use std::time::Duration;
use url::Url;

/// Default bound on a timestamp request.
pub const DEFAULT_TSA_TIMEOUT: Duration = Duration::from_secs(20);

/// Default bound on an HSM request.
pub const DEFAULT_HSM_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by the workflow engine, timestamp client and HSM client.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SigningConfig {
    tsa_url: Option<Url>,
    tsa_timeout: Duration,
    timestamp_policy: TimestampPolicy,
    hsm_base_url: Option<Url>,
    hsm_api_key: Option<String>,
    hsm_timeout: Duration,
    expiry_sweep_interval: Option<Duration>,
    default_list_limit: u32,
    max_list_limit: u32,
}

impl SigningConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> SigningConfigBuilder {
        SigningConfigBuilder::default()
    }

    /// Timestamp authority endpoint. `None` disables timestamping.
    pub fn tsa_url(&self) -> Option<&Url> {
        self.tsa_url.as_ref()
    }

    pub fn tsa_timeout(&self) -> Duration {
        self.tsa_timeout
    }

    /// What to do when no timestamp can be obtained.
    pub fn timestamp_policy(&self) -> TimestampPolicy {
        if self.tsa_url.is_none() {
            TimestampPolicy::Disabled
        } else {
            self.timestamp_policy
        }
    }

    pub fn hsm_base_url(&self) -> Option<&Url> {
        self.hsm_base_url.as_ref()
    }

    pub fn hsm_api_key(&self) -> Option<&str> {
        self.hsm_api_key.as_deref()
    }

    pub fn hsm_timeout(&self) -> Duration {
        self.hsm_timeout
    }

    /// Interval of the background expiry sweep. `None` means lazy expiry only.
    pub fn expiry_sweep_interval(&self) -> Option<Duration> {
        self.expiry_sweep_interval
    }

    /// Page size used when a list request names none.
    pub fn default_list_limit(&self) -> u32 {
        self.default_list_limit
    }

    pub fn max_list_limit(&self) -> u32 {
        self.max_list_limit
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        SigningConfigBuilder::default().build()
    }
}

/// Builder for [`SigningConfig`].
#[derive(Debug, Clone)]
pub struct SigningConfigBuilder {
    config: SigningConfig,
}

impl Default for SigningConfigBuilder {
    fn default() -> Self {
        Self {
            config: SigningConfig {
                tsa_url: None,
                tsa_timeout: DEFAULT_TSA_TIMEOUT,
                timestamp_policy: TimestampPolicy::BestEffort,
                hsm_base_url: None,
                hsm_api_key: None,
                hsm_timeout: DEFAULT_HSM_TIMEOUT,
                expiry_sweep_interval: Some(Duration::from_secs(60)),
                default_list_limit: 50,
                max_list_limit: 500,
            },
        }
    }
}

impl SigningConfigBuilder {
    pub fn tsa_url(mut self, value: Option<Url>) -> Self {
        self.config.tsa_url = value;
        self
    }

    pub fn tsa_timeout(mut self, value: Duration) -> Self {
        self.config.tsa_timeout = value;
        self
    }

    pub fn timestamp_policy(mut self, value: TimestampPolicy) -> Self {
        self.config.timestamp_policy = value;
        self
    }

    pub fn hsm_base_url(mut self, value: Option<Url>) -> Self {
        self.config.hsm_base_url = value;
        self
    }

    pub fn hsm_api_key(mut self, value: Option<String>) -> Self {
        self.config.hsm_api_key = value;
        self
    }

    pub fn hsm_timeout(mut self, value: Duration) -> Self {
        self.config.hsm_timeout = value;
        self
    }

    pub fn expiry_sweep_interval(mut self, value: Option<Duration>) -> Self {
        self.config.expiry_sweep_interval = value;
        self
    }

    /// Sets the default and maximum page sizes for listings.
    pub fn list_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.config.max_list_limit = max_limit.max(1);
        self.config.default_list_limit = default_limit.clamp(1, self.config.max_list_limit);
        self
    }

    pub fn build(self) -> SigningConfig {
        self.config
    }
}
