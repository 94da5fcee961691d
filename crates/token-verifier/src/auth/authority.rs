//! Token issuer identity.

use std::fmt;

/// Default key document host, keyed by region.
const DEFAULT_KEY_HOST_TEMPLATE: &str = "https://cognito-idp.{region}.amazonaws.com";

/// Path of the published key document below an issuer.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// One token issuer: a user pool within a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Authority {
    region: String,
    user_pool_id: String,
}

impl Authority {
    pub fn new(region: impl Into<String>, user_pool_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            user_pool_id: user_pool_id.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn user_pool_id(&self) -> &str {
        &self.user_pool_id
    }

    /// Issuer URL as it appears in the `iss` claim.
    pub fn issuer(&self) -> String {
        format!("{}/{}", self.default_host(), self.user_pool_id)
    }

    /// URL of the authority's published key document.
    ///
    /// `base_override` replaces the regional host (scheme, host and optional
    /// path prefix); the pool id and well-known path are always appended.
    pub fn jwks_url(&self, base_override: Option<&str>) -> String {
        let base = match base_override {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => self.default_host(),
        };
        format!("{}/{}{}", base, self.user_pool_id, JWKS_PATH)
    }

    fn default_host(&self) -> String {
        DEFAULT_KEY_HOST_TEMPLATE.replace("{region}", &self.region)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.user_pool_id)
    }
}
