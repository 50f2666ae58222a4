//! Authentication modes and OAuth2 client-credentials assembly.
//!
//! [`AuthMode::from_identity`] turns raw identity parameters into an immutable
//! authentication mode. Selection depends only on whether a client id and a
//! client secret are both present; everything else is validated afterwards so
//! that half-filled OAuth2 settings fail here instead of at connection time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use url::Url;

/// Grant type written into the key material and the provider parameters.
pub const CLIENT_CREDENTIALS: &str = "client_credentials";

/// Prefix of an embedded key-material reference.
pub const DATA_REFERENCE_PREFIX: &str = "data://";

/// Raw identity parameters as collected from configuration.
///
/// A value that is unset, empty or only whitespace counts as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IdentityParams {
    /// OAuth2 client identifier.
    pub client_id: Option<String>,
    /// OAuth2 client secret.
    pub client_secret: Option<String>,
    /// OAuth2 issuer URL.
    pub issuer_url: Option<String>,
    /// OAuth2 audience.
    pub audience: Option<String>,
    /// OAuth2 scope.
    pub scope: Option<String>,
}

impl fmt::Debug for IdentityParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityParams")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("issuer_url", &self.issuer_url)
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// How the connection authenticates against the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// No authentication is presented.
    Anonymous,
    /// OAuth2 client-credentials flow.
    OAuth2ClientCredentials(OAuth2Credentials),
}

impl AuthMode {
    /// Selects and builds the authentication mode for `identity`.
    ///
    /// Both a client id and a client secret select OAuth2; anything else is
    /// anonymous. In OAuth2 mode the issuer URL must be a valid absolute URL;
    /// audience and scope may be empty.
    pub fn from_identity(identity: &IdentityParams) -> Result<Self> {
        match (present(&identity.client_id), present(&identity.client_secret)) {
            (Some(client_id), Some(client_secret)) => {
                let credentials = OAuth2Credentials::new(
                    identity.issuer_url.as_deref().unwrap_or_default(),
                    client_id,
                    client_secret,
                    identity.audience.as_deref().unwrap_or_default(),
                    identity.scope.as_deref().unwrap_or_default(),
                )?;
                Ok(Self::OAuth2ClientCredentials(credentials))
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!("Only one of client id and client secret is set, connecting anonymously");
                Ok(Self::Anonymous)
            }
            (None, None) => Ok(Self::Anonymous),
        }
    }

    /// Short name used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::OAuth2ClientCredentials(_) => "oauth2_client_credentials",
        }
    }
}

/// Fully validated OAuth2 client-credentials parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuth2Credentials {
    issuer_url: String,
    client_id: String,
    client_secret: String,
    audience: String,
    scope: String,
    private_key: String,
}

impl OAuth2Credentials {
    /// Validates the parameters and serializes the embedded key material.
    pub fn new(
        issuer_url: &str,
        client_id: &str,
        client_secret: &str,
        audience: &str,
        scope: &str,
    ) -> Result<Self> {
        let issuer_url = issuer_url.trim();
        if issuer_url.is_empty() {
            return Err(Error::config(
                "issuer URL is required when client id and client secret are set",
            ));
        }
        Url::parse(issuer_url)
            .map_err(|e| Error::config(format!("issuer URL {issuer_url:?} is invalid: {e}")))?;

        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(Error::config("client id and client secret must both be non-empty"));
        }

        let key_material = KeyMaterial {
            kind: CLIENT_CREDENTIALS.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            issuer_url: issuer_url.to_string(),
            scope: scope.to_string(),
        };

        Ok(Self {
            issuer_url: issuer_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            audience: audience.to_string(),
            scope: scope.to_string(),
            private_key: key_material.to_data_reference()?,
        })
    }

    /// Issuer URL.
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret.
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Audience, possibly empty.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Scope, possibly empty.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Embedded key-material reference (`data://<json>`).
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Parameters of the authentication provider presented on connect.
    pub fn auth_provider(&self) -> AuthProvider {
        AuthProvider {
            kind: CLIENT_CREDENTIALS,
            issuer_url: self.issuer_url.clone(),
            client_id: self.client_id.clone(),
            audience: self.audience.clone(),
            scope: self.scope.clone(),
            private_key: self.private_key.clone(),
        }
    }
}

impl fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Authentication provider parameters handed to the transport.
///
/// The client secret is only reachable through [`AuthProvider::private_key`].
#[derive(Clone, PartialEq, Eq)]
pub struct AuthProvider {
    /// Grant type, always [`CLIENT_CREDENTIALS`].
    pub kind: &'static str,
    /// Issuer URL.
    pub issuer_url: String,
    /// Client identifier.
    pub client_id: String,
    /// Audience, possibly empty.
    pub audience: String,
    /// Scope, possibly empty.
    pub scope: String,
    /// Embedded key-material reference.
    pub private_key: String,
}

impl AuthProvider {
    /// Decodes the key material carried by [`Self::private_key`].
    pub fn key_material(&self) -> Result<KeyMaterial> {
        KeyMaterial::from_data_reference(&self.private_key)
    }
}

impl fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthProvider")
            .field("kind", &self.kind)
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("audience", &self.audience)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Client-credentials key file, embedded in the connection as a data reference.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// Grant type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Issuer URL.
    pub issuer_url: String,
    /// Scope, possibly empty.
    pub scope: String,
}

impl KeyMaterial {
    /// Serializes the key material into a `data://<json>` reference.
    pub fn to_data_reference(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{DATA_REFERENCE_PREFIX}{json}"))
    }

    /// Parses a reference produced by [`Self::to_data_reference`].
    pub fn from_data_reference(reference: &str) -> Result<Self> {
        let json = reference.strip_prefix(DATA_REFERENCE_PREFIX).ok_or_else(|| {
            Error::config(format!("key material must start with {DATA_REFERENCE_PREFIX}"))
        })?;
        serde_json::from_str(json)
            .map_err(|e| Error::config(format!("key material is not valid JSON: {e}")))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("issuer_url", &self.issuer_url)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
