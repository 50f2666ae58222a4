//! Fixtures shared by unit and integration tests.

use crate::auth::IdentityParams;
use bytes::Bytes;

/// Identity parameters that select OAuth2 client credentials.
pub fn oauth2_identity() -> IdentityParams {
    IdentityParams {
        client_id: Some("courier-test-client".to_string()),
        client_secret: Some("courier-test-secret".to_string()),
        issuer_url: Some("https://auth.courier.test/".to_string()),
        audience: Some("urn:courier:cluster".to_string()),
        scope: Some("produce".to_string()),
    }
}

/// Identity parameters without any credentials.
pub fn anonymous_identity() -> IdentityParams {
    IdentityParams::default()
}

/// Payload in the default `Test Message: <i>` shape.
pub fn test_payload(index: u64) -> Bytes {
    Bytes::from(format!("Test Message: {index}"))
}
