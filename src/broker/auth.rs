//! # Broker Authentication
//!
//! OAuth client-credentials grant against the resolved token URL.
//!
//! The token is never cached beyond one [`super::BrokerClient`], so credential
//! rotation is picked up on the next reconcile call.

use super::error::BrokerError;
use super::http::{HttpClient, HttpMethod, HttpRequest};
use super::responses::TokenResponse;
use crate::credentials::BrokerCredentials;
use crate::observability::metrics;
use base64::{engine::general_purpose, Engine as _};
use std::time::Instant;
use tracing::debug;

const TOKEN_PATH: &str = "/oauth/token";

/// Token endpoint for a token URL, appending `/oauth/token` unless already present
pub fn token_endpoint(token_url: &str) -> String {
    let base = token_url.trim_end_matches('/');
    if base.ends_with(TOKEN_PATH) {
        base.to_string()
    } else {
        format!("{base}{TOKEN_PATH}")
    }
}

/// Obtain a bearer token
///
/// Every failure is transient: a rejected client secret is fixed by rotating the
/// credentials secret, which the next reconcile call picks up.
pub async fn fetch_token(
    http: &dyn HttpClient,
    credentials: &BrokerCredentials,
) -> Result<String, BrokerError> {
    let basic = general_purpose::STANDARD.encode(format!(
        "{}:{}",
        credentials.client_id,
        credentials.client_secret()
    ));
    let request = HttpRequest::new(HttpMethod::Post, token_endpoint(&credentials.token_url))
        .header("Authorization", format!("Basic {basic}"))
        .header("Accept", "application/json")
        .form("grant_type=client_credentials");

    let start = Instant::now();
    let result = http.send(request).await;
    let elapsed = start.elapsed().as_secs_f64();

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            metrics::record_broker_request("token", "transient", elapsed);
            return Err(BrokerError::Transient(format!("token request failed: {e}")));
        }
    };

    if !response.is_success() {
        metrics::record_broker_request("token", "transient", elapsed);
        let err = BrokerError::from_response("token", &response);
        return Err(BrokerError::Transient(err.detail().to_string()));
    }

    let token: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
        metrics::record_broker_request("token", "transient", elapsed);
        BrokerError::Transient(format!("token response could not be parsed: {e}"))
    })?;
    metrics::record_broker_request("token", "sync", elapsed);

    debug!(
        token_type = token.token_type.as_deref().unwrap_or("bearer"),
        expires_in = token.expires_in.unwrap_or_default(),
        "Obtained broker access token"
    );
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_endpoint_appends_path() {
        assert_eq!(
            token_endpoint("https://auth.example.com"),
            "https://auth.example.com/oauth/token"
        );
        assert_eq!(
            token_endpoint("https://auth.example.com/"),
            "https://auth.example.com/oauth/token"
        );
    }

    #[test]
    fn test_token_endpoint_keeps_full_path() {
        assert_eq!(
            token_endpoint("https://auth.example.com/oauth/token"),
            "https://auth.example.com/oauth/token"
        );
    }
}
