//! Token verification
//!
//! A submission is authorised once, up front, by presenting the caller's token
//! to the identity service. Anything other than a 200 rejects it.

use super::client::render_template;
use super::http::{generate_headers, CloudHttpClient};
use crate::config::Endpoints;
use reqwest::StatusCode;

/// User-facing message returned when a submission is rejected
pub const AUTH_FAILURE_MESSAGE: &str = "Authentication has failed due to incorrect token or DDI. \
     Please check the token and DDI and try again.";

/// Placeholder logged in place of the token path segment
const REDACTED: &str = "<redacted>";

fn tokens_url(endpoints: &Endpoints, segment: &str) -> String {
    format!(
        "{}/v2.0/tokens/{}",
        render_template(&endpoints.identity, "", "").trim_end_matches('/'),
        segment
    )
}

/// Build the identity validation URL for a token
pub fn identity_url(endpoints: &Endpoints, token: &str) -> String {
    tokens_url(endpoints, &urlencoding::encode(token))
}

/// Check whether a token is accepted by the identity service
pub async fn check_authorized(http: &CloudHttpClient, endpoints: &Endpoints, token: &str) -> bool {
    let Ok(headers) = generate_headers(token) else {
        tracing::warn!("Rejecting token that is not a valid header value");
        return false;
    };

    let label = tokens_url(endpoints, REDACTED);
    match http.status(&identity_url(endpoints, token), &label, &headers).await {
        Some(StatusCode::OK) => true,
        Some(status) => {
            tracing::info!("Token validation returned {}", status);
            false
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_url_encodes_token() {
        let endpoints = Endpoints::all_at("http://localhost:1");
        assert_eq!(
            identity_url(&endpoints, "a b/c"),
            "http://localhost:1/v2.0/tokens/a%20b%2Fc"
        );
    }

    #[test]
    fn test_default_identity_url() {
        assert_eq!(
            identity_url(&Endpoints::default(), "abc"),
            "https://identity.api.rackspacecloud.com/v2.0/tokens/abc"
        );
    }
}
