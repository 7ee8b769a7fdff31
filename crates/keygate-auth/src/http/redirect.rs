//! Authorization and logout redirects.
//!
//! Both endpoints send the browser to the provider with `302 Found`,
//! forwarding the incoming query.

use axum::extract::{RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use url::Url;

use super::GatewayState;

/// Handler for `GET /api/authorize`.
///
/// Forwards the query to the provider's authorization endpoint, adding the
/// gateway's `client_id` when the caller did not send one.
pub async fn authorize_handler(
    State(state): State<GatewayState>,
    RawQuery(query): RawQuery,
) -> Response {
    let mut pairs = query_pairs(query.as_deref());
    if !pairs.iter().any(|(k, _)| k == "client_id") {
        pairs.push((
            "client_id".to_string(),
            state.exchange.default_credentials().client_id.clone(),
        ));
    }

    found(&state.endpoints.authorization, &pairs)
}

/// Handler for `GET /api/logout`.
///
/// Forwards the query to the provider's logout endpoint, renaming `redirect`
/// to `redirect_uri`.
pub async fn logout_handler(
    State(state): State<GatewayState>,
    RawQuery(query): RawQuery,
) -> Response {
    let pairs: Vec<(String, String)> = query_pairs(query.as_deref())
        .into_iter()
        .map(|(k, v)| {
            if k == "redirect" {
                ("redirect_uri".to_string(), v)
            } else {
                (k, v)
            }
        })
        .collect();

    found(&state.endpoints.logout, &pairs)
}

fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

fn found(target: &Url, pairs: &[(String, String)]) -> Response {
    let mut location = target.clone();
    if !pairs.is_empty() {
        location.query_pairs_mut().extend_pairs(pairs);
    }

    tracing::debug!(location = %location.path(), "Redirecting to provider");
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location.to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_appends_query() {
        let target = Url::parse("https://sso.example.com/auth?kc_idp_hint=github").unwrap();
        let response = found(
            &target,
            &[("state".to_string(), "a b".to_string())],
        );

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://sso.example.com/auth?kc_idp_hint=github&state=a+b"
        );
    }

    #[test]
    fn test_found_without_query() {
        let target = Url::parse("https://sso.example.com/logout").unwrap();
        let response = found(&target, &[]);
        assert_eq!(response.headers()[header::LOCATION], "https://sso.example.com/logout");
    }
}
