//! OpenID Connect user-info handler.

use axum::Json;
use axum::extract::State;

use super::GatewayState;
use super::extract::BearerToken;
use crate::error::AuthError;
use crate::userinfo::UserInfo;

/// Handler for `GET /api/userinfo`.
///
/// Validates the bearer token, resolves the local account for its subject and
/// returns `{sub, given_name, family_name, preferred_username, email}`.
///
/// # Errors
///
/// Returns 401 when the token is missing or invalid, or when no local account
/// exists for its subject.
pub async fn userinfo_handler(
    State(state): State<GatewayState>,
    BearerToken(token): BearerToken,
) -> Result<Json<UserInfo>, AuthError> {
    let claims = state.validator.validate(&token).await?;
    let info = state.userinfo.assemble(&claims).await?;
    tracing::debug!(sub = %info.sub, "Served user info");
    Ok(Json(info))
}
