use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use agora_types::api::TokenKind;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::{AppState, run_db};

/// Validate the bearer access token and make its claims available to
/// handlers as `Extension<Claims>`. Tokens for deleted members are refused.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized("Authentication credentials were not provided"))?;

    let claims = decode_token(&state.jwt_secret, bearer.token(), TokenKind::Access)?;

    let member_id = claims.sub;
    let exists = run_db(&state, move |db| Ok(db.member_exists(member_id)?)).await?;
    if !exists {
        return Err(ApiError::Unauthorized("User not found"));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
