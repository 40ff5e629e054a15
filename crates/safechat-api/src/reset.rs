use axum::{
    Json,
    extract::{Form, Path, State},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use safechat_types::api::{MsgResponse, ResetClaims, ResetPasswordForm, ResetRequestForm};

use crate::auth::{AppState, hash_password};
use crate::error::{ApiError, ApiResult};

/// Purpose claim baked into every reset token; an access token can never be
/// replayed here and vice versa.
const RESET_PURPOSE: &str = "password_reset";

const TOKEN_TTL_HOURS: i64 = 1;

/// POST /request_reset — issue a single-purpose reset token for the account.
/// There is no mail layer; the reset link is written to the log instead.
pub async fn request_reset(
    State(state): State<AppState>,
    Form(form): Form<ResetRequestForm>,
) -> ApiResult<Json<MsgResponse>> {
    let user = state
        .db
        .get_user_by_email(&form.email)?
        .ok_or(ApiError::NotFound("user"))?;

    let token = create_reset_token(&state.jwt_secret, &user.email)?;
    info!("Password reset link: /reset_password/{}", token);

    Ok(Json(MsgResponse {
        msg: "Password reset email sent".into(),
    }))
}

/// POST /reset_password/{token} — set a new password for the account the
/// token was issued to.
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> ApiResult<Json<MsgResponse>> {
    let email = verify_reset_token(&state.jwt_secret, &token)
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired token".into()))?;

    if form.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or(ApiError::NotFound("user"))?;

    let password_hash = hash_password(&form.password)?;
    state.db.set_password(user.id, &password_hash)?;

    Ok(Json(MsgResponse {
        msg: "Password reset successful".into(),
    }))
}

fn create_reset_token(secret: &str, email: &str) -> ApiResult<String> {
    let claims = ResetClaims {
        email: email.to_string(),
        purpose: RESET_PURPOSE.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| ApiError::Internal)
}

fn verify_reset_token(secret: &str, token: &str) -> Option<String> {
    let data = decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    (data.claims.purpose == RESET_PURPOSE).then_some(data.claims.email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_token;

    #[test]
    fn reset_token_roundtrip() {
        let token = create_reset_token("test-secret", "alice@example.com").unwrap();
        assert_eq!(
            verify_reset_token("test-secret", &token).as_deref(),
            Some("alice@example.com")
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_reset_token("test-secret", "alice@example.com").unwrap();
        assert!(verify_reset_token("other-secret", &token).is_none());
    }

    #[test]
    fn access_token_cannot_reset_a_password() {
        // Same signing secret, different claim shape and purpose
        let token = create_token("test-secret", 7, "alice").unwrap();
        assert!(verify_reset_token("test-secret", &token).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = ResetClaims {
            email: "alice@example.com".into(),
            purpose: RESET_PURPOSE.into(),
            exp: (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(verify_reset_token("test-secret", &token).is_none());
    }
}
