use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};

use safechat_db::{Database, MessageStore};
use safechat_types::api::{
    Claims, DeleteUserRequest, LoginRequest, LoginResponse, MsgResponse, RegisterRequest,
    UpdateProfileRequest, UserEntry, UserSummary,
};

use crate::error::{ApiError, ApiResult};
use crate::files::FileStore;
use crate::twofactor;

pub type AppState = Arc<AppStateInner>;

/// Explicitly constructed application context, injected into every handler.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub store: Arc<MessageStore>,
    pub files: FileStore,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::BadRequest(
            "Username must be 3-32 characters".into(),
        ));
    }
    if !req.email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email address".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    if state.db.get_user_by_username(&req.username)?.is_some() {
        return Err(ApiError::Conflict("Username already taken".into()));
    }
    if state.db.get_user_by_email(&req.email)?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    state
        .db
        .create_user(&req.username, &req.email, &password_hash)?;

    Ok((
        StatusCode::CREATED,
        Json(MsgResponse {
            msg: "Registration successful".into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .db
        .get_user_by_email(&req.email)?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::Unauthorized);
    }

    // Accounts with two-factor enabled must present a current code
    if let Some(secret) = &user.mfa_secret {
        let otp = req.otp.as_deref().ok_or(ApiError::Unauthorized)?;
        if !twofactor::verify_code(secret, otp) {
            return Err(ApiError::Unauthorized);
        }
    }

    let access_token = create_token(&state.jwt_secret, user.id, &user.username)?;

    Ok(Json(LoginResponse {
        access_token,
        user: UserSummary {
            id: user.id,
            username: user.username,
        },
    }))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserEntry>> {
    let user = state
        .db
        .get_user_by_id(claims.sub)?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(UserEntry {
        id: user.id,
        username: user.username,
        email: user.email,
    }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<MsgResponse>> {
    let user = state
        .db
        .get_user_by_id(claims.sub)?
        .ok_or(ApiError::NotFound("user"))?;

    let username = req.username.unwrap_or(user.username);
    let email = req.email.unwrap_or(user.email);

    if let Some(other) = state.db.get_user_by_username(&username)? {
        if other.id != user.id {
            return Err(ApiError::Conflict("Username already taken".into()));
        }
    }
    if let Some(other) = state.db.get_user_by_email(&email)? {
        if other.id != user.id {
            return Err(ApiError::Conflict("Email already registered".into()));
        }
    }

    state.db.update_profile(user.id, &username, &email)?;

    Ok(Json(MsgResponse {
        msg: "Profile updated".into(),
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteUserRequest>,
) -> ApiResult<Json<MsgResponse>> {
    let user = state
        .db
        .get_user_by_id(claims.sub)?
        .ok_or(ApiError::NotFound("user"))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::Forbidden);
    }

    state.db.delete_user(user.id)?;

    Ok(Json(MsgResponse {
        msg: "User deleted successfully".into(),
    }))
}

pub(crate) fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| ApiError::Internal)?
        .to_string();
    Ok(hash)
}

pub(crate) fn verify_password(password: &str, password_hash: &str) -> ApiResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash).map_err(|_| ApiError::Internal)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub(crate) fn create_token(secret: &str, user_id: i64, username: &str) -> ApiResult<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| ApiError::Internal)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    use super::*;

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong battery", &hash).unwrap());
    }

    #[test]
    fn access_token_carries_identity() {
        let token = create_token("test-secret", 7, "alice").unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();

        assert_eq!(data.claims.sub, 7);
        assert_eq!(data.claims.username, "alice");
    }

    #[test]
    fn access_token_rejects_wrong_secret() {
        let token = create_token("test-secret", 7, "alice").unwrap();

        assert!(
            decode::<Claims>(
                &token,
                &DecodingKey::from_secret(b"other-secret"),
                &Validation::default(),
            )
            .is_err()
        );
    }
}
