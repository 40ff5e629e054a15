use serde::{Deserialize, Serialize};

use crate::models::ThreadEntry;

// -- JWT Claims --

/// JWT claims shared across safechat-api (REST middleware) and safechat-relay
/// (socket identify handshake). Canonical definition lives here in
/// safechat-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

/// Claims for single-purpose password-reset tokens. Kept distinct from
/// `Claims` so a reset token can never pass as an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub email: String,
    pub purpose: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Required when the account has two-factor auth enabled
    #[serde(default)]
    pub otp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteUserRequest {
    pub password: String,
}

/// Public view of an account: profile endpoint and admin listing.
#[derive(Debug, Serialize)]
pub struct UserEntry {
    pub id: i64,
    pub username: String,
    pub email: String,
}

// -- Two-factor --

#[derive(Debug, Serialize)]
pub struct Enable2faResponse {
    pub qr_code_url: String,
}

// -- Password reset --

#[derive(Debug, Deserialize)]
pub struct ResetRequestForm {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub password: String,
}

// -- Messaging --

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub msg: String,
    pub thread_id: String,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub thread: Vec<ThreadEntry>,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationSummary>,
}

#[derive(Debug, Serialize)]
pub struct NotificationSummary {
    pub id: i64,
    pub content: String,
}

// -- Admin --

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserEntry>,
}

// -- Generic --

#[derive(Debug, Serialize)]
pub struct MsgResponse {
    pub msg: String,
}
