use std::time::{SystemTime, UNIX_EPOCH};

use axum::{Extension, Json, extract::State};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::Rng;
use totp_lite::{DEFAULT_STEP, Sha1, totp_custom};

use safechat_types::api::{Claims, Enable2faResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const SECRET_LEN: usize = 20;
const OTP_DIGITS: u32 = 6;

/// POST /enable_2fa — provision a TOTP secret for the caller and return the
/// otpauth:// URI to render as a QR code. An existing secret is reused, so
/// re-enabling never invalidates an already-configured authenticator.
pub async fn enable_2fa(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Enable2faResponse>> {
    let user = state
        .db
        .get_user_by_id(claims.sub)?
        .ok_or(ApiError::NotFound("user"))?;

    let secret = match user.mfa_secret {
        Some(secret) => secret,
        None => {
            let mut bytes = [0u8; SECRET_LEN];
            rand::rng().fill(&mut bytes[..]);
            let secret = BASE64.encode(bytes);
            state.db.set_mfa_secret(user.id, &secret)?;
            secret
        }
    };

    Ok(Json(Enable2faResponse {
        qr_code_url: provisioning_uri(&user.email, &secret),
    }))
}

fn provisioning_uri(email: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/SafeChat:{}?secret={}&issuer=SafeChat",
        urlencoding::encode(email),
        urlencoding::encode(secret)
    )
}

/// Check a 6-digit TOTP code against the stored secret for the current
/// 30-second window.
pub fn verify_code(secret: &str, code: &str) -> bool {
    if code.len() != OTP_DIGITS as usize {
        return false;
    }

    let Ok(secret_bytes) = BASE64.decode(secret) else {
        return false;
    };
    let Ok(elapsed) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return false;
    };

    let expected = totp_custom::<Sha1>(DEFAULT_STEP, OTP_DIGITS, &secret_bytes, elapsed.as_secs());
    expected == code
}
