use axum::{Extension, Json, extract::State};
use tracing::error;

use safechat_types::api::{Claims, UserEntry, UsersResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// GET /admin/users — full account listing, admin only.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UsersResponse>> {
    let caller = state
        .db
        .get_user_by_id(claims.sub)?
        .ok_or(ApiError::Forbidden)?;
    if !caller.is_admin {
        return Err(ApiError::Forbidden);
    }

    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_users())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })??;

    Ok(Json(UsersResponse {
        users: rows
            .into_iter()
            .map(|u| UserEntry {
                id: u.id,
                username: u.username,
                email: u.email,
            })
            .collect(),
    }))
}
