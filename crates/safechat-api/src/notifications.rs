use axum::{Extension, Json, extract::State};
use tracing::error;

use safechat_types::api::{Claims, MsgResponse, NotificationSummary, NotificationsResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// GET /notifications — the caller's unread notifications, oldest first.
pub async fn get_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<NotificationsResponse>> {
    let db = state.db.clone();
    let user_id = claims.sub;
    let rows = tokio::task::spawn_blocking(move || db.unread_notifications(user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })??;

    Ok(Json(NotificationsResponse {
        notifications: rows
            .into_iter()
            .map(|n| NotificationSummary {
                id: n.id,
                content: n.content,
            })
            .collect(),
    }))
}

/// POST /notifications/read — flip every unread notification to read. The
/// flag never moves back.
pub async fn mark_notifications_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MsgResponse>> {
    let db = state.db.clone();
    let user_id = claims.sub;
    tokio::task::spawn_blocking(move || db.mark_notifications_read(user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })??;

    Ok(Json(MsgResponse {
        msg: "Notifications marked as read".into(),
    }))
}
