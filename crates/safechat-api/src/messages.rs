use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};

use safechat_types::api::{Claims, SendMessageResponse, ThreadResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// POST /send_message — multipart form with fields `receiver_id`, `content`
/// (optional when a file is attached), `thread_id` (optional: absent means
/// the store opens a fresh conversation) and `file` (optional binary part).
///
/// The optional thread id is this path's contract only; the relay path
/// requires one.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut receiver_id: Option<i64> = None;
    let mut content = String::new();
    let mut thread_id: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("receiver_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                receiver_id = Some(
                    text.trim()
                        .parse()
                        .map_err(|_| ApiError::BadRequest("receiver_id must be an integer".into()))?,
                );
            }
            Some("content") => {
                content = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            }
            Some("thread_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if !text.is_empty() {
                    thread_id = Some(text);
                }
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if !data.is_empty() {
                    file = Some((filename, data.to_vec()));
                }
            }
            _ => {}
        }
    }

    let receiver_id = receiver_id.ok_or_else(|| ApiError::BadRequest("Missing fields".into()))?;
    if content.is_empty() && file.is_none() {
        return Err(ApiError::BadRequest("Missing fields".into()));
    }

    let file_url = match file {
        Some((filename, data)) => Some(state.files.save(&filename, &data).await?),
        None => None,
    };

    // Blocking DB write off the async runtime
    let store = state.store.clone();
    let sender_id = claims.sub;
    let persisted = tokio::task::spawn_blocking(move || {
        store.persist(
            thread_id.as_deref(),
            sender_id,
            receiver_id,
            &content,
            file_url.as_deref(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })??;

    // Unread notification for the receiver; best-effort, the message itself
    // is already durable.
    let db = state.db.clone();
    let note = format!("New message from {}", claims.username);
    match tokio::task::spawn_blocking(move || db.insert_notification(receiver_id, &note)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("failed to create notification for {}: {}", receiver_id, e),
        Err(e) => warn!("notification task failed: {}", e),
    }

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            msg: "Message sent!".into(),
            thread_id: persisted.thread_id,
        }),
    ))
}

/// GET /get_thread/{thread_id} — the full decrypted conversation, oldest
/// first. An unused identifier is 404, not a server fault.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<ThreadResponse>> {
    let store = state.store.clone();
    let thread = tokio::task::spawn_blocking(move || store.get_thread(&thread_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })??;

    Ok(Json(ThreadResponse { thread }))
}
