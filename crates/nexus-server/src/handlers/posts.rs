use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use nexus_shared::api::{CommentRequest, DeleteResponse};
use nexus_shared::PostView;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::routes::AppState;
use crate::store;

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
}

/// GET /posts
pub async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<PostListQuery>,
) -> Result<Json<Vec<PostView>>, AppError> {
    let posts = store::posts::list(&state.db, params.user_id).await?;
    Ok(Json(posts))
}

/// POST /posts
///
/// Multipart body: `content` text field, optional `image` file field.
/// The image is written to storage before the post row is created, so
/// a stored post never references a missing file.
pub async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PostView>), AppError> {
    let mut content = String::new();
    let mut image: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("content") => {
                content = field.text().await.map_err(multipart_error)?;
            }
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;

                if !bytes.is_empty() {
                    image = Some(state.uploads.save(file_name.as_deref(), &bytes).await?);
                }
            }
            _ => {}
        }
    }

    let post = store::posts::create(&state.db, user.id, &content, image).await?;

    let view = store::posts::find_view(&state.db, post.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /posts/:id/like
pub async fn toggle_like(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PostView>, AppError> {
    let view = store::posts::toggle_like(&state.db, post_id, user.id).await?;
    Ok(Json(view))
}

/// POST /posts/:id/comment
pub async fn add_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<PostView>, AppError> {
    store::posts::add_comment(&state.db, post_id, user.id, &req.text).await?;

    let view = store::posts::find_view(&state.db, post_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(view))
}

/// DELETE /posts/:id
pub async fn delete_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    store::posts::delete(&state.db, post_id, user.id).await?;

    Ok(Json(DeleteResponse {
        message: "Post deleted".to_string(),
    }))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {}", err))
}
