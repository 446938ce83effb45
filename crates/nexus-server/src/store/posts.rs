use std::collections::HashMap;

use chrono::Utc;
use nexus_shared::{Comment, CommentView, Post, PostView, UserSummary};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;

type PostRow = (
    Uuid,                  // post id
    String,                // content
    Option<String>,        // image
    chrono::DateTime<Utc>, // created_at
    chrono::DateTime<Utc>, // updated_at
    Uuid,                  // author id
    String,                // author username
    String,                // author avatar
);

const POST_SELECT: &str = "
    SELECT p.id, p.content, p.image, p.created_at, p.updated_at,
           u.id, u.username, u.avatar
    FROM posts p
    JOIN users u ON u.id = p.author_id
";

pub async fn create(
    db: &DbPool,
    author_id: Uuid,
    content: &str,
    image: Option<String>,
) -> Result<Post, AppError> {
    let content = content.trim();
    if content.is_empty() && image.is_none() {
        return Err(AppError::Validation(
            "Post needs text or an image".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO posts (id, author_id, content, image, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(author_id)
    .bind(content)
    .bind(&image)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(Post {
        id,
        author_id,
        content: content.to_string(),
        image,
        created_at: now,
        updated_at: now,
    })
}

/// Feed, newest first, optionally restricted to one author. Likes and
/// comments are resolved in two batched queries rather than per post.
pub async fn list(db: &DbPool, author: Option<Uuid>) -> Result<Vec<PostView>, AppError> {
    let rows: Vec<PostRow> = match author {
        Some(author_id) => {
            let sql = format!(
                "{} WHERE p.author_id = $1 ORDER BY p.created_at DESC, p.rowid DESC",
                POST_SELECT
            );
            sqlx::query_as(&sql).bind(author_id).fetch_all(db).await?
        }
        None => {
            let sql = format!("{} ORDER BY p.created_at DESC, p.rowid DESC", POST_SELECT);
            sqlx::query_as(&sql).fetch_all(db).await?
        }
    };

    resolve_views(db, rows).await
}

pub async fn find_view(db: &DbPool, post_id: Uuid) -> Result<Option<PostView>, AppError> {
    let sql = format!("{} WHERE p.id = $1", POST_SELECT);
    let row: Option<PostRow> = sqlx::query_as(&sql).bind(post_id).fetch_optional(db).await?;

    match row {
        Some(row) => Ok(resolve_views(db, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Like if not yet liked, unlike otherwise. The insert-or-ignore makes
/// the toggle a single decision point even under concurrent requests.
pub async fn toggle_like(db: &DbPool, post_id: Uuid, user_id: Uuid) -> Result<PostView, AppError> {
    ensure_post_exists(db, post_id).await?;

    let inserted = sqlx::query("INSERT OR IGNORE INTO post_likes (post_id, user_id) VALUES ($1, $2)")
        .bind(post_id)
        .bind(user_id)
        .execute(db)
        .await?;

    if inserted.rows_affected() == 0 {
        sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(db)
            .await?;
    }

    touch_post(db, post_id).await?;

    find_view(db, post_id).await?.ok_or(AppError::NotFound)
}

pub async fn add_comment(
    db: &DbPool,
    post_id: Uuid,
    author_id: Uuid,
    text: &str,
) -> Result<Comment, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Comment text is required".to_string()));
    }

    ensure_post_exists(db, post_id).await?;

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO post_comments (id, post_id, author_id, text, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(post_id)
    .bind(author_id)
    .bind(text)
    .bind(now)
    .execute(db)
    .await?;

    touch_post(db, post_id).await?;

    Ok(Comment {
        id,
        post_id,
        author_id,
        text: text.to_string(),
        created_at: now,
    })
}

/// Author-only delete. Likes and comments go with the post through
/// ON DELETE CASCADE.
pub async fn delete(db: &DbPool, post_id: Uuid, requester: Uuid) -> Result<(), AppError> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT author_id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(db)
        .await?;

    let Some((author_id,)) = row else {
        return Err(AppError::NotFound);
    };

    if author_id != requester {
        return Err(AppError::Forbidden);
    }

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(db)
        .await?;

    Ok(())
}

async fn ensure_post_exists(db: &DbPool, post_id: Uuid) -> Result<(), AppError> {
    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_optional(db)
        .await?;

    if exists.is_none() {
        return Err(AppError::NotFound);
    }
    Ok(())
}

async fn touch_post(db: &DbPool, post_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE posts SET updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(post_id)
        .execute(db)
        .await?;
    Ok(())
}

async fn resolve_views(db: &DbPool, rows: Vec<PostRow>) -> Result<Vec<PostView>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.0).collect();
    let marks = placeholders(ids.len());

    let sql = format!(
        "SELECT post_id, user_id FROM post_likes WHERE post_id IN ({}) ORDER BY rowid ASC",
        marks
    );
    let mut query = sqlx::query_as::<_, (Uuid, Uuid)>(&sql);
    for id in &ids {
        query = query.bind(*id);
    }
    let like_rows = query.fetch_all(db).await?;

    let mut likes: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (post_id, user_id) in like_rows {
        likes.entry(post_id).or_default().push(user_id);
    }

    let sql = format!(
        r#"
        SELECT c.post_id, c.id, c.text, c.created_at, u.id, u.username, u.avatar
        FROM post_comments c
        JOIN users u ON u.id = c.author_id
        WHERE c.post_id IN ({})
        ORDER BY c.created_at ASC, c.rowid ASC
        "#,
        marks
    );
    let mut query =
        sqlx::query_as::<_, (Uuid, Uuid, String, chrono::DateTime<Utc>, Uuid, String, String)>(
            &sql,
        );
    for id in &ids {
        query = query.bind(*id);
    }
    let comment_rows = query.fetch_all(db).await?;

    let mut comments: HashMap<Uuid, Vec<CommentView>> = HashMap::new();
    for (post_id, id, text, created_at, author_id, username, avatar) in comment_rows {
        comments.entry(post_id).or_default().push(CommentView {
            id,
            author: UserSummary {
                id: author_id,
                username,
                avatar,
            },
            text,
            created_at,
        });
    }

    Ok(rows
        .into_iter()
        .map(
            |(id, content, image, created_at, updated_at, author_id, username, avatar)| PostView {
                id,
                author: UserSummary {
                    id: author_id,
                    username,
                    avatar,
                },
                content,
                image,
                likes: likes.remove(&id).unwrap_or_default(),
                comments: comments.remove(&id).unwrap_or_default(),
                created_at,
                updated_at,
            },
        )
        .collect())
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(1), "$1");
        assert_eq!(placeholders(3), "$1, $2, $3");
    }
}
