use chrono::{DateTime, Utc};
use nexus_shared::{User, UserSummary, DEFAULT_AVATAR};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;

/// Account row as stored, password hash included. This type never
/// crosses the crate boundary; `into_user` strips the hash.
#[derive(Debug)]
pub struct StoredUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            avatar: self.avatar,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

type UserRow = (
    Uuid,                  // id
    String,                // username
    String,                // email
    String,                // avatar
    chrono::DateTime<Utc>, // created_at
    chrono::DateTime<Utc>, // updated_at
);

fn row_to_user(row: UserRow) -> User {
    User {
        id: row.0,
        username: row.1,
        email: row.2,
        avatar: row.3,
        created_at: row.4,
        updated_at: row.5,
    }
}

pub async fn create(
    db: &DbPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User, AppError> {
    let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(db)
        .await?;

    if taken.is_some() {
        return Err(AppError::Conflict("Username already taken".to_string()));
    }

    let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(db)
        .await?;

    if taken.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (id, username, email, password_hash, avatar, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(DEFAULT_AVATAR)
    .bind(now)
    .bind(now)
    .execute(db)
    .await;

    match result {
        Ok(_) => {}
        // Concurrent registration can slip past the checks above; the
        // UNIQUE constraints still make it a conflict, not a 500.
        Err(sqlx::Error::Database(e)) if e.message().contains("UNIQUE constraint failed") => {
            return Err(AppError::Conflict(
                "Username or email already registered".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(User {
        id,
        username: username.to_string(),
        email: email.to_string(),
        avatar: DEFAULT_AVATAR.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_by_username(
    db: &DbPool,
    username: &str,
) -> Result<Option<StoredUser>, AppError> {
    let row: Option<(Uuid, String, String, String, String, DateTime<Utc>, DateTime<Utc>)> =
        sqlx::query_as(
            r#"
            SELECT id, username, email, password_hash, avatar, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;

    Ok(row.map(
        |(id, username, email, password_hash, avatar, created_at, updated_at)| StoredUser {
            id,
            username,
            email,
            password_hash,
            avatar,
            created_at,
            updated_at,
        },
    ))
}

pub async fn find_by_id(db: &DbPool, id: Uuid) -> Result<Option<User>, AppError> {
    let row: Option<UserRow> = sqlx::query_as(
        "SELECT id, username, email, avatar, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(row_to_user))
}

pub async fn update_avatar(db: &DbPool, id: Uuid, avatar: &str) -> Result<User, AppError> {
    let result = sqlx::query("UPDATE users SET avatar = $1, updated_at = $2 WHERE id = $3")
        .bind(avatar)
        .bind(Utc::now())
        .bind(id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    find_by_id(db, id).await?.ok_or(AppError::NotFound)
}

/// Case-insensitive substring match on username. The query text is
/// matched literally, so LIKE wildcards in user input are escaped.
pub async fn search(db: &DbPool, query: &str) -> Result<Vec<UserSummary>, AppError> {
    let pattern = format!("%{}%", escape_like(query));

    let rows: Vec<(Uuid, String, String)> = sqlx::query_as(
        r#"
        SELECT id, username, avatar
        FROM users
        WHERE username LIKE $1 ESCAPE '\'
        ORDER BY username ASC
        "#,
    )
    .bind(&pattern)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, username, avatar)| UserSummary {
            id,
            username,
            avatar,
        })
        .collect())
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(escape_like("alice"), "alice");
    }

    #[test]
    fn wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }
}
