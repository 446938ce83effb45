use std::path::Path;

use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use nexus_shared::{
    api::{AuthResponse, CommentRequest, LoginRequest, RegisterRequest},
    PostView, User, UserSummary,
};
use reqwest::{multipart, Client, StatusCode};
use uuid::Uuid;

use super::session::Session;

/// JWT payload claims we need for expiry checking
#[derive(serde::Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Error body produced by the server
#[derive(serde::Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Access forbidden")]
    Forbidden,
    #[error("Resource not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Option<Session>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Load the stored session from disk. An expired token is discarded
    /// on the spot so the app starts at the login screen instead of
    /// failing its first request.
    pub fn load_session(&mut self) -> anyhow::Result<bool> {
        let Some(session) = Session::load()? else {
            return Ok(false);
        };

        if Self::token_expired(&session.token) {
            Session::delete()?;
            return Ok(false);
        }

        self.session = Some(session);
        Ok(true)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Build URL for endpoint
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Add auth header if authenticated
    fn auth_header(&self) -> Option<String> {
        self.session.as_ref().map(|s| format!("Bearer {}", s.token))
    }

    /// Decode JWT payload and extract expiration time
    fn decode_token_exp(token: &str) -> Option<i64> {
        // JWT format: header.payload.signature
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
        let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;

        Some(claims.exp)
    }

    fn token_expired(token: &str) -> bool {
        let Some(exp) = Self::decode_token_exp(token) else {
            return false; // Can't decode = let the server decide
        };

        exp < chrono::Utc::now().timestamp()
    }

    // ============ Authenticated Request Helpers ============

    async fn authed_get(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let auth = self.auth_header().ok_or(ApiError::Unauthorized)?;
        self.client
            .get(self.url(path))
            .header("Authorization", auth)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_post<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ApiError> {
        let auth = self.auth_header().ok_or(ApiError::Unauthorized)?;
        self.client
            .post(self.url(path))
            .header("Authorization", auth)
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    /// PUT without a body (the like toggle)
    async fn authed_put_empty(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let auth = self.auth_header().ok_or(ApiError::Unauthorized)?;
        self.client
            .put(self.url(path))
            .header("Authorization", auth)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_delete(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let auth = self.auth_header().ok_or(ApiError::Unauthorized)?;
        self.client
            .delete(self.url(path))
            .header("Authorization", auth)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_post_multipart(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<reqwest::Response, ApiError> {
        let auth = self.auth_header().ok_or(ApiError::Unauthorized)?;
        self.client
            .post(self.url(path))
            .header("Authorization", auth)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    async fn authed_put_multipart(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> Result<reqwest::Response, ApiError> {
        let auth = self.auth_header().ok_or(ApiError::Unauthorized)?;
        self.client
            .put(self.url(path))
            .header("Authorization", auth)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::Network)
    }

    /// Handle API response
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::CREATED => {
                response.json().await.map_err(ApiError::Network)
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::BAD_REQUEST => Err(ApiError::Validation(error_message(response).await)),
            StatusCode::CONFLICT => Err(ApiError::Conflict(error_message(response).await)),
            _ => Err(ApiError::Server(format!(
                "{}: {}",
                status,
                error_message(response).await
            ))),
        }
    }

    /// Handle response whose body we don't need
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<(), ApiError> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::BAD_REQUEST => Err(ApiError::Validation(error_message(response).await)),
            StatusCode::CONFLICT => Err(ApiError::Conflict(error_message(response).await)),
            _ => Err(ApiError::Server(format!(
                "{}: {}",
                status,
                error_message(response).await
            ))),
        }
    }

    // ============ Auth ============

    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, ApiError> {
        let req = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(&req)
            .send()
            .await?;

        let auth: AuthResponse = self.handle_response(response).await?;
        self.store_session(auth)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<Session, ApiError> {
        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };

        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&req)
            .send()
            .await?;

        let auth: AuthResponse = self.handle_response(response).await?;
        self.store_session(auth)
    }

    fn store_session(&mut self, auth: AuthResponse) -> Result<Session, ApiError> {
        let session = Session {
            id: auth.id,
            username: auth.username,
            email: auth.email,
            avatar: auth.avatar,
            token: auth.token,
        };

        session.save().map_err(ApiError::Other)?;
        self.session = Some(session.clone());

        Ok(session)
    }

    /// Tokens are stateless, so logging out is purely local: drop the
    /// session and remove it from disk.
    pub fn logout(&mut self) -> Result<(), ApiError> {
        self.session = None;
        Session::delete().map_err(ApiError::Other)?;
        Ok(())
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        let response = self.authed_get("/auth/me").await?;
        self.handle_response(response).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, ApiError> {
        let path = format!("/auth/search?q={}", urlencoding::encode(query));
        let response = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(ApiError::Network)?;

        self.handle_response(response).await
    }

    pub async fn update_avatar(&mut self, path: &Path) -> Result<User, ApiError> {
        let form = multipart::Form::new().part("avatar", file_part(path).await?);
        let response = self.authed_put_multipart("/auth/avatar", form).await?;
        let user: User = self.handle_response(response).await?;

        // Keep the stored session's avatar current
        if let Some(session) = self.session.as_mut() {
            session.avatar = user.avatar.clone();
            session.save().map_err(ApiError::Other)?;
        }

        Ok(user)
    }

    // ============ Posts ============

    pub async fn fetch_posts(&self, author: Option<Uuid>) -> Result<Vec<PostView>, ApiError> {
        let path = match author {
            Some(id) => format!("/posts?userId={}", id),
            None => "/posts".to_string(),
        };

        let response = self
            .client
            .get(self.url(&path))
            .send()
            .await
            .map_err(ApiError::Network)?;

        self.handle_response(response).await
    }

    pub async fn create_post(
        &self,
        content: &str,
        image: Option<&Path>,
    ) -> Result<PostView, ApiError> {
        let mut form = multipart::Form::new().text("content", content.to_string());
        if let Some(path) = image {
            form = form.part("image", file_part(path).await?);
        }

        let response = self.authed_post_multipart("/posts", form).await?;
        self.handle_response(response).await
    }

    pub async fn toggle_like(&self, post_id: Uuid) -> Result<PostView, ApiError> {
        let response = self
            .authed_put_empty(&format!("/posts/{}/like", post_id))
            .await?;
        self.handle_response(response).await
    }

    pub async fn add_comment(&self, post_id: Uuid, text: &str) -> Result<PostView, ApiError> {
        let req = CommentRequest {
            text: text.to_string(),
        };
        let response = self
            .authed_post(&format!("/posts/{}/comment", post_id), &req)
            .await?;
        self.handle_response(response).await
    }

    pub async fn delete_post(&self, post_id: Uuid) -> Result<(), ApiError> {
        let response = self.authed_delete(&format!("/posts/{}", post_id)).await?;
        self.handle_empty_response(response).await
    }
}

/// Error message out of a failed response, falling back to the status
/// text when the body is not the expected JSON shape.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();

    match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

/// Read a local file into a multipart part named after the file.
async fn file_part(path: &Path) -> Result<multipart::Part, ApiError> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    Ok(multipart::Part::bytes(bytes).file_name(file_name))
}
