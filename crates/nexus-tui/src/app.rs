use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use nexus_shared::{PostView, UserSummary};
use tokio::sync::mpsc;

use crate::api::ApiClient;
use crate::search::SearchDebounce;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    VerifyingSession,
    Feed,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VimMode {
    Normal,
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Username,
    Email,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeField {
    Content,
    Image,
}

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Tick,
    VerifySession,
    SearchResults {
        seq: u64,
        result: Result<Vec<UserSummary>, String>,
    },
}

pub struct App {
    pub api: ApiClient,
    pub view: View,
    pub vim_mode: VimMode,

    // Loading state
    pub loading: bool,
    pub loading_message: String,
    pub error_message: Option<String>,

    // Login/Register form
    pub auth_mode: AuthMode,
    pub auth_field: InputField,
    pub auth_username: String,
    pub auth_email: String,
    pub auth_password: String,

    // Feed
    pub posts: Vec<PostView>,
    pub selected_post: usize,

    // Profile being viewed
    pub profile_user: Option<UserSummary>,
    pub profile_posts: Vec<PostView>,
    pub selected_profile_post: usize,

    // Compose popup
    pub composing: bool,
    pub compose_field: ComposeField,
    pub compose_content: String,
    pub compose_image_path: String,

    // Comment popup
    pub commenting: bool,
    pub comment_text: String,

    // Avatar popup
    pub editing_avatar: bool,
    pub avatar_path: String,

    // Delete confirmation
    pub confirming_delete: bool,

    // Search overlay
    pub searching: bool,
    pub search_query: String,
    pub search_results: Vec<UserSummary>,
    pub selected_result: usize,
    pub search: SearchDebounce,
}

impl App {
    pub fn new(api: ApiClient, has_session: bool) -> Self {
        let view = if has_session {
            View::VerifyingSession
        } else {
            View::Login
        };

        Self {
            api,
            view,
            vim_mode: VimMode::Normal,
            loading: false,
            loading_message: String::new(),
            error_message: None,
            auth_mode: AuthMode::Login,
            auth_field: InputField::Username,
            auth_username: String::new(),
            auth_email: String::new(),
            auth_password: String::new(),
            posts: Vec::new(),
            selected_post: 0,
            profile_user: None,
            profile_posts: Vec::new(),
            selected_profile_post: 0,
            composing: false,
            compose_field: ComposeField::Content,
            compose_content: String::new(),
            compose_image_path: String::new(),
            commenting: false,
            comment_text: String::new(),
            editing_avatar: false,
            avatar_path: String::new(),
            confirming_delete: false,
            searching: false,
            search_query: String::new(),
            search_results: Vec::new(),
            selected_result: 0,
            search: SearchDebounce::new(),
        }
    }

    pub fn set_loading(&mut self, loading: bool, message: &str) {
        self.loading = loading;
        self.loading_message = message.to_string();
    }

    pub fn set_error(&mut self, message: String) {
        self.error_message = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Handle key events, returns true if app should quit
    pub async fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Any key dismisses an error popup; Esc does only that
        if self.error_message.is_some() {
            self.clear_error();
            if key.code == KeyCode::Esc {
                return Ok(false);
            }
        }

        // Global quit with Ctrl+C
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(true);
        }

        match self.view {
            View::Login => self.handle_login_key(key).await,
            View::VerifyingSession => Ok(false), // No input during verification
            View::Feed => self.handle_feed_key(key).await,
            View::Profile => self.handle_profile_key(key).await,
        }
    }

    async fn handle_login_key(&mut self, key: KeyEvent) -> Result<bool> {
        if self.loading {
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') if self.vim_mode == VimMode::Normal => return Ok(true),
            KeyCode::Esc => {
                if self.vim_mode == VimMode::Insert {
                    self.vim_mode = VimMode::Normal;
                }
            }
            KeyCode::Char('i') if self.vim_mode == VimMode::Normal => {
                self.vim_mode = VimMode::Insert;
            }
            // Toggle between Login and Register modes
            KeyCode::Char('r') if self.vim_mode == VimMode::Normal => {
                self.auth_mode = AuthMode::Register;
                self.auth_field = InputField::Username;
            }
            KeyCode::Char('l') if self.vim_mode == VimMode::Normal => {
                self.auth_mode = AuthMode::Login;
                self.auth_field = InputField::Username;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.auth_field = match (self.auth_mode, self.auth_field) {
                    (AuthMode::Login, InputField::Username) => InputField::Password,
                    (AuthMode::Login, InputField::Password) => InputField::Username,
                    (AuthMode::Login, InputField::Email) => InputField::Username,
                    (AuthMode::Register, InputField::Username) => InputField::Email,
                    (AuthMode::Register, InputField::Email) => InputField::Password,
                    (AuthMode::Register, InputField::Password) => InputField::Username,
                };
            }
            KeyCode::Char('j') | KeyCode::Down if self.vim_mode == VimMode::Normal => {
                self.auth_field = match (self.auth_mode, self.auth_field) {
                    (AuthMode::Login, InputField::Username) => InputField::Password,
                    (AuthMode::Register, InputField::Username) => InputField::Email,
                    (AuthMode::Register, InputField::Email) => InputField::Password,
                    _ => self.auth_field,
                };
            }
            KeyCode::Char('k') | KeyCode::Up if self.vim_mode == VimMode::Normal => {
                self.auth_field = match (self.auth_mode, self.auth_field) {
                    (AuthMode::Login, InputField::Password) => InputField::Username,
                    (AuthMode::Register, InputField::Password) => InputField::Email,
                    (AuthMode::Register, InputField::Email) => InputField::Username,
                    _ => self.auth_field,
                };
            }
            KeyCode::Enter => match self.auth_mode {
                AuthMode::Login => {
                    if !self.auth_username.is_empty() && !self.auth_password.is_empty() {
                        self.do_login().await;
                    }
                }
                AuthMode::Register => {
                    if !self.auth_username.is_empty()
                        && !self.auth_email.is_empty()
                        && !self.auth_password.is_empty()
                    {
                        self.do_register().await;
                    }
                }
            },
            KeyCode::Char(c) if self.vim_mode == VimMode::Insert => match self.auth_field {
                InputField::Username => self.auth_username.push(c),
                InputField::Email => self.auth_email.push(c),
                InputField::Password => self.auth_password.push(c),
            },
            KeyCode::Backspace if self.vim_mode == VimMode::Insert => match self.auth_field {
                InputField::Username => {
                    self.auth_username.pop();
                }
                InputField::Email => {
                    self.auth_email.pop();
                }
                InputField::Password => {
                    self.auth_password.pop();
                }
            },
            _ => {}
        }

        Ok(false)
    }

    async fn handle_feed_key(&mut self, key: KeyEvent) -> Result<bool> {
        if self.loading {
            return Ok(false);
        }

        // Compose popup
        if self.composing {
            match key.code {
                KeyCode::Esc => {
                    self.composing = false;
                }
                KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
                    self.compose_field = match self.compose_field {
                        ComposeField::Content => ComposeField::Image,
                        ComposeField::Image => ComposeField::Content,
                    };
                }
                KeyCode::Enter => {
                    if !self.compose_content.trim().is_empty()
                        || !self.compose_image_path.trim().is_empty()
                    {
                        self.do_create_post().await;
                    }
                }
                KeyCode::Char(c) => match self.compose_field {
                    ComposeField::Content => self.compose_content.push(c),
                    ComposeField::Image => self.compose_image_path.push(c),
                },
                KeyCode::Backspace => match self.compose_field {
                    ComposeField::Content => {
                        self.compose_content.pop();
                    }
                    ComposeField::Image => {
                        self.compose_image_path.pop();
                    }
                },
                _ => {}
            }
            return Ok(false);
        }

        // Comment popup
        if self.commenting {
            match key.code {
                KeyCode::Esc => {
                    self.commenting = false;
                    self.comment_text.clear();
                }
                KeyCode::Enter => {
                    if !self.comment_text.trim().is_empty() {
                        self.do_add_comment().await;
                    }
                }
                KeyCode::Char(c) => self.comment_text.push(c),
                KeyCode::Backspace => {
                    self.comment_text.pop();
                }
                _ => {}
            }
            return Ok(false);
        }

        // Avatar popup
        if self.editing_avatar {
            match key.code {
                KeyCode::Esc => {
                    self.editing_avatar = false;
                    self.avatar_path.clear();
                }
                KeyCode::Enter => {
                    if !self.avatar_path.trim().is_empty() {
                        self.do_update_avatar().await;
                    }
                }
                KeyCode::Char(c) => self.avatar_path.push(c),
                KeyCode::Backspace => {
                    self.avatar_path.pop();
                }
                _ => {}
            }
            return Ok(false);
        }

        // Delete confirmation
        if self.confirming_delete {
            match key.code {
                KeyCode::Char('y') => self.do_delete_post().await,
                KeyCode::Char('n') | KeyCode::Esc => {
                    self.confirming_delete = false;
                }
                _ => {}
            }
            return Ok(false);
        }

        // Search overlay
        if self.searching {
            match key.code {
                KeyCode::Esc => {
                    self.searching = false;
                }
                KeyCode::Down => {
                    if self.selected_result < self.search_results.len().saturating_sub(1) {
                        self.selected_result += 1;
                    }
                }
                KeyCode::Up => {
                    if self.selected_result > 0 {
                        self.selected_result -= 1;
                    }
                }
                KeyCode::Enter => {
                    if let Some(user) = self.search_results.get(self.selected_result).cloned() {
                        self.searching = false;
                        self.open_profile(user).await;
                    }
                }
                KeyCode::Char(c) => {
                    self.search_query.push(c);
                    self.note_search_input();
                }
                KeyCode::Backspace => {
                    self.search_query.pop();
                    self.note_search_input();
                }
                _ => {}
            }
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_post < self.posts.len().saturating_sub(1) {
                    self.selected_post += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.selected_post > 0 {
                    self.selected_post -= 1;
                }
            }
            KeyCode::Char('n') => {
                self.composing = true;
                self.compose_field = ComposeField::Content;
                self.compose_content.clear();
                self.compose_image_path.clear();
            }
            KeyCode::Char(' ') => self.do_toggle_like().await,
            KeyCode::Char('c') => {
                if self.posts.get(self.selected_post).is_some() {
                    self.commenting = true;
                    self.comment_text.clear();
                }
            }
            KeyCode::Char('d') => {
                if let Some(post) = self.posts.get(self.selected_post) {
                    if Some(post.author.id) == self.api.user_id() {
                        self.confirming_delete = true;
                    } else {
                        self.set_error("Only your own posts can be deleted".to_string());
                    }
                }
            }
            KeyCode::Char('p') => {
                if let Some(post) = self.posts.get(self.selected_post) {
                    let author = post.author.clone();
                    self.open_profile(author).await;
                }
            }
            KeyCode::Char('P') => self.open_own_profile().await,
            KeyCode::Char('/') => {
                self.searching = true;
                self.search_query.clear();
                self.search_results.clear();
                self.selected_result = 0;
                self.note_search_input();
            }
            KeyCode::Char('a') => {
                self.editing_avatar = true;
                self.avatar_path.clear();
            }
            KeyCode::Char('r') => self.load_feed().await,
            KeyCode::Char('L') => self.do_logout(),
            _ => {}
        }

        Ok(false)
    }

    async fn handle_profile_key(&mut self, key: KeyEvent) -> Result<bool> {
        if self.loading {
            return Ok(false);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Esc | KeyCode::Backspace => {
                self.view = View::Feed;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_profile_post < self.profile_posts.len().saturating_sub(1) {
                    self.selected_profile_post += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.selected_profile_post > 0 {
                    self.selected_profile_post -= 1;
                }
            }
            KeyCode::Char('r') => self.load_profile().await,
            _ => {}
        }

        Ok(false)
    }

    async fn do_login(&mut self) {
        self.set_loading(true, "Logging in...");

        let username = self.auth_username.clone();
        let password = self.auth_password.clone();

        match self.api.login(&username, &password).await {
            Ok(_) => {
                self.auth_password.clear();
                self.view = View::Feed;
                self.load_feed().await;
            }
            Err(e) => {
                self.auth_password.clear();
                self.set_error(format!("Login failed: {}", e));
            }
        }

        self.set_loading(false, "");
    }

    async fn do_register(&mut self) {
        self.set_loading(true, "Registering...");

        let username = self.auth_username.clone();
        let email = self.auth_email.clone();
        let password = self.auth_password.clone();

        match self.api.register(&username, &email, &password).await {
            Ok(_) => {
                self.auth_password.clear();
                self.view = View::Feed;
                self.load_feed().await;
            }
            Err(e) => self.set_error(format!("Registration failed: {}", e)),
        }

        self.set_loading(false, "");
    }

    /// Startup check of a stored session against the server.
    pub async fn verify_session(&mut self) {
        self.set_loading(true, "Verifying session...");

        match self.api.me().await {
            Ok(_) => {
                self.view = View::Feed;
                self.load_feed().await;
            }
            Err(_) => {
                // Stored token no longer valid
                let _ = self.api.logout();
                self.view = View::Login;
            }
        }

        self.set_loading(false, "");
    }

    fn do_logout(&mut self) {
        if let Err(e) = self.api.logout() {
            self.set_error(format!("Logout failed: {}", e));
            return;
        }

        self.posts.clear();
        self.selected_post = 0;
        self.profile_user = None;
        self.profile_posts.clear();
        self.auth_mode = AuthMode::Login;
        self.auth_field = InputField::Username;
        self.auth_username.clear();
        self.auth_email.clear();
        self.auth_password.clear();
        self.view = View::Login;
    }

    async fn load_feed(&mut self) {
        self.set_loading(true, "Loading feed...");

        match self.api.fetch_posts(None).await {
            Ok(posts) => {
                self.posts = posts;
                if self.selected_post >= self.posts.len() {
                    self.selected_post = self.posts.len().saturating_sub(1);
                }
            }
            Err(e) => self.set_error(format!("Failed to load feed: {}", e)),
        }

        self.set_loading(false, "");
    }

    async fn do_create_post(&mut self) {
        self.set_loading(true, "Posting...");

        let content = self.compose_content.clone();
        let image = match self.compose_image_path.trim() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };

        match self.api.create_post(&content, image.as_deref()).await {
            Ok(post) => {
                self.composing = false;
                self.compose_content.clear();
                self.compose_image_path.clear();
                // The feed is newest-first, so the new post goes on top
                self.posts.insert(0, post);
                self.selected_post = 0;
            }
            Err(e) => self.set_error(format!("Failed to post: {}", e)),
        }

        self.set_loading(false, "");
    }

    async fn do_toggle_like(&mut self) {
        let Some(post) = self.posts.get(self.selected_post) else {
            return;
        };
        let post_id = post.id;

        self.set_loading(true, "Updating like...");

        match self.api.toggle_like(post_id).await {
            Ok(updated) => self.patch_post(updated),
            Err(e) => self.set_error(format!("Like failed: {}", e)),
        }

        self.set_loading(false, "");
    }

    async fn do_add_comment(&mut self) {
        let Some(post) = self.posts.get(self.selected_post) else {
            return;
        };
        let post_id = post.id;
        let text = self.comment_text.clone();

        self.set_loading(true, "Commenting...");

        match self.api.add_comment(post_id, &text).await {
            Ok(updated) => {
                self.commenting = false;
                self.comment_text.clear();
                self.patch_post(updated);
            }
            Err(e) => self.set_error(format!("Comment failed: {}", e)),
        }

        self.set_loading(false, "");
    }

    async fn do_delete_post(&mut self) {
        self.confirming_delete = false;

        let Some(post) = self.posts.get(self.selected_post) else {
            return;
        };
        let post_id = post.id;

        self.set_loading(true, "Deleting post...");

        match self.api.delete_post(post_id).await {
            Ok(()) => {
                self.posts.retain(|p| p.id != post_id);
                if self.selected_post >= self.posts.len() {
                    self.selected_post = self.posts.len().saturating_sub(1);
                }
            }
            Err(e) => self.set_error(format!("Delete failed: {}", e)),
        }

        self.set_loading(false, "");
    }

    async fn do_update_avatar(&mut self) {
        let path = PathBuf::from(self.avatar_path.trim());

        self.set_loading(true, "Uploading avatar...");

        match self.api.update_avatar(&path).await {
            Ok(_) => {
                self.editing_avatar = false;
                self.avatar_path.clear();
            }
            Err(e) => self.set_error(format!("Avatar update failed: {}", e)),
        }

        self.set_loading(false, "");
    }

    /// Replace the local copy of a post with the server's updated view.
    fn patch_post(&mut self, updated: PostView) {
        if let Some(slot) = self.posts.iter_mut().find(|p| p.id == updated.id) {
            *slot = updated;
        }
    }

    async fn open_profile(&mut self, user: UserSummary) {
        self.profile_user = Some(user);
        self.selected_profile_post = 0;
        self.view = View::Profile;
        self.load_profile().await;
    }

    async fn open_own_profile(&mut self) {
        let Some(session) = self.api.session() else {
            return;
        };
        let me = UserSummary {
            id: session.id,
            username: session.username.clone(),
            avatar: session.avatar.clone(),
        };

        self.open_profile(me).await;
    }

    async fn load_profile(&mut self) {
        let Some(user_id) = self.profile_user.as_ref().map(|u| u.id) else {
            return;
        };

        self.set_loading(true, "Loading profile...");

        match self.api.fetch_posts(Some(user_id)).await {
            Ok(posts) => {
                self.profile_posts = posts;
                if self.selected_profile_post >= self.profile_posts.len() {
                    self.selected_profile_post = self.profile_posts.len().saturating_sub(1);
                }
            }
            Err(e) => self.set_error(format!("Failed to load profile: {}", e)),
        }

        self.set_loading(false, "");
    }

    fn note_search_input(&mut self) {
        if self.search.input(&self.search_query, Instant::now()) {
            self.search_results.clear();
            self.selected_result = 0;
        }
    }

    /// Dispatch a due search query on its own task so typing stays
    /// responsive while the request is in flight.
    pub fn on_tick(&mut self, tx: &mpsc::Sender<AppEvent>) {
        if let Some((seq, query)) = self.search.poll(Instant::now()) {
            let api = self.api.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = api.search_users(&query).await.map_err(|e| e.to_string());
                let _ = tx.send(AppEvent::SearchResults { seq, result }).await;
            });
        }
    }

    pub fn on_search_results(&mut self, seq: u64, result: Result<Vec<UserSummary>, String>) {
        // Ignore responses that a newer query has superseded
        if !self.search.accept(seq) {
            return;
        }

        match result {
            Ok(users) => {
                self.search_results = users;
                self.selected_result = 0;
            }
            Err(e) => self.set_error(format!("Search failed: {}", e)),
        }
    }
}
