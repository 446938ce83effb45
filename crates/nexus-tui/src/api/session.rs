use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logged-in account plus its bearer token, persisted so the user stays
/// signed in between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar: String,
    pub token: String,
}

impl Session {
    /// Get the path to the session file
    fn session_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("nexus-tui");

        fs::create_dir_all(&config_dir).context("Could not create config directory")?;

        Ok(config_dir.join("session.json"))
    }

    /// Load the session from disk
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::session_path()?)
    }

    fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path).context("Could not read session file")?;

        let session: Self =
            serde_json::from_str(&contents).context("Could not parse session file")?;

        Ok(Some(session))
    }

    /// Save the session to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::session_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Could not serialize session")?;

        fs::write(path, contents).context("Could not write session file")?;

        Ok(())
    }

    /// Delete the stored session
    pub fn delete() -> Result<()> {
        let path = Self::session_path()?;

        if path.exists() {
            fs::remove_file(&path).context("Could not delete session file")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("session.json");

        let session = Session {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            avatar: "http://localhost:3000/uploads/a.png".to_string(),
            token: "some.jwt.token".to_string(),
        };

        session.save_to(&path).unwrap();
        let loaded = Session::load_from(&path).unwrap().unwrap();

        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.username, session.username);
        assert_eq!(loaded.email, session.email);
        assert_eq!(loaded.avatar, session.avatar);
        assert_eq!(loaded.token, session.token);
    }

    #[test]
    fn missing_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = Session::load_from(&tmp.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }
}
