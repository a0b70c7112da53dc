use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::{UserId, UserRatings};

/// First id handed out to a new user
pub const FIRST_USER_ID: UserId = 10_000;

/// A user as returned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub user_id: UserId,
    pub ratings: UserRatings,
    /// True when this call registered the user
    pub created: bool,
}

/// Persistence for usernames, ids and ratings
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks a user up by name, registering them with a fresh id if unknown
    async fn get_or_create(&self, username: &str) -> AppResult<StoredUser>;

    /// Replaces the stored ratings of `username`
    async fn save(&self, username: &str, ratings: &UserRatings) -> AppResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct UserRecord {
    id: UserId,
    #[serde(default)]
    rated_movies: UserRatings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct UsersFile {
    #[serde(default = "default_counter")]
    user_id_counter: UserId,
    #[serde(default)]
    users: BTreeMap<String, UserRecord>,
}

fn default_counter() -> UserId {
    FIRST_USER_ID
}

impl Default for UsersFile {
    fn default() -> Self {
        Self {
            user_id_counter: FIRST_USER_ID,
            users: BTreeMap::new(),
        }
    }
}

impl UsersFile {
    /// Repairs what a hand-edited file might get wrong
    fn normalized(mut self) -> Self {
        for record in self.users.values_mut() {
            record.rated_movies = std::mem::take(&mut record.rated_movies).sanitized();
        }
        let next_free = self
            .users
            .values()
            .map(|r| r.id + 1)
            .max()
            .unwrap_or(FIRST_USER_ID);
        self.user_id_counter = self.user_id_counter.max(next_free).max(FIRST_USER_ID);
        self
    }
}

/// User store backed by a single JSON file
///
/// The whole file is loaded at open and rewritten on every change. A missing or
/// unreadable file starts an empty store rather than failing.
pub struct JsonUserStore {
    path: PathBuf,
    data: RwLock<UsersFile>,
}

impl JsonUserStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<UsersFile>(&contents) {
                Ok(data) => {
                    let data = data.normalized();
                    tracing::info!(path = %path.display(), users = data.users.len(), "Loaded user file");
                    data
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "User file is corrupt; starting empty");
                    UsersFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No user file yet; starting empty");
                UsersFile::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read user file; starting empty");
                UsersFile::default()
            }
        };

        Self {
            path,
            data: RwLock::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn user_count(&self) -> usize {
        self.data.read().await.users.len()
    }

    async fn persist(&self, data: &UsersFile) -> AppResult<()> {
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), users = data.users.len(), "User file saved");
        Ok(())
    }
}

fn checked_username(username: &str) -> AppResult<&str> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::InvalidInput("username must not be empty".to_string()));
    }
    Ok(username)
}

#[async_trait]
impl UserStore for JsonUserStore {
    async fn get_or_create(&self, username: &str) -> AppResult<StoredUser> {
        let username = checked_username(username)?;

        if let Some(record) = self.data.read().await.users.get(username) {
            return Ok(StoredUser {
                user_id: record.id,
                ratings: record.rated_movies.clone(),
                created: false,
            });
        }

        let mut data = self.data.write().await;
        // Another caller may have registered the name while we waited
        if let Some(record) = data.users.get(username) {
            return Ok(StoredUser {
                user_id: record.id,
                ratings: record.rated_movies.clone(),
                created: false,
            });
        }

        // Memory only changes once the file has been written
        let mut updated = data.clone();
        let user_id = updated.user_id_counter;
        updated.user_id_counter += 1;
        updated.users.insert(
            username.to_string(),
            UserRecord {
                id: user_id,
                rated_movies: UserRatings::new(),
            },
        );
        self.persist(&updated).await?;
        *data = updated;
        tracing::info!(username, user_id, "Registered new user");

        Ok(StoredUser {
            user_id,
            ratings: UserRatings::new(),
            created: true,
        })
    }

    async fn save(&self, username: &str, ratings: &UserRatings) -> AppResult<()> {
        let username = checked_username(username)?;
        let mut data = self.data.write().await;
        if !data.users.contains_key(username) {
            return Err(AppError::NotFound(format!("user '{}'", username)));
        }

        let mut updated = data.clone();
        if let Some(record) = updated.users.get_mut(username) {
            record.rated_movies = ratings.clone();
        }
        self.persist(&updated).await?;
        *data = updated;
        tracing::info!(username, rating_count = ratings.len(), "Saved ratings");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("marquee-users-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let path = temp_path();
        let store = JsonUserStore::open(&path).await;
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_new_users_get_sequential_ids() {
        let path = temp_path();
        let store = JsonUserStore::open(&path).await;

        let alice = store.get_or_create("alice").await.unwrap();
        let bob = store.get_or_create("bob").await.unwrap();
        let again = store.get_or_create("alice").await.unwrap();

        assert_eq!(alice.user_id, FIRST_USER_ID);
        assert!(alice.created);
        assert_eq!(bob.user_id, FIRST_USER_ID + 1);
        assert_eq!(again.user_id, alice.user_id);
        assert!(!again.created);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_ratings_survive_reopen() {
        let path = temp_path();
        {
            let store = JsonUserStore::open(&path).await;
            store.get_or_create("carol").await.unwrap();
            let ratings: UserRatings = [(1, 5), (50, 3)].into_iter().collect();
            assert_ok!(store.save("carol", &ratings).await);
        }

        let store = JsonUserStore::open(&path).await;
        let carol = store.get_or_create("carol").await.unwrap();
        assert_eq!(carol.ratings.get(1), Some(5));
        assert_eq!(carol.ratings.get(50), Some(3));

        let dave = store.get_or_create("dave").await.unwrap();
        assert_eq!(dave.user_id, FIRST_USER_ID + 1);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_file_format() {
        let path = temp_path();
        let store = JsonUserStore::open(&path).await;
        store.get_or_create("erin").await.unwrap();
        let ratings: UserRatings = [(100, 4)].into_iter().collect();
        assert_ok!(store.save("erin", &ratings).await);

        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw["user_id_counter"], 10_001);
        assert_eq!(raw["users"]["erin"]["id"], 10_000);
        assert_eq!(raw["users"]["erin"]["rated_movies"]["100"], 4);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let path = temp_path();
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let store = JsonUserStore::open(&path).await;
        assert_eq!(store.user_count().await, 0);
        assert_eq!(store.get_or_create("frank").await.unwrap().user_id, FIRST_USER_ID);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_hand_edited_file_is_normalized() {
        let path = temp_path();
        let contents = r#"{"user_id_counter": 3, "users": {"gina": {"id": 10004, "rated_movies": {"1": 9, "50": 2}}}}"#;
        tokio::fs::write(&path, contents).await.unwrap();

        let store = JsonUserStore::open(&path).await;
        let gina = store.get_or_create("gina").await.unwrap();
        assert_eq!(gina.ratings.len(), 1);
        assert_eq!(gina.ratings.get(50), Some(2));
        assert_eq!(store.get_or_create("hank").await.unwrap().user_id, 10_005);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        // Parent directory does not exist, so every write fails
        let path = std::env::temp_dir()
            .join(format!("marquee-missing-{}", Uuid::new_v4()))
            .join("users.json");
        let store = JsonUserStore::open(&path).await;

        assert_err!(store.get_or_create("ivy").await);
        assert_eq!(store.user_count().await, 0);
        // Still unknown, and the failed attempt did not burn an id
        assert_err!(store.get_or_create("ivy").await);
        assert_eq!(store.data.read().await.user_id_counter, FIRST_USER_ID);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_ratings() {
        let path = temp_path();
        let store = JsonUserStore::open(&path).await;
        store.get_or_create("jo").await.unwrap();
        let first: UserRatings = [(1, 5)].into_iter().collect();
        assert_ok!(store.save("jo", &first).await);

        // Swap the file for a directory so the rename fails
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();
        let second: UserRatings = [(1, 2), (50, 4)].into_iter().collect();
        assert_err!(store.save("jo", &second).await);

        let jo = store.get_or_create("jo").await.unwrap();
        assert_eq!(jo.ratings, first);

        let _ = tokio::fs::remove_dir(&path).await;
        let _ = tokio::fs::remove_file(path.with_extension("json.tmp")).await;
    }

    #[tokio::test]
    async fn test_blank_username_and_unknown_user_are_rejected() {
        let store = JsonUserStore::open(temp_path()).await;
        assert!(matches!(
            store.get_or_create("   ").await,
            Err(AppError::InvalidInput(_))
        ));
        let missing = assert_err!(store.save("nobody", &UserRatings::new()).await);
        assert!(matches!(missing, AppError::NotFound(_)));
    }
}
