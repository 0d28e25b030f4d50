//! The authoritative record store behind the REST API.
//!
//! All records live in memory behind one lock and are written out as a JSON
//! snapshot (codec wire format) after every mutation. The snapshot is written
//! to a sibling temp file and renamed over the old one, so a crash mid-write
//! leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use novella_shared::authority::Authority;
use novella_shared::codec::Entity;
use novella_shared::models::{
    NewStory, ProfilePatch, ProfileUpsert, Story, StoryPatch, UserProfile,
};
use novella_shared::{query, SearchFilters};

use crate::error::ServerError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    stories: Vec<Value>,
    #[serde(default)]
    profiles: Vec<Value>,
}

impl Snapshot {
    fn capture(authority: &Authority) -> Self {
        Self {
            stories: authority.stories().iter().map(Entity::encode).collect(),
            profiles: authority.profiles().iter().map(Entity::encode).collect(),
        }
    }

    fn restore(self) -> Result<Authority, ServerError> {
        let stories = self
            .stories
            .into_iter()
            .map(Story::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::Storage(format!("Corrupt story snapshot: {e}")))?;
        let profiles = self
            .profiles
            .into_iter()
            .map(UserProfile::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ServerError::Storage(format!("Corrupt profile snapshot: {e}")))?;
        Ok(Authority::from_records(stories, profiles))
    }
}

pub struct Backend {
    authority: RwLock<Authority>,
    snapshot_path: Option<PathBuf>,
}

impl Backend {
    /// A backend that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Self {
            authority: RwLock::new(Authority::new()),
            snapshot_path: None,
        }
    }

    /// Load the snapshot at `path`, or start empty if there is none yet.
    pub async fn open(path: PathBuf) -> Result<Self, ServerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                ServerError::Storage(format!(
                    "Failed to create data directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let authority = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<Snapshot>(&raw)
                .map_err(|e| ServerError::Storage(format!("Unreadable snapshot: {e}")))?
                .restore()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Authority::new(),
            Err(e) => {
                return Err(ServerError::Storage(format!(
                    "Failed to read '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        info!(
            path = %path.display(),
            stories = authority.stories().len(),
            profiles = authority.profiles().len(),
            "Backend loaded"
        );

        Ok(Self {
            authority: RwLock::new(authority),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self, authority: &Authority) -> Result<(), ServerError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let payload = serde_json::to_vec(&Snapshot::capture(authority))
            .map_err(|e| ServerError::Storage(format!("Snapshot encoding failed: {e}")))?;
        let tmp = tmp_path(path);
        fs::write(&tmp, &payload)
            .await
            .map_err(|e| ServerError::Storage(format!("Failed to write snapshot: {e}")))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| ServerError::Storage(format!("Failed to replace snapshot: {e}")))?;

        debug!(bytes = payload.len(), "Snapshot written");
        Ok(())
    }

    /// Apply `edit` to a copy of the records, save the copy, and only then
    /// make it the served state. A rejected edit or a failed save leaves the
    /// served records untouched.
    async fn commit<T>(
        &self,
        edit: impl FnOnce(&mut Authority) -> Result<T, ServerError>,
    ) -> Result<T, ServerError> {
        let mut authority = self.authority.write().await;
        let mut next = authority.clone();
        let out = edit(&mut next)?;
        self.persist(&next).await?;
        *authority = next;
        Ok(out)
    }

    // -- Stories --

    pub async fn stories(&self) -> Vec<Story> {
        self.authority.read().await.stories().to_vec()
    }

    pub async fn story(&self, id: &str) -> Result<Story, ServerError> {
        self.authority
            .read()
            .await
            .story(id)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("story {id}")))
    }

    pub async fn search(&self, text: &str, filters: &SearchFilters) -> Vec<Story> {
        query::search(self.stories().await, text, filters)
    }

    pub async fn popular(&self, limit: usize) -> Vec<Story> {
        query::popular(self.stories().await, limit)
    }

    pub async fn recent(&self, limit: usize) -> Vec<Story> {
        query::recent(self.stories().await, limit)
    }

    pub async fn by_owner(&self, user_id: &str) -> Vec<Story> {
        query::by_owner(self.stories().await, user_id)
    }

    pub async fn create_story(&self, new: NewStory) -> Result<Story, ServerError> {
        let story = self
            .commit(|authority| Ok(authority.create_story(new, Utc::now())))
            .await?;
        info!(id = %story.id, "Story created");
        Ok(story)
    }

    pub async fn import_story(&self, story: Story) -> Result<Story, ServerError> {
        let what = format!("story {}", story.id);
        let story = self
            .commit(|authority| {
                authority
                    .import_story(story)
                    .map_err(|e| ServerError::from_authority(e, &what))
            })
            .await?;
        info!(id = %story.id, "Story imported");
        Ok(story)
    }

    pub async fn update_story(&self, id: &str, patch: StoryPatch) -> Result<Story, ServerError> {
        self.commit(|authority| {
            authority
                .update_story(id, patch, Utc::now())
                .map_err(|e| ServerError::from_authority(e, &format!("story {id}")))
        })
        .await
    }

    pub async fn delete_story(&self, id: &str) -> Result<(), ServerError> {
        self.commit(|authority| {
            authority
                .delete_story(id)
                .map_err(|e| ServerError::from_authority(e, &format!("story {id}")))
        })
        .await?;
        info!(id, "Story deleted");
        Ok(())
    }

    // -- Profiles --

    pub async fn profiles(&self) -> Vec<UserProfile> {
        self.authority.read().await.profiles().to_vec()
    }

    pub async fn profile(&self, uid: &str) -> Result<UserProfile, ServerError> {
        self.authority
            .read()
            .await
            .profile(uid)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("profile {uid}")))
    }

    pub async fn upsert_profile(
        &self,
        uid: &str,
        upsert: ProfileUpsert,
    ) -> Result<UserProfile, ServerError> {
        self.commit(|authority| Ok(authority.upsert_profile(uid, upsert, Utc::now())))
            .await
    }

    pub async fn update_profile(
        &self,
        uid: &str,
        patch: ProfilePatch,
    ) -> Result<UserProfile, ServerError> {
        self.commit(|authority| {
            authority
                .update_profile(uid, patch, Utc::now())
                .map_err(|e| ServerError::from_authority(e, &format!("profile {uid}")))
        })
        .await
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use novella_shared::models::ProfileForm;
    use tempfile::TempDir;

    fn new_story(title: &str) -> NewStory {
        NewStory {
            title: title.into(),
            content: "The fog rolled in.".into(),
            author: "Poe".into(),
            user_id: "u1".into(),
            tags: vec!["mystery".into()],
        }
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("novella.json");

        let backend = Backend::open(path.clone()).await.unwrap();
        let story = backend.create_story(new_story("Fog")).await.unwrap();
        backend
            .upsert_profile(
                "u1",
                ProfileUpsert {
                    email: "u1@example.com".into(),
                    form: ProfileForm {
                        display_name: "Ellery".into(),
                        favorite_genre: "推理小説".into(),
                        bio: None,
                        favorite_author: None,
                    },
                },
            )
            .await
            .unwrap();
        drop(backend);

        let reopened = Backend::open(path).await.unwrap();
        assert_eq!(reopened.story(&story.id).await.unwrap().title, "Fog");
        assert_eq!(reopened.profile("u1").await.unwrap().display_name, "Ellery");
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novella.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        assert!(matches!(
            Backend::open(path).await,
            Err(ServerError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_import_conflict_and_missing_delete() {
        let backend = Backend::in_memory();
        let story = backend.create_story(new_story("Fog")).await.unwrap();

        assert!(matches!(
            backend.import_story(story).await,
            Err(ServerError::Conflict(_))
        ));
        assert!(matches!(
            backend.delete_story("missing").await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_queries() {
        let backend = Backend::in_memory();
        backend.create_story(new_story("Fog over London")).await.unwrap();
        backend.create_story(new_story("The Clock Tower")).await.unwrap();

        let hits = backend.search("clock", &SearchFilters::default()).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(backend.by_owner("u1").await.len(), 2);
        assert_eq!(backend.recent(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_records_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novella.json");
        let backend = Backend::open(path.clone()).await.unwrap();
        let kept = backend.create_story(new_story("Fog")).await.unwrap();

        // A directory squatting on the temp file makes every save fail.
        std::fs::create_dir(tmp_path(&path)).unwrap();

        assert!(matches!(
            backend.create_story(new_story("Tower")).await,
            Err(ServerError::Storage(_))
        ));
        assert!(backend
            .update_story(
                &kept.id,
                StoryPatch {
                    title: Some("Fog (revised)".into()),
                    ..Default::default()
                },
            )
            .await
            .is_err());
        assert!(backend.delete_story(&kept.id).await.is_err());

        let stories = backend.stories().await;
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].title, "Fog");

        // Once saves work again the next write goes through exactly once.
        std::fs::remove_dir(tmp_path(&path)).unwrap();
        backend.create_story(new_story("Tower")).await.unwrap();
        assert_eq!(backend.stories().await.len(), 2);
        assert_eq!(Backend::open(path).await.unwrap().stories().await.len(), 2);
    }

    #[test]
    fn test_tmp_path_is_a_sibling() {
        let tmp = tmp_path(Path::new("/var/lib/novella/novella.json"));
        assert_eq!(tmp, Path::new("/var/lib/novella/novella.json.tmp"));
    }
}
