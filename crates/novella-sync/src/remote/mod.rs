//! The authoritative, networked store.
//!
//! [`RemoteStore`] is the seam between the orchestrator and whatever backend
//! holds the confirmed records. [`HttpRemote`] talks to the REST server;
//! [`MemoryRemote`] is an in-process stand-in with failure injection.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::{FailureMode, MemoryRemote};

use async_trait::async_trait;
use thiserror::Error;

use novella_shared::models::{
    NewStory, ProfilePatch, ProfileUpsert, Story, StoryPatch, UserProfile,
};
use novella_shared::SearchFilters;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure, timeout or 5xx. The orchestrator falls back to cache.
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Record not found")]
    NotFound,

    #[error("Record already exists")]
    AlreadyExists,

    #[error("Remote error: {0}")]
    Other(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_stories(&self) -> RemoteResult<Vec<Story>>;
    async fn get_story(&self, id: &str) -> RemoteResult<Story>;

    /// Create with a server-assigned id and timestamps.
    async fn create_story(&self, new: &NewStory) -> RemoteResult<Story>;

    /// Insert under the story's own id, keeping its timestamps. Fails with
    /// [`RemoteError::AlreadyExists`] if the id is taken.
    async fn import_story(&self, story: &Story) -> RemoteResult<Story>;

    async fn update_story(&self, id: &str, patch: &StoryPatch) -> RemoteResult<Story>;
    async fn delete_story(&self, id: &str) -> RemoteResult<()>;

    async fn search_stories(
        &self,
        text: &str,
        filters: &SearchFilters,
    ) -> RemoteResult<Vec<Story>>;
    async fn popular_stories(&self, limit: usize) -> RemoteResult<Vec<Story>>;
    async fn recent_stories(&self, limit: usize) -> RemoteResult<Vec<Story>>;
    async fn stories_by_owner(&self, user_id: &str) -> RemoteResult<Vec<Story>>;

    async fn list_profiles(&self) -> RemoteResult<Vec<UserProfile>>;
    async fn get_profile(&self, uid: &str) -> RemoteResult<UserProfile>;
    async fn upsert_profile(&self, uid: &str, upsert: &ProfileUpsert)
        -> RemoteResult<UserProfile>;
    async fn update_profile(&self, uid: &str, patch: &ProfilePatch)
        -> RemoteResult<UserProfile>;
}
