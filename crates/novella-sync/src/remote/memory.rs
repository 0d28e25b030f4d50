//! In-process remote store with failure injection.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use novella_shared::authority::{Authority, AuthorityError};
use novella_shared::models::{
    NewStory, ProfilePatch, ProfileUpsert, Story, StoryPatch, UserProfile,
};
use novella_shared::{query, SearchFilters};

use super::{RemoteError, RemoteResult, RemoteStore};

/// How the next calls should fail, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    /// Every call fails as if the network were down.
    Unreachable,
    /// Every call is rejected as unauthorised.
    PermissionDenied,
}

#[derive(Default)]
struct State {
    authority: Authority,
    failure: FailureMode,
    calls: usize,
}

#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl From<AuthorityError> for RemoteError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::NotFound => RemoteError::NotFound,
            AuthorityError::AlreadyExists => RemoteError::AlreadyExists,
        }
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and apply the failure mode.
    fn enter(&self) -> RemoteResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls += 1;
        match state.failure {
            FailureMode::None => Ok(state),
            FailureMode::Unreachable => Err(RemoteError::Unreachable("injected".into())),
            FailureMode::PermissionDenied => {
                Err(RemoteError::PermissionDenied("injected".into()))
            }
        }
    }

    pub fn set_failure(&self, mode: FailureMode) {
        self.lock().failure = mode;
    }

    /// Number of calls received so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Seed a record directly, bypassing failure injection.
    pub fn seed_story(&self, story: Story) {
        let mut state = self.lock();
        // Seeding over an existing id replaces it.
        let _ = state.authority.delete_story(&story.id);
        let _ = state.authority.import_story(story);
    }

    /// Inspect a record directly, bypassing failure injection.
    pub fn story(&self, id: &str) -> Option<Story> {
        self.lock().authority.story(id).cloned()
    }

    pub fn stories(&self) -> Vec<Story> {
        self.lock().authority.stories().to_vec()
    }

    pub fn profile(&self, uid: &str) -> Option<UserProfile> {
        self.lock().authority.profile(uid).cloned()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list_stories(&self) -> RemoteResult<Vec<Story>> {
        Ok(self.enter()?.authority.stories().to_vec())
    }

    async fn get_story(&self, id: &str) -> RemoteResult<Story> {
        self.enter()?
            .authority
            .story(id)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn create_story(&self, new: &NewStory) -> RemoteResult<Story> {
        Ok(self.enter()?.authority.create_story(new.clone(), Utc::now()))
    }

    async fn import_story(&self, story: &Story) -> RemoteResult<Story> {
        Ok(self.enter()?.authority.import_story(story.clone())?)
    }

    async fn update_story(&self, id: &str, patch: &StoryPatch) -> RemoteResult<Story> {
        Ok(self
            .enter()?
            .authority
            .update_story(id, patch.clone(), Utc::now())?)
    }

    async fn delete_story(&self, id: &str) -> RemoteResult<()> {
        Ok(self.enter()?.authority.delete_story(id)?)
    }

    async fn search_stories(
        &self,
        text: &str,
        filters: &SearchFilters,
    ) -> RemoteResult<Vec<Story>> {
        let all = self.enter()?.authority.stories().to_vec();
        Ok(query::search(all, text, filters))
    }

    async fn popular_stories(&self, limit: usize) -> RemoteResult<Vec<Story>> {
        let all = self.enter()?.authority.stories().to_vec();
        Ok(query::popular(all, limit))
    }

    async fn recent_stories(&self, limit: usize) -> RemoteResult<Vec<Story>> {
        let all = self.enter()?.authority.stories().to_vec();
        Ok(query::recent(all, limit))
    }

    async fn stories_by_owner(&self, user_id: &str) -> RemoteResult<Vec<Story>> {
        let all = self.enter()?.authority.stories().to_vec();
        Ok(query::by_owner(all, user_id))
    }

    async fn list_profiles(&self) -> RemoteResult<Vec<UserProfile>> {
        Ok(self.enter()?.authority.profiles().to_vec())
    }

    async fn get_profile(&self, uid: &str) -> RemoteResult<UserProfile> {
        self.enter()?
            .authority
            .profile(uid)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn upsert_profile(
        &self,
        uid: &str,
        upsert: &ProfileUpsert,
    ) -> RemoteResult<UserProfile> {
        Ok(self
            .enter()?
            .authority
            .upsert_profile(uid, upsert.clone(), Utc::now()))
    }

    async fn update_profile(
        &self,
        uid: &str,
        patch: &ProfilePatch,
    ) -> RemoteResult<UserProfile> {
        Ok(self
            .enter()?
            .authority
            .update_profile(uid, patch.clone(), Utc::now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_story() -> NewStory {
        NewStory {
            title: "Fog".into(),
            content: "body".into(),
            author: "Poe".into(),
            user_id: "u1".into(),
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let remote = MemoryRemote::new();
        remote.create_story(&new_story()).await.unwrap();

        remote.set_failure(FailureMode::Unreachable);
        assert!(matches!(
            remote.list_stories().await,
            Err(RemoteError::Unreachable(_))
        ));

        remote.set_failure(FailureMode::PermissionDenied);
        assert!(matches!(
            remote.create_story(&new_story()).await,
            Err(RemoteError::PermissionDenied(_))
        ));

        remote.set_failure(FailureMode::None);
        assert_eq!(remote.list_stories().await.unwrap().len(), 1);
        assert_eq!(remote.calls(), 4);
    }

    #[tokio::test]
    async fn test_import_conflict() {
        let remote = MemoryRemote::new();
        let created = remote.create_story(&new_story()).await.unwrap();
        assert_eq!(
            remote.import_story(&created).await,
            Err(RemoteError::AlreadyExists)
        );
    }
}
