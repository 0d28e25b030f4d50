//! Pushing locally pending records once the remote is reachable again.

use tracing::{info, warn};

use novella_shared::models::{
    NewStory, ProfileForm, ProfileUpsert, Story, StoryPatch, UserProfile,
};
use novella_shared::types::is_local_id;
use novella_store::KvSubstrate;

use super::SyncOrchestrator;
use crate::error::Result;
use crate::remote::{RemoteError, RemoteResult};

/// Outcome of one [`SyncOrchestrator::sync_pending`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records the remote confirmed.
    pub pushed: usize,
    /// Offline deletes replayed on the remote.
    pub deleted: usize,
    /// Records left pending for the next pass.
    pub failed: usize,
}

impl<S: KvSubstrate> SyncOrchestrator<S> {
    /// Push every pending record and replay offline deletes.
    ///
    /// Per-record failures are logged and left pending. A no-op while the
    /// remote is unreachable.
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if !self.is_online() {
            return Ok(report);
        }

        for id in self.cache.pending_deletes()? {
            match self.remote.delete_story(&id).await {
                Ok(()) | Err(RemoteError::NotFound) => {
                    self.cache.clear_pending_delete(&id)?;
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Pending delete not replayed");
                    report.failed += 1;
                }
            }
        }

        let stories = self.cache.filter(|s: &Story| s.pending_sync)?;
        for story in stories {
            match self.push_story(&story).await {
                Ok(pushed) => {
                    self.cache.replace_id(&story.id, &pushed)?;
                    self.cache.extend_migration_ledger([pushed.id.clone()])?;
                    if pushed.pending_sync {
                        report.failed += 1;
                    } else {
                        report.pushed += 1;
                    }
                }
                Err(e) => {
                    warn!(id = %story.id, error = %e, "Pending story not pushed");
                    report.failed += 1;
                }
            }
        }

        let profiles = self.cache.filter(|p: &UserProfile| p.pending_sync)?;
        for profile in profiles {
            let upsert = ProfileUpsert {
                email: profile.email.clone(),
                form: ProfileForm::from(&profile),
            };
            match self.remote.upsert_profile(&profile.uid, &upsert).await {
                Ok(mut confirmed) => {
                    confirmed.pending_sync = false;
                    self.cache.upsert(&confirmed)?;
                    report.pushed += 1;
                }
                Err(e) => {
                    warn!(uid = %profile.uid, error = %e, "Pending profile not pushed");
                    report.failed += 1;
                }
            }
        }

        if report != SyncReport::default() {
            info!(?report, "Pending records reconciled");
        }
        Ok(report)
    }

    /// Push one pending story and return the record to cache in its place.
    ///
    /// A story created on-device is created remotely under a new id; its likes
    /// and comments follow in a second call. If only the first call succeeds
    /// the story is kept pending under the server id, so the next pass
    /// updates it rather than creating it twice.
    async fn push_story(&self, story: &Story) -> RemoteResult<Story> {
        if !is_local_id(&story.id) {
            let mut updated = self
                .remote
                .update_story(&story.id, &StoryPatch::full(story))
                .await?;
            updated.pending_sync = false;
            return Ok(updated);
        }

        let mut created = self.remote.create_story(&NewStory::from(story)).await?;
        created.pending_sync = false;
        if story.likes.is_empty() && story.comments.is_empty() {
            return Ok(created);
        }

        let social = StoryPatch {
            likes: Some(story.likes.clone()),
            comments: Some(story.comments.clone()),
            ..Default::default()
        };
        match self.remote.update_story(&created.id, &social).await {
            Ok(mut updated) => {
                updated.pending_sync = false;
                Ok(updated)
            }
            Err(e) => {
                warn!(id = %created.id, error = %e, "Likes and comments not pushed yet");
                Ok(Story {
                    id: created.id,
                    created_at: created.created_at,
                    pending_sync: true,
                    ..story.clone()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use novella_shared::models::{NewComment, StoryForm};
    use novella_shared::Story;

    use super::super::testing::{story, Harness};
    use super::SyncReport;

    fn form(title: &str) -> StoryForm {
        StoryForm {
            title: title.into(),
            content: "body".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_offline_only_is_a_no_op() {
        let h = Harness::offline();
        h.orchestrator.create_story(form("A")).await.unwrap();
        let report = h.orchestrator.sync_pending().await.unwrap();
        assert_eq!(report, SyncReport::default());
    }

    #[tokio::test]
    async fn test_local_story_is_created_under_server_id() {
        let h = Harness::offline();
        let local = h.orchestrator.create_story(form("A")).await.unwrap();
        h.orchestrator
            .add_comment(
                &local.id,
                NewComment {
                    user_id: "u2".into(),
                    user_name: Some("Queen".into()),
                    content: "nice".into(),
                },
            )
            .await
            .unwrap();
        h.orchestrator.toggle_like(&local.id, "u2").await.unwrap();

        h.go_online();
        let report = h.orchestrator.sync_pending().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed, 0);

        let cached: Vec<Story> = h.orchestrator.cache().get_all().unwrap();
        assert_eq!(cached.len(), 1);
        assert!(!cached[0].id.starts_with("local-"));
        assert!(!cached[0].pending_sync);

        let remote = h.remote.story(&cached[0].id).unwrap();
        assert_eq!(remote.comments.len(), 1);
        assert!(remote.likes.contains("u2"));

        // A second pass has nothing left to do.
        let again = h.orchestrator.sync_pending().await.unwrap();
        assert_eq!(again, SyncReport::default());
        assert_eq!(h.remote.stories().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_edit_of_remote_story_is_pushed_whole() {
        let h = Harness::offline();
        let mut seeded = story("r1", "Fog", "body", 1);
        h.remote.seed_story(seeded.clone());
        seeded.title = "Fog (revised)".into();
        seeded.pending_sync = true;
        h.orchestrator.cache().upsert(&seeded).unwrap();

        h.go_online();
        let report = h.orchestrator.sync_pending().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(h.remote.story("r1").unwrap().title, "Fog (revised)");
    }

    #[tokio::test]
    async fn test_failed_push_stays_pending() {
        let h = Harness::offline();
        let local = h.orchestrator.create_story(form("A")).await.unwrap();

        h.go_online();
        h.remote.set_failure(crate::remote::FailureMode::Unreachable);
        let report = h.orchestrator.sync_pending().await.unwrap();
        assert_eq!(report.failed, 1);

        let cached = h
            .orchestrator
            .cache()
            .get_by_id::<Story>(&local.id)
            .unwrap()
            .unwrap();
        assert!(cached.pending_sync);

        h.remote.set_failure(crate::remote::FailureMode::None);
        let retry = h.orchestrator.sync_pending().await.unwrap();
        assert_eq!(retry.pushed, 1);
        assert_eq!(h.remote.stories().len(), 1);
    }
}
