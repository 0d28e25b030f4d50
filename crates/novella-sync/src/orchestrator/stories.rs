use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use novella_shared::codec::{repair_author, EntityKind};
use novella_shared::models::{
    character_count, Comment, NewComment, NewStory, Story, StoryForm, StoryPatch,
};
use novella_shared::types::{is_local_id, local_id};
use novella_shared::{query, SearchFilters};
use novella_store::KvSubstrate;

use super::{found, SyncOrchestrator, Tier};
use crate::error::{Result, SyncError};
use crate::remote::RemoteError;

impl<S: KvSubstrate> SyncOrchestrator<S> {
    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get_all_stories(&self) -> Result<Vec<Story>> {
        self.ensure_session().await;
        self.read_with(
            "stories.get_all",
            self.remote.list_stories(),
            |fetched| self.merge_listing(fetched, true),
            || Ok(self.cache.get_all()?),
        )
        .await
    }

    /// `None` when neither store has the story.
    pub async fn get_story(&self, id: &str) -> Result<Option<Story>> {
        self.ensure_session().await;
        self.read_with(
            "stories.get",
            async { found(self.remote.get_story(id).await) },
            |fetched| self.refresh_one(id, fetched),
            || Ok(self.cache.get_by_id(id)?),
        )
        .await
    }

    pub async fn search_stories(&self, text: &str, filters: &SearchFilters) -> Result<Vec<Story>> {
        self.ensure_session().await;
        self.read_with(
            "stories.search",
            self.remote.search_stories(text, filters),
            |fetched| self.merge_listing(fetched, false),
            || Ok(query::search(self.cache.get_all()?, text, filters)),
        )
        .await
    }

    /// Longest stories first. `None` uses the configured default limit.
    pub async fn popular_stories(&self, limit: Option<usize>) -> Result<Vec<Story>> {
        self.ensure_session().await;
        let limit = limit.unwrap_or(self.default_list_limit);
        self.read_with(
            "stories.popular",
            self.remote.popular_stories(limit),
            |fetched| self.merge_listing(fetched, false),
            || Ok(query::popular(self.cache.get_all()?, limit)),
        )
        .await
    }

    /// Newest stories first. `None` uses the configured default limit.
    pub async fn recent_stories(&self, limit: Option<usize>) -> Result<Vec<Story>> {
        self.ensure_session().await;
        let limit = limit.unwrap_or(self.default_list_limit);
        self.read_with(
            "stories.recent",
            self.remote.recent_stories(limit),
            |fetched| self.merge_listing(fetched, false),
            || Ok(query::recent(self.cache.get_all()?, limit)),
        )
        .await
    }

    pub async fn stories_by_owner(&self, user_id: &str) -> Result<Vec<Story>> {
        self.ensure_session().await;
        self.read_with(
            "stories.by_owner",
            self.remote.stories_by_owner(user_id),
            |fetched| self.merge_listing(fetched, false),
            || Ok(query::by_owner(self.cache.get_all()?, user_id)),
        )
        .await
    }

    /// Read the story a mutation applies to, or fail with `NotFound`.
    async fn story_for_update(&self, id: &str) -> Result<Story> {
        self.get_story(id).await?.ok_or_else(|| SyncError::NotFound {
            kind: EntityKind::Story,
            id: id.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Post a story as the acting user. An empty author falls back to the
    /// user's display name.
    pub async fn create_story(&self, form: StoryForm) -> Result<Story> {
        let author = if form.author.trim().is_empty() {
            self.identity.display_name_or_anonymous()
        } else {
            form.author
        };

        let new = NewStory {
            title: form.title,
            content: form.content,
            author: repair_author(author),
            user_id: self.identity.user_id_or_anonymous(),
            tags: form.tags,
        };

        let now = Utc::now();
        let optimistic = Story {
            id: local_id(),
            title: new.title.clone(),
            content: new.content.clone(),
            author: new.author.clone(),
            user_id: new.user_id.clone(),
            tags: new.tags.clone(),
            character_count: character_count(&new.content),
            likes: Default::default(),
            comments: Vec::new(),
            pending_sync: true,
            created_at: now,
            updated_at: now,
        };

        self.write_with("stories.create", optimistic, self.remote.create_story(&new))
            .await
    }

    /// Apply `patch` to the story.
    pub async fn update_story(&self, id: &str, patch: StoryPatch) -> Result<Story> {
        let base = self.story_for_update(id).await?;
        self.write_patch("stories.update", base, patch).await
    }

    /// Flip `user_id`'s like on the story.
    pub async fn toggle_like(&self, id: &str, user_id: &str) -> Result<Story> {
        let base = self.story_for_update(id).await?;

        let mut likes = base.likes.clone();
        if !likes.remove(user_id) {
            likes.insert(user_id.to_string());
        }

        let patch = StoryPatch {
            likes: Some(likes),
            ..Default::default()
        };
        self.write_patch("stories.like", base, patch).await
    }

    /// Append a comment to the story.
    pub async fn add_comment(&self, id: &str, comment: NewComment) -> Result<Story> {
        let base = self.story_for_update(id).await?;

        let user_name = comment
            .user_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.identity.display_name_or_anonymous());

        let mut comments = base.comments.clone();
        comments.push(Comment {
            id: Uuid::new_v4().to_string(),
            user_id: comment.user_id,
            user_name,
            content: comment.content,
            created_at: Utc::now(),
        });

        let patch = StoryPatch {
            comments: Some(comments),
            ..Default::default()
        };
        self.write_patch("stories.comment", base, patch).await
    }

    /// Write `patch` over `base`. A story that already carries unsynced local
    /// changes is pushed whole so the remote catches up with all of them.
    async fn write_patch(&self, op: &'static str, base: Story, patch: StoryPatch) -> Result<Story> {
        let mut next = base.clone();
        next.apply_patch(patch.clone(), Utc::now());

        let push = if base.pending_sync {
            StoryPatch::full(&next)
        } else {
            patch
        };
        self.write_with(op, next, self.remote.update_story(&base.id, &push))
            .await
    }

    /// Delete the story. The local copy is removed whatever the remote says;
    /// an unconfirmed remote delete is recorded and replayed by
    /// [`Self::sync_pending`].
    pub async fn delete_story(&self, id: &str) -> Result<()> {
        // A story that never reached the remote has nothing to delete there.
        let mut confirmed = is_local_id(id);

        for tier in self.plan() {
            match tier {
                Tier::Remote if !confirmed => match self.remote.delete_story(id).await {
                    Ok(()) | Err(RemoteError::NotFound) => confirmed = true,
                    Err(e) => warn!(id, error = %e, "Remote delete failed, deleting locally"),
                },
                Tier::Remote => {}
                Tier::Cache => break,
            }
        }

        let existed = self.cache.delete::<Story>(id)?;
        if confirmed {
            self.cache.clear_pending_delete(id)?;
        } else {
            self.cache.mark_pending_delete(id)?;
        }
        info!(id, existed, confirmed, "Story deleted");
        Ok(())
    }
}
