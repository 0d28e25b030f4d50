//! Drafts never leave the device, so these calls go straight to the cache.

use std::cmp::Reverse;

use chrono::Utc;
use tracing::debug;

use novella_shared::codec::EntityKind;
use novella_shared::models::{Draft, DraftForm, DraftPatch};
use novella_shared::types::local_id;
use novella_store::KvSubstrate;

use super::SyncOrchestrator;
use crate::error::{Result, SyncError};

impl<S: KvSubstrate> SyncOrchestrator<S> {
    pub fn get_all_drafts(&self) -> Result<Vec<Draft>> {
        Ok(self.cache.get_all()?)
    }

    pub fn get_draft(&self, id: &str) -> Result<Option<Draft>> {
        Ok(self.cache.get_by_id(id)?)
    }

    /// Drafts owned by `user_id`, most recently edited first.
    pub fn drafts_by_owner(&self, user_id: &str) -> Result<Vec<Draft>> {
        let mut drafts = self.cache.filter(|d: &Draft| d.user_id == user_id)?;
        drafts.sort_by_key(|d| Reverse(d.updated_at));
        Ok(drafts)
    }

    pub fn create_draft(&self, form: DraftForm) -> Result<Draft> {
        let now = Utc::now();
        let author = if form.author.trim().is_empty() {
            self.identity.display_name_or_anonymous()
        } else {
            form.author
        };

        let draft = Draft {
            id: local_id(),
            title: form.title,
            content: form.content,
            author,
            user_id: self.identity.user_id_or_anonymous(),
            tags: form.tags,
            created_at: now,
            updated_at: now,
        };
        self.cache.upsert(&draft)?;
        debug!(id = %draft.id, "Draft saved");
        Ok(draft)
    }

    pub fn update_draft(&self, id: &str, patch: DraftPatch) -> Result<Draft> {
        let mut draft = self
            .cache
            .get_by_id::<Draft>(id)?
            .ok_or_else(|| SyncError::NotFound {
                kind: EntityKind::Draft,
                id: id.to_string(),
            })?;
        draft.apply_patch(patch, Utc::now());
        self.cache.upsert(&draft)?;
        Ok(draft)
    }

    /// Returns whether the draft existed.
    pub fn delete_draft(&self, id: &str) -> Result<bool> {
        Ok(self.cache.delete::<Draft>(id)?)
    }
}

#[cfg(test)]
mod tests {
    use novella_shared::models::{DraftForm, DraftPatch};

    use super::super::testing::Harness;

    #[tokio::test]
    async fn test_draft_lifecycle_stays_local() {
        let h = Harness::online();
        let o = &h.orchestrator;

        let first = o
            .create_draft(DraftForm {
                title: "Untitled".into(),
                ..Default::default()
            })
            .unwrap();
        let second = o.create_draft(DraftForm::default()).unwrap();
        assert_eq!(first.user_id, "u1");
        assert_eq!(first.author, "Ellery");

        let edited = o
            .update_draft(
                &first.id,
                DraftPatch {
                    content: Some("The fog rolled in.".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(edited.title, "Untitled");
        assert_eq!(edited.content, "The fog rolled in.");

        let mine = o.drafts_by_owner("u1").unwrap();
        assert_eq!(mine[0].id, first.id);
        assert_eq!(mine.len(), 2);

        assert!(o.delete_draft(&second.id).unwrap());
        assert!(!o.delete_draft(&second.id).unwrap());
        assert_eq!(o.get_all_drafts().unwrap().len(), 1);
        assert_eq!(h.remote.calls(), 0);
    }

    #[test]
    fn test_update_missing_draft_is_not_found() {
        let h = Harness::offline();
        let err = h
            .orchestrator
            .update_draft("nope", DraftPatch::default())
            .unwrap_err();
        assert!(matches!(err, crate::SyncError::NotFound { .. }));
    }
}
