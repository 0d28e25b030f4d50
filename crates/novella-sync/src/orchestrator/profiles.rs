use chrono::Utc;

use novella_shared::codec::EntityKind;
use novella_shared::models::{ProfileForm, ProfilePatch, ProfileUpsert, UserProfile};
use novella_store::KvSubstrate;

use super::{found, SyncOrchestrator};
use crate::error::{Result, SyncError};

impl<S: KvSubstrate> SyncOrchestrator<S> {
    pub async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.ensure_session().await;
        self.read_with(
            "profiles.get",
            async { found(self.remote.get_profile(uid).await) },
            |fetched| self.refresh_one(uid, fetched),
            || Ok(self.cache.get_by_id(uid)?),
        )
        .await
    }

    pub async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        self.ensure_session().await;
        self.read_with(
            "profiles.list",
            self.remote.list_profiles(),
            |fetched| self.merge_listing(fetched, true),
            || Ok(self.cache.get_all()?),
        )
        .await
    }

    /// Create or merge-update the acting user's profile.
    pub async fn upsert_profile(&self, form: ProfileForm) -> Result<UserProfile> {
        let user = self.identity.current_user().ok_or(SyncError::NoIdentity)?;
        let now = Utc::now();

        let optimistic = match self.cache.get_by_id::<UserProfile>(&user.user_id)? {
            Some(mut existing) => {
                existing.apply_form(form.clone(), now);
                existing
            }
            None => UserProfile {
                uid: user.user_id.clone(),
                email: user.email.clone(),
                display_name: form.display_name.clone(),
                favorite_genre: form.favorite_genre.clone(),
                bio: form.bio.clone(),
                favorite_author: form.favorite_author.clone(),
                pending_sync: true,
                created_at: now,
                updated_at: now,
            },
        };

        let upsert = ProfileUpsert {
            email: user.email,
            form,
        };
        self.write_with(
            "profiles.upsert",
            optimistic,
            self.remote.upsert_profile(&user.user_id, &upsert),
        )
        .await
    }

    /// Apply `patch` to an existing profile.
    pub async fn update_profile(&self, uid: &str, patch: ProfilePatch) -> Result<UserProfile> {
        let base = self.get_profile(uid).await?.ok_or_else(|| SyncError::NotFound {
            kind: EntityKind::UserProfile,
            id: uid.to_string(),
        })?;

        let mut next = base.clone();
        next.apply_patch(patch.clone(), Utc::now());

        if base.pending_sync {
            // The remote may not have the profile yet; send all of it.
            let upsert = ProfileUpsert {
                email: next.email.clone(),
                form: ProfileForm::from(&next),
            };
            self.write_with(
                "profiles.update",
                next,
                self.remote.upsert_profile(uid, &upsert),
            )
            .await
        } else {
            self.write_with(
                "profiles.update",
                next,
                self.remote.update_profile(uid, &patch),
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use novella_shared::codec::EntityKind;
    use novella_shared::models::{ProfileForm, ProfilePatch};

    use super::super::testing::Harness;
    use crate::SyncError;

    fn form(name: &str) -> ProfileForm {
        ProfileForm {
            display_name: name.into(),
            favorite_genre: "推理小説".into(),
            bio: None,
            favorite_author: Some("Christie".into()),
        }
    }

    #[tokio::test]
    async fn test_upsert_online_is_confirmed() {
        let h = Harness::online();
        let profile = h.orchestrator.upsert_profile(form("Ellery")).await.unwrap();

        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.email, "u1@example.com");
        assert!(!profile.pending_sync);
        assert!(h.remote.profile("u1").is_some());
    }

    #[tokio::test]
    async fn test_offline_profile_edits_sync_later() {
        let h = Harness::offline();
        let created = h.orchestrator.upsert_profile(form("Ellery")).await.unwrap();
        assert!(created.pending_sync);

        let updated = h
            .orchestrator
            .update_profile(
                "u1",
                ProfilePatch {
                    bio: Some("Reads at night.".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.pending_sync);
        assert_eq!(updated.display_name, "Ellery");

        h.go_online();
        let report = h.orchestrator.sync_pending().await.unwrap();
        assert_eq!(report.pushed, 1);

        let remote = h.remote.profile("u1").unwrap();
        assert_eq!(remote.bio.as_deref(), Some("Reads at night."));
        let cached = h.orchestrator.get_profile("u1").await.unwrap().unwrap();
        assert!(!cached.pending_sync);
    }

    #[tokio::test]
    async fn test_upsert_requires_identity() {
        let h = Harness::offline();
        h.identity.sign_out();
        let err = h.orchestrator.upsert_profile(form("Ellery")).await.unwrap_err();
        assert!(matches!(err, SyncError::NoIdentity));
    }

    #[tokio::test]
    async fn test_update_of_unknown_profile_is_not_found() {
        let h = Harness::online();
        let err = h
            .orchestrator
            .update_profile("ghost", ProfilePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_profiles_merges_remote() {
        let h = Harness::online();
        h.orchestrator.upsert_profile(form("Ellery")).await.unwrap();
        h.go_offline();
        let cached = h.orchestrator.list_profiles().await.unwrap();
        assert_eq!(cached.len(), 1);

        h.go_online();
        let listed = h.orchestrator.list_profiles().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_name, "Ellery");

        let cache = h.orchestrator.cache();
        assert!(cache
            .reconciled_ids(EntityKind::UserProfile)
            .unwrap()
            .contains("u1"));
        assert!(cache.migration_ledger().unwrap().is_empty());
    }
}
