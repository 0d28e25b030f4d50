//! Authoritative story and profile tables.
//!
//! The remote backend owns these semantics: it assigns ids and timestamps,
//! never stores a record as pending, and refuses to import over an existing
//! id. The HTTP server and the in-process test remote both wrap an
//! [`Authority`] so they cannot drift apart.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::codec::repair_author;
use crate::constants::ANONYMOUS_AUTHOR;
use crate::models::{
    character_count, NewStory, ProfilePatch, ProfileUpsert, Story, StoryPatch, UserProfile,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("Record not found")]
    NotFound,

    #[error("A record with this id already exists")]
    AlreadyExists,
}

pub type Result<T> = std::result::Result<T, AuthorityError>;

#[derive(Debug, Default, Clone)]
pub struct Authority {
    stories: Vec<Story>,
    profiles: Vec<UserProfile>,
}

impl Authority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a snapshot. Records are normalised to the confirmed state.
    pub fn from_records(stories: Vec<Story>, profiles: Vec<UserProfile>) -> Self {
        let mut authority = Self { stories, profiles };
        for story in &mut authority.stories {
            story.pending_sync = false;
            story.character_count = character_count(&story.content);
        }
        for profile in &mut authority.profiles {
            profile.pending_sync = false;
        }
        authority
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    pub fn profiles(&self) -> &[UserProfile] {
        &self.profiles
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id == id)
    }

    fn story_mut(&mut self, id: &str) -> Result<&mut Story> {
        self.stories
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(AuthorityError::NotFound)
    }

    pub fn create_story(&mut self, new: NewStory, now: DateTime<Utc>) -> Story {
        let author = match repair_author(new.author) {
            name if name.is_empty() => ANONYMOUS_AUTHOR.to_string(),
            name => name,
        };
        let story = Story {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            character_count: character_count(&new.content),
            content: new.content,
            author,
            user_id: new.user_id,
            tags: new.tags,
            likes: Default::default(),
            comments: Vec::new(),
            pending_sync: false,
            created_at: now,
            updated_at: now,
        };
        self.stories.push(story.clone());
        story
    }

    /// Insert `story` under its own id, keeping its timestamps.
    pub fn import_story(&mut self, mut story: Story) -> Result<Story> {
        if self.story(&story.id).is_some() {
            return Err(AuthorityError::AlreadyExists);
        }
        story.pending_sync = false;
        story.author = repair_author(story.author);
        story.character_count = character_count(&story.content);
        self.stories.push(story.clone());
        Ok(story)
    }

    pub fn update_story(
        &mut self,
        id: &str,
        patch: StoryPatch,
        now: DateTime<Utc>,
    ) -> Result<Story> {
        let story = self.story_mut(id)?;
        story.apply_patch(patch, now);
        Ok(story.clone())
    }

    pub fn delete_story(&mut self, id: &str) -> Result<()> {
        let before = self.stories.len();
        self.stories.retain(|s| s.id != id);
        if self.stories.len() == before {
            return Err(AuthorityError::NotFound);
        }
        Ok(())
    }

    pub fn profile(&self, uid: &str) -> Option<&UserProfile> {
        self.profiles.iter().find(|p| p.uid == uid)
    }

    /// Create the profile if absent, else merge the form into it. The email
    /// is only recorded on creation.
    pub fn upsert_profile(
        &mut self,
        uid: &str,
        upsert: ProfileUpsert,
        now: DateTime<Utc>,
    ) -> UserProfile {
        if let Some(existing) = self.profiles.iter_mut().find(|p| p.uid == uid) {
            existing.apply_form(upsert.form, now);
            return existing.clone();
        }

        let profile = UserProfile {
            uid: uid.to_string(),
            email: upsert.email,
            display_name: upsert.form.display_name,
            favorite_genre: upsert.form.favorite_genre,
            bio: upsert.form.bio,
            favorite_author: upsert.form.favorite_author,
            pending_sync: false,
            created_at: now,
            updated_at: now,
        };
        self.profiles.push(profile.clone());
        profile
    }

    pub fn update_profile(
        &mut self,
        uid: &str,
        patch: ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<UserProfile> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.uid == uid)
            .ok_or(AuthorityError::NotFound)?;
        profile.apply_patch(patch, now);
        Ok(profile.clone())
    }
}
