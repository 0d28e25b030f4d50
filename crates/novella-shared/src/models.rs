//! Domain models shared by the cache, the remote adapter and the backend.
//!
//! Entities (`Story`, `Draft`, `UserProfile`) only cross a process or disk
//! boundary through [`crate::codec`]; the request payloads (`NewStory`,
//! `StoryForm`, `ProfileForm`, ...) derive serde directly because they are
//! plain JSON bodies with no legacy variants to repair.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a story body as stored in `character_count`.
pub fn character_count(content: &str) -> usize {
    content.chars().count()
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// A published short story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    /// Assigned by whichever store created it (`local-...` when on-device).
    pub id: String,
    pub title: String,
    pub content: String,
    /// Author display name.
    pub author: String,
    /// Owning user id.
    pub user_id: String,
    /// Insertion order preserved.
    pub tags: Vec<String>,
    /// Always equal to `character_count(&self.content)`.
    pub character_count: usize,
    /// Ids of users who liked the story.
    pub likes: BTreeSet<String>,
    /// Append-only.
    pub comments: Vec<Comment>,
    /// The local copy has not been confirmed by the remote store yet.
    pub pending_sync: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Story {
    /// Replace the body, keeping `character_count` in step.
    pub fn set_content(&mut self, content: String) {
        self.character_count = character_count(&content);
        self.content = content;
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.contains(user_id)
    }

    /// Flip `user_id`'s membership in the likes set. Returns whether the user
    /// likes the story afterwards.
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        if self.likes.remove(user_id) {
            false
        } else {
            self.likes.insert(user_id.to_string());
            true
        }
    }

    /// Apply every field present in `patch` and bump `updated_at`.
    pub fn apply_patch(&mut self, patch: StoryPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.set_content(content);
        }
        if let Some(author) = patch.author {
            self.author = author;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(likes) = patch.likes {
            self.likes = likes;
        }
        if let Some(comments) = patch.comments {
            self.comments = comments;
        }
        self.updated_at = now;
    }
}

/// A comment attached to exactly one story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    /// Display name at the time of writing; later renames do not touch it.
    pub user_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Story fields supplied by the caller when posting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryForm {
    pub title: String,
    pub content: String,
    /// Empty means "use the acting user's display name".
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Creation payload sent to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStory {
    pub title: String,
    pub content: String,
    pub author: String,
    pub user_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<&Story> for NewStory {
    fn from(story: &Story) -> Self {
        Self {
            title: story.title.clone(),
            content: story.content.clone(),
            author: story.author.clone(),
            user_id: story.user_id.clone(),
            tags: story.tags.clone(),
        }
    }
}

/// Partial story update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
    pub likes: Option<BTreeSet<String>>,
    pub comments: Option<Vec<Comment>>,
}

impl StoryPatch {
    /// A patch rewriting every caller-editable field of `story`.
    pub fn full(story: &Story) -> Self {
        Self {
            title: Some(story.title.clone()),
            content: Some(story.content.clone()),
            author: Some(story.author.clone()),
            tags: Some(story.tags.clone()),
            likes: Some(story.likes.clone()),
            comments: Some(story.comments.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.author.is_none()
            && self.tags.is_none()
            && self.likes.is_none()
            && self.comments.is_none()
    }
}

/// Comment fields supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub user_id: String,
    /// Snapshot of the author's display name; filled from the identity
    /// provider when absent.
    #[serde(default)]
    pub user_name: Option<String>,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// Unfinished composition. Never leaves the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub user_id: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl Draft {
    pub fn apply_patch(&mut self, patch: DraftPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(author) = patch.author {
            self.author = author;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        self.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// One profile per user, keyed by the user's uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub favorite_genre: String,
    pub bio: Option<String>,
    pub favorite_author: Option<String>,
    pub pending_sync: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Merge-update: every field of `form` overwrites the stored value.
    pub fn apply_form(&mut self, form: ProfileForm, now: DateTime<Utc>) {
        self.display_name = form.display_name;
        self.favorite_genre = form.favorite_genre;
        self.bio = form.bio;
        self.favorite_author = form.favorite_author;
        self.updated_at = now;
    }

    pub fn apply_patch(&mut self, patch: ProfilePatch, now: DateTime<Utc>) {
        if let Some(display_name) = patch.display_name {
            self.display_name = display_name;
        }
        if let Some(favorite_genre) = patch.favorite_genre {
            self.favorite_genre = favorite_genre;
        }
        if let Some(bio) = patch.bio {
            self.bio = Some(bio);
        }
        if let Some(favorite_author) = patch.favorite_author {
            self.favorite_author = Some(favorite_author);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub display_name: String,
    pub favorite_genre: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_author: Option<String>,
}

impl From<&UserProfile> for ProfileForm {
    fn from(profile: &UserProfile) -> Self {
        Self {
            display_name: profile.display_name.clone(),
            favorite_genre: profile.favorite_genre.clone(),
            bio: profile.bio.clone(),
            favorite_author: profile.favorite_author.clone(),
        }
    }
}

/// Body of a profile upsert: the caller's email plus the editable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpsert {
    pub email: String,
    #[serde(flatten)]
    pub form: ProfileForm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_author: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(content: &str) -> Story {
        let now = Utc::now();
        Story {
            id: "s1".into(),
            title: "霧の街".into(),
            content: content.into(),
            author: "author".into(),
            user_id: "u1".into(),
            tags: vec![],
            character_count: character_count(content),
            likes: BTreeSet::new(),
            comments: vec![],
            pending_sync: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_character_count_counts_scalars_not_bytes() {
        assert_eq!(character_count("abc"), 3);
        assert_eq!(character_count("夜の霧"), 3);
    }

    #[test]
    fn test_patch_recomputes_character_count() {
        let mut s = story("short");
        let patch = StoryPatch {
            content: Some("x".repeat(42)),
            ..Default::default()
        };
        s.apply_patch(patch, Utc::now());
        assert_eq!(s.character_count, 42);
        assert_eq!(s.character_count, character_count(&s.content));
    }

    #[test]
    fn test_toggle_like_is_its_own_inverse() {
        let mut s = story("body");
        s.likes.insert("u9".into());
        let before = s.likes.clone();

        assert!(s.toggle_like("u2"));
        assert!(s.is_liked_by("u2"));
        assert!(!s.toggle_like("u2"));
        assert_eq!(s.likes, before);
    }

    #[test]
    fn test_empty_patch_is_detected() {
        assert!(StoryPatch::default().is_empty());
        assert!(!StoryPatch::full(&story("b")).is_empty());
    }

    #[test]
    fn test_profile_patch_only_touches_present_fields() {
        let now = Utc::now();
        let mut p = UserProfile {
            uid: "u1".into(),
            email: "a@example.com".into(),
            display_name: "A".into(),
            favorite_genre: "推理小説".into(),
            bio: None,
            favorite_author: Some("Poe".into()),
            pending_sync: false,
            created_at: now,
            updated_at: now,
        };
        p.apply_patch(
            ProfilePatch {
                bio: Some("hello".into()),
                ..Default::default()
            },
            now,
        );
        assert_eq!(p.display_name, "A");
        assert_eq!(p.bio.as_deref(), Some("hello"));
        assert_eq!(p.favorite_author.as_deref(), Some("Poe"));
    }
}
