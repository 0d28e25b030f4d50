//! Entity codec: wire/storage JSON <-> in-memory entities.
//!
//! The on-disk and on-the-wire format has no schema version. Records written
//! by older releases may lack fields added later, so decoding runs every raw
//! object through a per-kind migration table (field -> default) before the
//! typed conversion. Timestamps are equally forgiving: anything absent, null
//! or unreadable becomes "now".

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::constants::{
    ANONYMOUS_AUTHOR, ANONYMOUS_USER_ID, DRAFTS_TABLE, LEGACY_PLACEHOLDER_AUTHOR,
    MIGRATION_LEDGER_TABLE, PROFILES_TABLE, PROFILE_LEDGER_TABLE, STORIES_TABLE,
};
use crate::error::CodecError;
use crate::models::{character_count, Comment, Draft, Story, StoryPatch, UserProfile};

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Story,
    Draft,
    UserProfile,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Story, EntityKind::Draft, EntityKind::UserProfile];

    /// Key of the serialized table holding every record of this kind.
    pub fn table_key(self) -> &'static str {
        match self {
            EntityKind::Story => STORIES_TABLE,
            EntityKind::Draft => DRAFTS_TABLE,
            EntityKind::UserProfile => PROFILES_TABLE,
        }
    }

    /// Key of the set of ids of this kind known to be on the remote. Drafts
    /// never leave the device and have none.
    pub fn ledger_key(self) -> Option<&'static str> {
        match self {
            EntityKind::Story => Some(MIGRATION_LEDGER_TABLE),
            EntityKind::Draft => None,
            EntityKind::UserProfile => Some(PROFILE_LEDGER_TABLE),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Story => write!(f, "story"),
            EntityKind::Draft => write!(f, "draft"),
            EntityKind::UserProfile => write!(f, "user profile"),
        }
    }
}

/// A record type that can live in a keyed table.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Whether the local copy still has to reach the remote store.
    fn is_pending(&self) -> bool {
        false
    }

    fn encode(&self) -> Value;

    fn decode(record: Value) -> Result<Self, CodecError>;
}

// ---------------------------------------------------------------------------
// Decode-time migration tables
// ---------------------------------------------------------------------------

/// Value substituted for a field that is absent or null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    EmptyArray,
    EmptyString,
    False,
    Text(&'static str),
}

impl FieldDefault {
    fn value(self) -> Value {
        match self {
            FieldDefault::EmptyArray => Value::Array(Vec::new()),
            FieldDefault::EmptyString => Value::String(String::new()),
            FieldDefault::False => Value::Bool(false),
            FieldDefault::Text(text) => Value::String(text.to_string()),
        }
    }
}

pub const STORY_DEFAULTS: &[(&str, FieldDefault)] = &[
    ("title", FieldDefault::EmptyString),
    ("content", FieldDefault::EmptyString),
    ("author", FieldDefault::EmptyString),
    ("userId", FieldDefault::Text(ANONYMOUS_USER_ID)),
    ("tags", FieldDefault::EmptyArray),
    ("likes", FieldDefault::EmptyArray),
    ("comments", FieldDefault::EmptyArray),
    ("pendingSync", FieldDefault::False),
];

pub const COMMENT_DEFAULTS: &[(&str, FieldDefault)] = &[
    ("userId", FieldDefault::Text(ANONYMOUS_USER_ID)),
    ("userName", FieldDefault::EmptyString),
    ("content", FieldDefault::EmptyString),
];

pub const DRAFT_DEFAULTS: &[(&str, FieldDefault)] = &[
    ("title", FieldDefault::EmptyString),
    ("content", FieldDefault::EmptyString),
    ("author", FieldDefault::EmptyString),
    ("userId", FieldDefault::Text(ANONYMOUS_USER_ID)),
    ("tags", FieldDefault::EmptyArray),
];

pub const PROFILE_DEFAULTS: &[(&str, FieldDefault)] = &[
    ("email", FieldDefault::EmptyString),
    ("displayName", FieldDefault::EmptyString),
    ("favoriteGenre", FieldDefault::EmptyString),
    ("pendingSync", FieldDefault::False),
];

/// Fill every field of `table` that is absent or null in `record`.
pub fn apply_defaults(record: &mut Map<String, Value>, table: &[(&str, FieldDefault)]) {
    for (field, default) in table {
        if matches!(record.get(*field), None | Some(Value::Null)) {
            record.insert((*field).to_string(), default.value());
        }
    }
}

fn into_object(kind: EntityKind, record: Value) -> Result<Map<String, Value>, CodecError> {
    match record {
        Value::Object(map) => Ok(map),
        _ => Err(CodecError::NotAnObject { kind }),
    }
}

fn require_key(
    kind: EntityKind,
    record: &Map<String, Value>,
    field: &'static str,
) -> Result<(), CodecError> {
    match record.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(()),
        _ => Err(CodecError::MissingField { kind, field }),
    }
}

fn invalid(kind: EntityKind) -> impl FnOnce(serde_json::Error) -> CodecError {
    move |e| CodecError::Invalid {
        kind,
        reason: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Decode a timestamp written as RFC 3339 text, epoch milliseconds or a
/// `{seconds, nanoseconds}` object. Anything else decodes to now.
pub fn decode_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    let parsed = match value {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Some(Value::Object(obj)) => {
            let seconds = obj
                .get("seconds")
                .or_else(|| obj.get("_seconds"))
                .and_then(Value::as_i64);
            let nanos = obj
                .get("nanoseconds")
                .or_else(|| obj.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            seconds.and_then(|s| Utc.timestamp_opt(s, nanos as u32).single())
        }
        _ => None,
    };

    parsed.unwrap_or_else(|| {
        if value.is_some_and(|v| !v.is_null()) {
            tracing::debug!(?value, "unreadable timestamp, substituting now");
        }
        Utc::now()
    })
}

pub fn encode_timestamp(ts: &DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Rewrite the legacy placeholder author name to the anonymous default.
pub fn repair_author(name: String) -> String {
    if name == LEGACY_PLACEHOLDER_AUTHOR {
        ANONYMOUS_AUTHOR.to_string()
    } else {
        name
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRecord {
    id: String,
    user_id: String,
    user_name: String,
    content: String,
    #[serde(default)]
    created_at: Option<Value>,
}

pub fn encode_comment(comment: &Comment) -> Value {
    json!({
        "id": comment.id,
        "userId": comment.user_id,
        "userName": comment.user_name,
        "content": comment.content,
        "createdAt": encode_timestamp(&comment.created_at),
    })
}

pub fn decode_comment(record: Value) -> Result<Comment, CodecError> {
    let mut obj = into_object(EntityKind::Story, record)?;
    apply_defaults(&mut obj, COMMENT_DEFAULTS);
    let rec: CommentRecord =
        serde_json::from_value(Value::Object(obj)).map_err(invalid(EntityKind::Story))?;

    Ok(Comment {
        id: rec.id,
        user_id: rec.user_id,
        user_name: rec.user_name,
        content: rec.content,
        created_at: decode_timestamp(rec.created_at.as_ref()),
    })
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryRecord {
    id: String,
    title: String,
    content: String,
    author: String,
    user_id: String,
    tags: Vec<String>,
    likes: Vec<String>,
    comments: Vec<Value>,
    pending_sync: bool,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
}

impl Entity for Story {
    const KIND: EntityKind = EntityKind::Story;

    fn id(&self) -> &str {
        &self.id
    }

    fn is_pending(&self) -> bool {
        self.pending_sync
    }

    fn encode(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "content": self.content,
            "author": self.author,
            "userId": self.user_id,
            "tags": self.tags,
            "characterCount": self.character_count,
            "likes": self.likes,
            "comments": self.comments.iter().map(encode_comment).collect::<Vec<_>>(),
            "pendingSync": self.pending_sync,
            "createdAt": encode_timestamp(&self.created_at),
            "updatedAt": encode_timestamp(&self.updated_at),
        })
    }

    fn decode(record: Value) -> Result<Self, CodecError> {
        let mut obj = into_object(Self::KIND, record)?;
        require_key(Self::KIND, &obj, "id")?;
        apply_defaults(&mut obj, STORY_DEFAULTS);

        let rec: StoryRecord =
            serde_json::from_value(Value::Object(obj)).map_err(invalid(Self::KIND))?;
        let comments = rec
            .comments
            .into_iter()
            .map(decode_comment)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Story {
            id: rec.id,
            title: rec.title,
            character_count: character_count(&rec.content),
            content: rec.content,
            author: repair_author(rec.author),
            user_id: rec.user_id,
            tags: rec.tags,
            likes: rec.likes.into_iter().collect(),
            comments,
            pending_sync: rec.pending_sync,
            created_at: decode_timestamp(rec.created_at.as_ref()),
            updated_at: decode_timestamp(rec.updated_at.as_ref()),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryPatchRecord {
    title: Option<String>,
    content: Option<String>,
    author: Option<String>,
    tags: Option<Vec<String>>,
    likes: Option<Vec<String>>,
    comments: Option<Vec<Value>>,
}

/// Encode only the fields present in `patch`.
pub fn encode_patch(patch: &StoryPatch) -> Value {
    let mut obj = Map::new();
    if let Some(title) = &patch.title {
        obj.insert("title".into(), json!(title));
    }
    if let Some(content) = &patch.content {
        obj.insert("content".into(), json!(content));
    }
    if let Some(author) = &patch.author {
        obj.insert("author".into(), json!(author));
    }
    if let Some(tags) = &patch.tags {
        obj.insert("tags".into(), json!(tags));
    }
    if let Some(likes) = &patch.likes {
        obj.insert("likes".into(), json!(likes));
    }
    if let Some(comments) = &patch.comments {
        let encoded: Vec<Value> = comments.iter().map(encode_comment).collect();
        obj.insert("comments".into(), Value::Array(encoded));
    }
    Value::Object(obj)
}

pub fn decode_patch(record: Value) -> Result<StoryPatch, CodecError> {
    let rec: StoryPatchRecord =
        serde_json::from_value(record).map_err(invalid(EntityKind::Story))?;
    let comments = rec
        .comments
        .map(|list| list.into_iter().map(decode_comment).collect::<Result<Vec<_>, _>>())
        .transpose()?;

    Ok(StoryPatch {
        title: rec.title,
        content: rec.content,
        author: rec.author,
        tags: rec.tags,
        likes: rec.likes.map(|l| l.into_iter().collect()),
        comments,
    })
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftRecord {
    id: String,
    title: String,
    content: String,
    author: String,
    user_id: String,
    tags: Vec<String>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
}

impl Entity for Draft {
    const KIND: EntityKind = EntityKind::Draft;

    fn id(&self) -> &str {
        &self.id
    }

    fn encode(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "content": self.content,
            "author": self.author,
            "userId": self.user_id,
            "tags": self.tags,
            "createdAt": encode_timestamp(&self.created_at),
            "updatedAt": encode_timestamp(&self.updated_at),
        })
    }

    fn decode(record: Value) -> Result<Self, CodecError> {
        let mut obj = into_object(Self::KIND, record)?;
        require_key(Self::KIND, &obj, "id")?;
        apply_defaults(&mut obj, DRAFT_DEFAULTS);

        let rec: DraftRecord =
            serde_json::from_value(Value::Object(obj)).map_err(invalid(Self::KIND))?;

        Ok(Draft {
            id: rec.id,
            title: rec.title,
            content: rec.content,
            author: repair_author(rec.author),
            user_id: rec.user_id,
            tags: rec.tags,
            created_at: decode_timestamp(rec.created_at.as_ref()),
            updated_at: decode_timestamp(rec.updated_at.as_ref()),
        })
    }
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRecord {
    uid: String,
    email: String,
    display_name: String,
    favorite_genre: String,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    favorite_author: Option<String>,
    pending_sync: bool,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
}

impl Entity for UserProfile {
    const KIND: EntityKind = EntityKind::UserProfile;

    fn id(&self) -> &str {
        &self.uid
    }

    fn is_pending(&self) -> bool {
        self.pending_sync
    }

    fn encode(&self) -> Value {
        let mut value = json!({
            "uid": self.uid,
            "email": self.email,
            "displayName": self.display_name,
            "favoriteGenre": self.favorite_genre,
            "pendingSync": self.pending_sync,
            "createdAt": encode_timestamp(&self.created_at),
            "updatedAt": encode_timestamp(&self.updated_at),
        });
        if let Value::Object(obj) = &mut value {
            if let Some(bio) = &self.bio {
                obj.insert("bio".into(), json!(bio));
            }
            if let Some(favorite_author) = &self.favorite_author {
                obj.insert("favoriteAuthor".into(), json!(favorite_author));
            }
        }
        value
    }

    fn decode(record: Value) -> Result<Self, CodecError> {
        let mut obj = into_object(Self::KIND, record)?;
        require_key(Self::KIND, &obj, "uid")?;
        apply_defaults(&mut obj, PROFILE_DEFAULTS);

        let rec: ProfileRecord =
            serde_json::from_value(Value::Object(obj)).map_err(invalid(Self::KIND))?;

        Ok(UserProfile {
            uid: rec.uid,
            email: rec.email,
            display_name: repair_author(rec.display_name),
            favorite_genre: rec.favorite_genre,
            bio: rec.bio.filter(|s| !s.is_empty()),
            favorite_author: rec.favorite_author.filter(|s| !s.is_empty()),
            pending_sync: rec.pending_sync,
            created_at: decode_timestamp(rec.created_at.as_ref()),
            updated_at: decode_timestamp(rec.updated_at.as_ref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_missing_optional_fields_get_defaults() {
        let record = json!({
            "id": "local-1",
            "title": "霧の街の殺人事件",
            "content": "夜の霧",
            "author": "Holmes",
            "createdAt": "2024-01-15T00:00:00.000Z",
            "updatedAt": "2024-01-15T00:00:00.000Z",
        });

        let story = Story::decode(record).unwrap();
        assert!(story.tags.is_empty());
        assert!(story.likes.is_empty());
        assert!(story.comments.is_empty());
        assert!(!story.pending_sync);
        assert_eq!(story.user_id, ANONYMOUS_USER_ID);
        assert_eq!(story.character_count, 3);
    }

    #[test]
    fn test_null_fields_are_treated_as_absent() {
        let record = json!({
            "id": "s1",
            "title": null,
            "content": "abc",
            "tags": null,
            "likes": null,
            "comments": null,
            "pendingSync": null,
        });

        let story = Story::decode(record).unwrap();
        assert_eq!(story.title, "");
        assert!(story.tags.is_empty());
        assert!(!story.pending_sync);
    }

    #[test]
    fn test_stored_character_count_is_ignored() {
        let record = json!({ "id": "s1", "content": "x".repeat(150), "characterCount": 8500 });
        let story = Story::decode(record).unwrap();
        assert_eq!(story.character_count, 150);
    }

    #[test]
    fn test_missing_or_null_timestamps_decode_to_now() {
        let before = Utc::now();
        let story = Story::decode(json!({ "id": "s1", "createdAt": null })).unwrap();
        let after = Utc::now();

        assert!(story.created_at >= before && story.created_at <= after);
        assert!(story.updated_at >= before && story.updated_at <= after);
    }

    #[test]
    fn test_timestamp_forms() {
        let expected = Utc.timestamp_opt(1_705_276_800, 0).single().unwrap();

        assert_eq!(decode_timestamp(Some(&json!("2024-01-15T00:00:00Z"))), expected);
        assert_eq!(decode_timestamp(Some(&json!(1_705_276_800_000i64))), expected);
        assert_eq!(
            decode_timestamp(Some(&json!({ "seconds": 1_705_276_800i64, "nanoseconds": 0 }))),
            expected
        );

        let garbage = decode_timestamp(Some(&json!("not a date")));
        assert!(garbage > expected);
    }

    #[test]
    fn test_duplicate_likes_collapse() {
        let story = Story::decode(json!({ "id": "s1", "likes": ["u1", "u2", "u1"] })).unwrap();
        assert_eq!(story.likes.len(), 2);
    }

    #[test]
    fn test_legacy_placeholder_author_is_repaired() {
        let story = Story::decode(json!({ "id": "s1", "author": LEGACY_PLACEHOLDER_AUTHOR })).unwrap();
        assert_eq!(story.author, ANONYMOUS_AUTHOR);

        assert_eq!(repair_author("Poe".into()), "Poe");
    }

    #[test]
    fn test_record_without_id_is_rejected() {
        let err = Story::decode(json!({ "title": "orphan" })).unwrap_err();
        assert!(matches!(err, CodecError::MissingField { field: "id", .. }));

        let err = Story::decode(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, CodecError::NotAnObject { .. }));
    }

    #[test]
    fn test_wrong_field_type_is_invalid() {
        let err = Story::decode(json!({ "id": "s1", "tags": "mystery" })).unwrap_err();
        assert!(matches!(err, CodecError::Invalid { .. }));
    }

    #[test]
    fn test_comments_decode_with_defaults() {
        let story = Story::decode(json!({
            "id": "s1",
            "comments": [
                { "id": "c1", "userId": "u2", "content": "nice", "createdAt": 1_705_276_800_000i64 },
                { "id": "c2", "content": "agreed" },
            ],
        }))
        .unwrap();

        assert_eq!(story.comments.len(), 2);
        assert_eq!(story.comments[0].user_name, "");
        assert_eq!(story.comments[1].user_id, ANONYMOUS_USER_ID);
    }

    #[test]
    fn test_story_survives_encode_decode() {
        let mut story = Story::decode(json!({
            "id": "s1",
            "title": "時計塔の秘密",
            "content": "body",
            "tags": ["暗号", "財宝"],
            "likes": ["u1"],
            "pendingSync": true,
            "createdAt": "2024-01-20T10:00:00.123Z",
            "updatedAt": "2024-01-21T10:00:00.456Z",
        }))
        .unwrap();
        story.comments.push(Comment {
            id: "c1".into(),
            user_id: "u2".into(),
            user_name: "Watson".into(),
            content: "nice".into(),
            created_at: story.created_at,
        });

        let decoded = Story::decode(story.encode()).unwrap();
        assert_eq!(decoded, story);
    }

    #[test]
    fn test_patch_encodes_only_present_fields() {
        let patch = StoryPatch {
            title: Some("new".into()),
            ..Default::default()
        };
        let value = encode_patch(&patch);
        assert_eq!(value, json!({ "title": "new" }));
        assert_eq!(decode_patch(value).unwrap(), patch);
    }

    #[test]
    fn test_profile_defaults_and_empty_optionals() {
        let profile = UserProfile::decode(json!({
            "uid": "u1",
            "displayName": "Ellery",
            "bio": "",
        }))
        .unwrap();

        assert_eq!(profile.email, "");
        assert_eq!(profile.favorite_genre, "");
        assert!(profile.bio.is_none());
        assert!(!profile.pending_sync);

        let err = UserProfile::decode(json!({ "displayName": "nobody" })).unwrap_err();
        assert!(matches!(err, CodecError::MissingField { field: "uid", .. }));
    }

    #[test]
    fn test_draft_decodes_legacy_record() {
        let draft = Draft::decode(json!({
            "id": "17000000001abcdefghi",
            "title": "書きかけ",
            "content": "…",
            "userId": "u1",
        }))
        .unwrap();
        assert!(draft.tags.is_empty());
        assert_eq!(draft.author, "");
    }
}
