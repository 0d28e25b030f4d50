/// Application name
pub const APP_NAME: &str = "Novella";

/// Storage key of the stories table (kept from the first release so older
/// caches stay readable).
pub const STORIES_TABLE: &str = "novels";

/// Storage key of the drafts table
pub const DRAFTS_TABLE: &str = "drafts";

/// Storage key of the user-profiles table
pub const PROFILES_TABLE: &str = "user-profiles";

/// Storage key of the migration ledger: story ids known to be reconciled
/// with the remote
pub const MIGRATION_LEDGER_TABLE: &str = "migration-ledger";

/// Storage key of the profile uids known to be reconciled with the remote
pub const PROFILE_LEDGER_TABLE: &str = "profile-ledger";

/// Storage key of story ids deleted on-device but not yet on the remote
pub const PENDING_DELETES_TABLE: &str = "pending-deletes";

/// Prefix of ids generated on-device before the remote assigned one
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Owner id stamped on records written without a signed-in user
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Display name used for anonymous authors
pub const ANONYMOUS_AUTHOR: &str = "匿名ユーザー";

/// Placeholder author name shipped by the first form version ("your name").
/// Records still carrying it are rewritten to [`ANONYMOUS_AUTHOR`].
pub const LEGACY_PLACEHOLDER_AUTHOR: &str = "あなたの名前";

/// Default page size of the popular / recent listings
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 3001;
