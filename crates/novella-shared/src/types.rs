use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::constants::LOCAL_ID_PREFIX;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate an on-device id: `local-<epoch millis>-<9 base36 chars>`.
///
/// The prefix marks records the remote store has never seen, so the
/// reconciler knows to create rather than update them.
pub fn local_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    format!("{LOCAL_ID_PREFIX}{millis}-{suffix}")
}

/// Whether `id` was generated on-device by [`local_id`].
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ids_are_prefixed_and_unique() {
        let a = local_id();
        let b = local_id();
        assert!(is_local_id(&a));
        assert_ne!(a, b);

        let suffix = a.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(suffix.bytes().all(|c| BASE36.contains(&c)));
    }

    #[test]
    fn test_server_ids_are_not_local() {
        assert!(!is_local_id("3f0b6a9e-2f4c-4c59-9d7e-1b1f0c7f3a11"));
    }
}
