use thiserror::Error;

use crate::codec::EntityKind;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{kind} record is not a JSON object")]
    NotAnObject { kind: EntityKind },

    #[error("{kind} record is missing its `{field}` field")]
    MissingField {
        kind: EntityKind,
        field: &'static str,
    },

    #[error("invalid {kind} record: {reason}")]
    Invalid { kind: EntityKind, reason: String },
}
