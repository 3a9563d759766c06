use serde::{Deserialize, Serialize};

use crate::record::RecordKind;
use crate::user::User;

/// These are the request "commands" that can be made to a skull server.
///
/// Records travel as their raw string `fields`, in JSON/TSV field order, and are parsed
/// by the server, so a malformed record is rejected before it reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// get all records of a kind
    Get {
        /// whose records
        user: User,
        /// which kind
        kind: RecordKind,
    },
    /// append a record
    Add {
        /// whose records
        user: User,
        /// which kind
        kind: RecordKind,
        /// the record's fields
        fields: Vec<String>,
    },
    /// replace the record at a position
    Edit {
        /// whose records
        user: User,
        /// which kind
        kind: RecordKind,
        /// the new record's fields
        fields: Vec<String>,
        /// index of the record to replace
        position: usize,
    },
    /// remove the first record equal to the given one
    Remove {
        /// whose records
        user: User,
        /// which kind
        kind: RecordKind,
        /// fields of the record to match
        fields: Vec<String>,
    },
    /// remove the record at a position
    RemoveAt {
        /// whose records
        user: User,
        /// which kind
        kind: RecordKind,
        /// index of the record to remove
        position: usize,
    },
    /// reload all of a user's records from disk
    Reload {
        /// whose records
        user: User,
    },
}

impl Request {
    /// the user this request acts for
    pub fn user(&self) -> &User {
        match self {
            Request::Get { user, .. }
            | Request::Add { user, .. }
            | Request::Edit { user, .. }
            | Request::Remove { user, .. }
            | Request::RemoveAt { user, .. }
            | Request::Reload { user } => user,
        }
    }
}

/// The response Types that can be returned for any skull [`Request`]
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    /// a mutation or reload was accepted
    Ok,
    /// the JSON array answering a [`Request::Get`]
    Records(serde_json::Value),
    /// this variant is returned if an Error occurs while processing the request
    Err(String),
}
