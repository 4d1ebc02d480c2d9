// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for documents, commands, and messages.
//!
//! Unlike [`crate::id::IdBuf`]-backed IDs elsewhere in the source family,
//! these identifiers are not randomly generated — they are extracted from
//! upstream wire fields (message IDs, destinations) that can exceed the
//! 23-byte inline buffer, so they wrap an owned `String`.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* pub struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Identity of a persisted document (opaque to callers; typically equal
    /// to the wire message ID for command documents).
    pub struct DocumentId;
}

string_id! {
    /// The wire message ID a document was built from, e.g.
    /// `aws.ssm.11111111-1111-1111-1111-111111111111.i-0123456789abcdef0`.
    pub struct MessageId;
}

string_id! {
    /// The command ID extracted from a message ID's second-to-last dot segment.
    pub struct CommandId;
}

string_id! {
    /// Destination instance ID a document targets.
    pub struct InstanceId;
}

string_id! {
    /// Association run ID, used as the job-ID for Association documents
    /// instead of the message ID.
    pub struct AssociationId;
}

/// Duplicate-detection / admission key inside a single job pool.
///
/// Per the data model: the message-ID for non-association documents, the
/// association-ID otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&MessageId> for JobId {
    fn from(id: &MessageId) -> Self {
        Self(id.0.clone())
    }
}

impl From<&AssociationId> for JobId {
    fn from(id: &AssociationId) -> Self {
        Self(id.0.clone())
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_from_message_id_copies_string() {
        let msg = MessageId::from("aws.ssm.x.i-1");
        let job: JobId = (&msg).into();
        assert_eq!(job.as_str(), "aws.ssm.x.i-1");
    }

    #[test]
    fn string_id_round_trips_display() {
        let id = DocumentId::new("doc-1");
        assert_eq!(id.to_string(), "doc-1");
    }
}
