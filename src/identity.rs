//! Identity bootstrap surface
//!
//! The relay never signs a user in itself; an external bootstrap
//! (anonymous or otherwise) completes first and hands its result
//! in through `SetIdentity`. Until that happens the backend
//! refuses generation with `Error::NotReady`.

use serde::{Deserialize, Serialize};

/// Result of a completed identity bootstrap: an opaque user id,
/// possibly anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity
{   user_id: Option<String>
}

impl Identity
{   /// Identity with a known opaque user id
    pub fn known(user_id: impl Into<String>) -> Self
    {   Identity
        {   user_id: Some(user_id.into())
        }
    }

    /// Anonymous identity (bootstrap completed without an id)
    pub fn anonymous() -> Self
    {   Identity
        {   user_id: None
        }
    }

    pub fn is_anonymous(&self) -> bool
    {   self.user_id.is_none()
    }

    /// The opaque user id, if any
    pub fn user_id(&self) -> Option<&str>
    {   self.user_id.as_deref()
    }
}
