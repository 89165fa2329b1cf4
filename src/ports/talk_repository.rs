//! Talk repository port.
//!
//! Handlers re-fetch the talk on every invocation and save it once at the
//! end; `save` is the flush boundary.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TalkId};
use crate::domain::talk::Talk;

/// Repository port for Talk aggregate persistence.
#[async_trait]
pub trait TalkRepository: Send + Sync {
    /// Find a talk by its ID.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(&self, id: &TalkId) -> Result<Option<Talk>, DomainError>;

    /// Insert or update a talk, including its flow state.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn save(&self, talk: &Talk) -> Result<(), DomainError>;
}
