//! TalkMessage repository port. Messages are append-only.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, TalkId, TalkMessageId};
use crate::domain::talk::TalkMessage;

#[async_trait]
pub trait TalkMessageRepository: Send + Sync {
    async fn find_by_id(&self, id: &TalkMessageId) -> Result<Option<TalkMessage>, DomainError>;

    /// Append a message.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn save(&self, message: &TalkMessage) -> Result<(), DomainError>;

    /// The `limit` most recent messages of a talk (any direction), oldest first.
    async fn recent_for_talk(
        &self,
        talk_id: &TalkId,
        limit: usize,
    ) -> Result<Vec<TalkMessage>, DomainError>;

    /// Most recent message received from the contact.
    async fn latest_inbound(&self, talk_id: &TalkId) -> Result<Option<TalkMessage>, DomainError>;
}
