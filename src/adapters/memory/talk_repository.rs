//! In-memory Talk repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, TalkId};
use crate::domain::talk::Talk;
use crate::ports::TalkRepository;

/// In-memory talk storage. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTalkRepository {
    talks: Arc<RwLock<HashMap<TalkId, Talk>>>,
    fail_saves: Arc<AtomicBool>,
}

impl InMemoryTalkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save` fail with a database error (for tests).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn count(&self) -> usize {
        self.talks.read().await.len()
    }
}

#[async_trait]
impl TalkRepository for InMemoryTalkRepository {
    async fn find_by_id(&self, id: &TalkId) -> Result<Option<Talk>, DomainError> {
        Ok(self.talks.read().await.get(id).cloned())
    }

    async fn save(&self, talk: &Talk) -> Result<(), DomainError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DomainError::database("talk store unavailable")
                .with_detail("talk_id", talk.id().to_string()));
        }
        self.talks.write().await.insert(talk.id(), talk.clone());
        Ok(())
    }
}
