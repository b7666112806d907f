//! Durable [`MessageRepository`] backed by SQLite.
//!
//! Layers a [`MemoryRepository`] (the reactive live view) over a
//! [`SessionDb`]: live writes touch only the in-memory layer, persists
//! land in SQLite first and then refresh the live layer, so subscribers
//! observe durable state without a reload.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::instrument;

use tessera_engine::{
    EngineError, MemoryRepository, MessageRepository, Result, SavePayload, StoreEvent,
};
use tessera_types::{Block, BlockId, Message, MessageId};

use crate::db::SessionDb;

pub struct SqliteRepository {
    db: Arc<Mutex<SessionDb>>,
    live: Arc<MemoryRepository>,
}

impl SqliteRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = SessionDb::open(path).map_err(persistence)?;
        Ok(Self::from_db(db))
    }

    pub fn in_memory() -> Result<Self> {
        let db = SessionDb::in_memory().map_err(persistence)?;
        Ok(Self::from_db(db))
    }

    fn from_db(db: SessionDb) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            live: MemoryRepository::new(),
        }
    }

    /// Subscribe to live-view change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.live.subscribe()
    }

    /// The in-memory live view layered over this store.
    pub fn live(&self) -> &Arc<MemoryRepository> {
        &self.live
    }

    /// Load a message straight from SQLite.
    pub fn load_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.lock_db()?.get_message(id).map_err(persistence)
    }

    /// Load a block straight from SQLite.
    pub fn load_block(&self, id: BlockId) -> Result<Option<Block>> {
        self.lock_db()?.get_block(id).map_err(persistence)
    }

    /// Load a message's blocks straight from SQLite, in stored order.
    pub fn load_blocks(&self, message_id: MessageId) -> Result<Vec<Block>> {
        self.lock_db()?
            .blocks_for_message(message_id)
            .map_err(persistence)
    }

    fn lock_db(&self) -> Result<std::sync::MutexGuard<'_, SessionDb>> {
        self.db
            .lock()
            .map_err(|_| EngineError::Persistence("database lock poisoned".into()))
    }
}

#[async_trait]
impl MessageRepository for SqliteRepository {
    async fn upsert_live_block(&self, block: Block) -> Result<()> {
        self.live.upsert_live_block(block).await
    }

    async fn append_block_to_message(
        &self,
        message_id: MessageId,
        block_id: BlockId,
    ) -> Result<()> {
        self.live.append_block_to_message(message_id, block_id).await
    }

    #[instrument(skip_all, fields(message_id = %payload.message_id))]
    async fn persist(&self, payload: SavePayload) -> Result<()> {
        {
            let db = self.lock_db()?;
            let mut message = db
                .get_message(payload.message_id)
                .map_err(persistence)?
                .unwrap_or_else(|| Message::with_id(payload.message_id, payload.topic_id));
            if let Some(status) = payload.delta.status {
                message.status = status;
            }
            if let Some(usage) = payload.delta.usage {
                message.usage = Some(usage);
            }
            if let Some(block_ids) = &payload.delta.block_ids {
                message.block_ids = block_ids.clone();
                db.prune_blocks(payload.message_id, block_ids)
                    .map_err(persistence)?;
            }
            message.touch();
            for block in &payload.blocks {
                db.upsert_block(block).map_err(persistence)?;
            }
            db.upsert_message(&message).map_err(persistence)?;
        }
        // Refresh the live layer so subscribers see the durable state.
        self.live.persist(payload).await
    }
}

fn persistence(e: impl std::fmt::Display) -> EngineError {
    EngineError::Persistence(e.to_string())
}
