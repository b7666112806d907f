//! SQLite persistence for messages and blocks.
//!
//! One row per block, one row per message. The message row carries the
//! ordered block-id list as JSON; kind-specific block fields live in
//! nullable columns rather than extension tables, mirroring the flat
//! in-memory shape.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};

use tessera_types::{
    Block, BlockId, BlockKind, BlockStatus, CitationRef, FailureSnapshot, Message, MessageId,
    MessageStatus, TopicId, Usage,
};

/// Database handle for message persistence.
pub struct SessionDb {
    conn: Connection,
}

const SCHEMA: &str = r#"
-- Messages (ordered block-id list as JSON array of uuid strings)
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    topic_id TEXT NOT NULL,
    status TEXT NOT NULL,
    block_ids TEXT NOT NULL DEFAULT '[]',
    prompt_tokens INTEGER,
    completion_tokens INTEGER,
    total_tokens INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_topic ON messages(topic_id, created_at);

-- Blocks (universal fields plus nullable kind-specific columns)
CREATE TABLE IF NOT EXISTS blocks (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    content TEXT,
    url TEXT,
    file_path TEXT,
    metadata TEXT,
    tool_name TEXT,
    tool_call_id TEXT,
    response TEXT,
    error TEXT,
    thinking_millis INTEGER,
    citation_references TEXT,
    compacted_content TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_blocks_message ON blocks(message_id);
"#;

// =============================================================================
// Row Structs (module-private helpers)
// =============================================================================

/// Maps a row from the blocks table.
#[derive(Debug)]
struct BlockRow {
    id: String,
    message_id: String,
    kind: String,
    status: String,
    content: Option<String>,
    url: Option<String>,
    file_path: Option<String>,
    metadata: Option<String>,
    tool_name: Option<String>,
    tool_call_id: Option<String>,
    response: Option<String>,
    error: Option<String>,
    thinking_millis: Option<u64>,
    citation_references: Option<String>,
    compacted_content: Option<String>,
    created_at: u64,
}

/// Maps a row from the messages table.
#[derive(Debug)]
struct MessageRow {
    id: String,
    topic_id: String,
    status: String,
    block_ids: String,
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
    created_at: u64,
    updated_at: u64,
}

// =============================================================================
// Conversion Functions
// =============================================================================

fn block_to_row(block: &Block) -> BlockRow {
    BlockRow {
        id: block.id.to_string(),
        message_id: block.message_id.to_string(),
        kind: block.kind.as_str().to_string(),
        status: block.status.as_str().to_string(),
        content: block.content.clone(),
        url: block.url.clone(),
        file_path: block.file_path.clone(),
        metadata: block
            .metadata
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok()),
        tool_name: block.tool_name.clone(),
        tool_call_id: block.tool_call_id.clone(),
        response: block
            .response
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok()),
        error: block
            .error
            .as_ref()
            .and_then(|e| serde_json::to_string(e).ok()),
        thinking_millis: block.thinking_millis,
        citation_references: if block.citation_references.is_empty() {
            None
        } else {
            serde_json::to_string(&block.citation_references).ok()
        },
        compacted_content: block.compacted_content.clone(),
        created_at: block.created_at,
    }
}

fn row_to_block(row: BlockRow) -> Block {
    let mut block = Block::new(
        MessageId::parse(&row.message_id).unwrap_or_default(),
        BlockKind::from_str(&row.kind).unwrap_or_default(),
        BlockStatus::from_str(&row.status).unwrap_or_default(),
    );
    block.id = BlockId::parse(&row.id).unwrap_or_default();
    block.created_at = row.created_at;
    block.content = row.content;
    block.url = row.url;
    block.file_path = row.file_path;
    block.metadata = row.metadata.and_then(|s| serde_json::from_str(&s).ok());
    block.tool_name = row.tool_name;
    block.tool_call_id = row.tool_call_id;
    block.response = row.response.and_then(|s| serde_json::from_str(&s).ok());
    block.error = row
        .error
        .and_then(|s| serde_json::from_str::<FailureSnapshot>(&s).ok());
    block.thinking_millis = row.thinking_millis;
    block.citation_references = row
        .citation_references
        .and_then(|s| serde_json::from_str::<Vec<CitationRef>>(&s).ok())
        .unwrap_or_default();
    block.compacted_content = row.compacted_content;
    block
}

fn message_to_row(message: &Message) -> MessageRow {
    MessageRow {
        id: message.id.to_string(),
        topic_id: message.topic_id.to_string(),
        status: message.status.as_str().to_string(),
        block_ids: serde_json::to_string(&message.block_ids).unwrap_or_else(|_| "[]".into()),
        prompt_tokens: message.usage.map(|u| u.prompt_tokens),
        completion_tokens: message.usage.map(|u| u.completion_tokens),
        total_tokens: message.usage.map(|u| u.total_tokens),
        created_at: message.created_at,
        updated_at: message.updated_at,
    }
}

fn row_to_message(row: MessageRow) -> Message {
    let mut message = Message::with_id(
        MessageId::parse(&row.id).unwrap_or_default(),
        TopicId::parse(&row.topic_id).unwrap_or_default(),
    );
    message.status = MessageStatus::from_str(&row.status).unwrap_or_default();
    message.block_ids = serde_json::from_str(&row.block_ids).unwrap_or_default();
    message.usage = match (row.prompt_tokens, row.completion_tokens, row.total_tokens) {
        (Some(prompt), Some(completion), Some(total)) => Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        }),
        _ => None,
    };
    message.created_at = row.created_at;
    message.updated_at = row.updated_at;
    message
}

impl SessionDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // =========================================================================
    // Message CRUD
    // =========================================================================

    /// Insert or update a message row.
    pub fn upsert_message(&self, message: &Message) -> SqliteResult<()> {
        let row = message_to_row(message);
        self.conn.execute(
            "INSERT INTO messages (
                id, topic_id, status, block_ids,
                prompt_tokens, completion_tokens, total_tokens,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                block_ids = excluded.block_ids,
                prompt_tokens = excluded.prompt_tokens,
                completion_tokens = excluded.completion_tokens,
                total_tokens = excluded.total_tokens,
                updated_at = excluded.updated_at",
            params![
                row.id,
                row.topic_id,
                row.status,
                row.block_ids,
                row.prompt_tokens.map(|t| t as i64),
                row.completion_tokens.map(|t| t as i64),
                row.total_tokens.map(|t| t as i64),
                row.created_at as i64,
                row.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    /// Load a message by id.
    pub fn get_message(&self, id: MessageId) -> SqliteResult<Option<Message>> {
        self.conn
            .query_row(
                "SELECT id, topic_id, status, block_ids,
                        prompt_tokens, completion_tokens, total_tokens,
                        created_at, updated_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                |r| {
                    Ok(MessageRow {
                        id: r.get(0)?,
                        topic_id: r.get(1)?,
                        status: r.get(2)?,
                        block_ids: r.get(3)?,
                        prompt_tokens: r.get::<_, Option<i64>>(4)?.map(|t| t as u64),
                        completion_tokens: r.get::<_, Option<i64>>(5)?.map(|t| t as u64),
                        total_tokens: r.get::<_, Option<i64>>(6)?.map(|t| t as u64),
                        created_at: r.get::<_, i64>(7)? as u64,
                        updated_at: r.get::<_, i64>(8)? as u64,
                    })
                },
            )
            .optional()
            .map(|row| row.map(row_to_message))
    }

    /// Messages of a topic, oldest first.
    pub fn messages_for_topic(&self, topic_id: TopicId) -> SqliteResult<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, topic_id, status, block_ids,
                    prompt_tokens, completion_tokens, total_tokens,
                    created_at, updated_at
             FROM messages WHERE topic_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![topic_id.to_string()], |r| {
            Ok(MessageRow {
                id: r.get(0)?,
                topic_id: r.get(1)?,
                status: r.get(2)?,
                block_ids: r.get(3)?,
                prompt_tokens: r.get::<_, Option<i64>>(4)?.map(|t| t as u64),
                completion_tokens: r.get::<_, Option<i64>>(5)?.map(|t| t as u64),
                total_tokens: r.get::<_, Option<i64>>(6)?.map(|t| t as u64),
                created_at: r.get::<_, i64>(7)? as u64,
                updated_at: r.get::<_, i64>(8)? as u64,
            })
        })?;
        rows.map(|r| r.map(row_to_message)).collect()
    }

    // =========================================================================
    // Block CRUD
    // =========================================================================

    /// Insert or update a block row.
    pub fn upsert_block(&self, block: &Block) -> SqliteResult<()> {
        let row = block_to_row(block);
        self.conn.execute(
            "INSERT INTO blocks (
                id, message_id, kind, status, content, url, file_path,
                metadata, tool_name, tool_call_id, response, error,
                thinking_millis, citation_references, compacted_content, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                status = excluded.status,
                content = excluded.content,
                url = excluded.url,
                file_path = excluded.file_path,
                metadata = excluded.metadata,
                tool_name = excluded.tool_name,
                tool_call_id = excluded.tool_call_id,
                response = excluded.response,
                error = excluded.error,
                thinking_millis = excluded.thinking_millis,
                citation_references = excluded.citation_references,
                compacted_content = excluded.compacted_content",
            params![
                row.id,
                row.message_id,
                row.kind,
                row.status,
                row.content,
                row.url,
                row.file_path,
                row.metadata,
                row.tool_name,
                row.tool_call_id,
                row.response,
                row.error,
                row.thinking_millis.map(|t| t as i64),
                row.citation_references,
                row.compacted_content,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    /// Load a block by id.
    pub fn get_block(&self, id: BlockId) -> SqliteResult<Option<Block>> {
        self.conn
            .query_row(
                "SELECT id, message_id, kind, status, content, url, file_path,
                        metadata, tool_name, tool_call_id, response, error,
                        thinking_millis, citation_references, compacted_content, created_at
                 FROM blocks WHERE id = ?1",
                params![id.to_string()],
                map_block_row,
            )
            .optional()
            .map(|row| row.map(row_to_block))
    }

    /// Delete all blocks of a message that are not in the given id set.
    pub fn prune_blocks(&self, message_id: MessageId, keep: &[BlockId]) -> SqliteResult<usize> {
        let keep_json: Vec<String> = keep.iter().map(|id| id.to_string()).collect();
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM blocks WHERE message_id = ?1")?;
        let existing: Vec<String> = stmt
            .query_map(params![message_id.to_string()], |r| r.get(0))?
            .collect::<SqliteResult<_>>()?;
        let mut pruned = 0;
        for id in existing {
            if !keep_json.contains(&id) {
                self.conn
                    .execute("DELETE FROM blocks WHERE id = ?1", params![id])?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Blocks of a message, in the message's stored order.
    pub fn blocks_for_message(&self, message_id: MessageId) -> SqliteResult<Vec<Block>> {
        let Some(message) = self.get_message(message_id)? else {
            return Ok(Vec::new());
        };
        let mut blocks = Vec::with_capacity(message.block_ids.len());
        for id in message.block_ids {
            if let Some(block) = self.get_block(id)? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }
}

fn map_block_row(r: &rusqlite::Row<'_>) -> SqliteResult<BlockRow> {
    Ok(BlockRow {
        id: r.get(0)?,
        message_id: r.get(1)?,
        kind: r.get(2)?,
        status: r.get(3)?,
        content: r.get(4)?,
        url: r.get(5)?,
        file_path: r.get(6)?,
        metadata: r.get(7)?,
        tool_name: r.get(8)?,
        tool_call_id: r.get(9)?,
        response: r.get(10)?,
        error: r.get(11)?,
        thinking_millis: r.get::<_, Option<i64>>(12)?.map(|t| t as u64),
        citation_references: r.get(13)?,
        compacted_content: r.get(14)?,
        created_at: r.get::<_, i64>(15)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::CitationSource;

    #[test]
    fn test_block_roundtrip() {
        let db = SessionDb::in_memory().unwrap();
        let msg = MessageId::new();
        let mut block = Block::main_text(msg, "hello world");
        block.citation_references.push(CitationRef {
            block_id: BlockId::new(),
            source: CitationSource::WebSearch,
        });
        db.upsert_block(&block).unwrap();
        let loaded = db.get_block(block.id).unwrap().unwrap();
        assert_eq!(loaded, block);
    }

    #[test]
    fn test_block_upsert_overwrites() {
        let db = SessionDb::in_memory().unwrap();
        let msg = MessageId::new();
        let mut block = Block::main_text(msg, "v1");
        db.upsert_block(&block).unwrap();
        block.content = Some("v2".into());
        block.status = BlockStatus::Success;
        db.upsert_block(&block).unwrap();
        let loaded = db.get_block(block.id).unwrap().unwrap();
        assert_eq!(loaded.content.as_deref(), Some("v2"));
        assert_eq!(loaded.status, BlockStatus::Success);
    }

    #[test]
    fn test_message_roundtrip_with_usage() {
        let db = SessionDb::in_memory().unwrap();
        let mut message = Message::new(TopicId::new());
        message.status = MessageStatus::Success;
        message.usage = Some(Usage::new(100, 25));
        message.block_ids = vec![BlockId::new(), BlockId::new()];
        db.upsert_message(&message).unwrap();
        let loaded = db.get_message(message.id).unwrap().unwrap();
        assert_eq!(loaded, message);
    }

    #[test]
    fn test_missing_rows_are_none() {
        let db = SessionDb::in_memory().unwrap();
        assert!(db.get_message(MessageId::new()).unwrap().is_none());
        assert!(db.get_block(BlockId::new()).unwrap().is_none());
    }

    #[test]
    fn test_blocks_for_message_follow_stored_order() {
        let db = SessionDb::in_memory().unwrap();
        let mut message = Message::new(TopicId::new());
        let a = Block::main_text(message.id, "a");
        let b = Block::thinking(message.id, "b");
        db.upsert_block(&a).unwrap();
        db.upsert_block(&b).unwrap();
        // Stored order disagrees with insertion order on purpose.
        message.block_ids = vec![b.id, a.id];
        db.upsert_message(&message).unwrap();
        let blocks = db.blocks_for_message(message.id).unwrap();
        assert_eq!(blocks[0].id, b.id);
        assert_eq!(blocks[1].id, a.id);
    }

    #[test]
    fn test_prune_blocks() {
        let db = SessionDb::in_memory().unwrap();
        let msg = MessageId::new();
        let a = Block::main_text(msg, "keep");
        let b = Block::main_text(msg, "drop");
        db.upsert_block(&a).unwrap();
        db.upsert_block(&b).unwrap();
        let pruned = db.prune_blocks(msg, &[a.id]).unwrap();
        assert_eq!(pruned, 1);
        assert!(db.get_block(a.id).unwrap().is_some());
        assert!(db.get_block(b.id).unwrap().is_none());
    }

    #[test]
    fn test_messages_for_topic() {
        let db = SessionDb::in_memory().unwrap();
        let topic = TopicId::new();
        let m1 = Message::new(topic);
        let m2 = Message::new(topic);
        let other = Message::new(TopicId::new());
        db.upsert_message(&m1).unwrap();
        db.upsert_message(&m2).unwrap();
        db.upsert_message(&other).unwrap();
        let messages = db.messages_for_topic(topic).unwrap();
        assert_eq!(messages.len(), 2);
    }
}
