//! Full-stack persistence tests: orchestrator streaming into SQLite.

use std::sync::Arc;

use tessera_engine::{
    Collaborators, GenerationEvent, GenerationFailure, GenerationMetrics, StreamOrchestrator,
};
use tessera_store::SqliteRepository;
use tessera_types::{BlockKind, BlockStatus, MessageId, MessageStatus, TopicId, Usage};

fn completed_ok() -> GenerationEvent {
    GenerationEvent::Completed {
        status: MessageStatus::Success,
        metrics: GenerationMetrics {
            usage: Some(Usage::new(50, 12)),
            duration_millis: Some(800),
        },
    }
}

#[tokio::test]
async fn stream_lands_durably_in_sqlite() {
    let repo = Arc::new(SqliteRepository::in_memory().unwrap());
    let mut orch = StreamOrchestrator::new(
        Arc::clone(&repo),
        TopicId::new(),
        MessageId::new(),
        Collaborators::default(),
    );

    orch.handle(GenerationEvent::GenerationStarted).await.unwrap();
    orch.handle(GenerationEvent::TextStart).await.unwrap();
    orch.handle(GenerationEvent::TextDelta("Hello".into())).await.unwrap();
    orch.handle(GenerationEvent::TextComplete("Hello, world".into())).await.unwrap();
    orch.handle(completed_ok()).await.unwrap();

    let message = repo.load_message(orch.message_id()).unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Success);
    assert_eq!(message.usage, Some(Usage::new(50, 12)));

    let blocks = repo.load_blocks(orch.message_id()).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].kind, BlockKind::MainText);
    assert_eq!(blocks[0].status, BlockStatus::Success);
    assert_eq!(blocks[0].content.as_deref(), Some("Hello, world"));
}

#[tokio::test]
async fn abort_is_durable() {
    let repo = Arc::new(SqliteRepository::in_memory().unwrap());
    let mut orch = StreamOrchestrator::new(
        Arc::clone(&repo),
        TopicId::new(),
        MessageId::new(),
        Collaborators::default(),
    );

    orch.handle(GenerationEvent::GenerationStarted).await.unwrap();
    orch.handle(GenerationEvent::TextStart).await.unwrap();
    orch.handle(GenerationEvent::TextDelta("partial".into())).await.unwrap();
    orch.handle(GenerationEvent::Failed(GenerationFailure::aborted())).await.unwrap();

    let message = repo.load_message(orch.message_id()).unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Success);

    let blocks = repo.load_blocks(orch.message_id()).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].status, BlockStatus::Paused);
    assert_eq!(blocks[0].content.as_deref(), Some("partial"));
    assert_eq!(blocks[1].kind, BlockKind::Error);
}

#[tokio::test]
async fn compaction_prunes_folded_blocks_from_disk() {
    let repo = Arc::new(SqliteRepository::in_memory().unwrap());
    let mut orch = StreamOrchestrator::new(
        Arc::clone(&repo),
        TopicId::new(),
        MessageId::new(),
        Collaborators::default(),
    );

    orch.handle(GenerationEvent::GenerationStarted).await.unwrap();
    orch.handle(GenerationEvent::RawFrame {
        content: None,
        metadata: Some(serde_json::json!({"type": "compact"})),
    })
    .await
    .unwrap();
    orch.handle(GenerationEvent::TextComplete("Summary".into())).await.unwrap();
    orch.handle(GenerationEvent::TextComplete(
        "<local-command-stdout>old transcript</local-command-stdout>".into(),
    ))
    .await
    .unwrap();
    orch.handle(completed_ok()).await.unwrap();

    let blocks = repo.load_blocks(orch.message_id()).unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].kind, BlockKind::Compact);
    assert_eq!(blocks[0].content.as_deref(), Some("Summary"));
    assert_eq!(blocks[0].compacted_content.as_deref(), Some("old transcript"));
}

#[tokio::test]
async fn reopening_a_file_backed_db_preserves_the_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");
    let message_id;

    {
        let repo = Arc::new(SqliteRepository::open(&path).unwrap());
        let mut orch = StreamOrchestrator::new(
            Arc::clone(&repo),
            TopicId::new(),
            MessageId::new(),
            Collaborators::default(),
        );
        message_id = orch.message_id();
        orch.handle(GenerationEvent::GenerationStarted).await.unwrap();
        orch.handle(GenerationEvent::TextStart).await.unwrap();
        orch.handle(GenerationEvent::TextComplete("persisted".into())).await.unwrap();
        orch.handle(completed_ok()).await.unwrap();
    }

    let repo = SqliteRepository::open(&path).unwrap();
    let message = repo.load_message(message_id).unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Success);
    let blocks = repo.load_blocks(message_id).unwrap();
    assert_eq!(blocks[0].content.as_deref(), Some("persisted"));
}
