//! Per-generation event orchestrator.
//!
//! One [`StreamOrchestrator`] lives per (topic, message) generation. It
//! owns the block manager, the shared context, and one handler per content
//! kind, and routes every [`GenerationEvent`] through a single `handle`
//! call so handlers never see events concurrently.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use tessera_types::{MessageId, TopicId};

use crate::collaborators::Collaborators;
use crate::error::Result;
use crate::event::GenerationEvent;
use crate::handlers::GenerationContext;
use crate::handlers::citation::CitationHandler;
use crate::handlers::compaction::CompactionHandler;
use crate::handlers::image::ImageHandler;
use crate::handlers::lifecycle::LifecycleHandler;
use crate::handlers::text::TextHandler;
use crate::handlers::thinking::ThinkingHandler;
use crate::handlers::tool::ToolHandler;
use crate::handlers::video::VideoHandler;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

pub struct StreamOrchestrator<R: MessageRepository> {
    manager: BlockManager<R>,
    ctx: GenerationContext,
    text: TextHandler,
    thinking: ThinkingHandler,
    tool: ToolHandler,
    image: ImageHandler,
    video: VideoHandler,
    citation: CitationHandler,
    compaction: CompactionHandler,
    lifecycle: LifecycleHandler,
    started_at: Instant,
    finished: bool,
}

impl<R: MessageRepository> StreamOrchestrator<R> {
    pub fn new(
        repo: Arc<R>,
        topic_id: TopicId,
        message_id: MessageId,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            manager: BlockManager::new(repo, topic_id, message_id),
            ctx: GenerationContext::default(),
            text: TextHandler::default(),
            thinking: ThinkingHandler::default(),
            tool: ToolHandler,
            image: ImageHandler::default(),
            video: VideoHandler::default(),
            citation: CitationHandler::default(),
            compaction: CompactionHandler::default(),
            lifecycle: LifecycleHandler::new(collaborators),
            started_at: Instant::now(),
            finished: false,
        }
    }

    pub fn manager(&self) -> &BlockManager<R> {
        &self.manager
    }

    pub fn message_id(&self) -> MessageId {
        self.manager.message_id()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Apply one event. Events arriving after a terminal event are
    /// dropped, so a replayed tail is harmless.
    pub async fn handle(&mut self, event: GenerationEvent) -> Result<()> {
        if self.finished {
            debug!(message_id = %self.manager.message_id(), "event after terminal dropped");
            return Ok(());
        }
        match event {
            GenerationEvent::GenerationStarted => {
                self.lifecycle.on_started(&mut self.manager, &mut self.ctx).await
            }

            GenerationEvent::TextStart => {
                self.text.on_start(&mut self.manager, &mut self.ctx).await
            }
            GenerationEvent::TextDelta(t) => {
                self.text.on_delta(&mut self.manager, &mut self.ctx, &t).await
            }
            GenerationEvent::TextComplete(t) => self.on_text_complete(&t).await,

            GenerationEvent::ThinkingStart => {
                self.thinking.on_start(&mut self.manager, &mut self.ctx).await
            }
            GenerationEvent::ThinkingDelta(t) => {
                self.thinking.on_delta(&mut self.manager, &mut self.ctx, &t).await
            }
            GenerationEvent::ThinkingComplete(t) => {
                self.thinking.on_complete(&mut self.manager, &t).await
            }

            GenerationEvent::ToolPending(info) => {
                self.tool.on_pending(&mut self.manager, &mut self.ctx, info).await
            }
            GenerationEvent::ToolComplete(outcome) => {
                if let Some((source, response)) = self
                    .tool
                    .on_complete(&mut self.manager, &mut self.ctx, outcome)
                    .await?
                {
                    self.citation
                        .on_tool_citation(
                            &mut self.manager,
                            &mut self.ctx,
                            &self.text,
                            source,
                            response,
                        )
                        .await?;
                }
                Ok(())
            }

            GenerationEvent::ImageCreated => {
                self.image.on_created(&mut self.manager, &mut self.ctx).await
            }
            GenerationEvent::ImageDelta(payload) => {
                self.image.on_delta(&mut self.manager, &mut self.ctx, payload).await
            }
            GenerationEvent::ImageGenerated(payload) => {
                self.image
                    .on_generated(&mut self.manager, &mut self.ctx, payload)
                    .await
            }

            GenerationEvent::VideoFound { url, metadata } => {
                self.video.on_found(&mut self.manager, url, metadata).await
            }

            GenerationEvent::ExternalToolInProgress => {
                self.citation.on_external_in_progress(&mut self.manager).await
            }
            GenerationEvent::ExternalToolComplete(payload) => {
                self.citation
                    .on_complete(&mut self.manager, &mut self.ctx, &self.text, payload)
                    .await
            }
            GenerationEvent::LlmWebSearchInProgress => {
                self.citation
                    .on_llm_search_in_progress(&mut self.manager, &mut self.ctx)
                    .await
            }
            GenerationEvent::LlmWebSearchComplete(payload) => {
                self.citation
                    .on_complete(&mut self.manager, &mut self.ctx, &self.text, payload)
                    .await
            }

            GenerationEvent::RawFrame { content, metadata } => {
                self.compaction
                    .on_raw_frame(&mut self.manager, content.as_deref(), metadata.as_ref())
                    .await
            }

            GenerationEvent::Failed(failure) => {
                self.compaction.abandon(&mut self.manager).await?;
                self.lifecycle
                    .on_failed(&mut self.manager, &mut self.ctx, failure)
                    .await?;
                self.finish();
                Ok(())
            }
            GenerationEvent::Completed { status, metrics } => {
                self.compaction.abandon(&mut self.manager).await?;
                self.lifecycle
                    .on_completed(
                        &mut self.manager,
                        &mut self.ctx,
                        status,
                        metrics,
                        self.started_at,
                    )
                    .await?;
                self.finish();
                Ok(())
            }
        }
    }

    /// Completed text spans route through the compaction fold first. A
    /// completion with no open span only materializes a block when a fold
    /// is mid-flight (the summary and transcript spans arrive as bare
    /// completions); otherwise it is a replay and a no-op.
    async fn on_text_complete(&mut self, final_text: &str) -> Result<()> {
        if self.compaction.expects_text() {
            let block_id = self
                .text
                .ensure_block(&mut self.manager, &mut self.ctx, final_text)
                .await?;
            if self
                .compaction
                .on_text_complete(&mut self.manager, block_id, final_text)
                .await?
            {
                self.text.clear();
                return Ok(());
            }
        }
        self.text.on_complete(&mut self.manager, final_text).await
    }

    fn finish(&mut self) {
        self.finished = true;
        self.manager.shutdown();
    }
}
