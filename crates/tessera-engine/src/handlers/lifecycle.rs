//! Generation lifecycle: start, failure, completion.
//!
//! Failure taxonomy, as it lands on the message:
//!
//! - **user abort** — the interrupted block goes to `paused` with its
//!   partial content kept, and the message still completes `success`.
//! - **provider failure** — the interrupted block goes to `error`, the
//!   message goes to `error`.
//! - either way a terminal ERROR block is appended recording what
//!   happened, and observers are told exactly once.
//!
//! Tool failures are handled locally by the tool handler and never reach
//! this module.

use std::time::Instant;

use tessera_types::{Block, BlockPatch, BlockStatus, MessageStatus};

use crate::collaborators::{Collaborators, GenerationOutcome, NotificationRequest};
use crate::constants::LONG_RUN_NOTIFY_THRESHOLD;
use crate::error::Result;
use crate::event::{GenerationFailure, GenerationMetrics};
use crate::handlers::GenerationContext;
use crate::manager::BlockManager;
use crate::repository::MessageRepository;

pub struct LifecycleHandler {
    collaborators: Collaborators,
}

impl LifecycleHandler {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Open the generation: message goes to streaming and the placeholder
    /// block appears, so the view shows activity before any content lands.
    pub async fn on_started<R: MessageRepository>(
        &self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
    ) -> Result<()> {
        mgr.set_status(MessageStatus::Streaming);
        let placeholder = mgr.transition_to(Block::placeholder(mgr.message_id())).await?;
        ctx.placeholder = Some(placeholder);
        mgr.persist_message().await
    }

    /// Terminal failure (abort or provider error).
    pub async fn on_failed<R: MessageRepository>(
        &self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        failure: GenerationFailure,
    ) -> Result<()> {
        ctx.placeholder = None;

        // Whichever block was being worked on absorbs the interruption.
        let victim = mgr
            .active()
            .map(|a| (a.block_id, a.kind))
            .or_else(|| {
                mgr.last_block_id()
                    .and_then(|id| mgr.block(id).map(|b| (b.id, b.kind)))
            })
            .filter(|(id, _)| mgr.block(*id).is_some_and(|b| !b.status.is_terminal()));
        if let Some((block_id, kind)) = victim {
            let patch = if failure.is_abort() {
                BlockPatch::status(BlockStatus::Paused)
            } else {
                BlockPatch::status(BlockStatus::Error).with_error(failure.snapshot.clone())
            };
            mgr.smart_update(block_id, patch, kind, true).await?;
        }

        mgr.transition_to(Block::error_record(mgr.message_id(), failure.snapshot.clone()))
            .await?;

        let status = if failure.is_abort() {
            MessageStatus::Success
        } else {
            MessageStatus::Error
        };
        mgr.set_status(status);
        mgr.persist_message().await?;

        if !failure.is_abort()
            && !self.collaborators.focus.is_foregrounded(mgr.topic_id())
        {
            self.collaborators
                .notifier
                .notify(NotificationRequest {
                    topic_id: mgr.topic_id(),
                    title: "Generation failed".to_string(),
                    body: failure.snapshot.message.clone(),
                })
                .await;
        }

        self.collaborators
            .observer
            .on_generation_complete(GenerationOutcome {
                topic_id: mgr.topic_id(),
                message_id: mgr.message_id(),
                status,
                error: Some(failure.snapshot),
            })
            .await;
        Ok(())
    }

    /// Normal completion.
    pub async fn on_completed<R: MessageRepository>(
        &self,
        mgr: &mut BlockManager<R>,
        ctx: &mut GenerationContext,
        status: MessageStatus,
        metrics: GenerationMetrics,
        started_at: Instant,
    ) -> Result<()> {
        ctx.placeholder = None;

        // A still-open block finalizes with whatever content it has.
        if let Some(active) = mgr.active() {
            mgr.smart_update(
                active.block_id,
                BlockPatch::status(BlockStatus::Success),
                active.kind,
                true,
            )
            .await?;
        }

        // Providers sometimes report zero usage; fall back to a local
        // estimate.
        let usage = match metrics.usage.filter(|u| !u.is_degenerate()) {
            Some(usage) => Some(usage),
            None => {
                let blocks = mgr.blocks();
                self.collaborators.estimator.estimate(mgr.message(), &blocks).await
            }
        };
        if let Some(usage) = usage {
            mgr.set_usage(usage);
        }
        mgr.set_status(status);
        mgr.persist_message().await?;

        let namer = self.collaborators.namer.clone();
        let topic_id = mgr.topic_id();
        tokio::spawn(async move {
            namer.request_autoname(topic_id).await;
        });

        if started_at.elapsed() > LONG_RUN_NOTIFY_THRESHOLD
            && !self.collaborators.focus.is_foregrounded(mgr.topic_id())
        {
            self.collaborators
                .notifier
                .notify(NotificationRequest {
                    topic_id: mgr.topic_id(),
                    title: "Response ready".to_string(),
                    body: "A long-running generation finished".to_string(),
                })
                .await;
        }

        self.collaborators
            .observer
            .on_generation_complete(GenerationOutcome {
                topic_id: mgr.topic_id(),
                message_id: mgr.message_id(),
                status,
                error: None,
            })
            .await;
        Ok(())
    }
}
