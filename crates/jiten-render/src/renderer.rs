use std::collections::HashMap;
use std::sync::Arc;

use jiten_dictionary::{DrawMediaRequest, DrawReply, WorkerRequest};
use kanal::{AsyncReceiver, AsyncSender};

use crate::canvas::CanvasHandle;

/// Generations kept alive: the current one and the one before it. Replies
/// for anything older paint nothing.
const KEEP_GENERATIONS: u64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no database port available")]
    NoDatabasePort,

    #[error("database port is closed")]
    PortClosed,
}

/// One canvas wanting one media blob.
pub struct DrawTarget {
    pub path: String,
    pub dictionary: String,
    pub canvas: CanvasHandle,
}

/// Caller-side media draw pipeline.
///
/// Each draw call gets a fresh generation; the canvas list is recorded
/// under it before any asynchronous work starts. Replies are looked up by
/// their generation and silently dropped when it is no longer tracked, so
/// late results of superseded batches never touch a recycled canvas.
pub struct MediaRenderer {
    generation: u64,
    canvases_by_generation: HashMap<u64, Vec<CanvasHandle>>,
    db_port: Option<AsyncSender<WorkerRequest>>,
    reply_tx: AsyncSender<DrawReply>,
    reply_rx: AsyncReceiver<DrawReply>,
}

impl MediaRenderer {
    pub fn new() -> MediaRenderer {
        let (reply_tx, reply_rx) = kanal::unbounded_async();
        MediaRenderer {
            generation: 0,
            canvases_by_generation: HashMap::new(),
            db_port: None,
            reply_tx,
            reply_rx,
        }
    }

    /// Wires in a request port obtained from the database's
    /// `connect_to_database_worker`.
    pub fn connect(&mut self, port: AsyncSender<WorkerRequest>) {
        self.db_port = Some(port);
    }

    /// Sends one draw batch to the database worker and returns its
    /// generation. Completion is signaled through the replies, not here.
    pub async fn draw_media(&mut self, targets: &[DrawTarget]) -> Result<u64, RenderError> {
        self.generation += 1;
        let generation = self.generation;
        self.canvases_by_generation.insert(
            generation,
            targets.iter().map(|t| Arc::clone(&t.canvas)).collect(),
        );
        self.clean_old_generations();

        let requests: Vec<DrawMediaRequest> = targets
            .iter()
            .enumerate()
            .map(|(canvas_index, target)| {
                let (canvas_width, canvas_height) = {
                    let canvas = target.canvas.lock();
                    (canvas.width(), canvas.height())
                };
                DrawMediaRequest {
                    path: target.path.clone(),
                    dictionary: target.dictionary.clone(),
                    canvas_index,
                    canvas_width,
                    canvas_height,
                    generation,
                }
            })
            .collect();

        let Some(port) = &self.db_port else {
            tracing::error!("no database port available");
            return Err(RenderError::NoDatabasePort);
        };
        port.send(WorkerRequest::DrawMedia {
            requests,
            reply: self.reply_tx.clone(),
        })
        .await
        .map_err(|_| RenderError::PortClosed)?;
        Ok(generation)
    }

    /// Paints one reply onto the canvases of its generation; replies for
    /// untracked generations are dropped.
    pub fn handle_reply(&mut self, reply: DrawReply) {
        match reply {
            DrawReply::DrawBufferToCanvases {
                buffer,
                width,
                height,
                canvas_indexes,
                generation,
            } => {
                let Some(canvases) = self.canvases_by_generation.get(&generation) else {
                    return;
                };
                for index in canvas_indexes {
                    if let Some(canvas) = canvases.get(index) {
                        canvas.lock().put_image_data(&buffer, width, height);
                    }
                }
            }
            DrawReply::DrawDecodedImageToCanvases {
                image,
                canvas_indexes,
                generation,
            } => {
                let Some(canvases) = self.canvases_by_generation.get(&generation) else {
                    return;
                };
                for index in canvas_indexes {
                    if let Some(canvas) = canvases.get(index) {
                        canvas.lock().draw_image(&image);
                    }
                }
            }
        }
    }

    /// Serves draw replies for as long as the renderer lives.
    pub async fn run(&mut self) {
        let rx = self.reply_rx.clone();
        while let Ok(reply) = rx.recv().await {
            self.handle_reply(reply);
        }
        tracing::debug!("draw reply channel closed");
    }

    fn clean_old_generations(&mut self) {
        let cutoff = self.generation.saturating_sub(KEEP_GENERATIONS);
        self.canvases_by_generation.retain(|&g, _| g > cutoff);
    }
}

impl Default for MediaRenderer {
    fn default() -> Self {
        MediaRenderer::new()
    }
}
