use std::sync::Arc;

use kanal::{AsyncReceiver, AsyncSender};
use tokio_util::sync::CancellationToken;

use crate::database::DictionaryDatabase;
use crate::protocol::WorkerRequest;

/// Handle to the one persistent database worker an orchestrator owns.
pub(crate) struct WorkerHandle {
    tx: AsyncSender<WorkerRequest>,
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(
        tx: AsyncSender<WorkerRequest>,
        cancel: CancellationToken,
        join: tokio::task::JoinHandle<()>,
    ) -> WorkerHandle {
        WorkerHandle { tx, cancel, join }
    }

    pub(crate) fn sender(&self) -> AsyncSender<WorkerRequest> {
        self.tx.clone()
    }

    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.tx);
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "database worker did not shut down cleanly");
        }
    }
}

/// Main loop of the worker side: owns its database view and serves
/// forwarded requests until cancelled or disconnected.
pub(crate) async fn worker_main(
    db: Arc<DictionaryDatabase>,
    rx: AsyncReceiver<WorkerRequest>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Ok(request) => dispatch(&db, request),
                Err(_) => break,
            },
        }
    }
    tracing::debug!("database worker stopping");
}

/// Serves one spliced renderer port until the renderer drops it.
pub(crate) async fn serve_port(db: Arc<DictionaryDatabase>, rx: AsyncReceiver<WorkerRequest>) {
    while let Ok(request) = rx.recv().await {
        dispatch(&db, request);
    }
    tracing::debug!("database worker port disconnected");
}

fn dispatch(db: &Arc<DictionaryDatabase>, request: WorkerRequest) {
    match request {
        WorkerRequest::DrawMedia { requests, reply } => {
            let db = Arc::clone(db);
            tokio::spawn(async move {
                if let Err(e) = db.draw_media(requests, reply).await {
                    tracing::error!(error = %e, "media draw failed in worker");
                }
            });
        }
        WorkerRequest::Connect { port } => {
            tokio::spawn(serve_port(Arc::clone(db), port));
        }
    }
}
