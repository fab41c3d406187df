//! Bounded, cancellable pool of typesetting workers.
//!
//! Typesetting is CPU-heavy, so a small fixed set of workers each own one
//! engine instance; requests beyond that queue FIFO on a channel and are
//! served as workers free up. Every request carries its own reply channel,
//! so one failing job cannot corrupt the pool or other requests. The pool
//! applies no content caching; identical requests are re-typeset.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::PreviewError;
use crate::render::engine::{RenderOptions, RenderResult, TypesetEngine};

struct Job {
    source: String,
    options: RenderOptions,
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<RenderResult, PreviewError>>,
}

/// Handle to the worker pool. Cloneable; dropping the last handle shuts the
/// workers down once the queue drains.
#[derive(Clone)]
pub struct RenderPool {
    queue: mpsc::UnboundedSender<Job>,
}

impl RenderPool {
    /// Spawn `size` workers, each owning one engine built by `factory`.
    /// The factory is also used to replace an instance lost to a panic.
    pub fn new<E, F>(size: usize, factory: F) -> Self
    where
        E: TypesetEngine,
        F: Fn() -> E + Send + Sync + 'static,
    {
        let (queue, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let factory = Arc::new(factory);

        for id in 0..size.max(1) {
            let rx = Arc::clone(&rx);
            let factory = Arc::clone(&factory);
            tokio::spawn(async move {
                worker_loop(id, rx, factory).await;
            });
        }

        Self { queue }
    }

    /// Typeset `source`, waiting for a free engine instance.
    ///
    /// If `cancel` fires while the request is still queued, it is dropped at
    /// dequeue time without touching an engine. If it fires after dispatch,
    /// the engine runs to completion but the result is discarded and the
    /// instance is reclaimed for the next request (best-effort abort).
    pub async fn typeset(
        &self,
        source: String,
        options: RenderOptions,
        cancel: &CancellationToken,
    ) -> Result<RenderResult, PreviewError> {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            source,
            options,
            cancel: cancel.clone(),
            reply,
        };
        self.queue.send(job).map_err(|_| PreviewError::PoolClosed)?;

        tokio::select! {
            _ = cancel.cancelled() => Err(PreviewError::Cancelled),
            res = rx => res.unwrap_or(Err(PreviewError::PoolClosed)),
        }
    }
}

async fn worker_loop<E, F>(id: usize, rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>, factory: Arc<F>)
where
    E: TypesetEngine,
    F: Fn() -> E + Send + Sync + 'static,
{
    let mut engine = factory();

    loop {
        // Hold the lock only while dequeuing so siblings can pull the next
        // job as soon as this one is dispatched.
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else { break };

        if job.cancel.is_cancelled() {
            // Dropped from the queue without consuming an instance.
            let _ = job.reply.send(Err(PreviewError::Cancelled));
            continue;
        }

        let source = job.source;
        let options = job.options;
        let joined = tokio::task::spawn_blocking(move || {
            let result = engine.typeset(&source, &options);
            (engine, result)
        })
        .await;

        match joined {
            Ok((returned, result)) => {
                engine = returned;
                if job.cancel.is_cancelled() {
                    let _ = job.reply.send(Err(PreviewError::Cancelled));
                } else {
                    let _ = job.reply.send(result);
                }
            }
            Err(err) => {
                // The engine was lost to a panic; replace it and fail only
                // this request.
                tracing::error!(worker = id, %err, "typesetting worker panicked, restarting engine");
                engine = factory();
                let _ = job
                    .reply
                    .send(Err(PreviewError::Render("typesetting engine crashed".into())));
            }
        }
    }
}
