use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::scheduler::Scheduler;
use crate::session::{
    cancel_pair, CancelHandle, CaptureSession, SessionError, SessionReport,
};
use crate::sink::{StatusSink, SubmissionSink};
use crate::source::{GeoProvider, VideoSource};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("a capture session is already running")]
    Busy,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to start engine: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Messages sent from callers to the engine thread.
enum EngineRequest {
    Start {
        reply: oneshot::Sender<Result<SessionReport, SessionError>>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// At most one session runs at a time; `start` while one is in flight
/// returns [`EngineError::Busy`] without touching the running session.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    cancel: CancelHandle,
    busy: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Run one capture session and wait for its report.
    pub async fn start(&self) -> Result<SessionReport, EngineError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Busy);
        }
        self.cancel.reset();

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(EngineRequest::Start { reply: reply_tx })
            .await
            .is_err()
        {
            self.busy.store(false, Ordering::SeqCst);
            return Err(EngineError::ChannelClosed);
        }
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Ask the running session to stop. Returns false if nothing was running.
    pub fn cancel(&self) -> bool {
        if !self.busy.load(Ordering::SeqCst) {
            return false;
        }
        tracing::info!("cancel requested");
        self.cancel.cancel();
        true
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Spawn the capture engine on a dedicated OS thread.
///
/// The thread owns the session and drives each run on its own
/// single-threaded runtime, so collaborator futures need not be `Send`.
/// The thread exits when the last [`EngineHandle`] is dropped.
pub fn spawn_engine<V, G, S, R, C>(
    mut session: CaptureSession<V, G, S, R, C>,
) -> Result<EngineHandle, EngineError>
where
    V: VideoSource + Send + 'static,
    V::Handle: Send,
    G: GeoProvider + Send + 'static,
    S: SubmissionSink + Send + 'static,
    R: StatusSink + Send + 'static,
    C: Scheduler + Send + 'static,
{
    // Build the runtime up front so a failure surfaces to the caller
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(EngineError::Runtime)?;

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let (cancel, mut signal) = cancel_pair();
    let busy = Arc::new(AtomicBool::new(false));
    let thread_busy = Arc::clone(&busy);

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            tracing::info!(
                required = session.config().required_frames,
                "engine thread started"
            );
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Start { reply } => {
                        let result = rt.block_on(session.run(&mut signal));
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "session ended with error");
                        }
                        thread_busy.store(false, Ordering::SeqCst);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Runtime)?;

    Ok(EngineHandle { tx, cancel, busy })
}
