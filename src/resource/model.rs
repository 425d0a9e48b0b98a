//! The single exclusive model resource.
//!
//! The inference engine holds one mutable device context, so at most one
//! invocation may execute at any instant, system-wide. Exclusivity is
//! enforced by a dedicated worker task that owns the engine handle and
//! consumes jobs from a bounded channel; callers get their result back over
//! a oneshot. A caller that stops waiting discards the result without
//! interrupting the in-flight call.

use image::RgbImage;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ModelConfig, ResourceConfig};
use crate::engine::{EngineError, EngineHandle, InferenceEngine, ModelParams};
use crate::error::{AppError, Result};

/// Lifecycle state of the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Loading,
    Ready,
    /// Exclusive use, not an error state
    Busy,
    Closing,
    Closed,
}

struct InvokeJob {
    image: RgbImage,
    prompt: String,
    params: ModelParams,
    response_tx: oneshot::Sender<Result<RgbImage>>,
}

/// Process-lifetime owner of the loaded engine handle
pub struct ModelResource {
    engine: Arc<dyn InferenceEngine>,
    state: Arc<RwLock<ResourceState>>,
    in_flight: Arc<AtomicU32>,
    job_tx: Mutex<Option<mpsc::Sender<InvokeJob>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    invoke_timeout: Duration,
}

impl ModelResource {
    /// One-time startup load: Uninitialized -> Loading -> Ready.
    ///
    /// A load failure is fatal; the resource never reaches Ready and the
    /// caller must refuse to report the service healthy.
    pub async fn load(
        engine: Arc<dyn InferenceEngine>,
        model: &ModelConfig,
        resource: &ResourceConfig,
    ) -> Result<Self> {
        let state = Arc::new(RwLock::new(ResourceState::Loading));
        info!(
            checkpoint = %model.checkpoint,
            device = %model.device,
            "loading model weights"
        );

        let handle = engine
            .load(&model.checkpoint, model.device)
            .await
            .map_err(|e| {
                error!("model load failed: {e}");
                AppError::Internal(format!("model load failed: {e}"))
            })?;

        let in_flight = Arc::new(AtomicU32::new(0));
        let (job_tx, job_rx) = mpsc::channel(resource.max_pending);
        let worker = tokio::spawn(Self::run_worker(
            engine.clone(),
            state.clone(),
            in_flight.clone(),
            job_rx,
            handle,
        ));

        *state.write() = ResourceState::Ready;
        info!("model resource ready");

        Ok(Self {
            engine,
            state,
            in_flight,
            job_tx: Mutex::new(Some(job_tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            invoke_timeout: Duration::from_millis(resource.invoke_timeout_ms),
        })
    }

    /// Sequentially executes queued jobs; owns the engine handle for the
    /// lifetime of the resource and releases it when the queue closes.
    async fn run_worker(
        engine: Arc<dyn InferenceEngine>,
        state: Arc<RwLock<ResourceState>>,
        in_flight: Arc<AtomicU32>,
        mut job_rx: mpsc::Receiver<InvokeJob>,
        handle: EngineHandle,
    ) {
        while let Some(job) = job_rx.recv().await {
            {
                let mut s = state.write();
                if *s == ResourceState::Ready {
                    *s = ResourceState::Busy;
                }
            }
            in_flight.fetch_add(1, Ordering::SeqCst);

            let outcome = engine
                .run(&handle, &job.image, &job.prompt, &job.params)
                .await;

            if matches!(outcome, Err(EngineError::ResourceExhausted(_))) {
                warn!("device memory exhausted; reclaiming");
                engine.reclaim_memory().await;
            }

            in_flight.fetch_sub(1, Ordering::SeqCst);
            {
                // Busy -> Ready on any outcome; Closing is preserved.
                let mut s = state.write();
                if *s == ResourceState::Busy {
                    *s = ResourceState::Ready;
                }
            }

            let result = outcome.map_err(|e| match e {
                EngineError::ResourceExhausted(_) => AppError::DeviceMemoryExhausted,
                EngineError::InvalidArgument(msg) => AppError::Engine(msg),
                other => AppError::Engine(other.to_string()),
            });
            // A lapsed caller has dropped its receiver; the result is
            // discarded, never the call interrupted.
            if job.response_tx.send(result).is_err() {
                debug!("caller gave up before the result was ready");
            }
        }

        engine.release(handle).await;
        debug!("engine handle released");
    }

    /// Submit one transformation. Rejected outright when the bounded queue
    /// is full; otherwise waits up to the configured timeout for the result.
    pub async fn invoke(
        &self,
        image: RgbImage,
        prompt: String,
        params: ModelParams,
    ) -> Result<RgbImage> {
        match self.state() {
            ResourceState::Ready | ResourceState::Busy => {}
            _ => return Err(AppError::ResourceUnavailable),
        }

        let (response_tx, response_rx) = oneshot::channel();
        let job = InvokeJob {
            image,
            prompt,
            params,
            response_tx,
        };

        let send_result = {
            let tx = self.job_tx.lock();
            match tx.as_ref() {
                Some(tx) => tx.try_send(job),
                None => return Err(AppError::ResourceUnavailable),
            }
        };
        match send_result {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("invoke queue full, rejecting request");
                return Err(AppError::Overloaded { retry_after: 1 });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(AppError::ResourceUnavailable)
            }
        }

        match tokio::time::timeout(self.invoke_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::Internal(
                "transformation was cancelled".to_string(),
            )),
            Err(_) => Err(AppError::InvokeTimeout),
        }
    }

    pub fn state(&self) -> ResourceState {
        *self.state.read()
    }

    /// Whether the resource may accept work; Busy still counts as healthy
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), ResourceState::Ready | ResourceState::Busy)
    }

    /// Number of invocations executing right now; never exceeds 1
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Shutdown: {Ready, Busy} -> Closing -> Closed. Drains queued and
    /// in-flight work before the engine handle is released. Idempotent.
    pub async fn close(&self) {
        {
            let mut s = self.state.write();
            match *s {
                ResourceState::Closed | ResourceState::Closing | ResourceState::Uninitialized => {
                    return
                }
                _ => *s = ResourceState::Closing,
            }
        }

        // Dropping the sender lets the worker drain and exit.
        self.job_tx.lock().take();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!("worker task ended abnormally: {e}");
            }
        }
        self.engine.reclaim_memory().await;

        *self.state.write() = ResourceState::Closed;
        info!("model resource closed");
    }
}
