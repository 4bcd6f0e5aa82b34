use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{OwnedSemaphorePermit, mpsc, oneshot};
use tracing::{error, info, warn};
use uuid::Uuid;
use wg_core::{GenerationRequest, Orchestrator, PipelineResult, PipelineStage, ProgressAggregator, StageWeights};

use crate::error::AppError;
use crate::events::GenerateEvent;

/// Progress records buffered per run before the pipeline waits on the reader.
const EVENT_BUFFER: usize = 256;

pub enum WorkerCommand {
    Generate {
        request: GenerationRequest,
        permit: OwnedSemaphorePermit,
        events: mpsc::Sender<GenerateEvent>,
        done: oneshot::Sender<PipelineResult>,
    },
    Shutdown,
}

/// Dedicated thread that owns the orchestrator and runs one pipeline at a
/// time. The orchestrator is built on that thread and never leaves it.
pub struct PipelineWorker {
    command_tx: Sender<WorkerCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn spawn<F>(build: F, weights: StageWeights) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<Orchestrator> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = channel::<WorkerCommand>();
        let (ready_tx, ready_rx) = channel::<Result<(), String>>();

        let thread_handle = thread::Builder::new()
            .name("pipeline-worker".into())
            .spawn(move || {
                let orchestrator = match build() {
                    Ok(orchestrator) => {
                        let _ = ready_tx.send(Ok(()));
                        orchestrator
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                worker_loop(orchestrator, cmd_rx, weights);
            })
            .context("Failed to spawn pipeline worker thread")?;

        ready_rx
            .recv()
            .context("Pipeline worker exited during startup")?
            .map_err(anyhow::Error::msg)
            .context("Failed to build the generation pipeline")?;

        Ok(Self {
            command_tx: cmd_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Queues a run. The permit travels with it and is released by the
    /// worker once the run has finished.
    pub fn submit(
        &self,
        request: GenerationRequest,
        permit: OwnedSemaphorePermit,
    ) -> Result<RunHandle, AppError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (done_tx, done_rx) = oneshot::channel();
        self.command_tx
            .send(WorkerCommand::Generate {
                request,
                permit,
                events: events_tx,
                done: done_tx,
            })
            .map_err(|_| AppError::WorkerUnavailable)?;
        Ok(RunHandle { events: events_rx, done: done_rx })
    }

    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(mut orchestrator: Orchestrator, commands: Receiver<WorkerCommand>, weights: StageWeights) {
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Generate { request, permit, events, done } => {
                let run_id = Uuid::new_v4();
                info!(%run_id, target = %request.target, "Generation started");

                let result = run_with_progress(&mut orchestrator, &request, &weights, &events);
                match &result.error {
                    None => info!(%run_id, output = ?result.output_filename(), "Generation finished"),
                    Some(e) => warn!(%run_id, "Generation failed: {}", e),
                }

                // close the stream and free the gate before handing back the result
                drop(events);
                drop(permit);
                let _ = done.send(result);
            }
            WorkerCommand::Shutdown => break,
        }
    }
    info!("Pipeline worker stopped");
}

fn run_with_progress(
    orchestrator: &mut Orchestrator,
    request: &GenerationRequest,
    weights: &StageWeights,
    events: &mpsc::Sender<GenerateEvent>,
) -> PipelineResult {
    let mut aggregator = ProgressAggregator::new(weights.clone());
    let mut sink = |stage: PipelineStage, fraction: f32, message: &str| {
        let overall = aggregator.update(stage, fraction);
        // a closed channel means the client went away; the run still completes
        let _ = events.blocking_send(GenerateEvent::progress(stage, overall, message));
    };
    orchestrator.run_pipeline(request, &mut sink)
}

/// What one poll of a running generation produced.
#[derive(Debug)]
pub enum Polled {
    Event(GenerateEvent),
    Idle,
    Finished,
}

/// Receiving side of one submitted run.
pub struct RunHandle {
    events: mpsc::Receiver<GenerateEvent>,
    done: oneshot::Receiver<PipelineResult>,
}

impl RunHandle {
    /// Waits up to `timeout` for the next progress record. `Finished` is only
    /// returned once every buffered record has been taken.
    pub async fn poll(&mut self, timeout: Duration) -> Polled {
        match tokio::time::timeout(timeout, self.events.recv()).await {
            Ok(Some(event)) => Polled::Event(event),
            Ok(None) => Polled::Finished,
            Err(_) => Polled::Idle,
        }
    }

    /// The terminal `complete` record.
    pub async fn finish(self) -> GenerateEvent {
        match self.done.await {
            Ok(result) => GenerateEvent::complete(&result),
            Err(_) => {
                error!("Pipeline worker dropped a run without a result");
                GenerateEvent::aborted("Pipeline worker stopped unexpectedly")
            }
        }
    }
}
