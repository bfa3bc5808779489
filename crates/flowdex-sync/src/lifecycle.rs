//! Project lifecycle coordination.
//!
//! [`LifecycleCoordinator`] reacts to project enter/exit by starting and
//! stopping the processing scheduler, and to managed-node restarts by
//! wiping all indexed data: a node restart means chain history starts over
//! from genesis, so previously indexed data is stale.
//!
//! Process-state notifications are consumed through a broadcast receiver
//! owned by a single listener task per active context. Attach is
//! subscribe-and-spawn, detach is abort-and-drop, so repeated enter/exit
//! cycles cannot leak listeners or double-fire.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::{
    AsyncIntervalScheduler, FlowdexSync, GatewayAdapter, IndexStorage, IndexerResult,
    ProcessManager, ProcessState, ProjectContext, ProjectLifecycle, SyncEngine,
    WellKnownCandidates, EMULATOR_PROCESS_ID,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Inactive,
    Active,
}

pub struct LifecycleCoordinator<G, S, P> {
    engine: Arc<FlowdexSync<G, S, P>>,
    processes: Arc<P>,
    scheduler: AsyncIntervalScheduler,
    listener: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<CoordinatorState>,
}

impl<G, S, P> LifecycleCoordinator<G, S, P>
where
    G: GatewayAdapter + 'static,
    S: IndexStorage + 'static,
    P: ProcessManager + 'static,
{
    pub fn new(engine: Arc<FlowdexSync<G, S, P>>, processes: Arc<P>) -> Self {
        let interval = engine.config().processing_interval;
        Self {
            engine,
            processes,
            scheduler: AsyncIntervalScheduler::new("blockchain processing", interval),
            listener: Mutex::new(None),
            state: Mutex::new(CoordinatorState::Inactive),
        }
    }

    pub async fn state(&self) -> CoordinatorState {
        *self.state.lock().await
    }

    /// Watches the process event stream and wipes the index whenever the
    /// emulator process transitions into the running state.
    fn spawn_process_listener(&self) -> JoinHandle<()> {
        let mut events = self.processes.subscribe();
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let mut last_state: Option<ProcessState> = None;
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let info = event.info();
                        if info.id != EMULATOR_PROCESS_ID {
                            continue;
                        }
                        let became_running = info.state == ProcessState::Running
                            && last_state != Some(ProcessState::Running);
                        last_state = Some(info.state);
                        if became_running {
                            debug!("emulator process was started, reindexing");
                            if let Err(e) = engine.remove_all_indexed_data().await {
                                error!("failed to wipe indexed data: {e}");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("process listener lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn detach_listener(&self) {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl<G, S, P> ProjectLifecycle for LifecycleCoordinator<G, S, P>
where
    G: GatewayAdapter + 'static,
    S: IndexStorage + 'static,
    P: ProcessManager + 'static,
{
    async fn on_enter_project_context(&self, project: ProjectContext) -> IndexerResult<()> {
        // Unsupported addressing configurations must fail activation
        // visibly instead of erroring on every tick.
        WellKnownCandidates::resolve(project.chain)?;

        // Entering while active implies an exit of the previous context.
        self.on_exit_project_context().await?;

        debug!("entering project context: {}", project.name);
        self.engine.set_context(project).await;
        *self.listener.lock().await = Some(self.spawn_process_listener());

        let engine = self.engine.clone();
        self.scheduler
            .start(move || {
                let engine = engine.clone();
                async move { engine.process_single_tick().await }
            });

        *self.state.lock().await = CoordinatorState::Active;
        Ok(())
    }

    async fn on_exit_project_context(&self) -> IndexerResult<()> {
        if *self.state.lock().await == CoordinatorState::Inactive {
            return Ok(());
        }
        debug!("exiting project context");
        self.scheduler.stop();
        self.detach_listener().await;
        self.engine.clear_context().await;
        *self.state.lock().await = CoordinatorState::Inactive;
        Ok(())
    }
}
