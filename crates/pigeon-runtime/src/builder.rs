//! Runtime Builder API
//!
//! Provides a builder-style API for consumers (CLI, tests, an embedding app) to
//! attach a platform adapter and a permission source and get back a handle for
//! commands and state subscriptions.

use std::sync::Arc;

use pigeon_core::{
    create_notice_channel, create_raw_event_channel, Command, NoticeReceiver, PeerId,
    PermissionGate, PermissionSource, PigeonConfig, PigeonError, PigeonResult, PlatformAdapter,
    RawEventSink, SessionMachine, StateStore, StateView,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::info;

use crate::task::{task_gone, SessionTask, TaskMessage, TaskSender, TaskStats};

/// How long `shutdown` waits for the session task to finish
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a Pigeon session runtime
pub struct RuntimeBuilder {
    config: PigeonConfig,
    permissions: Option<Arc<dyn PermissionSource>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: PigeonConfig::default(),
            permissions: None,
        }
    }

    /// Set the Pigeon configuration
    pub fn with_config(mut self, config: PigeonConfig) -> Self {
        self.config = config;
        self
    }

    /// Set where permission grants are read from
    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionSource>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Build and start the runtime
    ///
    /// `make_adapter` receives the sink the adapter must deliver every platform
    /// notification and reply into. Must be called within a Tokio runtime.
    pub async fn start<F, A>(self, make_adapter: F) -> PigeonResult<RuntimeHandle>
    where
        F: FnOnce(RawEventSink) -> A,
        A: PlatformAdapter + 'static,
    {
        self.config.validate()?;
        let permissions = self
            .permissions
            .ok_or_else(|| PigeonError::config_error("no permission source configured"))?;

        info!("Building Pigeon runtime");

        let channels = &self.config.channels;
        let (command_sender, command_receiver) = mpsc::channel(channels.command_buffer_size);
        let (sink, raw_receiver) = create_raw_event_channel();
        let (notice_sender, _) = create_notice_channel(channels);

        let gate = PermissionGate::new(permissions, &self.config.permissions);
        let machine = SessionMachine::new(self.config.session.clone(), gate);
        let store = StateStore::new(machine.state(), notice_sender);
        let view = store.view();
        let adapter = make_adapter(sink.clone());

        let mut task = SessionTask::new(
            machine,
            store,
            adapter,
            command_receiver,
            raw_receiver,
            channels.timer_buffer_size,
        );
        let task_handle = tokio::spawn(async move { task.run().await });

        info!("Pigeon runtime started");

        Ok(RuntimeHandle {
            command_sender,
            view,
            sink,
            task_handle: Some(task_handle),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running session
pub struct RuntimeHandle {
    command_sender: TaskSender,
    view: StateView,
    sink: RawEventSink,
    task_handle: Option<JoinHandle<PigeonResult<TaskStats>>>,
}

impl RuntimeHandle {
    /// Read access to the observable state
    pub fn view(&self) -> StateView {
        self.view.clone()
    }

    /// Notices published from now on
    pub fn subscribe_notices(&self) -> NoticeReceiver {
        self.view.subscribe_notices()
    }

    /// The sink the platform adapter delivers into
    pub fn event_sink(&self) -> RawEventSink {
        self.sink.clone()
    }

    /// Send a command and wait for the session to accept or refuse it
    pub async fn send_command(&self, command: Command) -> PigeonResult<()> {
        let (reply, outcome) = oneshot::channel();
        self.command_sender
            .send(TaskMessage::Command { command, reply })
            .await
            .map_err(task_gone)?;
        outcome.await.map_err(task_gone)?.map_err(PigeonError::from)
    }

    pub async fn connect_to(&self, peer_id: impl Into<PeerId>) -> PigeonResult<()> {
        self.send_command(Command::ConnectTo {
            peer_id: peer_id.into(),
        })
        .await
    }

    pub async fn set_local_display_name(&self, name: impl Into<String>) -> PigeonResult<()> {
        self.send_command(Command::SetLocalDisplayName { name: name.into() })
            .await
    }

    pub async fn start_discovery(&self) -> PigeonResult<()> {
        self.send_command(Command::StartDiscovery).await
    }

    /// Check if the session task is still running
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the session task to complete
    ///
    /// Returns the task's counters; a handle whose task was already reaped gets
    /// empty counters.
    pub async fn wait(&mut self) -> PigeonResult<TaskStats> {
        match self.task_handle.take() {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(PigeonError::channel_error(format!(
                    "Session task panicked: {}",
                    e
                ))),
            },
            None => Ok(TaskStats::default()),
        }
    }

    /// Shut the session down gracefully
    pub async fn shutdown(&mut self) -> PigeonResult<TaskStats> {
        info!("Shutting down Pigeon runtime");
        let _ = self.command_sender.send(TaskMessage::Shutdown).await;

        let mut stats = TaskStats::default();
        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(result)) => stats = result?,
                Ok(Err(e)) => {
                    return Err(PigeonError::channel_error(format!(
                        "Session task panicked: {}",
                        e
                    )))
                }
                Err(_) => {
                    return Err(PigeonError::channel_error(
                        "Session task did not stop in time",
                    ))
                }
            }
        }

        info!("Pigeon runtime shut down");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigeon_core::{Capability, PlatformError, PlatformRequest, SessionPhase};

    struct Granted;

    impl PermissionSource for Granted {
        fn is_granted(&self, _capability: Capability) -> bool {
            true
        }
    }

    struct Silent;

    #[async_trait::async_trait]
    impl PlatformAdapter for Silent {
        async fn submit(&self, _request: PlatformRequest) -> Result<(), PlatformError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runtime_builder() {
        let mut runtime = RuntimeBuilder::new()
            .with_config(PigeonConfig::testing())
            .with_permissions(Arc::new(Granted))
            .start(|_sink| Silent)
            .await
            .expect("Failed to build runtime");

        assert!(runtime.is_running());
        assert_eq!(runtime.view().phase(), SessionPhase::Disabled);

        let stats = runtime.shutdown().await.expect("Failed to shut down");
        assert!(!runtime.is_running());
        // Identity request on start
        assert_eq!(stats.requests_submitted, 1);
        assert_eq!(stats.submit_failures, 0);
    }

    #[tokio::test]
    async fn test_builder_requires_permission_source() {
        let result = RuntimeBuilder::new().start(|_sink| Silent).await;
        assert!(matches!(result, Err(PigeonError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_builder_validates_config() {
        let mut config = PigeonConfig::testing();
        config.channels.command_buffer_size = 0;
        let result = RuntimeBuilder::new()
            .with_config(config)
            .with_permissions(Arc::new(Granted))
            .start(|_sink| Silent)
            .await;
        assert!(matches!(result, Err(PigeonError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let mut runtime = RuntimeBuilder::new()
            .with_permissions(Arc::new(Granted))
            .start(|_sink| Silent)
            .await
            .unwrap();
        runtime.shutdown().await.unwrap();

        let err = runtime.start_discovery().await.unwrap_err();
        assert!(matches!(err, PigeonError::Channel { .. }));
    }
}
