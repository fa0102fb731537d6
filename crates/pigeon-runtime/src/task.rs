//! Session Task Implementation
//!
//! The one task that owns the [`SessionMachine`]. Commands, raw platform events and
//! expired deadlines are consumed from their channels strictly one at a time, so
//! every transition sees a consistent state and nothing else ever writes to it.

use std::collections::VecDeque;

use pigeon_core::{
    normalize, Command, Effect, Event, Notice, PigeonError, PigeonResult, PlatformAdapter,
    RawEventReceiver, RequestId, SessionError, SessionMachine, StateStore, Transition,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Task Messages
// ----------------------------------------------------------------------------

/// Messages accepted on the session task's command channel
#[derive(Debug)]
pub enum TaskMessage {
    /// A subscriber command and where to send its outcome
    Command {
        command: Command,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Shutdown,
}

pub type TaskSender = mpsc::Sender<TaskMessage>;
pub type TaskReceiver = mpsc::Receiver<TaskMessage>;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Counters kept by the session task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub raw_events_received: u64,
    pub raw_events_dropped: u64,
    pub requests_submitted: u64,
    pub submit_failures: u64,
    pub deadlines_scheduled: u64,
}

// ----------------------------------------------------------------------------
// Session Task
// ----------------------------------------------------------------------------

/// Serialized driver of the session state machine
pub struct SessionTask<A: PlatformAdapter> {
    machine: SessionMachine,
    store: StateStore,
    adapter: A,
    /// Commands from runtime handles
    command_receiver: TaskReceiver,
    /// Raw notifications and replies from the platform adapter
    raw_receiver: RawEventReceiver,
    /// Expired deadlines, fed by timer tasks
    timer_sender: mpsc::Sender<RequestId>,
    timer_receiver: mpsc::Receiver<RequestId>,
    raw_closed: bool,
    stats: TaskStats,
}

impl<A: PlatformAdapter> SessionTask<A> {
    pub fn new(
        machine: SessionMachine,
        store: StateStore,
        adapter: A,
        command_receiver: TaskReceiver,
        raw_receiver: RawEventReceiver,
        timer_buffer_size: usize,
    ) -> Self {
        let (timer_sender, timer_receiver) = mpsc::channel(timer_buffer_size);
        Self {
            machine,
            store,
            adapter,
            command_receiver,
            raw_receiver,
            timer_sender,
            timer_receiver,
            raw_closed: false,
            stats: TaskStats::default(),
        }
    }

    /// Run until shutdown or until every command handle is gone, returning the counters
    pub async fn run(&mut self) -> PigeonResult<TaskStats> {
        info!("Session task starting with {} adapter", self.adapter.name());
        self.store.publish(self.machine.state());

        let bootstrap = self.machine.bootstrap();
        self.apply(bootstrap).await;

        loop {
            tokio::select! {
                message = self.command_receiver.recv() => {
                    match message {
                        Some(TaskMessage::Command { command, reply }) => {
                            let outcome = self.process_command(command).await;
                            if reply.send(outcome).is_err() {
                                debug!("Command caller went away before the reply");
                            }
                        }
                        Some(TaskMessage::Shutdown) => {
                            info!("Session task received shutdown");
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                raw = self.raw_receiver.recv(), if !self.raw_closed => {
                    match raw {
                        Some(raw) => {
                            self.stats.raw_events_received += 1;
                            match normalize(raw) {
                                Some(event) => self.process_event(event).await,
                                None => self.stats.raw_events_dropped += 1,
                            }
                        }
                        None => {
                            // Commands keep working; the platform just went quiet
                            warn!("Platform event sink closed");
                            self.raw_closed = true;
                        }
                    }
                }

                Some(request) = self.timer_receiver.recv() => {
                    self.process_event(Event::RequestTimedOut { request }).await;
                }
            }
        }

        info!(
            "Session task stopped: {} raw events, {} requests submitted",
            self.stats.raw_events_received, self.stats.requests_submitted
        );
        Ok(self.stats)
    }

    async fn process_command(&mut self, command: Command) -> Result<(), SessionError> {
        debug!("Processing command {:?}", command);
        match self.machine.handle_command(command) {
            Ok(transition) => {
                self.apply(transition).await;
                Ok(())
            }
            Err(err) => {
                if let SessionError::PermissionDenied { missing } = &err {
                    self.store.announce(Notice::PermissionRequired {
                        missing: missing.clone(),
                    });
                }
                Err(err)
            }
        }
    }

    async fn process_event(&mut self, event: Event) {
        debug!("Processing event {}", event.name());
        let transition = self.machine.handle_event(event);
        self.apply(transition).await;
    }

    /// Publish the new state, then execute effects
    ///
    /// A submission the adapter refuses outright is fed back as a rejection of that
    /// request before the next queued input is looked at.
    async fn apply(&mut self, transition: Transition) {
        let mut pending = VecDeque::from([transition]);

        while let Some(transition) = pending.pop_front() {
            if transition.from != transition.to {
                info!(
                    "Session {} -> {} on {}",
                    transition.from, transition.to, transition.trigger
                );
            }
            self.store.publish(self.machine.state());
            for notice in transition.notices {
                self.store.announce(notice);
            }

            for effect in transition.effects {
                match effect {
                    Effect::Submit(request) => {
                        let id = request.id();
                        self.stats.requests_submitted += 1;
                        if let Err(err) = self.adapter.submit(request).await {
                            self.stats.submit_failures += 1;
                            warn!("Submitting {} failed: {}", id, err);
                            pending.push_back(self.machine.handle_event(Event::RequestRejected {
                                request: id,
                                reason: err.to_string(),
                            }));
                        }
                    }
                    Effect::ScheduleTimeout { request, after } => {
                        self.stats.deadlines_scheduled += 1;
                        self.schedule_timeout(request, after);
                    }
                }
            }
        }
    }

    fn schedule_timeout(&self, request: RequestId, after: std::time::Duration) {
        let timer_sender = self.timer_sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if timer_sender.send(request).await.is_err() {
                debug!("Session task gone before deadline of {}", request);
            }
        });
    }
}

/// Convert a failed handoff to the session task into a channel error
pub(crate) fn task_gone<T>(_: T) -> PigeonError {
    error!("Session task is not running");
    PigeonError::channel_error("Session task is not running")
}
