//! Engine tying the protocols to one link.
//!
//! Owns the dispatcher, timeout scheduler and callback executor, and one
//! instance of each protocol. Incoming messages go through
//! [`Engine::process_message`]; [`Engine::tick`] drives timers and work
//! queues and is called by the driver task or, in tests, by hand.

use std::sync::Arc;
use std::time::Duration;

use mavlink::common::MavMessage;
use mavlink::MavHeader;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::callbacks::CallbackExecutor;
use crate::command::{CommandPolicy, CommandSender};
use crate::config::LinkConfig;
use crate::dispatch::MessageDispatcher;
use crate::error::LinkError;
use crate::mission::{MissionTransferClient, MissionTransferServer, TransferPolicy};
use crate::sender::Sender;
use crate::time::{MonotonicTime, TimeSource};
use crate::timeout::TimeoutScheduler;

pub struct Engine {
    config: LinkConfig,
    sender: Arc<dyn Sender>,
    dispatcher: Arc<MessageDispatcher>,
    scheduler: Arc<TimeoutScheduler>,
    executor: Arc<CallbackExecutor>,
    commands: CommandSender,
    mission_client: MissionTransferClient,
    mission_server: MissionTransferServer,
}

impl Engine {
    /// Engine on the monotonic system clock.
    pub fn new(sender: Arc<dyn Sender>, config: LinkConfig) -> Result<Self, LinkError> {
        Self::with_time_source(sender, config, Arc::new(MonotonicTime::new()))
    }

    /// Engine reading time from `time`.
    pub fn with_time_source(
        sender: Arc<dyn Sender>,
        config: LinkConfig,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, LinkError> {
        config.validate()?;

        let dispatcher = Arc::new(MessageDispatcher::new());
        let scheduler = Arc::new(TimeoutScheduler::new(time));
        let executor = Arc::new(CallbackExecutor::spawn()?);

        let command_policy = CommandPolicy {
            timeout: config.timeout(),
            retries: config.command_retries,
            debugging: config.command_debugging,
        };
        let transfer_policy = TransferPolicy {
            timeout: config.timeout(),
            retries: config.mission_retries,
            debugging: config.mission_debugging,
        };

        let commands = CommandSender::new(
            Arc::clone(&sender),
            Arc::clone(&dispatcher),
            Arc::clone(&scheduler),
            Arc::clone(&executor),
            command_policy,
        );
        let mission_client = MissionTransferClient::new(
            Arc::clone(&sender),
            Arc::clone(&dispatcher),
            Arc::clone(&scheduler),
            Arc::clone(&executor),
            transfer_policy,
        );
        let mission_server = MissionTransferServer::new(
            Arc::clone(&sender),
            Arc::clone(&dispatcher),
            Arc::clone(&scheduler),
            Arc::clone(&executor),
            transfer_policy,
        );

        debug!(
            own_system_id = sender.own_system_id(),
            target_system_id = sender.target_system_id(),
            "engine created"
        );

        Ok(Self {
            config,
            sender,
            dispatcher,
            scheduler,
            executor,
            commands,
            mission_client,
            mission_server,
        })
    }

    /// Route an incoming message to the registered handlers.
    pub fn process_message(&self, header: &MavHeader, message: &MavMessage) {
        self.dispatcher.dispatch(header, message);
    }

    /// Fire due timeouts, then advance every protocol.
    pub fn tick(&self) {
        self.scheduler.run_once();
        self.commands.do_work();
        self.mission_client.do_work();
        self.mission_server.do_work();
    }

    /// Tick period for the link's current connection state.
    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval(self.sender.is_connected())
    }

    /// Spawn a task that ticks the engine until `shutdown` turns `true` or
    /// its sender is dropped.
    pub fn spawn_driver(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(drive(Arc::clone(self), shutdown))
    }

    pub fn commands(&self) -> &CommandSender {
        &self.commands
    }

    pub fn mission_client(&self) -> &MissionTransferClient {
        &self.mission_client
    }

    pub fn mission_server(&self) -> &MissionTransferServer {
        &self.mission_server
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Arc<TimeoutScheduler> {
        &self.scheduler
    }

    pub fn executor(&self) -> &Arc<CallbackExecutor> {
        &self.executor
    }

    pub fn sender(&self) -> &Arc<dyn Sender> {
        &self.sender
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

async fn drive(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) {
    info!("engine driver started");
    loop {
        engine.tick();

        tokio::select! {
            _ = tokio::time::sleep(engine.poll_interval()) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("engine driver stopped");
}
