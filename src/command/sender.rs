//! Command Protocol Sender
//!
//! Sends COMMAND_LONG / COMMAND_INT and waits for the matching COMMAND_ACK.
//!
//! # Command Flow
//!
//! 1. `send_command_async` queues the command
//! 2. `do_work` sends the queue head and arms a timeout
//! 3. COMMAND_ACK with a final result completes the command
//! 4. IN_PROGRESS extends the timeout and reports progress
//! 5. A timeout resends the command until the retry budget runs out
//!
//! Only the head of the queue is ever in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mavlink::common::{MavMessage, MavResult, COMMAND_ACK_DATA};
use mavlink::{MavHeader, MessageData};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::types::Command;
use crate::callbacks::CallbackExecutor;
use crate::dispatch::{HandlerOwner, MessageDispatcher};
use crate::error::CommandError;
use crate::queue::{WorkId, WorkIds, WorkQueue, WorkQueueGuard};
use crate::sender::Sender;
use crate::timeout::{TimeoutCookie, TimeoutScheduler};

/// Result callback of a command.
pub type CommandCallback = Box<dyn FnOnce(Result<(), CommandError>) + Send>;

/// Progress callback, called with values in `0.0..=1.0`.
pub type CommandProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Ack progress value meaning "unknown".
const PROGRESS_UNKNOWN: u8 = u8::MAX;

/// Retry budget and timing of the command protocol.
#[derive(Debug, Clone, Copy)]
pub struct CommandPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub debugging: bool,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            retries: 3,
            debugging: false,
        }
    }
}

struct CommandWork {
    id: WorkId,
    command: Command,
    retries_remaining: u32,
    already_sent: bool,
    sent_at_us: u64,
    timeout_cookie: Option<TimeoutCookie>,
    outcome: Option<Result<(), CommandError>>,
    callback: Option<CommandCallback>,
    progress: Option<CommandProgressCallback>,
}

enum CommandEvent {
    Ack {
        header: MavHeader,
        ack: COMMAND_ACK_DATA,
    },
    Timeout {
        id: WorkId,
        cookie: TimeoutCookie,
    },
}

/// Sends commands one at a time and resolves them from COMMAND_ACK.
pub struct CommandSender {
    sender: Arc<dyn Sender>,
    dispatcher: Arc<MessageDispatcher>,
    scheduler: Arc<TimeoutScheduler>,
    executor: Arc<CallbackExecutor>,
    owner: HandlerOwner,
    queue: WorkQueue<CommandWork>,
    ids: WorkIds,
    events_tx: UnboundedSender<CommandEvent>,
    events_rx: Mutex<UnboundedReceiver<CommandEvent>>,
    policy: CommandPolicy,
    acks_seen: AtomicU64,
}

impl CommandSender {
    pub fn new(
        sender: Arc<dyn Sender>,
        dispatcher: Arc<MessageDispatcher>,
        scheduler: Arc<TimeoutScheduler>,
        executor: Arc<CallbackExecutor>,
        policy: CommandPolicy,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let owner = dispatcher.allocate_owner();

        let tx = events_tx.clone();
        dispatcher.register(COMMAND_ACK_DATA::ID, owner, move |header, message| {
            if let MavMessage::COMMAND_ACK(ack) = message {
                let _ = tx.send(CommandEvent::Ack {
                    header: *header,
                    ack: ack.clone(),
                });
            }
        });

        Self {
            sender,
            dispatcher,
            scheduler,
            executor,
            owner,
            queue: WorkQueue::new(),
            ids: WorkIds::new(),
            events_tx,
            events_rx: Mutex::new(events_rx),
            policy,
            acks_seen: AtomicU64::new(0),
        }
    }

    /// Queue `command`; `callback` runs once with the final result.
    pub fn send_command_async<F>(&self, command: impl Into<Command>, callback: F)
    where
        F: FnOnce(Result<(), CommandError>) + Send + 'static,
    {
        self.enqueue(command.into(), Box::new(callback), None);
    }

    /// Like [`send_command_async`](Self::send_command_async), additionally
    /// reporting progress carried by IN_PROGRESS acks.
    pub fn send_command_with_progress_async<F>(
        &self,
        command: impl Into<Command>,
        progress: CommandProgressCallback,
        callback: F,
    ) where
        F: FnOnce(Result<(), CommandError>) + Send + 'static,
    {
        self.enqueue(command.into(), Box::new(callback), Some(progress));
    }

    /// Send `command` and block until it resolves.
    ///
    /// Must not be called from an async context. Called from a result or
    /// progress callback it fails with [`CommandError::WouldDeadlock`].
    pub fn send_command(&self, command: impl Into<Command>) -> Result<(), CommandError> {
        if self.executor.is_current_thread() {
            error!("blocking send_command called from a callback, refusing");
            return Err(CommandError::WouldDeadlock);
        }

        let (tx, rx) = oneshot::channel();
        self.send_command_async(command, move |result| {
            let _ = tx.send(result);
        });
        rx.blocking_recv()
            .unwrap_or(Err(CommandError::ConnectionError))
    }

    /// Number of queued commands, including the one in flight.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of COMMAND_ACK messages processed so far.
    pub fn acks_seen(&self) -> u64 {
        self.acks_seen.load(Ordering::Relaxed)
    }

    /// Apply pending acks and timeouts, retire finished commands and send
    /// the next one.
    pub fn do_work(&self) {
        let mut finished = Vec::new();
        {
            let mut queue = self.queue.lock();
            self.drain_events(&mut queue);

            while let Some(work) = queue.front_mut() {
                if work.outcome.is_none() && !work.already_sent {
                    self.send_first(work);
                }
                if work.outcome.is_none() {
                    break;
                }
                if let Some(done) = queue.pop_front() {
                    finished.push(done);
                }
            }
        }

        for work in finished {
            self.post_result(work);
        }
    }

    fn enqueue(
        &self,
        command: Command,
        callback: CommandCallback,
        progress: Option<CommandProgressCallback>,
    ) {
        let work = CommandWork {
            id: self.ids.next_id(),
            command,
            retries_remaining: self.policy.retries,
            already_sent: false,
            sent_at_us: 0,
            timeout_cookie: None,
            outcome: None,
            callback: Some(callback),
            progress,
        };
        if self.policy.debugging {
            debug!(command = ?work.command.command_id(), "queueing command");
        }
        self.queue.push_back(work);
    }

    fn drain_events(&self, queue: &mut WorkQueueGuard<'_, CommandWork>) {
        let mut rx = self.events_rx.lock().unwrap_or_else(PoisonError::into_inner);
        while let Ok(event) = rx.try_recv() {
            match event {
                CommandEvent::Ack { header, ack } => self.handle_ack(queue, &header, &ack),
                CommandEvent::Timeout { id, cookie } => self.handle_timeout(queue, id, cookie),
            }
        }
    }

    fn send_first(&self, work: &mut CommandWork) {
        if !self.transmit(work) {
            error!(command = ?work.command.command_id(), "sending command failed");
            work.outcome = Some(Err(CommandError::ConnectionError));
            return;
        }
        work.already_sent = true;
        work.sent_at_us = self.scheduler.time().now_us();
        self.arm(work, self.policy.timeout);
    }

    fn handle_ack(
        &self,
        queue: &mut WorkQueueGuard<'_, CommandWork>,
        header: &MavHeader,
        ack: &COMMAND_ACK_DATA,
    ) {
        self.acks_seen.fetch_add(1, Ordering::Relaxed);

        let own_system = self.sender.own_system_id();
        let own_component = self.sender.own_component_id();
        if (ack.target_system != 0 && ack.target_system != own_system)
            || (ack.target_component != 0 && ack.target_component != own_component)
        {
            debug!(
                target_system = ack.target_system,
                target_component = ack.target_component,
                "ignoring command ack addressed elsewhere"
            );
            return;
        }

        let Some(work) = queue.front_mut() else {
            warn!(command = ?ack.command, "command ack with no command in flight");
            return;
        };
        if !work.already_sent || work.outcome.is_some() || work.command.command_id() != ack.command
        {
            warn!(
                command = ?ack.command,
                from_system = header.system_id,
                "ignoring stray command ack"
            );
            return;
        }

        if self.policy.debugging {
            debug!(
                command = ?ack.command,
                result = ?ack.result,
                elapsed_us = self.scheduler.time().elapsed_since(work.sent_at_us),
                "received command ack"
            );
        }

        match ack.result {
            MavResult::MAV_RESULT_ACCEPTED => self.finish(work, Ok(())),
            MavResult::MAV_RESULT_DENIED
            | MavResult::MAV_RESULT_TEMPORARILY_REJECTED
            | MavResult::MAV_RESULT_FAILED => self.finish(work, Err(CommandError::Denied)),
            MavResult::MAV_RESULT_UNSUPPORTED => self.finish(work, Err(CommandError::Unsupported)),
            MavResult::MAV_RESULT_IN_PROGRESS => self.extend(work, ack.progress),
            other => warn!(result = ?other, "unknown command ack result, ignoring"),
        }
    }

    fn handle_timeout(
        &self,
        queue: &mut WorkQueueGuard<'_, CommandWork>,
        id: WorkId,
        cookie: TimeoutCookie,
    ) {
        let Some(work) = queue.front_mut() else {
            return;
        };
        if work.id != id || work.timeout_cookie != Some(cookie) || work.outcome.is_some() {
            debug!("dropping stale command timeout");
            return;
        }
        work.timeout_cookie = None;

        if work.retries_remaining == 0 {
            warn!(command = ?work.command.command_id(), "command timed out, no retries left");
            work.outcome = Some(Err(CommandError::Timeout));
            return;
        }

        if self.policy.debugging {
            debug!(
                command = ?work.command.command_id(),
                retries = work.retries_remaining,
                "command timeout, resending"
            );
        }
        if !self.transmit(work) {
            error!(command = ?work.command.command_id(), "resending command failed");
            work.outcome = Some(Err(CommandError::ConnectionError));
            return;
        }
        work.retries_remaining -= 1;
        self.arm(work, self.policy.timeout);
    }

    /// IN_PROGRESS: the command is running, wait longer instead of resending.
    fn extend(&self, work: &mut CommandWork, progress: u8) {
        self.disarm(work);
        let factor = work.retries_remaining.max(1);
        self.arm(work, self.policy.timeout.saturating_mul(factor));

        if progress != PROGRESS_UNKNOWN {
            if let Some(callback) = &work.progress {
                let callback = Arc::clone(callback);
                let value = f32::from(progress.min(100)) / 100.0;
                self.executor.post(move || callback(value));
            }
        }
    }

    fn finish(&self, work: &mut CommandWork, outcome: Result<(), CommandError>) {
        self.disarm(work);
        work.outcome = Some(outcome);
    }

    fn transmit(&self, work: &CommandWork) -> bool {
        let message = work.command.to_message(self.sender.autopilot());
        self.sender.send_message(&message)
    }

    fn arm(&self, work: &mut CommandWork, duration: Duration) {
        let tx = self.events_tx.clone();
        let id = work.id;
        work.timeout_cookie = Some(self.scheduler.add_keyed(
            move |cookie| {
                let _ = tx.send(CommandEvent::Timeout { id, cookie });
            },
            duration,
        ));
    }

    fn disarm(&self, work: &mut CommandWork) {
        if let Some(cookie) = work.timeout_cookie.take() {
            self.scheduler.remove(cookie);
        }
    }

    fn post_result(&self, mut work: CommandWork) {
        self.disarm(&mut work);
        if let (Some(outcome), Some(callback)) = (work.outcome, work.callback) {
            self.executor.post(move || callback(outcome));
        }
    }
}

impl Drop for CommandSender {
    fn drop(&mut self) {
        self.dispatcher.unregister_all(self.owner);
        let pending: Vec<_> = self.queue.lock().drain().collect();
        for mut work in pending {
            work.outcome.get_or_insert(Err(CommandError::ConnectionError));
            self.post_result(work);
        }
    }
}
