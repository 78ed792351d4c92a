//! Single-flight mission transfer queue.
//!
//! Shared by the client and server halves of the mission protocol. Work
//! items are queued in FIFO order and only the head is active.
//!
//! # Event Flow
//!
//! 1. `do_work` starts the head: registers its message handlers and lets it
//!    send its first request
//! 2. Handlers and timers never touch item state, they post a
//!    [`TransferEvent`] tagged with the item's [`WorkId`]
//! 3. The next `do_work` drains those events and applies them to the head
//! 4. A finished head is popped, its handlers unregistered and its result
//!    callback posted to the callback executor
//!
//! Events for items that are no longer the active head are dropped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mavlink::common::{MavMessage, MavMissionResult, MavMissionType, MISSION_ACK_DATA};
use mavlink::MavHeader;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use super::control::{ClearWork, SetCurrentWork};
use super::download::{DownloadWork, ReceiveWork};
use super::upload::UploadWork;
use crate::callbacks::CallbackExecutor;
use crate::dispatch::{HandlerOwner, MessageDispatcher};
use crate::error::{TransferError, TransferResult};
use crate::queue::{WorkId, WorkIds, WorkQueue, WorkQueueGuard};
use crate::sender::Sender;
use crate::timeout::{TimeoutCookie, TimeoutScheduler};

/// Progress callback, called with values in `0.0..=1.0`.
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Result callback of a transfer.
pub type TransferCallback<T> = Box<dyn FnOnce(TransferResult<T>) + Send>;

/// How a new transfer treats a busy queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Admission {
    /// Wait behind queued transfers.
    #[default]
    Queue,
    /// Fail with [`TransferError::Busy`] unless the queue is empty.
    Exclusive,
}

/// Handle for cancelling a queued or running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle {
    id: WorkId,
}

/// Timing and retry ceiling of mission transfers.
#[derive(Debug, Clone, Copy)]
pub struct TransferPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub debugging: bool,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            retries: 5,
            debugging: false,
        }
    }
}

pub(crate) enum TransferEvent {
    Message {
        id: WorkId,
        header: MavHeader,
        message: MavMessage,
    },
    Timeout {
        id: WorkId,
        cookie: TimeoutCookie,
    },
}

impl TransferEvent {
    fn id(&self) -> WorkId {
        match self {
            TransferEvent::Message { id, .. } | TransferEvent::Timeout { id, .. } => *id,
        }
    }
}

/// Start flag, retry counter and armed timer of one transfer.
#[derive(Debug, Default)]
pub(crate) struct Attempts {
    pub(crate) started: bool,
    pub(crate) retries_done: u32,
    pub(crate) cookie: Option<TimeoutCookie>,
}

/// Result slot plus the callback it is delivered to.
///
/// The first outcome stored wins; later ones are ignored.
pub(crate) struct Finish<T> {
    callback: Option<TransferCallback<T>>,
    outcome: Option<TransferResult<T>>,
}

impl<T: Send + 'static> Finish<T> {
    pub(crate) fn new(callback: Option<TransferCallback<T>>) -> Self {
        Self {
            callback,
            outcome: None,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    pub(crate) fn complete(&mut self, outcome: TransferResult<T>) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    fn into_completion(self) -> Option<Completion> {
        match (self.callback, self.outcome) {
            (Some(callback), Some(outcome)) => Some(Box::new(move || callback(outcome))),
            _ => None,
        }
    }
}

type Completion = Box<dyn FnOnce() + Send>;

/// What an active transfer may use while handling an event.
pub(crate) struct TransferContext<'a> {
    id: WorkId,
    sender: &'a dyn Sender,
    scheduler: &'a TimeoutScheduler,
    executor: &'a CallbackExecutor,
    events: &'a UnboundedSender<TransferEvent>,
    pub(crate) policy: TransferPolicy,
}

impl TransferContext<'_> {
    pub(crate) fn send(&self, message: MavMessage) -> bool {
        self.sender.send_message(&message)
    }

    /// Arm a fresh timer in `attempts`, replacing any armed one.
    pub(crate) fn arm(&self, attempts: &mut Attempts) {
        self.disarm(attempts);
        let tx = self.events.clone();
        let id = self.id;
        attempts.cookie = Some(self.scheduler.add_keyed(
            move |cookie| {
                let _ = tx.send(TransferEvent::Timeout { id, cookie });
            },
            self.policy.timeout,
        ));
    }

    pub(crate) fn refresh(&self, attempts: &Attempts) {
        if let Some(cookie) = attempts.cookie {
            self.scheduler.refresh(cookie);
        }
    }

    pub(crate) fn disarm(&self, attempts: &mut Attempts) {
        if let Some(cookie) = attempts.cookie.take() {
            self.scheduler.remove(cookie);
        }
    }

    pub(crate) fn exhausted(&self, attempts: &Attempts) -> bool {
        attempts.retries_done >= self.policy.retries
    }

    pub(crate) fn report_progress(&self, callback: &Option<ProgressCallback>, value: f32) {
        if let Some(callback) = callback {
            let callback = Arc::clone(callback);
            self.executor.post(move || callback(value));
        }
    }

    /// Send MISSION_ACK(OPERATION_CANCELLED) to the peer.
    pub(crate) fn send_cancel_ack(
        &self,
        target_system: u8,
        target_component: u8,
        mission_type: MavMissionType,
    ) -> bool {
        self.send_ack(
            target_system,
            target_component,
            mission_type,
            MavMissionResult::MAV_MISSION_OPERATION_CANCELLED,
        )
    }

    pub(crate) fn send_ack(
        &self,
        target_system: u8,
        target_component: u8,
        mission_type: MavMissionType,
        result: MavMissionResult,
    ) -> bool {
        self.send(MavMessage::MISSION_ACK(MISSION_ACK_DATA {
            target_system,
            target_component,
            mavtype: result,
            mission_type,
            ..Default::default()
        }))
    }
}

pub(crate) enum TransferWork {
    Upload(UploadWork),
    Download(DownloadWork),
    Receive(ReceiveWork),
    Clear(ClearWork),
    SetCurrent(SetCurrentWork),
}

macro_rules! each_kind {
    ($work:expr, $inner:ident => $body:expr) => {
        match $work {
            TransferWork::Upload($inner) => $body,
            TransferWork::Download($inner) => $body,
            TransferWork::Receive($inner) => $body,
            TransferWork::Clear($inner) => $body,
            TransferWork::SetCurrent($inner) => $body,
        }
    };
}

impl TransferWork {
    fn message_ids(&self) -> &'static [u32] {
        each_kind!(self, w => w.message_ids())
    }

    fn target_system(&self) -> u8 {
        each_kind!(self, w => w.target_system())
    }

    fn attempts(&self) -> &Attempts {
        each_kind!(self, w => w.attempts())
    }

    fn attempts_mut(&mut self) -> &mut Attempts {
        each_kind!(self, w => w.attempts_mut())
    }

    fn is_done(&self) -> bool {
        each_kind!(self, w => w.is_done())
    }

    fn start(&mut self, ctx: &TransferContext<'_>) {
        self.attempts_mut().started = true;
        each_kind!(self, w => w.start(ctx))
    }

    fn on_message(&mut self, ctx: &TransferContext<'_>, header: &MavHeader, message: &MavMessage) {
        each_kind!(self, w => w.on_message(ctx, header, message))
    }

    fn on_timeout(&mut self, ctx: &TransferContext<'_>) {
        self.attempts_mut().cookie = None;
        each_kind!(self, w => w.on_timeout(ctx))
    }

    fn cancel(&mut self, ctx: &TransferContext<'_>) {
        each_kind!(self, w => w.cancel(ctx))
    }

    fn abort(&mut self, error: TransferError) {
        each_kind!(self, w => w.abort(error))
    }

    fn into_completion(self) -> Option<Completion> {
        each_kind!(self, w => w.into_finish().into_completion())
    }
}

struct QueuedTransfer {
    id: WorkId,
    owner: HandlerOwner,
    work: TransferWork,
}

/// FIFO of mission transfers driven by `do_work`.
pub(crate) struct TransferQueue {
    sender: Arc<dyn Sender>,
    dispatcher: Arc<MessageDispatcher>,
    scheduler: Arc<TimeoutScheduler>,
    executor: Arc<CallbackExecutor>,
    queue: WorkQueue<QueuedTransfer>,
    ids: WorkIds,
    events_tx: UnboundedSender<TransferEvent>,
    events_rx: Mutex<UnboundedReceiver<TransferEvent>>,
    policy: TransferPolicy,
}

impl TransferQueue {
    pub(crate) fn new(
        sender: Arc<dyn Sender>,
        dispatcher: Arc<MessageDispatcher>,
        scheduler: Arc<TimeoutScheduler>,
        executor: Arc<CallbackExecutor>,
        policy: TransferPolicy,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            sender,
            dispatcher,
            scheduler,
            executor,
            queue: WorkQueue::new(),
            ids: WorkIds::new(),
            events_tx,
            events_rx: Mutex::new(events_rx),
            policy,
        }
    }

    pub(crate) fn sender(&self) -> &dyn Sender {
        self.sender.as_ref()
    }

    /// Queue `work`, or complete it with Busy if `admission` forbids
    /// waiting.
    pub(crate) fn enqueue(&self, mut work: TransferWork, admission: Admission) -> TransferHandle {
        let id = self.ids.next_id();
        {
            let mut queue = self.queue.lock();
            if admission == Admission::Queue || queue.is_empty() {
                queue.push_back(QueuedTransfer {
                    id,
                    owner: self.dispatcher.allocate_owner(),
                    work,
                });
                return TransferHandle { id };
            }
        }

        debug!("mission transfer already in progress, rejecting exclusive request");
        work.abort(TransferError::Busy);
        self.post_completion(work);
        TransferHandle { id }
    }

    /// Cancel the transfer behind `handle`.
    ///
    /// A running transfer notifies its peer where the protocol allows it;
    /// one still waiting in the queue is dropped without any I/O. Returns
    /// `false` if the transfer already left the queue.
    pub(crate) fn cancel(&self, handle: TransferHandle) -> bool {
        let cancelled = {
            let mut queue = self.queue.lock();
            let is_head = queue.front().map(|t| t.id) == Some(handle.id);
            let Some(mut entry) = queue.remove_first(|t| t.id == handle.id) else {
                return false;
            };

            if is_head && entry.work.attempts().started && !entry.work.is_done() {
                let ctx = self.context(entry.id);
                entry.work.cancel(&ctx);
            } else {
                entry.work.abort(TransferError::Cancelled);
            }
            self.retire(&mut entry);
            entry
        };

        self.post_completion(cancelled.work);
        true
    }

    /// Apply pending events, retire finished transfers and start the next.
    pub(crate) fn do_work(&self) {
        let mut finished = Vec::new();
        {
            let mut queue = self.queue.lock();
            self.drain_events(&mut queue);

            while let Some(head) = queue.front_mut() {
                if !head.work.attempts().started {
                    self.register_handlers(head);
                    let ctx = self.context(head.id);
                    head.work.start(&ctx);
                }
                if !head.work.is_done() {
                    break;
                }
                if let Some(mut done) = queue.pop_front() {
                    self.retire(&mut done);
                    finished.push(done);
                }
            }
        }

        for done in finished {
            self.post_completion(done.work);
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    fn drain_events(&self, queue: &mut WorkQueueGuard<'_, QueuedTransfer>) {
        let mut rx = self.events_rx.lock().unwrap_or_else(PoisonError::into_inner);
        while let Ok(event) = rx.try_recv() {
            let Some(head) = queue.front_mut() else {
                trace!("dropping mission event, queue empty");
                continue;
            };
            if head.id != event.id() || head.work.is_done() {
                trace!("dropping mission event for inactive transfer");
                continue;
            }

            let ctx = self.context(head.id);
            match event {
                TransferEvent::Message {
                    header, message, ..
                } => head.work.on_message(&ctx, &header, &message),
                TransferEvent::Timeout { cookie, .. } => {
                    if head.work.attempts().cookie == Some(cookie) {
                        head.work.on_timeout(&ctx);
                    } else {
                        trace!("dropping stale mission timeout");
                    }
                }
            }
        }
    }

    fn register_handlers(&self, entry: &QueuedTransfer) {
        let target_system = entry.work.target_system();
        for &message_id in entry.work.message_ids() {
            let tx = self.events_tx.clone();
            let id = entry.id;
            self.dispatcher
                .register(message_id, entry.owner, move |header, message| {
                    if target_system != 0 && header.system_id != target_system {
                        return;
                    }
                    let _ = tx.send(TransferEvent::Message {
                        id,
                        header: *header,
                        message: message.clone(),
                    });
                });
        }
    }

    fn retire(&self, entry: &mut QueuedTransfer) {
        self.dispatcher.unregister_all(entry.owner);
        if let Some(cookie) = entry.work.attempts_mut().cookie.take() {
            self.scheduler.remove(cookie);
        }
    }

    fn post_completion(&self, work: TransferWork) {
        if let Some(completion) = work.into_completion() {
            self.executor.post(completion);
        }
    }

    fn context(&self, id: WorkId) -> TransferContext<'_> {
        TransferContext {
            id,
            sender: self.sender.as_ref(),
            scheduler: &self.scheduler,
            executor: &self.executor,
            events: &self.events_tx,
            policy: self.policy,
        }
    }
}

impl Drop for TransferQueue {
    fn drop(&mut self) {
        let entries: Vec<_> = self.queue.lock().drain().collect();
        for mut entry in entries {
            self.retire(&mut entry);
            entry.work.abort(TransferError::Cancelled);
            self.post_completion(entry.work);
        }
    }
}
