//! Vehicle side of the mission protocol.

use std::sync::Arc;

use mavlink::common::MavMissionType;

use super::download::ReceiveWork;
use super::item::MissionItem;
use super::transfer::{
    Admission, Finish, TransferHandle, TransferPolicy, TransferQueue, TransferWork,
};
use super::upload::UploadWork;
use crate::callbacks::CallbackExecutor;
use crate::dispatch::MessageDispatcher;
use crate::error::TransferResult;
use crate::sender::Sender;
use crate::timeout::TimeoutScheduler;

/// Serves transfers a peer initiates: receiving a list it announced with
/// MISSION_COUNT, and sending ours after MISSION_REQUEST_LIST.
///
/// Both are addressed to the peer's own system and component, taken from
/// the header of the message that started the exchange.
pub struct MissionTransferServer {
    queue: TransferQueue,
}

impl MissionTransferServer {
    pub fn new(
        sender: Arc<dyn Sender>,
        dispatcher: Arc<MessageDispatcher>,
        scheduler: Arc<TimeoutScheduler>,
        executor: Arc<CallbackExecutor>,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            queue: TransferQueue::new(sender, dispatcher, scheduler, executor, policy),
        }
    }

    /// Collect `count` items announced by the peer.
    pub fn receive_incoming_items_async<F>(
        &self,
        mission_type: MavMissionType,
        count: u32,
        target_system: u8,
        target_component: u8,
        admission: Admission,
        callback: F,
    ) -> TransferHandle
    where
        F: FnOnce(TransferResult<Vec<MissionItem>>) + Send + 'static,
    {
        let work = ReceiveWork::new(
            mission_type,
            count,
            target_system,
            target_component,
            Finish::new(Some(Box::new(callback))),
        );
        self.queue.enqueue(TransferWork::Receive(work), admission)
    }

    /// Send `items` to a peer that asked for our list.
    pub fn send_outgoing_items_async<F>(
        &self,
        mission_type: MavMissionType,
        items: Vec<MissionItem>,
        target_system: u8,
        target_component: u8,
        admission: Admission,
        callback: F,
    ) -> TransferHandle
    where
        F: FnOnce(TransferResult<()>) + Send + 'static,
    {
        let work = UploadWork::new(
            mission_type,
            items,
            target_system,
            target_component,
            self.queue.sender().autopilot(),
            false,
            None,
            Finish::new(Some(Box::new(callback))),
        );
        self.queue.enqueue(TransferWork::Upload(work), admission)
    }

    pub fn cancel(&self, handle: TransferHandle) -> bool {
        self.queue.cancel(handle)
    }

    pub fn do_work(&self) {
        self.queue.do_work();
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }
}
