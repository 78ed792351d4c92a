//! Ground side of the mission protocol.

use std::sync::Arc;

use mavlink::common::MavMissionType;

use super::control::{ClearWork, SetCurrentWork};
use super::download::DownloadWork;
use super::item::MissionItem;
use super::transfer::{
    Admission, Finish, ProgressCallback, TransferHandle, TransferPolicy, TransferQueue,
    TransferWork,
};
use super::upload::UploadWork;
use crate::callbacks::CallbackExecutor;
use crate::dispatch::MessageDispatcher;
use crate::error::TransferResult;
use crate::sender::{Sender, AUTOPILOT_COMPONENT_ID};
use crate::timeout::TimeoutScheduler;

/// Uploads, downloads, clears and sets the current item of a vehicle's
/// mission lists.
///
/// Every request is addressed to the vehicle's autopilot component. Requests
/// run one at a time in submission order; [`Admission::Exclusive`] refuses to
/// wait behind others.
pub struct MissionTransferClient {
    queue: TransferQueue,
}

impl MissionTransferClient {
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

    /// Upload `items` as the `mission_type` list of `target_system`.
    ///
    /// Items must be numbered from zero with exactly one current item.
    pub fn upload_items_async<F>(
        &self,
        mission_type: MavMissionType,
        target_system: u8,
        items: Vec<MissionItem>,
        admission: Admission,
        progress: Option<ProgressCallback>,
        callback: F,
    ) -> TransferHandle
    where
        F: FnOnce(TransferResult<()>) + Send + 'static,
    {
        let work = UploadWork::new(
            mission_type,
            items,
            target_system,
            AUTOPILOT_COMPONENT_ID,
            self.queue.sender().autopilot(),
            true,
            progress,
            Finish::new(Some(Box::new(callback))),
        );
        self.queue.enqueue(TransferWork::Upload(work), admission)
    }

    /// Download the `mission_type` list of `target_system`.
    pub fn download_items_async<F>(
        &self,
        mission_type: MavMissionType,
        target_system: u8,
        admission: Admission,
        progress: Option<ProgressCallback>,
        callback: F,
    ) -> TransferHandle
    where
        F: FnOnce(TransferResult<Vec<MissionItem>>) + Send + 'static,
    {
        let work = DownloadWork::new(
            mission_type,
            target_system,
            AUTOPILOT_COMPONENT_ID,
            progress,
            Finish::new(Some(Box::new(callback))),
        );
        self.queue.enqueue(TransferWork::Download(work), admission)
    }

    /// Erase the `mission_type` list of `target_system`.
    pub fn clear_items_async<F>(
        &self,
        mission_type: MavMissionType,
        target_system: u8,
        admission: Admission,
        callback: F,
    ) -> TransferHandle
    where
        F: FnOnce(TransferResult<()>) + Send + 'static,
    {
        let work = ClearWork::new(
            mission_type,
            target_system,
            AUTOPILOT_COMPONENT_ID,
            Finish::new(Some(Box::new(callback))),
        );
        self.queue.enqueue(TransferWork::Clear(work), admission)
    }

    /// Make item `current` the active mission item of `target_system`.
    ///
    /// Negative indices fail with
    /// [`CurrentInvalid`](crate::error::TransferError::CurrentInvalid).
    pub fn set_current_item_async<F>(
        &self,
        current: i32,
        target_system: u8,
        admission: Admission,
        callback: F,
    ) -> TransferHandle
    where
        F: FnOnce(TransferResult<()>) + Send + 'static,
    {
        let work = SetCurrentWork::new(
            current,
            target_system,
            AUTOPILOT_COMPONENT_ID,
            Finish::new(Some(Box::new(callback))),
        );
        self.queue.enqueue(TransferWork::SetCurrent(work), admission)
    }

    /// Cancel a queued or running transfer. See [`TransferHandle`].
    pub fn cancel(&self, handle: TransferHandle) -> bool {
        self.queue.cancel(handle)
    }

    pub fn do_work(&self) {
        self.queue.do_work();
    }

    /// Whether no transfer is queued or running.
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }
}
