//! Mission download (peer → us).
//!
//! Two entry points share the item loop:
//!
//! - [`DownloadWork`] asks for the list with MISSION_REQUEST_LIST and learns
//!   the count from MISSION_COUNT
//! - [`ReceiveWork`] answers a peer that announced `count` items with its own
//!   MISSION_COUNT, so it starts requesting straight away
//!
//! Items are then requested one at a time with MISSION_REQUEST_INT. The last
//! item is answered with MISSION_ACK(ACCEPTED).

use mavlink::common::{
    MavMessage, MavMissionResult, MavMissionType, MISSION_COUNT_DATA, MISSION_ITEM_INT_DATA,
    MISSION_REQUEST_INT_DATA, MISSION_REQUEST_LIST_DATA,
};
use mavlink::{MavHeader, MessageData};
use tracing::{debug, error, warn};

use super::item::MissionItem;
use super::transfer::{Attempts, Finish, ProgressCallback, TransferContext};
use crate::error::TransferError;

const DOWNLOAD_MESSAGE_IDS: &[u32] = &[MISSION_COUNT_DATA::ID, MISSION_ITEM_INT_DATA::ID];
const RECEIVE_MESSAGE_IDS: &[u32] = &[MISSION_ITEM_INT_DATA::ID];

/// Items received so far, in sequence order.
#[derive(Debug, Default)]
struct ItemCollector {
    items: Vec<MissionItem>,
    expected: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum Collected {
    /// Not the item we asked for.
    Ignored,
    More,
    Complete,
}

impl ItemCollector {
    fn reset(&mut self, expected: usize) {
        self.items.clear();
        self.items.reserve(expected);
        self.expected = expected;
    }

    fn next_sequence(&self) -> usize {
        self.items.len()
    }

    fn accept(&mut self, data: &MISSION_ITEM_INT_DATA) -> Collected {
        if usize::from(data.seq) != self.items.len() {
            return Collected::Ignored;
        }
        self.items.push(MissionItem::from(data));
        if self.items.len() == self.expected {
            Collected::Complete
        } else {
            Collected::More
        }
    }

    fn take(&mut self) -> Vec<MissionItem> {
        std::mem::take(&mut self.items)
    }
}

/// Send MISSION_REQUEST_INT for the collector's next sequence.
fn request_item(
    ctx: &TransferContext<'_>,
    attempts: &mut Attempts,
    target: (u8, u8),
    mission_type: MavMissionType,
    collector: &ItemCollector,
) -> bool {
    let seq = u16::try_from(collector.next_sequence()).unwrap_or(u16::MAX);
    if ctx.policy.debugging {
        debug!(seq, retries = attempts.retries_done, "requesting mission item");
    }

    let sent = ctx.send(MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
        target_system: target.0,
        target_component: target.1,
        seq,
        mission_type,
    }));
    if !sent {
        error!(seq, "sending mission item request failed");
        ctx.disarm(attempts);
        return false;
    }
    attempts.retries_done += 1;
    true
}

/// Acknowledge the whole list and hand it over.
fn accept_list(
    ctx: &TransferContext<'_>,
    target: (u8, u8),
    mission_type: MavMissionType,
    collector: &mut ItemCollector,
) -> Result<Vec<MissionItem>, TransferError> {
    let acked = ctx.send_ack(
        target.0,
        target.1,
        mission_type,
        MavMissionResult::MAV_MISSION_ACCEPTED,
    );
    if !acked {
        error!("sending mission ack failed");
        return Err(TransferError::ConnectionError);
    }
    Ok(collector.take())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    RequestList,
    RequestItem,
}

pub(crate) struct DownloadWork {
    mission_type: MavMissionType,
    target_system: u8,
    target_component: u8,
    step: Step,
    collector: ItemCollector,
    attempts: Attempts,
    progress: Option<ProgressCallback>,
    finish: Finish<Vec<MissionItem>>,
}

impl DownloadWork {
    pub(crate) fn new(
        mission_type: MavMissionType,
        target_system: u8,
        target_component: u8,
        progress: Option<ProgressCallback>,
        finish: Finish<Vec<MissionItem>>,
    ) -> Self {
        Self {
            mission_type,
            target_system,
            target_component,
            step: Step::RequestList,
            collector: ItemCollector::default(),
            attempts: Attempts::default(),
            progress,
            finish,
        }
    }

    pub(crate) fn message_ids(&self) -> &'static [u32] {
        DOWNLOAD_MESSAGE_IDS
    }

    pub(crate) fn target_system(&self) -> u8 {
        self.target_system
    }

    pub(crate) fn attempts(&self) -> &Attempts {
        &self.attempts
    }

    pub(crate) fn attempts_mut(&mut self) -> &mut Attempts {
        &mut self.attempts
    }

    pub(crate) fn is_done(&self) -> bool {
        self.finish.is_done()
    }

    pub(crate) fn into_finish(self) -> Finish<Vec<MissionItem>> {
        self.finish
    }

    pub(crate) fn abort(&mut self, error: TransferError) {
        self.finish.complete(Err(error));
    }

    pub(crate) fn start(&mut self, ctx: &TransferContext<'_>) {
        ctx.report_progress(&self.progress, 0.0);

        self.collector.reset(0);
        self.attempts.retries_done = 0;
        self.step = Step::RequestList;
        ctx.arm(&mut self.attempts);
        self.request_list(ctx);
    }

    pub(crate) fn on_message(
        &mut self,
        ctx: &TransferContext<'_>,
        _header: &MavHeader,
        message: &MavMessage,
    ) {
        match message {
            MavMessage::MISSION_COUNT(count) => self.process_count(ctx, count),
            MavMessage::MISSION_ITEM_INT(item) => self.process_item(ctx, item),
            _ => {}
        }
    }

    pub(crate) fn on_timeout(&mut self, ctx: &TransferContext<'_>) {
        if ctx.policy.debugging {
            debug!(retries = self.attempts.retries_done, step = ?self.step, "mission download timeout");
        }

        if ctx.exhausted(&self.attempts) {
            warn!("mission download timed out, retries exceeded");
            self.finish.complete(Err(TransferError::Timeout));
            return;
        }

        ctx.arm(&mut self.attempts);
        match self.step {
            Step::RequestList => self.request_list(ctx),
            Step::RequestItem => self.request_next_item(ctx),
        }
    }

    pub(crate) fn cancel(&mut self, ctx: &TransferContext<'_>) {
        ctx.disarm(&mut self.attempts);
        if !ctx.send_cancel_ack(self.target_system, self.target_component, self.mission_type) {
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }
        self.finish.complete(Err(TransferError::Cancelled));
    }

    fn request_list(&mut self, ctx: &TransferContext<'_>) {
        let sent = ctx.send(MavMessage::MISSION_REQUEST_LIST(MISSION_REQUEST_LIST_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            mission_type: self.mission_type,
        }));
        if !sent {
            error!("sending mission request list failed");
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }
        self.attempts.retries_done += 1;
    }

    fn request_next_item(&mut self, ctx: &TransferContext<'_>) {
        let target = (self.target_system, self.target_component);
        if !request_item(ctx, &mut self.attempts, target, self.mission_type, &self.collector) {
            self.finish.complete(Err(TransferError::ConnectionError));
        }
    }

    fn process_count(&mut self, ctx: &TransferContext<'_>, count: &MISSION_COUNT_DATA) {
        if self.step != Step::RequestList {
            debug!(count = count.count, "ignoring repeated mission count");
            return;
        }
        if ctx.policy.debugging {
            debug!(count = count.count, "received mission count");
        }

        if count.count == 0 {
            ctx.disarm(&mut self.attempts);
            self.finish_list(ctx);
            return;
        }

        ctx.refresh(&self.attempts);
        self.step = Step::RequestItem;
        self.attempts.retries_done = 0;
        self.collector.reset(usize::from(count.count));
        self.request_next_item(ctx);
    }

    fn process_item(&mut self, ctx: &TransferContext<'_>, item: &MISSION_ITEM_INT_DATA) {
        if self.step != Step::RequestItem {
            return;
        }

        ctx.refresh(&self.attempts);
        match self.collector.accept(item) {
            Collected::Ignored => {
                debug!(
                    seq = item.seq,
                    expected = self.collector.next_sequence(),
                    "ignoring unexpected mission item"
                );
            }
            Collected::More => {
                let received = self.collector.next_sequence() as f32;
                ctx.report_progress(&self.progress, received / self.collector.expected as f32);
                self.attempts.retries_done = 0;
                self.request_next_item(ctx);
            }
            Collected::Complete => {
                ctx.disarm(&mut self.attempts);
                self.finish_list(ctx);
            }
        }
    }

    fn finish_list(&mut self, ctx: &TransferContext<'_>) {
        let target = (self.target_system, self.target_component);
        let outcome = accept_list(ctx, target, self.mission_type, &mut self.collector);
        if outcome.is_ok() {
            ctx.report_progress(&self.progress, 1.0);
        }
        self.finish.complete(outcome);
    }
}

pub(crate) struct ReceiveWork {
    mission_type: MavMissionType,
    count: u32,
    target_system: u8,
    target_component: u8,
    collector: ItemCollector,
    attempts: Attempts,
    finish: Finish<Vec<MissionItem>>,
}

impl ReceiveWork {
    pub(crate) fn new(
        mission_type: MavMissionType,
        count: u32,
        target_system: u8,
        target_component: u8,
        finish: Finish<Vec<MissionItem>>,
    ) -> Self {
        Self {
            mission_type,
            count,
            target_system,
            target_component,
            collector: ItemCollector::default(),
            attempts: Attempts::default(),
            finish,
        }
    }

    pub(crate) fn message_ids(&self) -> &'static [u32] {
        RECEIVE_MESSAGE_IDS
    }

    pub(crate) fn target_system(&self) -> u8 {
        self.target_system
    }

    pub(crate) fn attempts(&self) -> &Attempts {
        &self.attempts
    }

    pub(crate) fn attempts_mut(&mut self) -> &mut Attempts {
        &mut self.attempts
    }

    pub(crate) fn is_done(&self) -> bool {
        self.finish.is_done()
    }

    pub(crate) fn into_finish(self) -> Finish<Vec<MissionItem>> {
        self.finish
    }

    pub(crate) fn abort(&mut self, error: TransferError) {
        self.finish.complete(Err(error));
    }

    pub(crate) fn start(&mut self, ctx: &TransferContext<'_>) {
        if self.count > u32::from(u16::MAX) {
            warn!(count = self.count, "announced mission too large");
            self.finish.complete(Err(TransferError::TooManyMissionItems));
            return;
        }

        self.attempts.retries_done = 0;
        if self.count == 0 {
            self.finish_list(ctx);
            return;
        }

        self.collector.reset(self.count as usize);
        ctx.arm(&mut self.attempts);
        self.request_next_item(ctx);
    }

    pub(crate) fn on_message(
        &mut self,
        ctx: &TransferContext<'_>,
        _header: &MavHeader,
        message: &MavMessage,
    ) {
        let MavMessage::MISSION_ITEM_INT(item) = message else {
            return;
        };

        ctx.refresh(&self.attempts);
        match self.collector.accept(item) {
            Collected::Ignored => {
                debug!(
                    seq = item.seq,
                    expected = self.collector.next_sequence(),
                    "ignoring unexpected mission item"
                );
            }
            Collected::More => {
                self.attempts.retries_done = 0;
                self.request_next_item(ctx);
            }
            Collected::Complete => {
                ctx.disarm(&mut self.attempts);
                self.finish_list(ctx);
            }
        }
    }

    pub(crate) fn on_timeout(&mut self, ctx: &TransferContext<'_>) {
        if ctx.exhausted(&self.attempts) {
            warn!("incoming mission timed out, retries exceeded");
            self.finish.complete(Err(TransferError::Timeout));
            return;
        }
        ctx.arm(&mut self.attempts);
        self.request_next_item(ctx);
    }

    pub(crate) fn cancel(&mut self, ctx: &TransferContext<'_>) {
        ctx.disarm(&mut self.attempts);
        if !ctx.send_cancel_ack(self.target_system, self.target_component, self.mission_type) {
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }
        self.finish.complete(Err(TransferError::Cancelled));
    }

    fn request_next_item(&mut self, ctx: &TransferContext<'_>) {
        let target = (self.target_system, self.target_component);
        if !request_item(ctx, &mut self.attempts, target, self.mission_type, &self.collector) {
            self.finish.complete(Err(TransferError::ConnectionError));
        }
    }

    fn finish_list(&mut self, ctx: &TransferContext<'_>) {
        let target = (self.target_system, self.target_component);
        let outcome = accept_list(ctx, target, self.mission_type, &mut self.collector);
        self.finish.complete(outcome);
    }
}
