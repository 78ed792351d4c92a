//! Mission upload (us → peer).
//!
//! # Flow
//!
//! 1. Send MISSION_COUNT, resent on timeout
//! 2. Peer requests each item with MISSION_REQUEST_INT
//! 3. Answer every request with MISSION_ITEM_INT
//! 4. Peer closes with MISSION_ACK
//!
//! The same machine serves outgoing transfers on the vehicle side, where
//! the peer asked for our list. Those skip the current-item check.

use mavlink::common::{
    MavMessage, MavMissionResult, MavMissionType, MISSION_ACK_DATA, MISSION_COUNT_DATA,
    MISSION_REQUEST_DATA, MISSION_REQUEST_INT_DATA,
};
use mavlink::{MavHeader, MessageData};
use tracing::{debug, error, warn};

use super::item::{validate_upload, MissionItem};
use super::result::ack_outcome;
use super::transfer::{Attempts, Finish, ProgressCallback, TransferContext};
use crate::error::TransferError;
use crate::sender::Autopilot;

const MESSAGE_IDS: &[u32] = &[
    MISSION_REQUEST_DATA::ID,
    MISSION_REQUEST_INT_DATA::ID,
    MISSION_ACK_DATA::ID,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    SendCount,
    SendItems,
}

pub(crate) struct UploadWork {
    mission_type: MavMissionType,
    items: Vec<MissionItem>,
    target_system: u8,
    target_component: u8,
    autopilot: Autopilot,
    require_current: bool,
    step: Step,
    next_sequence: usize,
    attempts: Attempts,
    progress: Option<ProgressCallback>,
    finish: Finish<()>,
}

impl UploadWork {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mission_type: MavMissionType,
        items: Vec<MissionItem>,
        target_system: u8,
        target_component: u8,
        autopilot: Autopilot,
        require_current: bool,
        progress: Option<ProgressCallback>,
        finish: Finish<()>,
    ) -> Self {
        Self {
            mission_type,
            items,
            target_system,
            target_component,
            autopilot,
            require_current,
            step: Step::SendCount,
            next_sequence: 0,
            attempts: Attempts::default(),
            progress,
            finish,
        }
    }

    pub(crate) fn message_ids(&self) -> &'static [u32] {
        MESSAGE_IDS
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

    pub(crate) fn into_finish(self) -> Finish<()> {
        self.finish
    }

    pub(crate) fn abort(&mut self, error: TransferError) {
        self.finish.complete(Err(error));
    }

    pub(crate) fn start(&mut self, ctx: &TransferContext<'_>) {
        if let Err(error) = validate_upload(&self.items, self.mission_type, self.require_current) {
            warn!(%error, "refusing mission upload");
            self.finish.complete(Err(error));
            return;
        }

        ctx.report_progress(&self.progress, 0.0);

        self.attempts.retries_done = 0;
        self.step = Step::SendCount;
        self.next_sequence = 0;
        ctx.arm(&mut self.attempts);
        self.send_count(ctx);
    }

    pub(crate) fn on_message(
        &mut self,
        ctx: &TransferContext<'_>,
        header: &MavHeader,
        message: &MavMessage,
    ) {
        match message {
            MavMessage::MISSION_REQUEST(request) => self.process_legacy_request(ctx, header, request),
            MavMessage::MISSION_REQUEST_INT(request) => self.process_request_int(ctx, request),
            MavMessage::MISSION_ACK(ack) => self.process_ack(ctx, ack),
            _ => {}
        }
    }

    pub(crate) fn on_timeout(&mut self, ctx: &TransferContext<'_>) {
        if ctx.policy.debugging {
            debug!(retries = self.attempts.retries_done, "mission upload timeout");
        }

        if ctx.exhausted(&self.attempts) {
            warn!("mission upload timed out, retries exceeded");
            self.finish.complete(Err(TransferError::Timeout));
            return;
        }

        match self.step {
            Step::SendCount => {
                ctx.arm(&mut self.attempts);
                self.send_count(ctx);
            }
            Step::SendItems => {
                // The peer drives item requests, only count the silence.
                self.attempts.retries_done += 1;
                ctx.arm(&mut self.attempts);
            }
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

    fn send_count(&mut self, ctx: &TransferContext<'_>) {
        let count = u16::try_from(self.items.len()).unwrap_or(u16::MAX);
        let sent = ctx.send(MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            count,
            mission_type: self.mission_type,
            ..Default::default()
        }));
        if !sent {
            error!("sending mission count failed");
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }

        if ctx.policy.debugging {
            debug!(count, retries = self.attempts.retries_done, "sent mission count");
        }
        self.attempts.retries_done += 1;
    }

    /// Float-coordinate MISSION_REQUEST.
    ///
    /// ArduPilot still emits it and is served as if it had asked with
    /// MISSION_REQUEST_INT. Anyone else is told to switch.
    fn process_legacy_request(
        &mut self,
        ctx: &TransferContext<'_>,
        header: &MavHeader,
        request: &MISSION_REQUEST_DATA,
    ) {
        if self.autopilot == Autopilot::ArduPilot {
            let translated = MISSION_REQUEST_INT_DATA {
                target_system: request.target_system,
                target_component: request.target_component,
                seq: request.seq,
                mission_type: request.mission_type,
            };
            self.process_request_int(ctx, &translated);
            return;
        }

        let nacked = ctx.send_ack(
            header.system_id,
            header.component_id,
            self.mission_type,
            MavMissionResult::MAV_MISSION_UNSUPPORTED,
        );
        if !nacked {
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }
        ctx.refresh(&self.attempts);
    }

    fn process_request_int(&mut self, ctx: &TransferContext<'_>, request: &MISSION_REQUEST_INT_DATA) {
        let seq = usize::from(request.seq);

        if ctx.policy.debugging {
            debug!(seq, expected = self.next_sequence, "mission item requested");
        }

        if seq >= self.items.len() {
            warn!(seq, total = self.items.len(), "mission item request past the end, ignoring");
            return;
        }
        if seq > self.next_sequence {
            warn!(seq, expected = self.next_sequence, "mission item request out of order, ignoring");
            return;
        }
        self.step = Step::SendItems;
        if seq < self.next_sequence {
            // Already sent once, this is the peer retrying.
            if ctx.exhausted(&self.attempts) {
                warn!(seq, "mission item request retries exceeded");
                ctx.disarm(&mut self.attempts);
                self.finish.complete(Err(TransferError::Timeout));
                return;
            }
        } else {
            self.attempts.retries_done = 0;
        }

        ctx.refresh(&self.attempts);
        self.next_sequence = seq;

        let total = self.items.len() as f32;
        ctx.report_progress(&self.progress, (seq as f32 + 1.0) / (total + 1.0));

        self.send_mission_item(ctx);
    }

    fn send_mission_item(&mut self, ctx: &TransferContext<'_>) {
        let Some(item) = self.items.get(self.next_sequence) else {
            error!(seq = self.next_sequence, "requested mission item out of bounds");
            return;
        };

        if ctx.policy.debugging {
            debug!(seq = self.next_sequence, retries = self.attempts.retries_done, "sending mission item");
        }

        let data = item.to_mission_item_int(self.target_system, self.target_component);
        if !ctx.send(MavMessage::MISSION_ITEM_INT(data)) {
            error!(seq = self.next_sequence, "sending mission item failed");
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }

        self.next_sequence += 1;
        self.attempts.retries_done += 1;
    }

    fn process_ack(&mut self, ctx: &TransferContext<'_>, ack: &MISSION_ACK_DATA) {
        if ctx.policy.debugging {
            debug!(result = ?ack.mavtype, "received mission ack");
        }

        ctx.disarm(&mut self.attempts);

        match ack_outcome(ack.mavtype) {
            Ok(()) if self.next_sequence == self.items.len() => {
                ctx.report_progress(&self.progress, 1.0);
                self.finish.complete(Ok(()));
            }
            Ok(()) => {
                warn!(
                    sent = self.next_sequence,
                    total = self.items.len(),
                    "mission accepted before all items were sent"
                );
                self.finish.complete(Err(TransferError::ProtocolError));
            }
            Err(error) => self.finish.complete(Err(error)),
        }
    }
}
