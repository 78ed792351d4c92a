//! Single-message mission operations: clear and set-current.

use mavlink::common::{
    MavMessage, MavMissionType, MISSION_ACK_DATA, MISSION_CLEAR_ALL_DATA, MISSION_CURRENT_DATA,
    MISSION_SET_CURRENT_DATA,
};
use mavlink::{MavHeader, MessageData};
use tracing::{debug, error, warn};

use super::result::ack_outcome;
use super::transfer::{Attempts, Finish, TransferContext};
use crate::error::TransferError;

const CLEAR_MESSAGE_IDS: &[u32] = &[MISSION_ACK_DATA::ID];
const SET_CURRENT_MESSAGE_IDS: &[u32] = &[MISSION_CURRENT_DATA::ID];

/// MISSION_CLEAR_ALL until the peer acks.
pub(crate) struct ClearWork {
    mission_type: MavMissionType,
    target_system: u8,
    target_component: u8,
    attempts: Attempts,
    finish: Finish<()>,
}

impl ClearWork {
    pub(crate) fn new(
        mission_type: MavMissionType,
        target_system: u8,
        target_component: u8,
        finish: Finish<()>,
    ) -> Self {
        Self {
            mission_type,
            target_system,
            target_component,
            attempts: Attempts::default(),
            finish,
        }
    }

    pub(crate) fn message_ids(&self) -> &'static [u32] {
        CLEAR_MESSAGE_IDS
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
        self.attempts.retries_done = 0;
        ctx.arm(&mut self.attempts);
        self.send_clear(ctx);
    }

    pub(crate) fn on_message(
        &mut self,
        ctx: &TransferContext<'_>,
        _header: &MavHeader,
        message: &MavMessage,
    ) {
        let MavMessage::MISSION_ACK(ack) = message else {
            return;
        };
        if ctx.policy.debugging {
            debug!(result = ?ack.mavtype, "received mission clear ack");
        }
        ctx.disarm(&mut self.attempts);
        self.finish.complete(ack_outcome(ack.mavtype));
    }

    pub(crate) fn on_timeout(&mut self, ctx: &TransferContext<'_>) {
        if ctx.exhausted(&self.attempts) {
            warn!("mission clear timed out, retries exceeded");
            self.finish.complete(Err(TransferError::Timeout));
            return;
        }
        ctx.arm(&mut self.attempts);
        self.send_clear(ctx);
    }

    pub(crate) fn cancel(&mut self, ctx: &TransferContext<'_>) {
        ctx.disarm(&mut self.attempts);
        self.finish.complete(Err(TransferError::Cancelled));
    }

    fn send_clear(&mut self, ctx: &TransferContext<'_>) {
        let sent = ctx.send(MavMessage::MISSION_CLEAR_ALL(MISSION_CLEAR_ALL_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            mission_type: self.mission_type,
        }));
        if !sent {
            error!("sending mission clear failed");
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }
        self.attempts.retries_done += 1;
    }
}

/// MISSION_SET_CURRENT until MISSION_CURRENT reports the requested index.
pub(crate) struct SetCurrentWork {
    current: i32,
    target_system: u8,
    target_component: u8,
    attempts: Attempts,
    finish: Finish<()>,
}

impl SetCurrentWork {
    pub(crate) fn new(
        current: i32,
        target_system: u8,
        target_component: u8,
        finish: Finish<()>,
    ) -> Self {
        Self {
            current,
            target_system,
            target_component,
            attempts: Attempts::default(),
            finish,
        }
    }

    pub(crate) fn message_ids(&self) -> &'static [u32] {
        SET_CURRENT_MESSAGE_IDS
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
        if u16::try_from(self.current).is_err() {
            warn!(current = self.current, "mission index out of range");
            self.finish.complete(Err(TransferError::CurrentInvalid));
            return;
        }

        self.attempts.retries_done = 0;
        ctx.arm(&mut self.attempts);
        self.send_set_current(ctx);
    }

    pub(crate) fn on_message(
        &mut self,
        ctx: &TransferContext<'_>,
        _header: &MavHeader,
        message: &MavMessage,
    ) {
        let MavMessage::MISSION_CURRENT(report) = message else {
            return;
        };

        if i32::from(report.seq) == self.current {
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Ok(()));
            return;
        }

        if ctx.exhausted(&self.attempts) {
            warn!(reported = report.seq, requested = self.current, "mission current mismatch, retries exceeded");
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Err(TransferError::Timeout));
            return;
        }

        debug!(reported = report.seq, requested = self.current, "mission current mismatch, resending");
        ctx.refresh(&self.attempts);
        self.send_set_current(ctx);
    }

    pub(crate) fn on_timeout(&mut self, ctx: &TransferContext<'_>) {
        if ctx.exhausted(&self.attempts) {
            warn!("mission set current timed out, retries exceeded");
            self.finish.complete(Err(TransferError::Timeout));
            return;
        }
        ctx.arm(&mut self.attempts);
        self.send_set_current(ctx);
    }

    pub(crate) fn cancel(&mut self, ctx: &TransferContext<'_>) {
        ctx.disarm(&mut self.attempts);
        self.finish.complete(Err(TransferError::Cancelled));
    }

    fn send_set_current(&mut self, ctx: &TransferContext<'_>) {
        let seq = u16::try_from(self.current).unwrap_or_default();
        let sent = ctx.send(MavMessage::MISSION_SET_CURRENT(MISSION_SET_CURRENT_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            seq,
        }));
        if !sent {
            error!(seq, "sending mission set current failed");
            ctx.disarm(&mut self.attempts);
            self.finish.complete(Err(TransferError::ConnectionError));
            return;
        }
        self.attempts.retries_done += 1;
    }
}
