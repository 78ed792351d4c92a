//! Simulated vehicle tying the protocol handlers together.

use mavlink::common::{
    MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA,
};
use mavlink::{MavHeader, Message};
use tracing::debug;

use crate::command::SimCommands;
use crate::mission::SimMission;

/// A vehicle answering mission and command traffic in-process.
///
/// Messages addressed to another system are ignored. Replies are returned
/// rather than sent so the caller decides how they reach the client.
#[derive(Debug)]
pub struct SimVehicle {
    system_id: u8,
    component_id: u8,
    autopilot: MavAutopilot,
    sequence: u8,
    drop_incoming: usize,
    pub mission: SimMission,
    pub commands: SimCommands,
}

impl SimVehicle {
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
            autopilot: MavAutopilot::MAV_AUTOPILOT_PX4,
            sequence: 0,
            drop_incoming: 0,
            mission: SimMission::new(),
            commands: SimCommands::new(),
        }
    }

    /// Report `autopilot` in heartbeats. ArduPilot also switches the
    /// mission handler to legacy item requests.
    pub fn with_autopilot(mut self, autopilot: MavAutopilot) -> Self {
        self.autopilot = autopilot;
        self.mission
            .set_legacy_requests(autopilot == MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA);
        self
    }

    pub fn system_id(&self) -> u8 {
        self.system_id
    }

    /// Silently drop the next `count` incoming messages.
    pub fn drop_next(&mut self, count: usize) {
        self.drop_incoming = count;
    }

    /// Header for the next outgoing message.
    pub fn header(&mut self) -> MavHeader {
        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    pub fn heartbeat(&self) -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GROUND_ROVER,
            autopilot: self.autopilot,
            base_mode: if self.commands.is_armed() {
                MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
            } else {
                MavModeFlag::empty()
            },
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: 3,
        })
    }

    /// Handle one message from the ground side, returning the replies.
    pub fn handle(&mut self, header: &MavHeader, message: &MavMessage) -> Vec<MavMessage> {
        if !self.addressed_to_us(message) {
            return Vec::new();
        }
        if self.drop_incoming > 0 {
            self.drop_incoming -= 1;
            debug!(id = message.message_id(), "dropping incoming message");
            return Vec::new();
        }

        match message {
            MavMessage::COMMAND_LONG(_) | MavMessage::COMMAND_INT(_) => self
                .commands
                .handle((header.system_id, header.component_id), message),
            _ => self.mission.handle(header, message),
        }
    }

    fn addressed_to_us(&self, message: &MavMessage) -> bool {
        let target = match message {
            MavMessage::COMMAND_LONG(m) => m.target_system,
            MavMessage::COMMAND_INT(m) => m.target_system,
            MavMessage::MISSION_COUNT(m) => m.target_system,
            MavMessage::MISSION_ITEM_INT(m) => m.target_system,
            MavMessage::MISSION_REQUEST_LIST(m) => m.target_system,
            MavMessage::MISSION_REQUEST_INT(m) => m.target_system,
            MavMessage::MISSION_ACK(m) => m.target_system,
            MavMessage::MISSION_CLEAR_ALL(m) => m.target_system,
            MavMessage::MISSION_SET_CURRENT(m) => m.target_system,
            _ => return false,
        };
        target == 0 || target == self.system_id
    }
}
