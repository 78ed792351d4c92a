//! Vehicle-side command protocol.
//!
//! Answers COMMAND_LONG and COMMAND_INT with COMMAND_ACK. Arm and disarm
//! are executed; everything else is reported as unsupported. A number of
//! IN_PROGRESS acknowledgements can be scripted ahead of the final one to
//! exercise long-running command handling.

use mavlink::common::{MavCmd, MavMessage, MavResult, COMMAND_ACK_DATA};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct SimCommands {
    armed: bool,
    in_progress_steps: u8,
}

impl SimCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Answer the next command with `steps` IN_PROGRESS acks before the
    /// final result.
    pub fn set_in_progress_steps(&mut self, steps: u8) {
        self.in_progress_steps = steps;
    }

    pub fn handle(&mut self, peer: (u8, u8), message: &MavMessage) -> Vec<MavMessage> {
        let (command, param1) = match message {
            MavMessage::COMMAND_LONG(cmd) => (cmd.command, cmd.param1),
            MavMessage::COMMAND_INT(cmd) => (cmd.command, cmd.param1),
            _ => return Vec::new(),
        };
        debug!(?command, "command received");

        let mut replies = Vec::new();
        let steps = std::mem::take(&mut self.in_progress_steps);
        for step in 1..=steps {
            let progress = (u16::from(step) * 100 / (u16::from(steps) + 1)) as u8;
            replies.push(ack(peer, command, MavResult::MAV_RESULT_IN_PROGRESS, progress));
        }

        let result = match command {
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM => {
                self.armed = param1 > 0.5;
                info!(armed = self.armed, "arm state changed");
                MavResult::MAV_RESULT_ACCEPTED
            }
            _ => MavResult::MAV_RESULT_UNSUPPORTED,
        };
        replies.push(ack(peer, command, result, 0));
        replies
    }
}

fn ack(peer: (u8, u8), command: MavCmd, result: MavResult, progress: u8) -> MavMessage {
    MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
        command,
        result,
        progress,
        result_param2: 0,
        target_system: peer.0,
        target_component: peer.1,
    })
}
