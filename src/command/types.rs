//! Command descriptions and their wire encoding.

use mavlink::common::{MavCmd, MavFrame, MavMessage, COMMAND_INT_DATA, COMMAND_LONG_DATA};

use crate::sender::{Autopilot, AUTOPILOT_COMPONENT_ID};

/// A single command parameter.
///
/// `Reserved` marks a parameter the command does not use. PX4 expects NaN
/// for those, ArduPilot expects zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CommandParam {
    Value(f32),
    #[default]
    Reserved,
}

impl CommandParam {
    /// Wire value of the parameter for `autopilot`.
    pub fn resolve(self, autopilot: Autopilot) -> f32 {
        match self {
            CommandParam::Value(value) => value,
            CommandParam::Reserved => match autopilot {
                Autopilot::ArduPilot => 0.0,
                Autopilot::Px4 | Autopilot::Unknown => f32::NAN,
            },
        }
    }
}

impl From<f32> for CommandParam {
    fn from(value: f32) -> Self {
        CommandParam::Value(value)
    }
}

/// COMMAND_LONG with seven float parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLong {
    pub target_system: u8,
    pub target_component: u8,
    pub command: MavCmd,
    pub confirmation: u8,
    pub params: [CommandParam; 7],
}

impl CommandLong {
    /// Command with every parameter reserved.
    pub fn new(target_system: u8, target_component: u8, command: MavCmd) -> Self {
        Self {
            target_system,
            target_component,
            command,
            confirmation: 0,
            params: [CommandParam::Reserved; 7],
        }
    }

    /// Set parameter `index` (1-based, as in the MAVLink docs).
    ///
    /// Out-of-range indices are ignored.
    pub fn param(mut self, index: usize, value: impl Into<CommandParam>) -> Self {
        if let Some(slot) = index.checked_sub(1).and_then(|i| self.params.get_mut(i)) {
            *slot = value.into();
        }
        self
    }

    /// MAV_CMD_COMPONENT_ARM_DISARM addressed to the autopilot.
    pub fn arm_disarm(target_system: u8, arm: bool) -> Self {
        Self::new(
            target_system,
            AUTOPILOT_COMPONENT_ID,
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        )
        .param(1, if arm { 1.0_f32 } else { 0.0 })
    }

    fn to_data(&self, autopilot: Autopilot) -> COMMAND_LONG_DATA {
        let [p1, p2, p3, p4, p5, p6, p7] = self.params.map(|p| p.resolve(autopilot));
        COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command: self.command,
            confirmation: self.confirmation,
            param1: p1,
            param2: p2,
            param3: p3,
            param4: p4,
            param5: p5,
            param6: p6,
            param7: p7,
        }
    }
}

/// COMMAND_INT with four float parameters and integer coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInt {
    pub target_system: u8,
    pub target_component: u8,
    pub frame: MavFrame,
    pub command: MavCmd,
    pub current: u8,
    pub autocontinue: u8,
    pub params: [CommandParam; 4],
    /// Latitude in degrees * 1e7, or local x * 1e4.
    pub x: i32,
    /// Longitude in degrees * 1e7, or local y * 1e4.
    pub y: i32,
    pub z: CommandParam,
}

impl CommandInt {
    pub fn new(target_system: u8, target_component: u8, frame: MavFrame, command: MavCmd) -> Self {
        Self {
            target_system,
            target_component,
            frame,
            command,
            current: 0,
            autocontinue: 0,
            params: [CommandParam::Reserved; 4],
            x: 0,
            y: 0,
            z: CommandParam::Reserved,
        }
    }

    fn to_data(&self, autopilot: Autopilot) -> COMMAND_INT_DATA {
        let [p1, p2, p3, p4] = self.params.map(|p| p.resolve(autopilot));
        COMMAND_INT_DATA {
            param1: p1,
            param2: p2,
            param3: p3,
            param4: p4,
            x: self.x,
            y: self.y,
            z: self.z.resolve(autopilot),
            command: self.command,
            target_system: self.target_system,
            target_component: self.target_component,
            frame: self.frame,
            current: self.current,
            autocontinue: self.autocontinue,
        }
    }
}

/// Either command encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Long(CommandLong),
    Int(CommandInt),
}

impl Command {
    pub fn command_id(&self) -> MavCmd {
        match self {
            Command::Long(c) => c.command,
            Command::Int(c) => c.command,
        }
    }

    /// Encode with reserved parameters resolved for `autopilot`.
    pub fn to_message(&self, autopilot: Autopilot) -> MavMessage {
        match self {
            Command::Long(c) => MavMessage::COMMAND_LONG(c.to_data(autopilot)),
            Command::Int(c) => MavMessage::COMMAND_INT(c.to_data(autopilot)),
        }
    }
}

impl From<CommandLong> for Command {
    fn from(command: CommandLong) -> Self {
        Command::Long(command)
    }
}

impl From<CommandInt> for Command {
    fn from(command: CommandInt) -> Self {
        Command::Int(command)
    }
}
