//! Simulated MAVLink vehicle for exercising `waylink` without hardware.
//!
//! The vehicle answers the mission protocol (upload, download, clear,
//! set current) and COMMAND_LONG/COMMAND_INT, and can drop incoming
//! messages to emulate a lossy link.

pub mod command;
pub mod mission;
pub mod vehicle;

pub use command::SimCommands;
pub use mission::{SimMission, TransferState};
pub use vehicle::SimVehicle;
