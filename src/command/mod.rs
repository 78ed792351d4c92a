//! MAVLink command protocol (COMMAND_LONG / COMMAND_INT with COMMAND_ACK).

mod sender;
mod types;

pub use sender::{CommandCallback, CommandPolicy, CommandProgressCallback, CommandSender};
pub use types::{Command, CommandInt, CommandLong, CommandParam};
