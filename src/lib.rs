//! waylink - Reliable command and mission transfer over lossy MAVLink links
//!
//! This library implements the client side of the MAVLink command and
//! mission protocols on top of any transport implementing [`Sender`].
//!
//! # Architecture
//!
//! - [`dispatch`]: routes incoming messages to per-transfer handlers
//! - [`timeout`]: cookie-based one-shot timers driving retries
//! - [`command`]: COMMAND_LONG / COMMAND_INT with acknowledgement and retry
//! - [`mission`]: upload, download, clear and set-current of mission lists
//! - [`engine`]: owns all of the above for one link and drives them
//!
//! Result and progress callbacks run on a dedicated thread
//! ([`callbacks::CallbackExecutor`]), never on the driving thread.

pub mod callbacks;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mission;
pub mod queue;
pub mod sender;
pub mod time;
pub mod timeout;
pub mod transport;

pub use command::{Command, CommandInt, CommandLong, CommandParam, CommandSender};
pub use config::LinkConfig;
pub use engine::Engine;
pub use error::{CommandError, LinkError, TransferError, TransferResult};
pub use mission::{
    Admission, MissionItem, MissionPlan, MissionTransferClient, MissionTransferServer,
    TransferHandle,
};
pub use sender::{Autopilot, Sender};
pub use time::{ManualTime, MonotonicTime, TimeSource};
