//! MAVLink mission protocol.
//!
//! # Mission Upload Flow (us → vehicle)
//!
//! 1. Send MISSION_COUNT with the number of items
//! 2. Vehicle requests each item with MISSION_REQUEST_INT
//! 3. Answer with MISSION_ITEM_INT
//! 4. Vehicle closes with MISSION_ACK
//!
//! # Mission Download Flow (vehicle → us)
//!
//! 1. Send MISSION_REQUEST_LIST
//! 2. Vehicle answers with MISSION_COUNT
//! 3. Request each item with MISSION_REQUEST_INT
//! 4. Close with MISSION_ACK(ACCEPTED)
//!
//! # Timeout Handling
//!
//! Every step is guarded by a per-attempt timeout (0.5 s by default). The
//! last request is resent until the retry ceiling (5 by default) is reached,
//! after which the transfer fails with
//! [`Timeout`](crate::error::TransferError::Timeout).

mod client;
mod control;
mod download;
mod item;
mod result;
mod server;
mod transfer;
mod upload;

pub use client::MissionTransferClient;
pub use item::{MissionItem, MissionPlan, PlanWaypoint};
pub use server::MissionTransferServer;
pub use transfer::{Admission, ProgressCallback, TransferCallback, TransferHandle, TransferPolicy};
