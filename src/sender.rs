//! Outbound side of a link, as seen by the protocols.

use mavlink::common::MavMessage;
use serde::Deserialize;

/// Component id of the primary autopilot (MAV_COMP_ID_AUTOPILOT1).
pub const AUTOPILOT_COMPONENT_ID: u8 = 1;

/// Autopilot flavour of the peer.
///
/// Decides how reserved command parameters are encoded and whether legacy
/// float-coordinate mission requests are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Autopilot {
    #[default]
    Unknown,
    Px4,
    ArduPilot,
}

/// Transport abstraction the protocols send through.
///
/// Implementations stamp the header (own ids, sequence) and transmit.
pub trait Sender: Send + Sync {
    fn own_system_id(&self) -> u8;

    fn own_component_id(&self) -> u8;

    /// System id of the vehicle this link talks to.
    fn target_system_id(&self) -> u8;

    fn autopilot(&self) -> Autopilot;

    /// Queue `message` for transmission. `false` means it was not sent.
    fn send_message(&self, message: &MavMessage) -> bool;

    fn is_connected(&self) -> bool {
        true
    }
}
