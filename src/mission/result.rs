//! MISSION_ACK result codes.

use mavlink::common::MavMissionResult;

use crate::error::TransferError;

/// Map a MISSION_ACK result to the transfer outcome it implies.
pub(crate) fn ack_outcome(result: MavMissionResult) -> Result<(), TransferError> {
    use MavMissionResult::*;

    match result {
        MAV_MISSION_ACCEPTED => Ok(()),
        MAV_MISSION_ERROR => Err(TransferError::ProtocolError),
        MAV_MISSION_UNSUPPORTED_FRAME => Err(TransferError::UnsupportedFrame),
        MAV_MISSION_UNSUPPORTED => Err(TransferError::Unsupported),
        MAV_MISSION_NO_SPACE => Err(TransferError::TooManyMissionItems),
        MAV_MISSION_INVALID
        | MAV_MISSION_INVALID_PARAM1
        | MAV_MISSION_INVALID_PARAM2
        | MAV_MISSION_INVALID_PARAM3
        | MAV_MISSION_INVALID_PARAM4
        | MAV_MISSION_INVALID_PARAM5_X
        | MAV_MISSION_INVALID_PARAM6_Y
        | MAV_MISSION_INVALID_PARAM7 => Err(TransferError::InvalidParam),
        MAV_MISSION_INVALID_SEQUENCE => Err(TransferError::InvalidSequence),
        MAV_MISSION_DENIED => Err(TransferError::Denied),
        MAV_MISSION_OPERATION_CANCELLED => Err(TransferError::Cancelled),
        #[allow(unreachable_patterns)]
        _ => Err(TransferError::ProtocolError),
    }
}
