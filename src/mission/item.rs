//! Mission item representation and upload preconditions.

use mavlink::common::{MavCmd, MavFrame, MavMissionType, MISSION_ITEM_INT_DATA};
use serde::Deserialize;

use crate::error::TransferError;

/// One mission item as exchanged through MISSION_ITEM_INT.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionItem {
    pub seq: u16,
    pub frame: MavFrame,
    pub command: MavCmd,
    pub current: bool,
    pub autocontinue: bool,
    pub param1: f32,
    pub param2: f32,
    pub param3: f32,
    pub param4: f32,
    /// Latitude in degrees * 1e7, or local x * 1e4.
    pub x: i32,
    /// Longitude in degrees * 1e7, or local y * 1e4.
    pub y: i32,
    pub z: f32,
    pub mission_type: MavMissionType,
}

impl Default for MissionItem {
    fn default() -> Self {
        Self {
            seq: 0,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            command: MavCmd::MAV_CMD_NAV_WAYPOINT,
            current: false,
            autocontinue: true,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: 0,
            y: 0,
            z: 0.0,
            mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
        }
    }
}

impl MissionItem {
    /// NAV_WAYPOINT at a global position, altitude relative to home.
    pub fn waypoint(seq: u16, latitude_deg: f64, longitude_deg: f64, altitude_m: f32) -> Self {
        Self {
            seq,
            current: seq == 0,
            x: degrees_to_e7(latitude_deg),
            y: degrees_to_e7(longitude_deg),
            z: altitude_m,
            ..Self::default()
        }
    }

    /// Encode addressed to `target_system` / `target_component`.
    pub fn to_mission_item_int(&self, target_system: u8, target_component: u8) -> MISSION_ITEM_INT_DATA {
        MISSION_ITEM_INT_DATA {
            target_system,
            target_component,
            seq: self.seq,
            frame: self.frame,
            command: self.command,
            current: u8::from(self.current),
            autocontinue: u8::from(self.autocontinue),
            param1: self.param1,
            param2: self.param2,
            param3: self.param3,
            param4: self.param4,
            x: self.x,
            y: self.y,
            z: self.z,
            mission_type: self.mission_type,
        }
    }
}

impl From<&MISSION_ITEM_INT_DATA> for MissionItem {
    fn from(data: &MISSION_ITEM_INT_DATA) -> Self {
        Self {
            seq: data.seq,
            frame: data.frame,
            command: data.command,
            current: data.current != 0,
            autocontinue: data.autocontinue != 0,
            param1: data.param1,
            param2: data.param2,
            param3: data.param3,
            param4: data.param4,
            x: data.x,
            y: data.y,
            z: data.z,
            mission_type: data.mission_type,
        }
    }
}

/// Waypoint entry of a mission plan file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PlanWaypoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f32,
    /// Hold time at the waypoint in seconds.
    #[serde(default)]
    pub hold_s: f32,
}

/// Mission plan as read from TOML.
///
/// ```toml
/// [[waypoint]]
/// latitude_deg = 47.397742
/// longitude_deg = 8.545594
/// altitude_m = 10.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MissionPlan {
    #[serde(default, rename = "waypoint")]
    pub waypoints: Vec<PlanWaypoint>,
}

impl MissionPlan {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Number waypoints from zero, marking the first one current.
    pub fn to_items(&self) -> Vec<MissionItem> {
        self.waypoints
            .iter()
            .zip(0u16..)
            .map(|(wp, seq)| {
                let mut item = MissionItem::waypoint(seq, wp.latitude_deg, wp.longitude_deg, wp.altitude_m);
                item.param1 = wp.hold_s;
                item
            })
            .collect()
    }
}

/// Check a list before starting an upload.
///
/// Items must be non-empty, numbered `0..N` in order and all of
/// `mission_type`. When `require_current` is set, exactly one item must be
/// flagged current.
pub(crate) fn validate_upload(
    items: &[MissionItem],
    mission_type: MavMissionType,
    require_current: bool,
) -> Result<(), TransferError> {
    if items.is_empty() {
        return Err(TransferError::NoMissionAvailable);
    }
    if items.len() > usize::from(u16::MAX) {
        return Err(TransferError::TooManyMissionItems);
    }
    if items
        .iter()
        .zip(0u16..)
        .any(|(item, expected)| item.seq != expected)
    {
        return Err(TransferError::InvalidSequence);
    }
    if require_current && items.iter().filter(|item| item.current).count() != 1 {
        return Err(TransferError::CurrentInvalid);
    }
    if items.iter().any(|item| item.mission_type != mission_type) {
        return Err(TransferError::MissionTypeNotConsistent);
    }
    Ok(())
}

fn degrees_to_e7(degrees: f64) -> i32 {
    (degrees * 1e7).round() as i32
}
