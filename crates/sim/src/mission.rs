//! Vehicle-side mission protocol.
//!
//! # Mission Upload Flow (GCS → vehicle)
//!
//! 1. GCS sends MISSION_COUNT with number of items
//! 2. Vehicle responds with MISSION_REQUEST_INT (or legacy MISSION_REQUEST)
//!    for seq=0
//! 3. GCS sends MISSION_ITEM_INT for seq=0
//! 4. ... repeat until all items received
//! 5. Vehicle sends MISSION_ACK(ACCEPTED)
//!
//! # Mission Download Flow (vehicle → GCS)
//!
//! 1. GCS sends MISSION_REQUEST_LIST
//! 2. Vehicle responds with MISSION_COUNT
//! 3. GCS requests each item, vehicle answers with MISSION_ITEM_INT
//! 4. GCS sends MISSION_ACK
//!
//! Out-of-order items during upload are answered by re-requesting the
//! expected one, so a lossy link converges instead of aborting.

use mavlink::common::{
    MavMessage, MavMissionResult, MavMissionType, MISSION_ACK_DATA, MISSION_COUNT_DATA,
    MISSION_CURRENT_DATA, MISSION_ITEM_INT_DATA, MISSION_REQUEST_DATA, MISSION_REQUEST_INT_DATA,
};
use mavlink::MavHeader;
use tracing::{debug, info, warn};

/// Mission transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    /// Receiving a list from the GCS.
    Receiving {
        count: u16,
        next_seq: u16,
        peer: (u8, u8),
        mission_type: MavMissionType,
    },
    /// Sending our list to the GCS.
    Sending { peer: (u8, u8) },
}

/// Stored mission plus the transfer in progress.
#[derive(Debug, Default)]
pub struct SimMission {
    items: Vec<MISSION_ITEM_INT_DATA>,
    pending: Vec<MISSION_ITEM_INT_DATA>,
    current: u16,
    state: TransferState,
    legacy_requests: bool,
}

impl SimMission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request items with float-coordinate MISSION_REQUEST, as older
    /// ArduPilot firmware does.
    pub fn set_legacy_requests(&mut self, legacy: bool) {
        self.legacy_requests = legacy;
    }

    pub fn items(&self) -> &[MISSION_ITEM_INT_DATA] {
        &self.items
    }

    /// Replace the stored mission directly.
    pub fn set_items(&mut self, items: Vec<MISSION_ITEM_INT_DATA>) {
        self.items = items;
        self.current = 0;
    }

    pub fn current(&self) -> u16 {
        self.current
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Handle a mission message, returning the replies.
    pub fn handle(&mut self, header: &MavHeader, message: &MavMessage) -> Vec<MavMessage> {
        let peer = (header.system_id, header.component_id);
        match message {
            MavMessage::MISSION_COUNT(data) => self.handle_count(data, peer),
            MavMessage::MISSION_ITEM_INT(data) => self.handle_item_int(data),
            MavMessage::MISSION_REQUEST_LIST(data) => {
                info!("mission download requested");
                let Ok(count) = u16::try_from(self.items.len()) else {
                    warn!(items = self.items.len(), "stored mission too large to send");
                    self.state = TransferState::Idle;
                    return vec![ack(peer, data.mission_type, MavMissionResult::MAV_MISSION_NO_SPACE)];
                };
                self.state = TransferState::Sending { peer };
                vec![MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
                    target_system: peer.0,
                    target_component: peer.1,
                    count,
                    mission_type: data.mission_type,
                    ..Default::default()
                })]
            }
            MavMessage::MISSION_REQUEST_INT(data) => self.handle_request_int(data, peer),
            MavMessage::MISSION_ACK(data) => {
                match self.state {
                    TransferState::Sending { .. } => {
                        debug!(result = ?data.mavtype, "mission download finished");
                    }
                    TransferState::Receiving { .. } => {
                        warn!(result = ?data.mavtype, "mission upload aborted by GCS");
                        self.pending.clear();
                    }
                    TransferState::Idle => {}
                }
                self.state = TransferState::Idle;
                Vec::new()
            }
            MavMessage::MISSION_CLEAR_ALL(data) => {
                info!("mission cleared");
                self.items.clear();
                self.current = 0;
                self.state = TransferState::Idle;
                vec![ack(peer, data.mission_type, MavMissionResult::MAV_MISSION_ACCEPTED)]
            }
            MavMessage::MISSION_SET_CURRENT(data) => {
                if usize::from(data.seq) < self.items.len() {
                    self.current = data.seq;
                } else {
                    warn!(seq = data.seq, "set current out of range");
                }
                vec![MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA {
                    seq: self.current,
                    ..Default::default()
                })]
            }
            _ => Vec::new(),
        }
    }

    fn handle_count(&mut self, data: &MISSION_COUNT_DATA, peer: (u8, u8)) -> Vec<MavMessage> {
        info!(count = data.count, "mission upload started");
        self.pending.clear();

        if data.count == 0 {
            self.items.clear();
            self.state = TransferState::Idle;
            return vec![ack(peer, data.mission_type, MavMissionResult::MAV_MISSION_ACCEPTED)];
        }

        self.state = TransferState::Receiving {
            count: data.count,
            next_seq: 0,
            peer,
            mission_type: data.mission_type,
        };
        vec![self.request(peer, 0, data.mission_type)]
    }

    fn handle_item_int(&mut self, data: &MISSION_ITEM_INT_DATA) -> Vec<MavMessage> {
        let TransferState::Receiving {
            count,
            next_seq,
            peer,
            mission_type,
        } = self.state
        else {
            warn!(seq = data.seq, "mission item while not receiving");
            return Vec::new();
        };

        if data.seq != next_seq {
            debug!(seq = data.seq, expected = next_seq, "re-requesting mission item");
            return vec![self.request(peer, next_seq, mission_type)];
        }

        self.pending.push(data.clone());
        let next_seq = next_seq + 1;
        if next_seq >= count {
            info!(count, "mission upload complete");
            self.items = std::mem::take(&mut self.pending);
            self.current = 0;
            self.state = TransferState::Idle;
            return vec![ack(peer, mission_type, MavMissionResult::MAV_MISSION_ACCEPTED)];
        }

        self.state = TransferState::Receiving {
            count,
            next_seq,
            peer,
            mission_type,
        };
        vec![self.request(peer, next_seq, mission_type)]
    }

    fn handle_request_int(
        &mut self,
        data: &MISSION_REQUEST_INT_DATA,
        peer: (u8, u8),
    ) -> Vec<MavMessage> {
        match self.items.get(usize::from(data.seq)) {
            Some(item) => {
                let mut item = item.clone();
                item.target_system = peer.0;
                item.target_component = peer.1;
                vec![MavMessage::MISSION_ITEM_INT(item)]
            }
            None => {
                warn!(seq = data.seq, "requested mission item not found");
                vec![ack(peer, data.mission_type, MavMissionResult::MAV_MISSION_INVALID_SEQUENCE)]
            }
        }
    }

    fn request(&self, peer: (u8, u8), seq: u16, mission_type: MavMissionType) -> MavMessage {
        if self.legacy_requests {
            MavMessage::MISSION_REQUEST(MISSION_REQUEST_DATA {
                target_system: peer.0,
                target_component: peer.1,
                seq,
                mission_type,
            })
        } else {
            MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
                target_system: peer.0,
                target_component: peer.1,
                seq,
                mission_type,
            })
        }
    }
}

fn ack(peer: (u8, u8), mission_type: MavMissionType, result: MavMissionResult) -> MavMessage {
    MavMessage::MISSION_ACK(MISSION_ACK_DATA {
        target_system: peer.0,
        target_component: peer.1,
        mavtype: result,
        mission_type,
        ..Default::default()
    })
}
