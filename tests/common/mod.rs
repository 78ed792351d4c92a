//! Shared harness for the integration tests.
//!
//! The engine runs on a [`ManualTime`] clock and is ticked by hand. Sent
//! messages are captured by [`RecordingSender`]; replies are injected as if
//! they came from system 1, component 1.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mavlink::common::{
    MavCmd, MavMessage, MavMissionResult, MavMissionType, MavResult, COMMAND_ACK_DATA,
    MISSION_ACK_DATA, MISSION_COUNT_DATA, MISSION_CURRENT_DATA, MISSION_ITEM_INT_DATA,
    MISSION_REQUEST_DATA, MISSION_REQUEST_INT_DATA,
};
use mavlink::MavHeader;

use waylink::{Autopilot, Engine, LinkConfig, ManualTime, MissionItem, Sender};

pub const VEHICLE: u8 = 1;
pub const OWN_SYSTEM: u8 = 245;
pub const OWN_COMPONENT: u8 = 190;
pub const MISSION: MavMissionType = MavMissionType::MAV_MISSION_TYPE_MISSION;
pub const RESULT_WAIT: Duration = Duration::from_secs(2);

/// Sender recording every message instead of transmitting it.
pub struct RecordingSender {
    sent: Mutex<Vec<MavMessage>>,
    accept: AtomicBool,
    autopilot: Mutex<Autopilot>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            accept: AtomicBool::new(true),
            autopilot: Mutex::new(Autopilot::Px4),
        }
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn set_autopilot(&self, autopilot: Autopilot) {
        *self.autopilot.lock().unwrap() = autopilot;
    }

    pub fn sent(&self) -> Vec<MavMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<MavMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&MavMessage) -> bool,
    {
        self.sent.lock().unwrap().iter().filter(|m| pred(m)).count()
    }
}

impl Sender for RecordingSender {
    fn own_system_id(&self) -> u8 {
        OWN_SYSTEM
    }

    fn own_component_id(&self) -> u8 {
        OWN_COMPONENT
    }

    fn target_system_id(&self) -> u8 {
        VEHICLE
    }

    fn autopilot(&self) -> Autopilot {
        *self.autopilot.lock().unwrap()
    }

    fn send_message(&self, message: &MavMessage) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(message.clone());
        true
    }
}

pub struct Harness {
    pub link: Arc<RecordingSender>,
    pub time: ManualTime,
    pub engine: Engine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        let link = Arc::new(RecordingSender::new());
        let time = ManualTime::new();
        let engine = Engine::with_time_source(
            Arc::clone(&link) as Arc<dyn Sender>,
            config,
            Arc::new(time.clone()),
        )
        .unwrap();
        Self { link, time, engine }
    }

    pub fn tick(&self) {
        self.engine.tick();
    }

    /// Deliver `message` from the vehicle and tick.
    pub fn inject(&self, message: MavMessage) {
        let header = MavHeader {
            system_id: VEHICLE,
            component_id: 1,
            sequence: 0,
        };
        self.engine.process_message(&header, &message);
        self.tick();
    }

    pub fn inject_from(&self, system_id: u8, message: MavMessage) {
        let header = MavHeader {
            system_id,
            component_id: 1,
            sequence: 0,
        };
        self.engine.process_message(&header, &message);
        self.tick();
    }

    /// Advance the clock by `duration` and tick.
    pub fn advance(&self, duration: Duration) {
        self.time.advance(duration);
        self.tick();
    }

    /// Advance past one default timeout.
    pub fn expire(&self) {
        self.advance(Duration::from_millis(600));
    }

    /// Wait for every callback posted so far to run.
    pub fn flush(&self) {
        assert!(self.engine.executor().flush());
    }
}

/// Channel capturing callback results.
pub fn capture<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel();
    (
        move |value| {
            let _ = tx.send(value);
        },
        rx,
    )
}

pub fn expect_result<T>(rx: &mpsc::Receiver<T>) -> T {
    rx.recv_timeout(RESULT_WAIT).expect("callback did not fire")
}

/// Progress values reported so far.
pub fn progress_log() -> (Arc<dyn Fn(f32) + Send + Sync>, Arc<Mutex<Vec<f32>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (Arc::new(move |v| sink.lock().unwrap().push(v)), log)
}

pub fn waypoints(n: u16) -> Vec<MissionItem> {
    (0..n)
        .map(|seq| MissionItem::waypoint(seq, 47.3977 + f64::from(seq) * 1e-4, 8.5456, 10.0))
        .collect()
}

pub fn command_ack(command: MavCmd, result: MavResult, progress: u8) -> MavMessage {
    MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
        command,
        result,
        progress,
        result_param2: 0,
        target_system: OWN_SYSTEM,
        target_component: OWN_COMPONENT,
    })
}

pub fn request_int(seq: u16) -> MavMessage {
    MavMessage::MISSION_REQUEST_INT(MISSION_REQUEST_INT_DATA {
        target_system: OWN_SYSTEM,
        target_component: OWN_COMPONENT,
        seq,
        mission_type: MISSION,
    })
}

pub fn legacy_request(seq: u16) -> MavMessage {
    MavMessage::MISSION_REQUEST(MISSION_REQUEST_DATA {
        target_system: OWN_SYSTEM,
        target_component: OWN_COMPONENT,
        seq,
        mission_type: MISSION,
    })
}

pub fn mission_ack(result: MavMissionResult) -> MavMessage {
    MavMessage::MISSION_ACK(MISSION_ACK_DATA {
        target_system: OWN_SYSTEM,
        target_component: OWN_COMPONENT,
        mavtype: result,
        mission_type: MISSION,
        ..Default::default()
    })
}

pub fn mission_count(count: u16) -> MavMessage {
    MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
        target_system: OWN_SYSTEM,
        target_component: OWN_COMPONENT,
        count,
        mission_type: MISSION,
        ..Default::default()
    })
}

pub fn mission_item(seq: u16) -> MavMessage {
    let item = MissionItem::waypoint(seq, 47.3977 + f64::from(seq) * 1e-4, 8.5456, 10.0);
    MavMessage::MISSION_ITEM_INT(item.to_mission_item_int(OWN_SYSTEM, OWN_COMPONENT))
}

pub fn mission_current(seq: u16) -> MavMessage {
    MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA {
        seq,
        ..Default::default()
    })
}

pub fn is_count(m: &MavMessage) -> bool {
    matches!(m, MavMessage::MISSION_COUNT(_))
}

pub fn is_item(m: &MavMessage) -> bool {
    matches!(m, MavMessage::MISSION_ITEM_INT(_))
}

pub fn is_request_int(m: &MavMessage) -> bool {
    matches!(m, MavMessage::MISSION_REQUEST_INT(_))
}

pub fn is_command(m: &MavMessage) -> bool {
    matches!(m, MavMessage::COMMAND_LONG(_) | MavMessage::COMMAND_INT(_))
}

pub fn acks(messages: &[MavMessage]) -> Vec<MISSION_ACK_DATA> {
    messages
        .iter()
        .filter_map(|m| match m {
            MavMessage::MISSION_ACK(a) => Some(a.clone()),
            _ => None,
        })
        .collect()
}

pub fn sent_item(m: &MavMessage) -> Option<&MISSION_ITEM_INT_DATA> {
    match m {
        MavMessage::MISSION_ITEM_INT(i) => Some(i),
        _ => None,
    }
}
