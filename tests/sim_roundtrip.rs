//! Engine against the simulated vehicle.

mod common;

use std::sync::mpsc::Receiver;

use mavlink::common::MavAutopilot;
use mavlink::MavHeader;
use waylink::command::CommandLong;
use waylink::{Admission, Autopilot};
use waylink_sim::SimVehicle;

use common::*;

const MAX_ROUNDS: usize = 200;

/// Shuttle messages between engine and vehicle until `rx` yields.
///
/// Rounds without traffic advance the clock past a timeout.
fn pump<T>(h: &Harness, vehicle: &mut SimVehicle, rx: &Receiver<T>) -> T {
    let gcs = MavHeader {
        system_id: OWN_SYSTEM,
        component_id: OWN_COMPONENT,
        sequence: 0,
    };
    for _ in 0..MAX_ROUNDS {
        h.flush();
        if let Ok(value) = rx.try_recv() {
            return value;
        }

        let outgoing = h.link.take();
        if outgoing.is_empty() {
            h.expire();
            continue;
        }
        for message in outgoing {
            for reply in vehicle.handle(&gcs, &message) {
                let header = vehicle.header();
                h.engine.process_message(&header, &reply);
            }
        }
        h.tick();
    }
    panic!("no result after {MAX_ROUNDS} rounds");
}

#[test]
fn test_upload_then_download() {
    let h = Harness::new();
    let mut vehicle = SimVehicle::new(VEHICLE, 1);
    let items = waypoints(5);

    let (cb, rx) = capture();
    h.engine.mission_client().upload_items_async(
        MISSION,
        VEHICLE,
        items.clone(),
        Admission::Queue,
        None,
        cb,
    );
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(()));
    assert_eq!(vehicle.mission.items().len(), 5);

    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .download_items_async(MISSION, VEHICLE, Admission::Queue, None, cb);
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(items));
}

#[test]
fn test_upload_survives_lost_messages() {
    let h = Harness::new();
    let mut vehicle = SimVehicle::new(VEHICLE, 1);

    let (cb, rx) = capture();
    h.engine.mission_client().upload_items_async(
        MISSION,
        VEHICLE,
        waypoints(3),
        Admission::Queue,
        None,
        cb,
    );
    vehicle.drop_next(2);
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(()));
    assert_eq!(vehicle.mission.items().len(), 3);
}

#[test]
fn test_ardupilot_legacy_requests() {
    let h = Harness::new();
    h.link.set_autopilot(Autopilot::ArduPilot);
    let mut vehicle =
        SimVehicle::new(VEHICLE, 1).with_autopilot(MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA);

    let (cb, rx) = capture();
    h.engine.mission_client().upload_items_async(
        MISSION,
        VEHICLE,
        waypoints(2),
        Admission::Queue,
        None,
        cb,
    );
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(()));
    assert_eq!(vehicle.mission.items().len(), 2);
}

#[test]
fn test_clear_and_set_current() {
    let h = Harness::new();
    let mut vehicle = SimVehicle::new(VEHICLE, 1);

    let (cb, rx) = capture();
    h.engine.mission_client().upload_items_async(
        MISSION,
        VEHICLE,
        waypoints(4),
        Admission::Queue,
        None,
        cb,
    );
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(()));

    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .set_current_item_async(2, VEHICLE, Admission::Queue, cb);
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(()));
    assert_eq!(vehicle.mission.current(), 2);

    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Queue, cb);
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(()));
    assert!(vehicle.mission.items().is_empty());
}

#[test]
fn test_arm_with_progress() {
    let h = Harness::new();
    let mut vehicle = SimVehicle::new(VEHICLE, 1);
    vehicle.commands.set_in_progress_steps(1);

    let (progress, log) = progress_log();
    let (cb, rx) = capture();
    h.engine.commands().send_command_with_progress_async(
        CommandLong::arm_disarm(VEHICLE, true),
        progress,
        cb,
    );
    assert_eq!(pump(&h, &mut vehicle, &rx), Ok(()));
    assert!(vehicle.commands.is_armed());
    assert_eq!(*log.lock().unwrap(), vec![0.5]);
}
