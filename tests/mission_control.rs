mod common;

use mavlink::common::{MavMessage, MavMissionResult};
use waylink::{Admission, TransferError};

use common::*;

fn set_current_sent(h: &Harness) -> Vec<u16> {
    h.link
        .sent()
        .iter()
        .filter_map(|m| match m {
            MavMessage::MISSION_SET_CURRENT(s) => Some(s.seq),
            _ => None,
        })
        .collect()
}

fn is_clear(m: &MavMessage) -> bool {
    matches!(m, MavMessage::MISSION_CLEAR_ALL(_))
}

#[test]
fn test_clear() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Queue, cb);
    h.tick();
    assert!(matches!(
        h.link.sent().as_slice(),
        [MavMessage::MISSION_CLEAR_ALL(c)] if c.target_system == VEHICLE && c.target_component == 1
    ));

    h.inject(mission_ack(MavMissionResult::MAV_MISSION_ACCEPTED));
    assert_eq!(expect_result(&rx), Ok(()));
}

#[test]
fn test_clear_resent_on_timeout_and_denied() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Queue, cb);
    h.tick();
    h.expire();
    assert_eq!(h.link.count(is_clear), 2);

    h.inject(mission_ack(MavMissionResult::MAV_MISSION_DENIED));
    assert_eq!(expect_result(&rx), Err(TransferError::Denied));
}

#[test]
fn test_clear_times_out() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Queue, cb);
    h.tick();
    for _ in 0..5 {
        h.expire();
    }
    assert_eq!(expect_result(&rx), Err(TransferError::Timeout));
    assert_eq!(h.link.count(is_clear), 5);
}

#[test]
fn test_set_current() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .set_current_item_async(2, VEHICLE, Admission::Queue, cb);
    h.tick();
    assert_eq!(set_current_sent(&h), vec![2]);

    h.inject(mission_current(2));
    assert_eq!(expect_result(&rx), Ok(()));
}

#[test]
fn test_set_current_mismatch_is_resent() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .set_current_item_async(3, VEHICLE, Admission::Queue, cb);
    h.tick();

    h.inject(mission_current(0));
    assert_eq!(set_current_sent(&h), vec![3, 3]);
    h.flush();
    assert!(rx.try_recv().is_err());

    h.inject(mission_current(3));
    assert_eq!(expect_result(&rx), Ok(()));
}

#[test]
fn test_set_current_persistent_mismatch_gives_up() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .set_current_item_async(3, VEHICLE, Admission::Queue, cb);
    h.tick();

    for _ in 0..5 {
        h.inject(mission_current(1));
    }
    assert_eq!(expect_result(&rx), Err(TransferError::Timeout));
    assert_eq!(set_current_sent(&h).len(), 5);
}

#[test]
fn test_set_current_negative_index() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine
        .mission_client()
        .set_current_item_async(-1, VEHICLE, Admission::Queue, cb);
    h.tick();
    assert_eq!(expect_result(&rx), Err(TransferError::CurrentInvalid));
    assert!(h.link.sent().is_empty());
}

#[test]
fn test_transfers_run_in_submission_order() {
    let h = Harness::new();
    let (clear_cb, clear_rx) = capture();
    let (current_cb, current_rx) = capture();
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Queue, clear_cb);
    h.engine
        .mission_client()
        .set_current_item_async(0, VEHICLE, Admission::Queue, current_cb);
    assert_eq!(h.engine.mission_client().pending(), 2);

    h.tick();
    assert_eq!(h.link.sent().len(), 1);
    assert!(set_current_sent(&h).is_empty());

    h.inject(mission_ack(MavMissionResult::MAV_MISSION_ACCEPTED));
    assert_eq!(expect_result(&clear_rx), Ok(()));
    assert_eq!(set_current_sent(&h), vec![0]);

    h.inject(mission_current(0));
    assert_eq!(expect_result(&current_rx), Ok(()));
    assert!(h.engine.mission_client().is_idle());
}

#[test]
fn test_exclusive_request_while_busy() {
    let h = Harness::new();
    let (first, first_rx) = capture();
    let (second, second_rx) = capture();
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Exclusive, first);
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Exclusive, second);

    assert_eq!(expect_result(&second_rx), Err(TransferError::Busy));
    assert_eq!(h.engine.mission_client().pending(), 1);

    h.tick();
    h.inject(mission_ack(MavMissionResult::MAV_MISSION_ACCEPTED));
    assert_eq!(expect_result(&first_rx), Ok(()));
    assert_eq!(h.link.count(is_clear), 1);
}

#[test]
fn test_cancel_queued_transfer_sends_nothing() {
    let h = Harness::new();
    let (first, first_rx) = capture();
    let (second, second_rx) = capture();
    h.engine
        .mission_client()
        .clear_items_async(MISSION, VEHICLE, Admission::Queue, first);
    let queued = h
        .engine
        .mission_client()
        .download_items_async(MISSION, VEHICLE, Admission::Queue, None, second);
    h.tick();
    h.link.take();

    assert!(h.engine.mission_client().cancel(queued));
    assert_eq!(expect_result(&second_rx), Err(TransferError::Cancelled));
    assert!(h.link.sent().is_empty());

    h.inject(mission_ack(MavMissionResult::MAV_MISSION_ACCEPTED));
    assert_eq!(expect_result(&first_rx), Ok(()));
    assert!(h.link.sent().is_empty(), "cancelled download never starts");
    assert!(h.engine.mission_client().is_idle());
}

fn starts_transfer(m: &MavMessage) -> bool {
    matches!(
        m,
        MavMessage::MISSION_CLEAR_ALL(_)
            | MavMessage::MISSION_COUNT(_)
            | MavMessage::MISSION_SET_CURRENT(_)
    )
}

/// What the vehicle answers to `m`.
fn vehicle_reply(m: &MavMessage) -> Option<MavMessage> {
    match m {
        MavMessage::MISSION_CLEAR_ALL(_) => Some(mission_ack(MavMissionResult::MAV_MISSION_ACCEPTED)),
        MavMessage::MISSION_COUNT(_) => Some(request_int(0)),
        MavMessage::MISSION_ITEM_INT(item) if item.seq == 0 => Some(request_int(1)),
        MavMessage::MISSION_ITEM_INT(_) => Some(mission_ack(MavMissionResult::MAV_MISSION_ACCEPTED)),
        MavMessage::MISSION_SET_CURRENT(s) => Some(mission_current(s.seq)),
        _ => None,
    }
}

#[test]
fn test_transfers_queued_from_several_threads_run_one_at_a_time() {
    let h = Harness::new();
    let client = h.engine.mission_client();
    let (tx, rx) = std::sync::mpsc::channel::<(&'static str, Result<(), TransferError>)>();

    std::thread::scope(|scope| {
        let clear_tx = tx.clone();
        scope.spawn(move || {
            client.clear_items_async(MISSION, VEHICLE, Admission::Queue, move |r| {
                let _ = clear_tx.send(("clear", r));
            });
        });
        let upload_tx = tx.clone();
        scope.spawn(move || {
            client.upload_items_async(
                MISSION,
                VEHICLE,
                waypoints(2),
                Admission::Queue,
                None,
                move |r| {
                    let _ = upload_tx.send(("upload", r));
                },
            );
        });
        let current_tx = tx.clone();
        scope.spawn(move || {
            client.set_current_item_async(1, VEHICLE, Admission::Queue, move |r| {
                let _ = current_tx.send(("current", r));
            });
        });
    });
    drop(tx);
    assert_eq!(client.pending(), 3);

    let mut starts = 0;
    let mut finished = Vec::new();
    for _ in 0..50 {
        h.tick();
        let sent = h.link.take();
        for message in &sent {
            if starts_transfer(message) {
                starts += 1;
                h.flush();
                finished.extend(rx.try_iter());
                assert_eq!(
                    finished.len(),
                    starts - 1,
                    "a transfer started before the previous one finished"
                );
            }
        }
        if let Some(reply) = sent.last().and_then(vehicle_reply) {
            h.inject(reply);
        }
        h.flush();
        finished.extend(rx.try_iter());
        if finished.len() == 3 {
            break;
        }
    }

    assert_eq!(starts, 3);
    let mut labels: Vec<_> = finished
        .iter()
        .map(|(label, result)| {
            assert_eq!(*result, Ok(()), "{label}");
            *label
        })
        .collect();
    labels.sort_unstable();
    assert_eq!(labels, vec!["clear", "current", "upload"]);

    h.tick();
    h.flush();
    assert!(rx.try_iter().next().is_none(), "each callback fires once");
    assert!(client.is_idle());
}

#[test]
fn test_dropping_engine_cancels_pending_transfers() {
    let h = Harness::new();
    let client = h.engine.mission_client();
    let (clear_cb, clear_rx) = capture();
    let (upload_cb, upload_rx) = capture();
    client.clear_items_async(MISSION, VEHICLE, Admission::Queue, clear_cb);
    client.upload_items_async(
        MISSION,
        VEHICLE,
        waypoints(2),
        Admission::Queue,
        None,
        upload_cb,
    );
    h.tick();
    assert_eq!(h.link.count(is_clear), 1);

    drop(h);

    assert_eq!(expect_result(&clear_rx), Err(TransferError::Cancelled));
    assert_eq!(expect_result(&upload_rx), Err(TransferError::Cancelled));
}
