mod common;

use std::sync::Arc;
use std::time::Duration;

use mavlink::common::{MavCmd, MavMessage, MavResult};
use waylink::command::{CommandLong, CommandParam};
use waylink::{Autopilot, CommandError, Engine, LinkConfig, ManualTime, Sender};

use common::*;

const ARM: MavCmd = MavCmd::MAV_CMD_COMPONENT_ARM_DISARM;

fn arm() -> CommandLong {
    CommandLong::arm_disarm(VEHICLE, true)
}

#[test]
fn test_accepted_command() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine.commands().send_command_async(arm(), cb);

    h.tick();
    let sent = h.link.sent();
    let [MavMessage::COMMAND_LONG(cmd)] = sent.as_slice() else {
        panic!("expected one COMMAND_LONG, got {sent:?}");
    };
    assert_eq!(cmd.command, ARM);
    assert_eq!(cmd.target_system, VEHICLE);
    assert_eq!(cmd.param1, 1.0);

    h.inject(command_ack(ARM, MavResult::MAV_RESULT_ACCEPTED, 0));
    assert_eq!(expect_result(&rx), Ok(()));
    assert_eq!(h.engine.commands().pending(), 0);
}

#[test]
fn test_timeout_after_retries() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine.commands().send_command_async(arm(), cb);
    h.tick();

    for _ in 0..3 {
        h.expire();
    }
    assert_eq!(h.link.count(is_command), 4);
    h.flush();
    assert!(rx.try_recv().is_err());

    h.expire();
    assert_eq!(expect_result(&rx), Err(CommandError::Timeout));
    assert_eq!(h.link.count(is_command), 4);
}

#[test]
fn test_in_progress_extends_timeout() {
    let h = Harness::new();
    let (progress, log) = progress_log();
    let (cb, rx) = capture();
    h.engine
        .commands()
        .send_command_with_progress_async(arm(), progress, cb);
    h.tick();

    h.inject(command_ack(ARM, MavResult::MAV_RESULT_IN_PROGRESS, 50));
    for _ in 0..10 {
        h.advance(Duration::from_millis(100));
    }
    assert_eq!(h.link.count(is_command), 1, "no resend while in progress");

    h.inject(command_ack(ARM, MavResult::MAV_RESULT_ACCEPTED, 0));
    assert_eq!(expect_result(&rx), Ok(()));
    h.flush();
    assert!(rx.try_recv().is_err(), "exactly one result");
    assert_eq!(*log.lock().unwrap(), vec![0.5]);
}

#[test]
fn test_unknown_progress_is_not_reported() {
    let h = Harness::new();
    let (progress, log) = progress_log();
    let (cb, _rx) = capture();
    h.engine
        .commands()
        .send_command_with_progress_async(arm(), progress, cb);
    h.tick();

    h.inject(command_ack(ARM, MavResult::MAV_RESULT_IN_PROGRESS, u8::MAX));
    h.flush();
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_result_mapping() {
    let cases = [
        (MavResult::MAV_RESULT_DENIED, CommandError::Denied),
        (MavResult::MAV_RESULT_TEMPORARILY_REJECTED, CommandError::Denied),
        (MavResult::MAV_RESULT_FAILED, CommandError::Denied),
        (MavResult::MAV_RESULT_UNSUPPORTED, CommandError::Unsupported),
    ];
    for (result, expected) in cases {
        let h = Harness::new();
        let (cb, rx) = capture();
        h.engine.commands().send_command_async(arm(), cb);
        h.tick();
        h.inject(command_ack(ARM, result, 0));
        assert_eq!(expect_result(&rx), Err(expected), "{result:?}");
    }
}

#[test]
fn test_ack_for_other_system_is_ignored() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine.commands().send_command_async(arm(), cb);
    h.tick();

    let MavMessage::COMMAND_ACK(mut ack) = command_ack(ARM, MavResult::MAV_RESULT_ACCEPTED, 0)
    else {
        unreachable!()
    };
    ack.target_system = 99;
    h.inject(MavMessage::COMMAND_ACK(ack));
    h.flush();
    assert!(rx.try_recv().is_err());
    assert_eq!(h.engine.commands().acks_seen(), 1);

    h.inject(command_ack(ARM, MavResult::MAV_RESULT_ACCEPTED, 0));
    assert_eq!(expect_result(&rx), Ok(()));
}

#[test]
fn test_ack_for_other_command_is_ignored() {
    let h = Harness::new();
    let (cb, rx) = capture();
    h.engine.commands().send_command_async(arm(), cb);
    h.tick();

    h.inject(command_ack(
        MavCmd::MAV_CMD_DO_SET_MODE,
        MavResult::MAV_RESULT_DENIED,
        0,
    ));
    h.flush();
    assert!(rx.try_recv().is_err());
    assert_eq!(h.engine.commands().pending(), 1);
}

#[test]
fn test_send_failure_is_connection_error() {
    let h = Harness::new();
    h.link.set_accept(false);
    let (cb, rx) = capture();
    h.engine.commands().send_command_async(arm(), cb);
    h.tick();
    assert_eq!(expect_result(&rx), Err(CommandError::ConnectionError));
}

#[test]
fn test_commands_run_in_order() {
    let h = Harness::new();
    let (first, first_rx) = capture();
    let (second, second_rx) = capture();
    h.engine.commands().send_command_async(arm(), first);
    h.engine
        .commands()
        .send_command_async(CommandLong::arm_disarm(VEHICLE, false), second);

    h.tick();
    assert_eq!(h.link.count(is_command), 1);

    h.inject(command_ack(ARM, MavResult::MAV_RESULT_ACCEPTED, 0));
    assert_eq!(expect_result(&first_rx), Ok(()));
    let sent = h.link.sent();
    let Some(MavMessage::COMMAND_LONG(disarm)) = sent.last() else {
        panic!("expected second command, got {sent:?}");
    };
    assert_eq!(disarm.param1, 0.0);

    h.inject(command_ack(ARM, MavResult::MAV_RESULT_DENIED, 0));
    assert_eq!(expect_result(&second_rx), Err(CommandError::Denied));
}

#[test]
fn test_reserved_params_follow_autopilot() {
    let h = Harness::new();
    let command = CommandLong::new(VEHICLE, 1, MavCmd::MAV_CMD_DO_REPOSITION)
        .param(1, CommandParam::Reserved)
        .param(5, 47.5_f32);

    h.engine.commands().send_command_async(command.clone(), |_| {});
    h.tick();
    let Some(MavMessage::COMMAND_LONG(px4)) = h.link.take().pop() else {
        panic!("expected a command");
    };
    assert!(px4.param1.is_nan());
    assert_eq!(px4.param5, 47.5);

    let h = Harness::new();
    h.link.set_autopilot(Autopilot::ArduPilot);
    h.engine.commands().send_command_async(command, |_| {});
    h.tick();
    let Some(MavMessage::COMMAND_LONG(ardupilot)) = h.link.take().pop() else {
        panic!("expected a command");
    };
    assert_eq!(ardupilot.param1, 0.0);
}

#[test]
fn test_blocking_send_command() {
    let h = Harness::new();

    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| h.engine.commands().send_command(arm()));

        while h.link.count(is_command) == 0 {
            h.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
        h.inject(command_ack(ARM, MavResult::MAV_RESULT_ACCEPTED, 0));

        assert_eq!(waiter.join().unwrap(), Ok(()));
    });
}

#[test]
fn test_blocking_send_from_callback_would_deadlock() {
    let link = Arc::new(RecordingSender::new());
    let engine = Arc::new(
        Engine::with_time_source(
            Arc::clone(&link) as Arc<dyn Sender>,
            LinkConfig::default(),
            Arc::new(ManualTime::new()),
        )
        .unwrap(),
    );

    let (tx, rx) = std::sync::mpsc::channel();
    let inner = Arc::clone(&engine);
    engine.executor().post(move || {
        let _ = tx.send(inner.commands().send_command(arm()));
    });

    assert_eq!(expect_result(&rx), Err(CommandError::WouldDeadlock));
    assert!(link.sent().is_empty());
}

#[test]
fn test_dropping_engine_fails_pending_commands() {
    let h = Harness::new();
    let (sent_cb, sent_rx) = capture();
    let (queued_cb, queued_rx) = capture();
    h.engine.commands().send_command_async(arm(), sent_cb);
    h.engine
        .commands()
        .send_command_async(CommandLong::arm_disarm(VEHICLE, false), queued_cb);
    h.tick();
    assert_eq!(h.link.count(is_command), 1);

    drop(h);

    assert_eq!(expect_result(&sent_rx), Err(CommandError::ConnectionError));
    assert_eq!(expect_result(&queued_rx), Err(CommandError::ConnectionError));
}
