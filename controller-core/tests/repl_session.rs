use controller_core::channels::ChannelId;
use controller_core::device::{LaserDriverController, NoopBoard, Notification};
use controller_core::engine::ChannelPhase;
use controller_core::registers::{RegisterAddress, RegisterValue};
use controller_core::repl::commands::{CommandExecutor, CommandOutcome, render_outcome};

fn run(executor: &mut CommandExecutor<LaserDriverController<NoopBoard>>, line: &str) -> String {
    let outcome = executor
        .execute(line)
        .unwrap_or_else(|error| panic!("`{line}` failed: {error}"));
    let mut text = String::new();
    render_outcome(&mut text, &outcome).unwrap();
    text
}

#[test]
fn register_driven_train_completes_and_notifies() {
    let controller = LaserDriverController::new(NoopBoard::new()).unwrap();
    let mut executor = CommandExecutor::new(controller);

    run(&mut executor, "write bnc1-on 2");
    run(&mut executor, "write bnc1-off 1");
    run(&mut executor, "write bnc1-pulses 2");
    assert_eq!(run(&mut executor, "write 0x2c 0x02"), "OK bncs-state\narmed BNC1\n");
    assert_eq!(run(&mut executor, "read bncs-state"), "bncs-state = 2 (0x02)\n");

    let controller = executor.controller_mut();
    assert!(controller.board().pulse_levels[ChannelId::Bnc1.as_index()]);
    for _ in 0..6 {
        controller.tick();
    }

    assert_eq!(controller.engine().phase(ChannelId::Bnc1), ChannelPhase::Idle);
    assert!(!controller.board().pulse_levels[ChannelId::Bnc1.as_index()]);
    let notifications: Vec<Notification> = controller.take_notifications().collect();
    assert_eq!(
        notifications,
        vec![Notification {
            address: RegisterAddress::BncsState,
            value: RegisterValue::U8(0),
        }]
    );
    assert_eq!(run(&mut executor, "read bncs-state"), "bncs-state = 0 (0x00)\n");
}

#[test]
fn standby_from_the_repl_quiets_the_board() {
    let mut board = NoopBoard::new();
    board.inputs.spad_switch = true;
    let mut executor = CommandExecutor::new(LaserDriverController::new(board).unwrap());

    run(&mut executor, "write intensity 200");
    run(&mut executor, "start signal-a on=3 off=3");
    run(&mut executor, "start bnc0 on=1 tail=10");
    assert!(executor.controller().board().relay_closed);

    assert_eq!(run(&mut executor, "standby"), "OK standby BNC0 SIGNAL_A\n");

    let controller = executor.controller();
    assert_eq!(controller.engine().active_mask().bits(), 0);
    assert_eq!(controller.board().pulse_levels, [false; 4]);
    assert_eq!(controller.board().digipot, Some(0));
    assert!(!controller.board().relay_closed);

    let status = run(&mut executor, "status");
    assert!(status.contains("laser key=off frequency=off intensity=0\n"));
    assert!(status.contains("io spad=open"));
}

#[test]
fn status_reflects_running_channels() {
    let mut executor = CommandExecutor::new(LaserDriverController::new(NoopBoard::new()).unwrap());
    run(&mut executor, "start signal-b on=4 off=6 pulses=3 tail=2");
    run(&mut executor, "write frequency 4");

    let Ok(CommandOutcome::Status(snapshot)) = executor.execute("status") else {
        panic!("status did not return a snapshot");
    };
    let signal_b = snapshot.channels[ChannelId::SignalB.as_index()];
    assert_eq!(signal_b.phase, ChannelPhase::TailWait);
    assert_eq!(signal_b.descriptor.period(), 10);

    let status = run(&mut executor, "status");
    assert!(status.contains("SIGNAL_B tail on=4 off=6 pulses=3 tail=2 left=3\n"));
    assert!(status.contains("frequency=f3"));
}
