use qp_core::{priority, Signal};

use super::{framework, log, run, Recorder, PING, TIMEOUT};

#[test]
fn one_shot_fires_exactly_once() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let te = fw.time_event(priority!(1), TIMEOUT, 0);

    fw.arm(te, 2, 0);
    fw.tick(0);
    run(&fw);
    assert!(log.lock().is_empty());
    assert_eq!(fw.current_ctr(te), 1);

    for _ in 0..5 {
        fw.tick(0);
        run(&fw);
    }
    assert_eq!(*log.lock(), [(1, TIMEOUT)]);
    assert_eq!(fw.current_ctr(te), 0);
    assert!(fw.no_time_events_active(0));
}

#[test]
fn periodic_time_event_rearms_itself() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let te = fw.time_event(priority!(1), TIMEOUT, 0);

    fw.arm(te, 1, 3);
    for _ in 0..7 {
        fw.tick(0);
        run(&fw);
    }
    // ticks 1, 4 and 7
    assert_eq!(log.lock().len(), 3);
    assert_eq!(fw.current_ctr(te), 3);
}

#[test]
fn disarm_is_idempotent() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let te = fw.time_event(priority!(1), TIMEOUT, 0);

    assert!(!fw.disarm(te));
    fw.arm(te, 5, 0);
    assert!(fw.disarm(te));
    assert!(!fw.disarm(te));

    for _ in 0..6 {
        fw.tick(0);
    }
    run(&fw);
    assert!(log.lock().is_empty());
}

#[test]
fn disarmed_event_stays_linked_until_the_next_tick() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let te = fw.time_event(priority!(1), TIMEOUT, 0);

    fw.arm(te, 5, 0);
    fw.tick(0);
    fw.disarm(te);
    assert!(!fw.no_time_events_active(0));
    fw.tick(0);
    assert!(fw.no_time_events_active(0));
}

#[test]
fn was_disarmed_reports_the_last_disarm() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let te = fw.time_event(priority!(1), TIMEOUT, 0);

    fw.arm(te, 1, 0);
    fw.tick(0);
    // expired before the disarm got to it
    assert!(!fw.disarm(te));
    assert!(!fw.was_disarmed(te));
    // asking sets the flag
    assert!(fw.was_disarmed(te));

    fw.arm(te, 3, 0);
    assert!(fw.disarm(te));
    assert!(fw.was_disarmed(te));
}

#[test]
fn rearm_shifts_the_phase() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let te = fw.time_event(priority!(1), TIMEOUT, 0);

    fw.arm(te, 2, 0);
    fw.tick(0);
    assert!(fw.rearm(te, 3));
    fw.tick(0);
    fw.tick(0);
    run(&fw);
    assert!(log.lock().is_empty());
    fw.tick(0);
    run(&fw);
    assert_eq!(log.lock().len(), 1);

    // a stopped time event gets armed by rearm
    assert!(!fw.rearm(te, 1));
    fw.tick(0);
    run(&fw);
    assert_eq!(log.lock().len(), 2);
}

#[test]
fn tick_rates_are_independent() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let fast = fw.time_event(priority!(1), TIMEOUT, 0);
    let slow = fw.time_event(priority!(1), PING, 1);

    fw.arm(fast, 1, 0);
    fw.arm(slow, 1, 0);
    fw.tick(0);
    run(&fw);
    assert_eq!(*log.lock(), [(1, TIMEOUT)]);
    fw.tick(1);
    run(&fw);
    assert_eq!(*log.lock(), [(1, TIMEOUT), (1, PING)]);
}

#[test]
fn several_events_expire_on_the_same_tick() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    fw.start_active(priority!(2), 4, Recorder::new(&log));
    let a = fw.time_event(priority!(1), TIMEOUT, 0);
    let b = fw.time_event(priority!(2), TIMEOUT, 0);
    let c = fw.time_event(priority!(1), PING, 0);

    fw.arm(a, 2, 0);
    fw.arm(b, 2, 2);
    fw.arm(c, 1, 0);
    fw.tick(0);
    fw.disarm(a);
    fw.tick(0);
    run(&fw);

    assert_eq!(*log.lock(), [(2, TIMEOUT), (1, PING)]);
    assert!(!fw.no_time_events_active(0));
    fw.disarm(b);
    fw.tick(0);
    assert!(fw.no_time_events_active(0));
}

#[test]
fn reserved_signal_wakes_instead_of_posting() {
    let fw = framework();
    fw.register_thread(priority!(3), 2);
    fw.clear_ready(priority!(3));
    let te = fw.time_event(priority!(3), Signal::EMPTY, 0);

    fw.arm(te, 1, 0);
    fw.tick(0);
    assert!(fw.is_ready(priority!(3)));
    assert_eq!(fw.queue_len(priority!(3)), 0);
    assert!(fw.take_timeout(priority!(3)));
    assert!(!fw.take_timeout(priority!(3)));
}

#[test]
fn ticker_walks_the_lists_in_task_context() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 4, Recorder::new(&log));
    let ticker = fw.start_active(priority!(10), 2, crate::Ticker::new(0));
    let te = fw.time_event(priority!(1), TIMEOUT, 0);
    fw.arm(te, 2, 0);

    for _ in 0..2 {
        fw.post(priority!(10), qp_mem::EventRef::from_signal(PING));
        run(&fw);
    }
    assert_eq!(ticker.with(|t| t.ticks()), 2);
    assert_eq!(*log.lock(), [(1, TIMEOUT)]);
}

#[test]
#[should_panic]
fn arming_with_zero_ticks_is_fatal() {
    let fw = framework();
    let te = fw.time_event(priority!(1), TIMEOUT, 0);
    fw.arm(te, 0, 0);
}
