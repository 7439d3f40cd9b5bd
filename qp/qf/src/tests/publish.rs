use std::sync::Arc;

use qp_core::{priority, Priority};
use qp_mem::EventRef;
use qp_qs::{filters, hdlc, Record, Tracer};

use super::{framework, log, run, Recorder, PING, PONG, TICK};
use crate::{Framework, FrameworkConfig};

#[test]
fn fan_out_goes_highest_priority_first() {
    let fw = framework();
    let log = log();
    for p in [2, 9, 5] {
        let prio = Priority::new(p).unwrap();
        fw.start_active(prio, 2, Recorder::new(&log).subscribed(TICK));
    }

    fw.publish(EventRef::from_signal(TICK));
    run(&fw);

    let order: Vec<u8> = log.lock().iter().map(|(p, _)| *p).collect();
    assert_eq!(order, [9, 5, 2]);
}

#[test]
fn unsubscribed_event_is_recycled() {
    let fw = framework();
    let e = fw.new_event(PONG, &[1, 2]);
    assert_eq!(fw.pool_free(1), 3);
    fw.publish(e);
    assert_eq!(fw.pool_free(1), 4);
}

#[test]
fn unsubscribe_stops_delivery() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 2, Recorder::new(&log).subscribed(PING).subscribed(PONG));

    fw.unsubscribe(priority!(1), PING);
    fw.publish(EventRef::from_signal(PING));
    fw.publish(EventRef::from_signal(PONG));
    run(&fw);
    assert_eq!(*log.lock(), [(1, PONG)]);

    fw.unsubscribe_all(priority!(1));
    assert!(fw.subscribers(PONG).is_empty());
}

#[test]
#[should_panic]
fn reserved_signal_cannot_be_subscribed() {
    let fw = framework();
    let log = log();
    fw.start_active(priority!(1), 2, Recorder::new(&log));
    fw.subscribe(priority!(1), qp_core::Signal::ENTRY);
}

#[test]
#[should_panic]
fn signal_past_the_table_cannot_be_published() {
    let fw = framework();
    fw.publish(EventRef::from_signal(qp_core::Signal(32)));
}

/// `(record id, payload)` of every frame, timestamps stripped.
fn frames(tracer: &Tracer) -> Vec<(u8, Vec<u8>)> {
    let mut raw = Vec::new();
    tracer.drain(64, |b| raw.extend_from_slice(b));

    let mut out = Vec::new();
    for chunk in raw.split(|b| *b == hdlc::FLAG).filter(|c| !c.is_empty()) {
        let mut frame = Vec::new();
        let mut esc = false;
        for &b in chunk {
            if esc {
                frame.push(b ^ hdlc::ESC_XOR);
                esc = false;
            } else if b == hdlc::ESC {
                esc = true;
            } else {
                frame.push(b);
            }
        }
        let id = frame[1];
        let body = if qp_qs::has_timestamp(id) { &frame[6..] } else { &frame[2..] };
        out.push((id, body[..body.len() - 1].to_vec()));
    }
    out
}

#[test]
fn trace_shows_high_priority_subscriber_first() {
    let tracer = Arc::new(Tracer::new(4096));
    tracer.global_filter(filters::SM | filters::SC, true);
    let fw = Framework::new(
        FrameworkConfig::builder()
            .max_signal(16)
            .tracer(Arc::clone(&tracer))
            .build(),
    );
    let log = log();
    fw.start_active(priority!(1), 2, Recorder::new(&log).subscribed(TICK));
    fw.start_active(priority!(2), 2, Recorder::new(&log).subscribed(TICK));

    fw.publish(EventRef::from_signal(TICK));
    run(&fw);

    let frames = frames(&tracer);
    let dispatched: Vec<u8> = frames
        .iter()
        .filter(|(id, _)| *id == Record::QepDispatch as u8)
        .map(|(_, body)| body[0])
        .collect();
    assert_eq!(dispatched, [2, 1]);

    // the fan-out ran with the scheduler locked up to the top subscriber
    let lock = frames
        .iter()
        .find(|(id, _)| *id == Record::SchedLock as u8)
        .expect("lock record");
    assert_eq!(lock.1, [0, 2]);
    assert!(frames.iter().any(|(id, _)| *id == Record::SchedUnlock as u8));
}
