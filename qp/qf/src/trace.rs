//! QS records emitted by the framework
//!
//! Object references in these records are priorities for active objects
//! and threads and indices for time events. State names are the `Debug`
//! rendering of the state.

use core::fmt::{self, Write};

use heapless::String;
use qp_core::Signal;
use qp_mem::EventRef;
use qp_qep::{Dispatched, Step};
use qp_qs::{Record, RecordBuilder};

use crate::Framework;

const NAME_LEN: usize = 48;

fn name_of<S: fmt::Debug>(state: S) -> String<NAME_LEN> {
    let mut name = String::new();
    // a name that does not fit is left empty
    let _ = write!(name, "{state:?}");
    name
}

/// Field writers shared by several records.
pub(crate) trait RecordExt: Sized {
    /// `signal, pool id, ref count`
    fn event(self, e: EventRef, ref_count: u8) -> Self;
    fn state<S: fmt::Debug>(self, state: S) -> Self;
}

impl RecordExt for RecordBuilder<'_> {
    fn event(self, e: EventRef, ref_count: u8) -> Self {
        self.signal(e.signal()).u8(e.pool_id()).u8(ref_count)
    }

    fn state<S: fmt::Debug>(self, state: S) -> Self {
        self.str(&name_of(state))
    }
}

pub(crate) fn qep_step<S: fmt::Debug>(fw: &Framework, me: u8, step: Step<S>) {
    let record = match step {
        Step::Entry(_) => Record::QepStateEntry,
        Step::Exit(_) => Record::QepStateExit,
        Step::Init { .. } => Record::QepStateInit,
    };
    let Some(rec) = fw.trace(record, me) else {
        return;
    };
    match step {
        Step::Entry(s) | Step::Exit(s) => rec.u8(me).state(s).end(),
        Step::Init { from, to } => rec.u8(me).state(from).state(to).end(),
    }
}

pub(crate) fn qep_init<S: fmt::Debug>(fw: &Framework, me: u8, leaf: S) {
    if let Some(rec) = fw.trace(Record::QepInitTran, me) {
        rec.u8(me).state(leaf).end();
    }
}

pub(crate) fn qep_dispatch<S: fmt::Debug>(fw: &Framework, me: u8, signal: Signal, state: S) {
    if let Some(rec) = fw.trace(Record::QepDispatch, me) {
        rec.u8(me).signal(signal).state(state).end();
    }
}

pub(crate) fn qep_result<S: fmt::Debug>(
    fw: &Framework,
    me: u8,
    signal: Signal,
    result: Dispatched<S>,
) {
    match result {
        Dispatched::Handled { by } => {
            if let Some(rec) = fw.trace(Record::QepInternTran, me) {
                rec.u8(me).signal(signal).state(by).end();
            }
        }
        Dispatched::Ignored => {
            if let Some(rec) = fw.trace(Record::QepUnhandled, me) {
                rec.u8(me).signal(signal).end();
            }
        }
        Dispatched::Transitioned { source, target } => {
            if let Some(rec) = fw.trace(Record::QepTran, me) {
                rec.u8(me).signal(signal).state(source).state(target).end();
            }
        }
    }
}
