//! Dictionary and target-information records
//!
//! `qspy` learns symbolic names and the target's sizing from these records,
//! usually sent once right after start-up.

use qp_core::Signal;

use crate::types::Record;
use crate::Tracer;

/// Payload of the `QS_TARGET_INFO` record.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub is_reset: u8,
    pub version: u16,
    pub signal_size: u8,
    pub event_size: u8,
    pub equeue_ctr_size: u8,
    pub time_evt_ctr_size: u8,
    pub mpool_size_size: u8,
    pub mpool_ctr_size: u8,
    pub obj_ptr_size: u8,
    pub fun_ptr_size: u8,
    pub time_size: u8,
    pub max_active: u8,
    pub max_event_pools: u8,
    pub max_tick_rate: u8,
}

impl Default for TargetInfo {
    fn default() -> Self {
        Self {
            is_reset: 0xFF,
            version: 800,
            signal_size: 2,
            event_size: 2,
            equeue_ctr_size: 2,
            time_evt_ctr_size: 4,
            mpool_size_size: 2,
            mpool_ctr_size: 2,
            obj_ptr_size: 8,
            fun_ptr_size: 8,
            time_size: 4,
            max_active: qp_core::MAX_ACTIVE as u8,
            max_event_pools: 3,
            max_tick_rate: qp_core::MAX_TICK_RATE as u8,
        }
    }
}

impl Tracer {
    /// Names a signal, optionally scoped to one object (`obj == 0` is global).
    pub fn sig_dict(&self, sig: Signal, obj: u64, name: &str) {
        if let Some(rec) = self.begin(Record::SigDict, 0) {
            rec.signal(sig).obj(obj).str(name).end();
        }
    }

    pub fn obj_dict(&self, obj: u64, name: &str) {
        if let Some(rec) = self.begin(Record::ObjDict, 0) {
            rec.obj(obj).str(name).end();
        }
    }

    pub fn fun_dict(&self, fun: u64, name: &str) {
        if let Some(rec) = self.begin(Record::FunDict, 0) {
            rec.obj(fun).str(name).end();
        }
    }

    /// Names an application record id.
    pub fn usr_dict(&self, record: u8, name: &str) {
        if let Some(rec) = self.begin(Record::UsrDict, 0) {
            rec.u8(record).str(name).end();
        }
    }

    pub fn target_info(&self, info: &TargetInfo) {
        if let Some(rec) = self.begin(Record::TargetInfo, 0) {
            rec.u8(info.is_reset)
                .u16(info.version)
                .u8(info.signal_size | (info.event_size << 4))
                .u8(info.equeue_ctr_size | (info.time_evt_ctr_size << 4))
                .u8(info.mpool_size_size | (info.mpool_ctr_size << 4))
                .u8(info.obj_ptr_size | (info.fun_ptr_size << 4))
                .u8(info.time_size)
                .u8(info.max_active)
                .u8(info.max_event_pools | (info.max_tick_rate << 4))
                .end();
        }
    }
}
