//! QS record identifiers and filter groups

/// Predefined record identifiers understood by `qspy`.
///
/// Ids below [`Record::User`] are reserved for the framework; applications
/// number their own records from `Record::User as u8` upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Record {
    Empty = 0,

    // state machine
    QepStateEntry = 1,
    QepStateExit = 2,
    QepStateInit = 3,
    QepInitTran = 4,
    QepInternTran = 5,
    QepTran = 6,
    QepIgnored = 7,
    QepDispatch = 8,
    QepUnhandled = 9,

    // active objects
    ActiveDefer = 10,
    ActiveRecall = 11,
    ActiveSubscribe = 12,
    ActiveUnsubscribe = 13,
    ActivePost = 14,
    ActivePostLifo = 15,
    ActiveGet = 16,
    ActiveGetLast = 17,
    ActiveRecallAttempt = 18,

    // framework and pools
    NewAttempt = 23,
    MpoolGet = 24,
    MpoolPut = 25,
    Publish = 26,
    NewRef = 27,
    New = 28,
    GcAttempt = 29,
    Gc = 30,
    Tick = 31,

    // time events
    TimeEvtArm = 32,
    TimeEvtAutoDisarm = 33,
    TimeEvtDisarmAttempt = 34,
    TimeEvtDisarm = 35,
    TimeEvtRearm = 36,
    TimeEvtPost = 37,

    DeleteRef = 38,
    IsrEntry = 41,
    IsrExit = 42,
    ActivePostAttempt = 45,
    MpoolGetAttempt = 47,

    // scheduler
    SchedPreempt = 48,
    SchedRestore = 49,
    SchedLock = 50,
    SchedUnlock = 51,
    SchedNext = 52,
    SchedIdle = 53,

    // dictionaries and session records
    SigDict = 60,
    ObjDict = 61,
    FunDict = 62,
    UsrDict = 63,
    TargetInfo = 64,
    TargetDone = 65,
    AssertFail = 69,
    QfRun = 70,

    // blocking primitives of extended threads
    SemTake = 71,
    SemBlock = 72,
    SemSignal = 73,
    SemBlockAttempt = 74,
    MtxLock = 75,
    MtxBlock = 76,
    MtxUnlock = 77,
    MtxLockAttempt = 78,
    MtxBlockAttempt = 79,
    MtxUnlockAttempt = 80,

    ActiveDeferAttempt = 81,

    User = 100,
}

impl Record {
    const ALL: [Record; 65] = [
        Record::Empty,
        Record::QepStateEntry,
        Record::QepStateExit,
        Record::QepStateInit,
        Record::QepInitTran,
        Record::QepInternTran,
        Record::QepTran,
        Record::QepIgnored,
        Record::QepDispatch,
        Record::QepUnhandled,
        Record::ActiveDefer,
        Record::ActiveRecall,
        Record::ActiveSubscribe,
        Record::ActiveUnsubscribe,
        Record::ActivePost,
        Record::ActivePostLifo,
        Record::ActiveGet,
        Record::ActiveGetLast,
        Record::ActiveRecallAttempt,
        Record::NewAttempt,
        Record::MpoolGet,
        Record::MpoolPut,
        Record::Publish,
        Record::NewRef,
        Record::New,
        Record::GcAttempt,
        Record::Gc,
        Record::Tick,
        Record::TimeEvtArm,
        Record::TimeEvtAutoDisarm,
        Record::TimeEvtDisarmAttempt,
        Record::TimeEvtDisarm,
        Record::TimeEvtRearm,
        Record::TimeEvtPost,
        Record::DeleteRef,
        Record::IsrEntry,
        Record::IsrExit,
        Record::ActivePostAttempt,
        Record::MpoolGetAttempt,
        Record::SchedPreempt,
        Record::SchedRestore,
        Record::SchedLock,
        Record::SchedUnlock,
        Record::SchedNext,
        Record::SchedIdle,
        Record::SigDict,
        Record::ObjDict,
        Record::FunDict,
        Record::UsrDict,
        Record::TargetInfo,
        Record::TargetDone,
        Record::AssertFail,
        Record::QfRun,
        Record::SemTake,
        Record::SemBlock,
        Record::SemSignal,
        Record::SemBlockAttempt,
        Record::MtxLock,
        Record::MtxBlock,
        Record::MtxUnlock,
        Record::MtxLockAttempt,
        Record::MtxBlockAttempt,
        Record::MtxUnlockAttempt,
        Record::ActiveDeferAttempt,
        Record::User,
    ];

    /// Looks up a predefined record. User ids (`>= 100`) map to `None`.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| *r as u8 == id)
    }

    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Bit of this record in a global filter mask
    pub const fn mask(self) -> u128 {
        1u128 << (self as u8)
    }

    /// Name used by QSPY
    pub const fn name(self) -> &'static str {
        match self {
            Self::Empty => "QS_EMPTY",
            Self::QepStateEntry => "QS_QEP_STATE_ENTRY",
            Self::QepStateExit => "QS_QEP_STATE_EXIT",
            Self::QepStateInit => "QS_QEP_STATE_INIT",
            Self::QepInitTran => "QS_QEP_INIT_TRAN",
            Self::QepInternTran => "QS_QEP_INTERN_TRAN",
            Self::QepTran => "QS_QEP_TRAN",
            Self::QepIgnored => "QS_QEP_IGNORED",
            Self::QepDispatch => "QS_QEP_DISPATCH",
            Self::QepUnhandled => "QS_QEP_UNHANDLED",
            Self::ActiveDefer => "QS_QF_ACTIVE_DEFER",
            Self::ActiveRecall => "QS_QF_ACTIVE_RECALL",
            Self::ActiveSubscribe => "QS_QF_ACTIVE_SUBSCRIBE",
            Self::ActiveUnsubscribe => "QS_QF_ACTIVE_UNSUBSCRIBE",
            Self::ActivePost => "QS_QF_ACTIVE_POST",
            Self::ActivePostLifo => "QS_QF_ACTIVE_POST_LIFO",
            Self::ActiveGet => "QS_QF_ACTIVE_GET",
            Self::ActiveGetLast => "QS_QF_ACTIVE_GET_LAST",
            Self::ActiveRecallAttempt => "QS_QF_ACTIVE_RECALL_ATTEMPT",
            Self::NewAttempt => "QS_QF_NEW_ATTEMPT",
            Self::MpoolGet => "QS_QF_MPOOL_GET",
            Self::MpoolPut => "QS_QF_MPOOL_PUT",
            Self::Publish => "QS_QF_PUBLISH",
            Self::NewRef => "QS_QF_NEW_REF",
            Self::New => "QS_QF_NEW",
            Self::GcAttempt => "QS_QF_GC_ATTEMPT",
            Self::Gc => "QS_QF_GC",
            Self::Tick => "QS_QF_TICK",
            Self::TimeEvtArm => "QS_QF_TIMEEVT_ARM",
            Self::TimeEvtAutoDisarm => "QS_QF_TIMEEVT_AUTO_DISARM",
            Self::TimeEvtDisarmAttempt => "QS_QF_TIMEEVT_DISARM_ATTEMPT",
            Self::TimeEvtDisarm => "QS_QF_TIMEEVT_DISARM",
            Self::TimeEvtRearm => "QS_QF_TIMEEVT_REARM",
            Self::TimeEvtPost => "QS_QF_TIMEEVT_POST",
            Self::DeleteRef => "QS_QF_DELETE_REF",
            Self::IsrEntry => "QS_QF_ISR_ENTRY",
            Self::IsrExit => "QS_QF_ISR_EXIT",
            Self::ActivePostAttempt => "QS_QF_ACTIVE_POST_ATTEMPT",
            Self::MpoolGetAttempt => "QS_QF_MPOOL_GET_ATTEMPT",
            Self::SchedPreempt => "QS_SCHED_PREEMPT",
            Self::SchedRestore => "QS_SCHED_RESTORE",
            Self::SchedLock => "QS_SCHED_LOCK",
            Self::SchedUnlock => "QS_SCHED_UNLOCK",
            Self::SchedNext => "QS_SCHED_NEXT",
            Self::SchedIdle => "QS_SCHED_IDLE",
            Self::SigDict => "QS_SIG_DICT",
            Self::ObjDict => "QS_OBJ_DICT",
            Self::FunDict => "QS_FUN_DICT",
            Self::UsrDict => "QS_USR_DICT",
            Self::TargetInfo => "QS_TARGET_INFO",
            Self::TargetDone => "QS_TARGET_DONE",
            Self::AssertFail => "QS_ASSERT_FAIL",
            Self::QfRun => "QS_QF_RUN",
            Self::SemTake => "QS_SEM_TAKE",
            Self::SemBlock => "QS_SEM_BLOCK",
            Self::SemSignal => "QS_SEM_SIGNAL",
            Self::SemBlockAttempt => "QS_SEM_BLOCK_ATTEMPT",
            Self::MtxLock => "QS_MTX_LOCK",
            Self::MtxBlock => "QS_MTX_BLOCK",
            Self::MtxUnlock => "QS_MTX_UNLOCK",
            Self::MtxLockAttempt => "QS_MTX_LOCK_ATTEMPT",
            Self::MtxBlockAttempt => "QS_MTX_BLOCK_ATTEMPT",
            Self::MtxUnlockAttempt => "QS_MTX_UNLOCK_ATTEMPT",
            Self::ActiveDeferAttempt => "QS_QF_ACTIVE_DEFER_ATTEMPT",
            Self::User => "QS_USER",
        }
    }

    /// Session records pass regardless of the filters.
    pub const fn is_non_maskable(self) -> bool {
        matches!(
            self,
            Self::Empty
                | Self::SigDict
                | Self::ObjDict
                | Self::FunDict
                | Self::UsrDict
                | Self::TargetInfo
                | Self::TargetDone
                | Self::AssertFail
                | Self::QfRun
        )
    }
}

impl From<Record> for u8 {
    fn from(r: Record) -> u8 {
        r as u8
    }
}

/// Whether frames with this id carry a timestamp after the record id.
///
/// Dictionaries and session records are untimed; everything else,
/// user records included, is stamped.
pub fn has_timestamp(id: u8) -> bool {
    !matches!(
        Record::from_id(id),
        Some(
            Record::Empty
                | Record::SigDict
                | Record::ObjDict
                | Record::FunDict
                | Record::UsrDict
                | Record::TargetInfo
                | Record::TargetDone
                | Record::QfRun
        )
    )
}

const fn span(first: u8, last: u8) -> u128 {
    let width = (last - first + 1) as u32;
    if width >= 128 {
        u128::MAX
    } else {
        ((1u128 << width) - 1) << first
    }
}

/// Global filter groups
pub mod filters {
    use super::span;

    pub const ALL: u128 = u128::MAX;
    /// State machine records
    pub const SM: u128 = span(1, 9);
    /// Active object records
    pub const AO: u128 = span(10, 18) | 1u128 << 45 | 1u128 << 81;
    /// Event pool records
    pub const MP: u128 = span(23, 25) | 1u128 << 47;
    /// Framework records (publish, new, gc, tick)
    pub const QF: u128 = span(26, 31) | 1u128 << 38;
    /// Time event records
    pub const TE: u128 = span(32, 37);
    /// Interrupt entry/exit
    pub const ISR: u128 = span(41, 42);
    /// Scheduler records
    pub const SC: u128 = span(48, 53);
    /// Semaphores
    pub const SEM: u128 = span(71, 74);
    /// Mutexes
    pub const MTX: u128 = span(75, 80);
    /// All application records
    pub const USER: u128 = span(100, 127);
}

/// Local filter helpers; the QS-id of an active object is its priority.
pub mod qs_ids {
    use super::span;

    /// Ids `1..=64` belong to active objects and threads
    pub const AO: u128 = span(1, 64);
    /// Ids `65..=80` belong to event pools
    pub const EP: u128 = span(65, 80);
    /// Ids `97..=127` are free for the application
    pub const AP: u128 = span(97, 127);

    /// QS-id of event pool `pool_id` (1-based)
    pub const fn pool(pool_id: u8) -> u8 {
        64 + pool_id
    }
}
