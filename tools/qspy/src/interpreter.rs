use std::collections::HashMap;

use qp_qs::{filters, Record};
use serde::Serialize;

use crate::QsFrame;

/// Record family, used for coloring and filtering output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Sm,
    Ao,
    Pool,
    Qf,
    Te,
    Isr,
    Sched,
    Sem,
    Mtx,
    Info,
    User,
}

impl Group {
    pub fn of(record: u8) -> Self {
        let bit = |mask: u128| record < 128 && mask & (1u128 << record) != 0;
        if bit(filters::SM) {
            Self::Sm
        } else if bit(filters::AO) {
            Self::Ao
        } else if bit(filters::MP) {
            Self::Pool
        } else if bit(filters::QF) {
            Self::Qf
        } else if bit(filters::TE) {
            Self::Te
        } else if bit(filters::ISR) {
            Self::Isr
        } else if bit(filters::SC) {
            Self::Sched
        } else if bit(filters::SEM) {
            Self::Sem
        } else if bit(filters::MTX) {
            Self::Mtx
        } else if record >= Record::User.id() {
            Self::User
        } else {
            Self::Info
        }
    }

    /// Parses the short group names accepted on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "sm" => Self::Sm,
            "ao" => Self::Ao,
            "mp" | "pool" => Self::Pool,
            "qf" => Self::Qf,
            "te" => Self::Te,
            "isr" => Self::Isr,
            "sc" | "sched" => Self::Sched,
            "sem" => Self::Sem,
            "mtx" => Self::Mtx,
            "info" | "dict" => Self::Info,
            "user" | "u" => Self::User,
            _ => return None,
        })
    }
}

/// One interpreted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub seq: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u32>,
    pub record: String,
    pub group: Group,
    pub text: String,
}

#[derive(Debug, Default)]
struct Dictionaries {
    signals: HashMap<(u16, u64), String>,
    objects: HashMap<u64, String>,
    functions: HashMap<u64, String>,
    users: HashMap<u8, String>,
}

/// Turns frames into [`Line`]s, learning names from dictionary records as
/// they arrive.
#[derive(Debug, Default)]
pub struct FrameInterpreter {
    dict: Dictionaries,
}

impl FrameInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names `signal` ahead of any dictionary record from the target.
    pub fn preload_signal(&mut self, signal: u16, name: &str) {
        self.dict.signals.insert((signal, 0), name.to_owned());
    }

    pub fn preload_object(&mut self, obj: u64, name: &str) {
        self.dict.objects.insert(obj, name.to_owned());
    }

    pub fn interpret(&mut self, frame: &QsFrame) -> Line {
        let record = Record::from_id(frame.record);
        let name = match (record, self.dict.users.get(&frame.record)) {
            (_, Some(user)) => user.clone(),
            (Some(r), None) => r.name().to_owned(),
            (None, None) if frame.record > Record::User.id() => {
                format!("QS_USER_{:02}", frame.record - Record::User.id())
            }
            (None, None) => format!("QS_RESERVED_{}", frame.record),
        };

        let mut cur = Cursor::new(&frame.payload);
        let text = match record {
            Some(r) => self.describe(r, &mut cur),
            None => Some(hex_bytes(&frame.payload)),
        };
        let text = text.unwrap_or_else(|| format!("<malformed> {}", hex_bytes(&frame.payload)));

        Line {
            seq: frame.seq,
            timestamp: frame.timestamp,
            record: name,
            group: Group::of(frame.record),
            text,
        }
    }

    fn describe(&mut self, record: Record, cur: &mut Cursor<'_>) -> Option<String> {
        use Record::*;

        Some(match record {
            SigDict => {
                let (sig, obj, name) = (cur.u16()?, cur.u64()?, cur.str()?);
                let line = format!("Sig-Dict {sig:08X},Obj={obj:#x}->{name}");
                self.dict.signals.insert((sig, obj), name);
                line
            }
            ObjDict => {
                let (obj, name) = (cur.u64()?, cur.str()?);
                let line = format!("Obj-Dict {obj:#x}->{name}");
                self.dict.objects.insert(obj, name);
                line
            }
            FunDict => {
                let (fun, name) = (cur.u64()?, cur.str()?);
                let line = format!("Fun-Dict {fun:#x}->{name}");
                self.dict.functions.insert(fun, name);
                line
            }
            UsrDict => {
                let (id, name) = (cur.u8()?, cur.str()?);
                let line = format!("Usr-Dict {id:08}->{name}");
                self.dict.users.insert(id, name);
                line
            }
            TargetInfo => {
                let reset = cur.u8()?;
                let version = cur.u16()?;
                cur.skip(4)?;
                let (time_size, max_active, packed) = (cur.u8()?, cur.u8()?, cur.u8()?);
                format!(
                    "Trg-Info reset={} QP={}.{}.{} timestamp={}B max_active={} pools={} rates={}",
                    reset == 0xFF,
                    version / 100,
                    (version / 10) % 10,
                    version % 10,
                    time_size,
                    max_active,
                    packed & 0x0F,
                    packed >> 4
                )
            }
            TargetDone => "Trg-Done".to_owned(),
            QfRun => "QF_RUN".to_owned(),
            Empty => String::new(),

            QepStateEntry | QepStateExit => {
                let (me, state) = (cur.u8()?, cur.str()?);
                format!("Obj={} State={state}", self.obj(me))
            }
            QepStateInit => {
                let (me, from, to) = (cur.u8()?, cur.str()?, cur.str()?);
                format!("Obj={} Source={from}->Target={to}", self.obj(me))
            }
            QepInitTran => {
                let (me, leaf) = (cur.u8()?, cur.str()?);
                format!("Obj={} New={leaf}", self.obj(me))
            }
            QepDispatch | QepInternTran | QepIgnored => {
                let (me, sig, state) = (cur.u8()?, cur.u16()?, cur.str()?);
                format!("Obj={} Sig={} State={state}", self.obj(me), self.sig(sig, me))
            }
            QepUnhandled => {
                let (me, sig) = (cur.u8()?, cur.u16()?);
                format!("Obj={} Sig={}", self.obj(me), self.sig(sig, me))
            }
            QepTran => {
                let (me, sig, src, tgt) = (cur.u8()?, cur.u16()?, cur.str()?, cur.str()?);
                format!(
                    "Obj={} Sig={} Source={src}->Target={tgt}",
                    self.obj(me),
                    self.sig(sig, me)
                )
            }

            ActivePost | ActivePostLifo => {
                let (target, sig, pool, refs) = (cur.u8()?, cur.u16()?, cur.u8()?, cur.u8()?);
                let (free, min) = (cur.u16()?, cur.u16()?);
                format!(
                    "Obj={} Evt<Sig={},Pool={pool},Ref={refs}> Queue<Free={free},Min={min}>",
                    self.obj(target),
                    self.sig(sig, target)
                )
            }
            ActivePostAttempt => {
                let (target, sig, pool, refs) = (cur.u8()?, cur.u16()?, cur.u8()?, cur.u8()?);
                let (free, margin) = (cur.u16()?, cur.u16()?);
                format!(
                    "Obj={} Evt<Sig={},Pool={pool},Ref={refs}> Queue<Free={free},Margin={margin}>",
                    self.obj(target),
                    self.sig(sig, target)
                )
            }
            ActiveGet | ActiveGetLast => {
                let (me, sig, pool, refs) = (cur.u8()?, cur.u16()?, cur.u8()?, cur.u8()?);
                let free = cur.u16()?;
                format!(
                    "Obj={} Evt<Sig={},Pool={pool},Ref={refs}> Queue<Free={free}>",
                    self.obj(me),
                    self.sig(sig, me)
                )
            }
            ActiveSubscribe | ActiveUnsubscribe => {
                let (me, sig) = (cur.u8()?, cur.u16()?);
                format!("Obj={} Sig={}", self.obj(me), self.sig(sig, me))
            }
            ActiveDefer | ActiveDeferAttempt | ActiveRecall => {
                let (me, sig, pool, refs) = (cur.u8()?, cur.u16()?, cur.u8()?, cur.u8()?);
                format!(
                    "Obj={} Evt<Sig={},Pool={pool},Ref={refs}>",
                    self.obj(me),
                    self.sig(sig, me)
                )
            }
            ActiveRecallAttempt => format!("Obj={}", self.obj(cur.u8()?)),

            New => {
                let (sig, len) = (cur.u16()?, cur.u16()?);
                format!("Sig={} Len={len}", self.sig(sig, 0))
            }
            NewAttempt => {
                let (sig, len, margin) = (cur.u16()?, cur.u16()?, cur.u16()?);
                format!("Sig={} Len={len} Margin={margin}", self.sig(sig, 0))
            }
            MpoolGet | MpoolGetAttempt => {
                let (pool, free, min) = (cur.u8()?, cur.u16()?, cur.u16()?);
                format!("Pool={pool} Free={free} Min={min}")
            }
            MpoolPut => {
                let (pool, free) = (cur.u8()?, cur.u16()?);
                format!("Pool={pool} Free={free}")
            }
            Publish | NewRef | DeleteRef | Gc | GcAttempt => {
                let (sig, pool, refs) = (cur.u16()?, cur.u8()?, cur.u8()?);
                format!("Evt<Sig={},Pool={pool},Ref={refs}>", self.sig(sig, 0))
            }
            Tick => {
                let (ctr, rate) = (cur.u32()?, cur.u8()?);
                format!("Ctr={ctr} Rate={rate}")
            }

            TimeEvtArm | TimeEvtDisarm => {
                let (id, target) = (cur.u16()?, cur.u8()?);
                let (ctr, interval, rate) = (cur.u32()?, cur.u32()?, cur.u8()?);
                format!(
                    "TimeEvt({id}) Obj={} Ctr={ctr} Interval={interval} Rate={rate}",
                    self.obj(target)
                )
            }
            TimeEvtRearm => {
                let (id, target) = (cur.u16()?, cur.u8()?);
                let (ctr, interval, rate, was) = (cur.u32()?, cur.u32()?, cur.u8()?, cur.u8()?);
                format!(
                    "TimeEvt({id}) Obj={} Ctr={ctr} Interval={interval} Rate={rate} WasArmed={}",
                    self.obj(target),
                    was != 0
                )
            }
            TimeEvtDisarmAttempt | TimeEvtAutoDisarm => {
                let (id, target, rate) = (cur.u16()?, cur.u8()?, cur.u8()?);
                format!("TimeEvt({id}) Obj={} Rate={rate}", self.obj(target))
            }
            TimeEvtPost => {
                let (id, sig, target, rate) = (cur.u16()?, cur.u16()?, cur.u8()?, cur.u8()?);
                format!(
                    "TimeEvt({id}) Sig={} Obj={} Rate={rate}",
                    self.sig(sig, target),
                    self.obj(target)
                )
            }

            IsrEntry | IsrExit => {
                let (nest, active) = (cur.u8()?, cur.u8()?);
                format!("Nest={nest} Active={active}")
            }
            SchedLock => {
                let (prev, ceiling) = (cur.u8()?, cur.u8()?);
                format!("Ceil={prev}->{ceiling}")
            }
            SchedUnlock => {
                let (ceiling, prev) = (cur.u8()?, cur.u8()?);
                format!("Ceil={ceiling}->{prev}")
            }
            SchedNext | SchedPreempt => {
                let (next, prev) = (cur.u8()?, cur.u8()?);
                format!("Prio={prev}->{next} Obj={}", self.obj(next))
            }
            SchedRestore => {
                let (prio, last) = (cur.u8()?, cur.u8()?);
                format!("Prio={last}->{prio}")
            }
            SchedIdle => format!("Prio={}->0", cur.u8()?),

            SemTake | SemBlock | SemSignal | SemBlockAttempt => {
                let (me, count) = (cur.u8()?, cur.u16()?);
                format!("Obj={} Count={count}", self.obj(me))
            }
            MtxLock | MtxUnlock => {
                let (me, nesting) = (cur.u8()?, cur.u8()?);
                format!("Obj={} Nesting={nesting}", self.obj(me))
            }
            MtxBlock | MtxBlockAttempt => {
                let (me, owner) = (cur.u8()?, cur.u8()?);
                format!("Obj={} Owner={}", self.obj(me), self.obj(owner))
            }
            MtxLockAttempt | MtxUnlockAttempt => format!("Obj={}", self.obj(cur.u8()?)),

            AssertFail | User => hex_bytes(cur.rest()),
        })
    }

    fn obj(&self, obj: u8) -> String {
        match self.dict.objects.get(&(obj as u64)) {
            Some(name) => name.clone(),
            None => obj.to_string(),
        }
    }

    fn sig(&self, sig: u16, obj: u8) -> String {
        self.dict
            .signals
            .get(&(sig, obj as u64))
            .or_else(|| self.dict.signals.get(&(sig, 0)))
            .cloned()
            .unwrap_or_else(|| sig.to_string())
    }
}

struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let (head, rest) = self.data.split_first_chunk::<N>()?;
        self.data = rest;
        Some(*head)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.data = self.data.get(n..)?;
        Some(())
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn str(&mut self) -> Option<String> {
        let end = self.data.iter().position(|&b| b == 0)?;
        let s = String::from_utf8_lossy(&self.data[..end]).into_owned();
        self.data = &self.data[end + 1..];
        Some(s)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
