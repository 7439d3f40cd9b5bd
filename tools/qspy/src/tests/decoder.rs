use qp_core::Signal;
use qp_qs::{filters, Record, Tracer};

use crate::{DecodeError, HdlcDecoder, QsFrame};

fn traced(f: impl FnOnce(&Tracer)) -> Vec<u8> {
    let tracer = Tracer::new(1024).with_clock(|| 0x0102_0304);
    tracer.global_filter(filters::ALL, true);
    f(&tracer);
    tracer.get_block(usize::MAX)
}

fn decode_all(bytes: &[u8]) -> Vec<QsFrame> {
    HdlcDecoder::new()
        .push_bytes(bytes)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn decoder_roundtrip() {
    let bytes = traced(|t| {
        if let Some(rec) = t.begin(Record::User, 0) {
            rec.u8(0xDE).u8(0xAD).u8(0xBE).u8(0xEF).end();
        }
    });

    let frames = decode_all(&bytes);
    assert_eq!(
        frames,
        vec![QsFrame {
            seq: 0,
            record: Record::User.id(),
            timestamp: Some(0x0102_0304),
            payload: vec![0xDE, 0xAD, 0xBE, 0xEF],
        }]
    );
}

#[test]
fn dictionaries_carry_no_timestamp() {
    let bytes = traced(|t| t.obj_dict(3, "table"));

    let frames = decode_all(&bytes);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].record, Record::ObjDict.id());
    assert_eq!(frames[0].timestamp, None);
    assert_eq!(&frames[0].payload[..8], &3u64.to_le_bytes());
}

#[test]
fn escaped_bytes_survive_the_trip() {
    // 0x7E and 0x7D in the payload get stuffed on the wire
    let bytes = traced(|t| {
        if let Some(rec) = t.begin(Record::User, 0) {
            rec.u8(0x7E).u8(0x7D).u16(0x7E7D).end();
        }
    });

    let frames = decode_all(&bytes);
    assert_eq!(frames[0].payload, vec![0x7E, 0x7D, 0x7D, 0x7E]);
}

#[test]
fn frames_split_across_chunks() {
    let bytes = traced(|t| {
        t.sig_dict(Signal(4), 0, "EAT");
        t.sig_dict(Signal(5), 0, "DONE");
    });

    let mut decoder = HdlcDecoder::new();
    let (head, tail) = bytes.split_at(bytes.len() / 2 + 1);
    let mut frames = decoder.push_bytes(head);
    frames.extend(decoder.push_bytes(tail));

    let seqs: Vec<u8> = frames.into_iter().map(|f| f.unwrap().seq).collect();
    assert_eq!(seqs, vec![0, 1]);
    assert_eq!(decoder.lost(), 0);
}

#[test]
fn detects_bad_checksum() {
    let mut decoder = HdlcDecoder::new();
    let frames = decoder.push_bytes(&[0x01, Record::ObjDict.id(), 0x00, 0x7E]);
    assert!(matches!(
        frames.as_slice(),
        [Err(DecodeError::InvalidChecksum { .. })]
    ));
}

#[test]
fn rejects_runt_frames() {
    let mut decoder = HdlcDecoder::new();
    let frames = decoder.push_bytes(&[0x01, 0x7E]);
    assert_eq!(frames, vec![Err(DecodeError::FrameTooShort(1))]);
}

#[test]
fn timed_record_without_timestamp_is_an_error() {
    // seq 0, QS_QF_TICK, checksum, no timestamp bytes
    let id = Record::Tick.id();
    let checksum = !id;
    let frames = HdlcDecoder::new().push_bytes(&[0x00, id, checksum, 0x7E]);
    assert_eq!(frames, vec![Err(DecodeError::MissingTimestamp { record: id })]);
}

#[test]
fn gaps_in_the_sequence_count_as_lost() {
    let bytes = traced(|t| {
        for obj in 0..4 {
            t.obj_dict(obj, "x");
        }
    });
    let frames: Vec<&[u8]> = bytes.split_inclusive(|&b| b == 0x7E).collect();
    assert_eq!(frames.len(), 4);

    let mut decoder = HdlcDecoder::new();
    decoder.push_bytes(frames[0]);
    decoder.push_bytes(frames[3]);
    assert_eq!(decoder.lost(), 2);
}

#[test]
fn corrupt_frame_does_not_poison_the_next_one() {
    let good = traced(|t| t.obj_dict(1, "a"));
    let mut stream = vec![0x05, 0x10, 0x00, 0x7E];
    stream.extend_from_slice(&good);

    let frames = HdlcDecoder::new().push_bytes(&stream);
    assert_eq!(frames.len(), 2);
    assert!(frames[0].is_err());
    assert_eq!(frames[1].as_ref().map(|f| f.record), Ok(Record::ObjDict.id()));
}
