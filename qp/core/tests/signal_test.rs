//! Signal tests for qp-core

use qp_core::{Signal, TickRate, MAX_TICK_RATE};

#[test]
fn test_signal_creation() {
    let sig1 = Signal::new(1);
    let sig2 = Signal::new(2);
    assert_ne!(sig1, sig2);
    assert_eq!(Signal::from(7u16).raw(), 7);
}

#[test]
fn test_signal_display() {
    assert_eq!(Signal::ENTRY.to_string(), "ENTRY");
    assert_eq!(Signal(0x10).to_string(), "SIG(0x0010)");
}

#[test]
fn test_tick_rate_range() {
    assert!(TickRate::new(0).is_ok());
    assert!(TickRate::new(MAX_TICK_RATE as u8).is_err());
}
