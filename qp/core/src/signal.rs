//! Signal identifiers for the QP framework

use core::fmt;

/// Type-safe event signal identifier.
///
/// The first four values are reserved for the state-machine processor; user
/// signals start at [`Signal::USER`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(pub u16);

impl Signal {
    /// Empty signal, also used for time events that wake a blocked thread
    pub const EMPTY: Signal = Signal(0);
    /// Reserved signal for state entry actions
    pub const ENTRY: Signal = Signal(1);
    /// Reserved signal for state exit actions
    pub const EXIT: Signal = Signal(2);
    /// Reserved signal for initial transitions
    pub const INIT: Signal = Signal(3);

    /// First user-defined signal
    pub const USER: Signal = Signal(4);

    /// Create a new signal from a raw value
    pub const fn new(signal: u16) -> Self {
        Signal(signal)
    }

    /// Get the raw signal value
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// True for the signals the framework keeps for itself
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::USER.0
    }
}

impl From<u16> for Signal {
    #[inline]
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Signal::EMPTY => f.write_str("EMPTY"),
            Signal::ENTRY => f.write_str("ENTRY"),
            Signal::EXIT => f.write_str("EXIT"),
            Signal::INIT => f.write_str("INIT"),
            Signal(raw) => write!(f, "SIG({raw:#06x})"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Signal {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Signal({})", self.0);
    }
}

/// Declares a block of user signals, numbered from [`Signal::USER`].
///
/// ```
/// qp_core::signals! {
///     pub TIMEOUT,
///     pub EAT,
/// }
/// assert_eq!(TIMEOUT, qp_core::Signal::USER);
/// assert_eq!(EAT.raw(), TIMEOUT.raw() + 1);
/// ```
#[macro_export]
macro_rules! signals {
    (@step $n:expr;) => {};
    (@step $n:expr; $vis:vis $name:ident, $($rest:tt)*) => {
        $vis const $name: $crate::Signal = $crate::Signal($crate::Signal::USER.0 + $n);
        $crate::signals!(@step $n + 1; $($rest)*);
    };
    ($($body:tt)*) => {
        $crate::signals!(@step 0; $($body)*);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_signals_sit_below_user() {
        assert!(Signal::EMPTY.is_reserved());
        assert!(Signal::INIT.is_reserved());
        assert!(!Signal::USER.is_reserved());
    }

    signals! {
        FIRST,
        SECOND,
    }

    #[test]
    fn signals_macro_counts_from_user() {
        assert_eq!(FIRST, Signal::USER);
        assert_eq!(SECOND, Signal(Signal::USER.0 + 1));
    }
}
