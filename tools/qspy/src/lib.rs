//! Host-side decoding of QS software traces.
//!
//! [`HdlcDecoder`] deframes the byte stream a target sends,
//! [`FrameInterpreter`] turns frames into readable [`Line`]s using the
//! dictionaries the target reports, and [`RecordFormatter`] renders them as
//! colored text or JSON.

mod decoder;
mod formatter;
mod interpreter;

pub use decoder::{DecodeError, HdlcDecoder, QsFrame};
pub use formatter::RecordFormatter;
pub use interpreter::{FrameInterpreter, Group, Line};

#[cfg(test)]
mod tests;
