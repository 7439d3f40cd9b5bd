//! Host-side output of the trace buffer

use std::io::{self, Write};
use std::net::{ToSocketAddrs, UdpSocket};

use thiserror::Error;

use crate::Tracer;

/// Largest datagram sent to `qspy` in one go
pub const UDP_CHUNK: usize = 1024;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace output failed: {0}")]
    Io(#[from] io::Error),
    #[error("no address resolved for {0}")]
    NoAddress(String),
}

impl Tracer {
    /// Writes every buffered byte to `out` and returns the byte count.
    ///
    /// Blocks are copied out of the buffer first so the tracer is not held
    /// locked across the write.
    pub fn drain_to(&self, out: &mut impl Write) -> Result<usize, TraceError> {
        let mut total = 0;
        loop {
            let block = self.get_block(UDP_CHUNK);
            if block.is_empty() {
                break;
            }
            out.write_all(&block)?;
            total += block.len();
        }
        out.flush()?;
        Ok(total)
    }
}

/// Sends trace blocks to a `qspy` instance listening on UDP.
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    pub fn connect(host: &str, port: u16) -> Result<Self, TraceError> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TraceError::NoAddress(format!("{host}:{port}")))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        log::info!("QS: UDP output to {addr}");
        Ok(Self { socket })
    }

    /// Sends everything buffered in `tracer`, one datagram per block.
    pub fn flush(&self, tracer: &Tracer) -> Result<usize, TraceError> {
        let mut total = 0;
        loop {
            let block = tracer.get_block(UDP_CHUNK);
            if block.is_empty() {
                return Ok(total);
            }
            self.socket.send(&block)?;
            total += block.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{filters, Record};

    #[test]
    fn drain_to_empties_the_buffer() {
        let tracer = Tracer::new(128);
        tracer.global_filter(filters::ALL, true);
        tracer.begin(Record::User, 0).map(|r| r.str("x").end());
        let mut out = Vec::new();
        let n = tracer.drain_to(&mut out).expect("write to vec");
        assert_eq!(n, out.len());
        assert_eq!(tracer.used(), 0);
    }

    #[test]
    fn udp_sink_delivers_frames() {
        let listener = UdpSocket::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("addr").port();
        let sink = UdpSink::connect("127.0.0.1", port).expect("connect");

        let tracer = Tracer::new(128);
        tracer.obj_dict(0x10, "ao");
        let sent = sink.flush(&tracer).expect("send");

        let mut buf = [0u8; 256];
        let n = listener.recv(&mut buf).expect("recv");
        assert_eq!(n, sent);
        assert_eq!(buf[n - 1], crate::hdlc::FLAG);
    }
}
