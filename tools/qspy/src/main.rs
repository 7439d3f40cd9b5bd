use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::net::UdpSocket;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use qspy::{FrameInterpreter, HdlcDecoder, RecordFormatter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Decodes QS software traces")]
struct Opts {
    /// Reads a captured trace instead of listening
    #[arg(long, value_name = "PATH", conflicts_with = "udp_addr")]
    file: Option<PathBuf>,

    #[arg(long = "udp", default_value = "0.0.0.0:7701", value_name = "ADDR")]
    udp_addr: String,

    /// One JSON object per record
    #[arg(long)]
    json: bool,

    #[arg(long)]
    no_timestamps: bool,

    /// Shows only these record groups (sm, ao, mp, qf, te, isr, sc, sem, mtx, info, user)
    #[arg(long = "filter", value_delimiter = ',')]
    filters: Vec<String>,

    /// Names a signal up front, as `NUMBER=NAME`
    #[arg(long = "sig", value_name = "NUMBER=NAME")]
    signals: Vec<String>,

    /// Names an object (a priority) up front, as `NUMBER=NAME`
    #[arg(long = "obj", value_name = "NUMBER=NAME")]
    objects: Vec<String>,
}

struct Session {
    decoder: HdlcDecoder,
    interpreter: FrameInterpreter,
    formatter: RecordFormatter,
    out: BufWriter<io::Stdout>,
}

impl Session {
    fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        for frame in self.decoder.push_bytes(bytes) {
            match frame {
                Ok(frame) => {
                    let line = self.interpreter.interpret(&frame);
                    if let Some(text) = self.formatter.format(&line) {
                        writeln!(self.out, "{text}")?;
                    }
                }
                Err(err) => eprintln!("decoder error: {err}"),
            }
        }
        Ok(())
    }
}

fn parse_name(arg: &str) -> Result<(u64, &str)> {
    let Some((num, name)) = arg.split_once('=') else {
        bail!("expected NUMBER=NAME, got `{arg}`");
    };
    let num = match num.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => num.parse(),
    }
    .with_context(|| format!("bad number in `{arg}`"))?;
    Ok((num, name))
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let mut interpreter = FrameInterpreter::new();
    for arg in &opts.signals {
        let (sig, name) = parse_name(arg)?;
        let sig = u16::try_from(sig).with_context(|| format!("signal out of range in `{arg}`"))?;
        interpreter.preload_signal(sig, name);
    }
    for arg in &opts.objects {
        let (obj, name) = parse_name(arg)?;
        interpreter.preload_object(obj, name);
    }

    let mut formatter = RecordFormatter::new(opts.json, !opts.no_timestamps);
    if !opts.filters.is_empty() {
        let unknown = formatter.set_filters(&opts.filters);
        if !unknown.is_empty() {
            bail!("unknown record groups: {}", unknown.join(", "));
        }
    }

    let mut session = Session {
        decoder: HdlcDecoder::new(),
        interpreter,
        formatter,
        out: BufWriter::new(io::stdout()),
    };

    match &opts.file {
        Some(path) => {
            let mut bytes = Vec::new();
            File::open(path)
                .and_then(|mut f| f.read_to_end(&mut bytes))
                .with_context(|| format!("reading {}", path.display()))?;
            session.feed(&bytes)?;
        }
        None => {
            let socket = UdpSocket::bind(&opts.udp_addr)
                .with_context(|| format!("binding udp://{}", opts.udp_addr))?;
            eprintln!("qspy listening on udp://{}", opts.udp_addr);

            let mut buf = [0u8; 4096];
            let mut last_peer = None;
            loop {
                let (len, peer) = match socket.recv_from(&mut buf) {
                    Ok(r) => r,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err).context("receiving from target"),
                };
                if last_peer != Some(peer) {
                    eprintln!("telemetry from {peer}");
                    session.decoder.reset();
                    last_peer = Some(peer);
                }
                session.feed(&buf[..len])?;
                session.out.flush()?;
            }
        }
    }

    session.out.flush()?;
    if session.decoder.lost() > 0 {
        eprintln!("{} records lost", session.decoder.lost());
    }
    Ok(())
}
