//! Log sink construction.
//!
//! The sink is a [`Dispatch`] handed to the service future rather than a
//! process-wide default subscriber.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing::{Dispatch, Level, Metadata};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

const SYSLOG_SOCKET: &str = "/dev/log";

/// `LOG_DAEMON` facility code.
const FACILITY_DAEMON: u8 = 3;

const VERBOSE_DIRECTIVES: &str =
    "info,orkd=debug,ork_core=debug,ork_queue=debug,ork_keys=debug,ork_backup=debug,ork_poller=debug";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    Syslog,
}

/// Build the sink for `target`. `RUST_LOG` overrides the level.
pub fn build(target: &LogTarget, verbose: bool) -> anyhow::Result<Dispatch> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_DIRECTIVES } else { "info" }));

    let dispatch = match target {
        LogTarget::Stderr => Dispatch::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .finish(),
        ),
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Dispatch::new(
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .finish(),
            )
        }
        LogTarget::Syslog => {
            let syslog = Syslog::connect(Path::new(SYSLOG_SOCKET))
                .with_context(|| format!("connect to syslog at {SYSLOG_SOCKET}"))?;
            Dispatch::new(
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .without_time()
                    .with_target(false)
                    .with_writer(syslog)
                    .finish(),
            )
        }
    };

    Ok(dispatch)
}

/// Datagram writer to the local syslog socket.
///
/// The fmt layer writes each formatted event in one call, so every write
/// becomes one syslog packet.
#[derive(Debug)]
pub struct Syslog {
    socket: UnixDatagram,
}

impl Syslog {
    pub fn connect(path: &Path) -> io::Result<Self> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Self { socket })
    }
}

pub struct SyslogLine<'a> {
    syslog: &'a Syslog,
    severity: u8,
}

impl<'a> MakeWriter<'a> for Syslog {
    type Writer = SyslogLine<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogLine {
            syslog: self,
            severity: severity(&Level::INFO),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogLine {
            syslog: self,
            severity: severity(meta.level()),
        }
    }
}

impl Write for SyslogLine<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        // The pid is read per packet; the socket is opened before forking.
        let packet = format!(
            "<{}>orkd[{}]: {}",
            FACILITY_DAEMON * 8 + self.severity,
            std::process::id(),
            line.trim_end()
        );
        self.syslog.socket.send(packet.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn severity(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        _ => 7,
    }
}
