//! Transport (spec.md §4.1): one full-duplex byte channel per session, over
//! TCP, a filesystem path, or the stdio of a spawned shell command.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};

use nix::sys::signal::{signal, SigHandler, Signal};

/// A full-duplex byte channel. The three concrete transports below all
/// implement this; `Session`/`Framer` only ever depend on the trait, so
/// tests substitute an in-memory pipe.
pub trait Channel: Read + Write {}
impl<T: Read + Write> Channel for T {}

pub enum Transport {
    Tcp(TcpStream),
    Path(std::fs::File),
    Command { child: Child },
}

impl Transport {
    /// Open a TCP connection to `host:port`. IPv4 only (spec.md Non-goals:
    /// no IPv6). Connect failures are transport faults (spec.md §7 kind 2):
    /// fatal at the point of detection, not a `Result` the caller recovers
    /// from.
    pub fn open_tcp(host: &str, port: u16) -> Transport {
        let stream = match TcpStream::connect((host, port)) {
            Ok(s) => s,
            Err(e) => fatal!("could not connect to {}:{}: {}", host, port, e),
        };
        let t = Transport::Tcp(stream);
        t.prime();
        t
    }

    /// Open a filesystem path (serial device or FIFO) for read/write.
    pub fn open_path(path: &str) -> Transport {
        let file = match std::fs::OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) => fatal!("could not open {}: {}", path, e),
        };
        let t = Transport::Path(file);
        t.prime();
        t
    }

    /// Spawn `/bin/sh -c <shell_cmd>` with its stdin/stdout as the channel.
    /// Installs SIGPIPE-ignore for the session, since writes to a dead
    /// child's stdin would otherwise kill the tracer.
    pub fn open_command(shell_cmd: &str) -> Transport {
        ignore_sigpipe();
        let child = match Command::new("/bin/sh")
            .arg("-c")
            .arg(shell_cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => fatal!("could not spawn '{}': {}", shell_cmd, e),
        };
        let t = Transport::Command { child };
        t.prime();
        t
    }

    /// Send a bare `+` immediately after opening, to prime the remote's
    /// line discipline (spec.md §4.1).
    fn prime(&self) {
        let mut this = self.try_clone_writer();
        if let Err(e) = this.write_all(b"+").and_then(|_| this.flush()) {
            fatal!("transport priming write failed: {}", e);
        }
    }

    fn try_clone_writer(&self) -> Box<dyn Write + '_> {
        // We only need a one-shot writer to send the priming `+`; subsequent
        // traffic goes through the `Read + Write` impl below, which borrows
        // `self` directly.
        match self {
            Transport::Tcp(s) => match s.try_clone() {
                Ok(s) => Box::new(s),
                Err(e) => fatal!("could not clone tcp stream for priming: {}", e),
            },
            Transport::Path(f) => match f.try_clone() {
                Ok(f) => Box::new(f),
                Err(e) => fatal!("could not clone file for priming: {}", e),
            },
            Transport::Command { child } => {
                // stdin is consumed by write(); priming writes directly.
                Box::new(child.stdin.as_ref().unwrap())
            }
        }
    }
}

fn ignore_sigpipe() {
    unsafe {
        let _ = signal(Signal::SIGPIPE, SigHandler::SigIgn);
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(buf),
            Transport::Path(f) => f.read(buf),
            Transport::Command { child } => child.stdout.as_mut().unwrap().read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(buf),
            Transport::Path(f) => f.write(buf),
            Transport::Command { child } => child.stdin.as_mut().unwrap().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.flush(),
            Transport::Path(f) => f.flush(),
            Transport::Command { child } => child.stdin.as_mut().unwrap().flush(),
        }
    }
}

/// Parse one of the endpoint forms from spec.md §6: `|<shell-command>`,
/// `host:port`, or a filesystem path.
pub fn open_endpoint(endpoint: &str) -> Transport {
    if let Some(cmd) = endpoint.strip_prefix('|') {
        return Transport::open_command(cmd);
    }
    if !endpoint.contains('/') {
        if let Some(colon) = endpoint.rfind(':') {
            let (host, port_str) = endpoint.split_at(colon);
            let port_str = &port_str[1..];
            if let Ok(port) = port_str.parse::<u16>() {
                return Transport::open_tcp(host, port);
            }
        }
    }
    Transport::open_path(endpoint)
}

#[cfg(test)]
pub mod tests {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    /// An in-memory duplex pipe: everything written to one end can be read
    /// from the other. Used as the `Channel` test double across the codec,
    /// session, and controller test suites.
    pub struct PairedChannel {
        pub inbound: VecDeque<u8>,
        pub outbound: VecDeque<u8>,
    }

    impl PairedChannel {
        pub fn new() -> PairedChannel {
            PairedChannel {
                inbound: VecDeque::new(),
                outbound: VecDeque::new(),
            }
        }

        /// Queue bytes as if the remote stub sent them.
        pub fn feed(&mut self, data: &[u8]) {
            self.inbound.extend(data.iter().copied());
        }

        /// Inspect what's been sent so far.
        pub fn sent(&self) -> Vec<u8> {
            self.outbound.iter().copied().collect()
        }

        pub fn clear_sent(&mut self) {
            self.outbound.clear();
        }
    }

    impl Read for PairedChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbound.is_empty() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no more data"));
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbound.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl Write for PairedChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.extend(buf.iter().copied());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn paired_channel_round_trips() {
        let mut c = PairedChannel::new();
        c.feed(b"hello");
        let mut buf = [0u8; 5];
        c.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        c.write_all(b"world").unwrap();
        assert_eq!(c.sent(), b"world");
    }
}
