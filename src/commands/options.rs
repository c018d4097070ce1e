//! CLI surface (spec.md §6). `ClientOptions`/`ClientSubCommand` stand where
//! the teacher's `RdOptions`/`RdSubCommand` (`commands/rd_options.rs`) would,
//! built the same way on `structopt` derive.

use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "rsp-trace", about = "GDB remote serial protocol syscall tracer")]
pub struct ClientOptions {
    #[structopt(subcommand)]
    pub cmd: ClientSubCommand,
}

#[derive(StructOpt, Debug)]
pub enum ClientSubCommand {
    /// Connect to a stub and trace an already-running or freshly spawned
    /// inferior.
    Connect {
        /// `host:port` for a TCP endpoint.
        #[structopt(long, conflicts_with_all = &["serial", "command"])]
        tcp: Option<String>,

        /// Path to a serial device or named pipe.
        #[structopt(long, conflicts_with_all = &["tcp", "command"])]
        serial: Option<String>,

        /// Shell command line whose stdio is the RSP connection.
        #[structopt(long, conflicts_with_all = &["tcp", "serial"])]
        command: Option<String>,

        /// Attach to an already-running process instead of spawning one.
        #[structopt(long)]
        attach: Option<i64>,

        /// Program (and arguments) to spawn and trace, when not attaching.
        #[structopt(conflicts_with = "attach")]
        argv: Vec<String>,

        /// Request non-stop mode for the attach dance (spec.md §4.7); falls
        /// back to all-stop on its own if the stub won't cooperate.
        #[structopt(long)]
        non_stop: bool,

        /// Skip asking the stub to report syscall entry/return (on by
        /// default; this flag turns it off).
        #[structopt(long)]
        no_catch_syscalls: bool,
    },
}

impl ClientSubCommand {
    /// The single endpoint string `transport::open_endpoint` expects, built
    /// from whichever of `--tcp`/`--serial`/`--command` was given.
    pub fn endpoint(&self) -> String {
        match self {
            ClientSubCommand::Connect {
                tcp,
                serial,
                command,
                ..
            } => {
                if let Some(hp) = tcp {
                    hp.clone()
                } else if let Some(p) = serial {
                    p.clone()
                } else if let Some(c) = command {
                    format!("|{}", c)
                } else {
                    fatal!("one of --tcp, --serial, or --command is required");
                }
            }
        }
    }
}
