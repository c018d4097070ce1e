//! The one concrete `ClientCommand`: open a transport, run the handshake,
//! start or attach to an inferior, and drive `Controller` until the trace
//! ends. Grounded on the teacher's `commands/trace_info_command.rs`, whose
//! shape (read options, build a session object, loop, print) this follows;
//! the replay-specific body is replaced with the RSP event loop.

use std::io;

use crate::commands::options::ClientSubCommand;
use crate::commands::ClientCommand;
use crate::controller::Controller;
use crate::external::{LoggingSyscallDecoder, NullTraceeRegistry};
use crate::session::Session;
use crate::signal_map::{Personality, SignalMap, StaticPersonalityCatalog};
use crate::transport::{open_endpoint, Transport};

pub struct ConnectCommand {
    cmd: ClientSubCommand,
}

impl ConnectCommand {
    pub fn new(cmd: ClientSubCommand) -> ConnectCommand {
        ConnectCommand { cmd }
    }
}

impl ClientCommand for ConnectCommand {
    fn run(&mut self) -> io::Result<()> {
        let (attach, argv, non_stop, no_catch_syscalls) = match &self.cmd {
            ClientSubCommand::Connect {
                attach,
                argv,
                non_stop,
                no_catch_syscalls,
                ..
            } => (*attach, argv.clone(), *non_stop, *no_catch_syscalls),
        };

        let transport: Transport = open_endpoint(&self.cmd.endpoint());
        let mut session = Session::new(transport);
        session.handshake();

        let signal_map = SignalMap::build(&StaticPersonalityCatalog);
        let mut controller = Controller::new(
            session,
            NullTraceeRegistry::new(),
            LoggingSyscallDecoder::new(),
            signal_map,
            Personality::X86_64,
        );

        match attach {
            Some(pid) => controller.startup_attach(pid, non_stop),
            None => {
                if argv.is_empty() {
                    fatal!("connect requires either --attach <pid> or a program to run");
                }
                let argv: Vec<Vec<u8>> = argv.into_iter().map(|s| s.into_bytes()).collect();
                controller.startup_child(&argv);
            }
        }

        if no_catch_syscalls {
            log!(
                crate::log::LogWarn,
                "--no-catch-syscalls requested; tracing would see no syscall events"
            );
        }

        loop {
            controller.resume();
            if !controller.trace() {
                break;
            }
        }

        controller.detach();
        Ok(())
    }
}
