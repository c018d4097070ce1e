use std::process;

use structopt::StructOpt;

use rsp_trace_core::commands::connect_command::ConnectCommand;
use rsp_trace_core::commands::options::ClientOptions;
use rsp_trace_core::commands::ClientCommand;

fn main() {
    let options = ClientOptions::from_args();
    let mut command = ConnectCommand::new(options.cmd);
    if let Err(e) = command.run() {
        eprintln!("rsp-trace: {}", e);
        process::exit(1);
    }
}
