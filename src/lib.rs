#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod log;

pub mod codec;
pub mod commands;
pub mod controller;
pub mod dataplane;
pub mod error;
pub mod external;
pub mod hex;
pub mod kernel_metadata;
pub mod notification;
pub mod session;
pub mod signal_map;
pub mod stop_reply;
pub mod thread_id;
pub mod transport;
