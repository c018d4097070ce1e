//! Stop-reply parser (spec.md §4.6): turns a raw stop packet body into a
//! typed record. Grounded (read in reverse, server→client instead of
//! client→server) on
//! `examples/other_examples/4f505f2c_daniel5151-gdbstub__src-stub-core_impl-resume.rs.rs`'s
//! `finish_exec`, which emits exactly this packet vocabulary from the stub
//! side.

use crate::hex;
use crate::signal_map::{GDB_SIGNAL_0, GDB_SIGNAL_TRAP};
use crate::thread_id::{Id, ThreadId};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StopKind {
    Error(u8),
    Trap,
    Signal(u8),
    SyscallEntry(u64),
    SyscallReturn(u64),
    Exited(u64),
    Terminated(u8),
    Unknown,
}

/// Always carries `pid`/`tid`, `-1` when the packet didn't say (spec.md §3).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StopReply {
    pub kind: StopKind,
    pub pid: i64,
    pub tid: i64,
}

fn id_to_i64(id: Id) -> i64 {
    match id {
        Id::Id(v) => v,
        Id::All => -1,
        Id::Any => 0,
    }
}

fn split_fields(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split(|&b| b == b';').filter(|f| !f.is_empty())
}

impl StopReply {
    /// The parser does not own `body`; callers free it after inspection.
    pub fn parse(body: &[u8]) -> StopReply {
        match body.first() {
            Some(b'E') => {
                let code = body.get(1..3).and_then(hex::decode).unwrap_or(0);
                StopReply {
                    kind: StopKind::Error(code),
                    pid: -1,
                    tid: -1,
                }
            }
            Some(b'S') | Some(b'T') => Self::parse_signal(body),
            Some(b'W') => Self::parse_lifecycle(&body[1..], true),
            Some(b'X') => Self::parse_lifecycle(&body[1..], false),
            _ => StopReply {
                kind: StopKind::Unknown,
                pid: -1,
                tid: -1,
            },
        }
    }

    fn parse_signal(body: &[u8]) -> StopReply {
        let code = body.get(1..3).and_then(hex::decode).unwrap_or(0);
        let mut kind = if code as i32 == GDB_SIGNAL_TRAP || code as i32 == GDB_SIGNAL_0 {
            StopKind::Trap
        } else {
            StopKind::Signal(code)
        };
        let mut pid = -1i64;
        let mut tid = -1i64;

        let rest = if body.len() > 3 { &body[3..] } else { &[] };
        for field in split_fields(rest) {
            if let Some(value) = field.strip_prefix(b"thread:") {
                if let Some(t) = ThreadId::parse(value) {
                    pid = id_to_i64(t.pid);
                    tid = id_to_i64(t.tid);
                }
            } else if let Some(value) = field.strip_prefix(b"syscall_entry:") {
                if kind == StopKind::Trap {
                    if let Some((scno, _)) = hex::decode_str(value) {
                        kind = StopKind::SyscallEntry(scno);
                    }
                }
            } else if let Some(value) = field.strip_prefix(b"syscall_return:") {
                if kind == StopKind::Trap {
                    if let Some((scno, _)) = hex::decode_str(value) {
                        kind = StopKind::SyscallReturn(scno);
                    }
                }
            }
        }

        StopReply { kind, pid, tid }
    }

    fn parse_lifecycle(body: &[u8], exited: bool) -> StopReply {
        let (code, consumed) = hex::decode_str(body).unwrap_or((0, 0));
        let mut pid = -1i64;
        let rest = if body.len() > consumed {
            &body[consumed..]
        } else {
            &[]
        };
        for field in split_fields(rest) {
            if let Some(value) = field.strip_prefix(b"process:") {
                if let Some((p, _)) = hex::decode_str(value) {
                    pid = p as i64;
                }
            }
        }
        let kind = if exited {
            StopKind::Exited(code)
        } else {
            StopKind::Terminated(code as u8)
        };
        StopReply { kind, pid, tid: -1 }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_error() {
        let r = StopReply::parse(b"E01");
        assert_eq!(r.kind, StopKind::Error(1));
    }

    #[test]
    fn parses_trap_with_thread() {
        let r = StopReply::parse(b"T05thread:p1234.1234;");
        assert_eq!(r.kind, StopKind::Trap);
        assert_eq!(r.pid, 0x1234);
        assert_eq!(r.tid, 0x1234);
    }

    #[test]
    fn parses_signal_non_trap() {
        let r = StopReply::parse(b"T0bthread:p1234.1235;");
        assert_eq!(r.kind, StopKind::Signal(0x0b));
        assert_eq!(r.tid, 0x1235);
    }

    #[test]
    fn parses_syscall_entry() {
        let r = StopReply::parse(b"T05syscall_entry:3b;thread:p1234.1234;");
        assert_eq!(r.kind, StopKind::SyscallEntry(0x3b));
        assert_eq!(r.tid, 0x1234);
    }

    #[test]
    fn parses_syscall_return() {
        let r = StopReply::parse(b"T05syscall_return:3b;thread:p1234.1234;");
        assert_eq!(r.kind, StopKind::SyscallReturn(0x3b));
    }

    #[test]
    fn non_trap_signal_is_not_promoted_by_syscall_fields() {
        // Malformed in practice, but the rule is: only a `trap` kind gets
        // promoted to syscall-entry/return.
        let r = StopReply::parse(b"T0bsyscall_entry:3b;");
        assert_eq!(r.kind, StopKind::Signal(0x0b));
    }

    #[test]
    fn parses_exited_with_process() {
        let r = StopReply::parse(b"W00;process:1234");
        assert_eq!(r.kind, StopKind::Exited(0));
        assert_eq!(r.pid, 0x1234);
    }

    #[test]
    fn parses_terminated_without_process() {
        let r = StopReply::parse(b"X0b");
        assert_eq!(r.kind, StopKind::Terminated(0x0b));
        assert_eq!(r.pid, -1);
    }

    #[test]
    fn unknown_first_byte() {
        let r = StopReply::parse(b"Zbogus");
        assert_eq!(r.kind, StopKind::Unknown);
    }
}
