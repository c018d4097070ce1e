//! RSP thread-id model (spec.md §3 "Thread identifier").
//!
//! Grounded on `other_examples`'s `tromey-gdb-rsp` `ProcessId`/`Id`, which
//! only serializes thread-ids for an RSP client; this module adds parsing,
//! since the stop-reply parser (`stop_reply.rs`) needs to read `thread:`
//! sub-fields back off the wire.

use crate::hex;

/// One half (pid or tid) of a thread-id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Id {
    /// A concrete process or thread id.
    Id(i64),
    /// `-1`: all processes, or all threads of a process.
    All,
    /// `0`: any process, or any thread of a process.
    Any,
}

/// A process/thread pair as it appears on the wire: either a bare `TID`
/// (pid assumed equal to tid) or the multiprocess form `pPID.TID`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ThreadId {
    pub pid: Id,
    pub tid: Id,
}

impl ThreadId {
    pub fn new(pid: i64, tid: i64) -> ThreadId {
        ThreadId {
            pid: Id::Id(pid),
            tid: Id::Id(tid),
        }
    }

    /// Parse a thread-id field value, i.e. the bytes after `thread:` and
    /// before the next `;` (or end of input). Accepts `pPID.TID`, `pPID`
    /// (tid defaults to `Any`), or a bare `TID` (pid defaults to equal the
    /// tid).
    pub fn parse(data: &[u8]) -> Option<ThreadId> {
        if let Some(rest) = data.strip_prefix(b"p") {
            let dot = rest.iter().position(|&b| b == b'.');
            let (pid_bytes, tid_bytes) = match dot {
                Some(i) => (&rest[..i], Some(&rest[i + 1..])),
                None => (rest, None),
            };
            let pid = parse_id(pid_bytes)?;
            let tid = match tid_bytes {
                Some(b) => parse_id(b)?,
                None => Id::Any,
            };
            Some(ThreadId { pid, tid })
        } else {
            let tid = parse_id(data)?;
            let pid = tid;
            Some(ThreadId { pid, tid })
        }
    }

    /// Format as the wire form, always using the multiprocess `pPID.TID`
    /// shape (matching spec.md's data-plane ops, which always speak to a
    /// `multiprocess+` stub).
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::from(&b"p"[..]);
        write_id(&mut out, self.pid);
        out.push(b'.');
        write_id(&mut out, self.tid);
        out
    }
}

fn parse_id(data: &[u8]) -> Option<Id> {
    if data == b"-1" {
        return Some(Id::All);
    }
    if data == b"0" {
        return Some(Id::Any);
    }
    let (val, n) = hex::decode_signed_hex_str(data)?;
    if n != data.len() {
        return None;
    }
    Some(Id::Id(val))
}

fn write_id(out: &mut Vec<u8>, id: Id) {
    match id {
        Id::Id(v) => out.extend_from_slice(format!("{:x}", v).as_bytes()),
        Id::All => out.extend_from_slice(b"-1"),
        Id::Any => out.extend_from_slice(b"0"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_multiprocess_form() {
        let t = ThreadId::parse(b"p1234.1234").unwrap();
        assert_eq!(t.pid, Id::Id(0x1234));
        assert_eq!(t.tid, Id::Id(0x1234));
    }

    #[test]
    fn parses_bare_tid() {
        let t = ThreadId::parse(b"1235").unwrap();
        assert_eq!(t.pid, Id::Id(0x1235));
        assert_eq!(t.tid, Id::Id(0x1235));
    }

    #[test]
    fn parses_all_threads_of_pid() {
        let t = ThreadId::parse(b"p1234.-1").unwrap();
        assert_eq!(t.pid, Id::Id(0x1234));
        assert_eq!(t.tid, Id::All);
    }

    #[test]
    fn pid_only_form_defaults_tid_to_any() {
        let t = ThreadId::parse(b"p1234").unwrap();
        assert_eq!(t.pid, Id::Id(0x1234));
        assert_eq!(t.tid, Id::Any);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(ThreadId::parse(b"pxyz"), None);
    }
}
