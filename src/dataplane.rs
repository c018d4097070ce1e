//! Data-plane ops (spec.md §4.8): register read, chunked memory read,
//! `qXfer` transfers, and `vFile:readlink`. Free functions over `&mut
//! Session`, since none of them carry state across calls.

use crate::error::{DataPlaneError, DataPlaneResult};
use crate::hex;
use crate::session::Session;
use crate::thread_id::ThreadId;
use crate::transport::Channel;

const MEMORY_CHUNK: u64 = 0x1000;
const QXFER_MAXLEN: u64 = 0xfff;

fn error_from_reply(reply: &[u8]) -> Option<DataPlaneError> {
    if reply.first() == Some(&b'E') {
        let errno = reply.get(1..3).and_then(hex::decode).unwrap_or(0) as i32;
        Some(DataPlaneError { errno })
    } else {
        None
    }
}

/// `g`. Assumes the stub's current thread is already the requested TID
/// (caller's responsibility, per spec.md §4.8).
pub fn read_registers<C: Channel>(session: &mut Session<C>) -> DataPlaneResult<Vec<u8>> {
    session.send(b"g");
    let reply = session.recv(true);
    if let Some(err) = error_from_reply(&reply) {
        return Err(err);
    }
    Ok(reply)
}

pub struct MemRead {
    /// 0 success, 1 stopped early on NUL, -1 error.
    pub status: i32,
    pub data: Vec<u8>,
    pub errno: Option<i32>,
}

/// Memory read, chunked at `0x1000` bytes. If `check_nil` is set and a
/// decoded chunk contains a NUL, stops early (including the NUL byte) and
/// reports `status == 1`.
pub fn read_memory<C: Channel>(
    session: &mut Session<C>,
    addr: u64,
    len: u64,
    check_nil: bool,
) -> MemRead {
    let mut data = Vec::new();
    let mut offset = 0u64;
    while offset < len {
        let chunk_len = std::cmp::min(MEMORY_CHUNK, len - offset);
        let cmd = format!("m{:x},{:x}", addr + offset, chunk_len);
        session.send(cmd.as_bytes());
        let reply = session.recv(true);
        if let Some(err) = error_from_reply(&reply) {
            return MemRead {
                status: -1,
                data,
                errno: Some(err.errno),
            };
        }
        if reply.len() > (chunk_len as usize) * 2 {
            fatal!("m reply longer than twice the requested length");
        }
        let decoded = match hex::decode_buf(&reply) {
            Some(d) => d,
            None => fatal!("m reply was not valid hex"),
        };
        if check_nil {
            if let Some(pos) = decoded.iter().position(|&b| b == 0) {
                data.extend_from_slice(&decoded[..=pos]);
                return MemRead {
                    status: 1,
                    data,
                    errno: None,
                };
            }
        }
        data.extend_from_slice(&decoded);
        offset += chunk_len;
    }
    MemRead {
        status: 0,
        data,
        errno: None,
    }
}

/// Repeated `qXfer:<obj>:read:<annex>:<offset-hex>,<maxlen-hex>`, concatenating
/// data chunks until `l` (last) or `E` (error).
pub fn qxfer_read<C: Channel>(
    session: &mut Session<C>,
    obj: &str,
    annex: &str,
) -> DataPlaneResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut offset: u64 = 0;
    loop {
        let cmd = format!(
            "qXfer:{}:read:{}:{:x},{:x}",
            obj, annex, offset, QXFER_MAXLEN
        );
        session.send(cmd.as_bytes());
        let reply = session.recv(true);
        if let Some(err) = error_from_reply(&reply) {
            return Err(err);
        }
        match reply.first() {
            Some(&b'm') => {
                let chunk = &reply[1..];
                offset += chunk.len() as u64;
                out.extend_from_slice(chunk);
            }
            Some(&b'l') => {
                out.extend_from_slice(&reply[1..]);
                return Ok(out);
            }
            _ => fatal!("qXfer reply had an unexpected prefix"),
        }
    }
}

/// `vFile:readlink:<hex-path>`, writing the (possibly truncated,
/// NUL-terminated) result into `buf` and returning the number of link bytes
/// copied.
pub fn vfile_readlink<C: Channel>(
    session: &mut Session<C>,
    path: &[u8],
    buf: &mut [u8],
) -> DataPlaneResult<usize> {
    let mut cmd = Vec::from(&b"vFile:readlink:"[..]);
    cmd.extend_from_slice(&hex::encode_buf(path));
    session.send(&cmd);
    let reply = session.recv(true);
    if reply.first() != Some(&b'F') {
        fatal!("vFile:readlink reply missing 'F' prefix");
    }
    let rest = &reply[1..];
    let (head, attachment) = match rest.iter().position(|&b| b == b';') {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };
    let (result_part, errno_part) = match head.iter().position(|&b| b == b',') {
        Some(i) => (&head[..i], Some(&head[i + 1..])),
        None => (head, None),
    };
    let (result, _) = hex::decode_signed_hex_str(result_part)
        .unwrap_or_else(|| fatal!("vFile:readlink reply had a malformed result field"));

    if result < 0 {
        let errno = match errno_part {
            Some(e) => hex::decode_str(e).map(|(v, _)| v as i32).unwrap_or(0),
            None => 0,
        };
        return Err(DataPlaneError { errno });
    }

    let att = attachment.unwrap_or(&[]);
    if att.len() as i64 != result {
        fatal!("vFile:readlink attachment length did not match reported result");
    }
    let n = std::cmp::min(att.len(), buf.len().saturating_sub(1));
    buf[..n].copy_from_slice(&att[..n]);
    if buf.len() > n {
        buf[n] = 0;
    }
    Ok(n)
}

/// Thread enumeration via `qfThreadInfo`/`qsThreadInfo`. Deviates
/// deliberately from the source's single-token `strtok` behavior
/// (Open Question 1): every reply is comma-tokenized in full.
pub fn list_threads<C: Channel>(session: &mut Session<C>) -> Vec<ThreadId> {
    let mut tids = Vec::new();
    session.send(b"qfThreadInfo");
    let mut reply = session.recv(true);
    loop {
        match reply.first() {
            Some(&b'm') => {
                for tok in reply[1..].split(|&b| b == b',') {
                    if let Some(t) = ThreadId::parse(tok) {
                        tids.push(t);
                    }
                }
            }
            Some(&b'l') => {
                for tok in reply[1..].split(|&b| b == b',').filter(|t| !t.is_empty()) {
                    if let Some(t) = ThreadId::parse(tok) {
                        tids.push(t);
                    }
                }
                return tids;
            }
            _ => fatal!("qThreadInfo reply had an unexpected prefix"),
        }
        session.send(b"qsThreadInfo");
        reply = session.recv(true);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::tests::PairedChannel;

    fn session_with_input(data: &[u8]) -> Session<PairedChannel> {
        let mut chan = PairedChannel::new();
        chan.feed(data);
        let mut s = Session::new(chan);
        s.set_ack(false);
        s
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let cs = payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        let mut out = Vec::new();
        out.push(b'$');
        out.extend_from_slice(payload);
        out.push(b'#');
        out.extend_from_slice(&hex::encode(cs));
        out
    }

    #[test]
    fn read_registers_success() {
        let mut s = session_with_input(&frame(b"deadbeef"));
        let regs = read_registers(&mut s).unwrap();
        assert_eq!(regs, b"deadbeef");
    }

    #[test]
    fn read_registers_error() {
        let mut s = session_with_input(&frame(b"E01"));
        let err = read_registers(&mut s).unwrap_err();
        assert_eq!(err.errno, 1);
    }

    #[test]
    fn read_memory_single_chunk() {
        let encoded = hex::encode_buf(b"hello");
        let mut s = session_with_input(&frame(&encoded));
        let r = read_memory(&mut s, 0x1000, 5, false);
        assert_eq!(r.status, 0);
        assert_eq!(r.data, b"hello");
    }

    #[test]
    fn read_memory_stops_early_on_nil_when_requested() {
        let encoded = hex::encode_buf(b"ab\0cd");
        let mut s = session_with_input(&frame(&encoded));
        let r = read_memory(&mut s, 0, 5, true);
        assert_eq!(r.status, 1);
        assert_eq!(r.data, b"ab\0");
    }

    #[test]
    fn read_memory_chunks_at_0x1000() {
        let mut input = Vec::new();
        let first_chunk = vec![b'A'; 0x1000];
        let second_chunk = vec![b'B'; 4];
        input.extend_from_slice(&frame(&hex::encode_buf(&first_chunk)));
        input.extend_from_slice(&frame(&hex::encode_buf(&second_chunk)));
        let mut s = session_with_input(&input);
        let r = read_memory(&mut s, 0, 0x1004, false);
        assert_eq!(r.status, 0);
        assert_eq!(r.data.len(), 0x1004);
        assert!(r.data[..0x1000].iter().all(|&b| b == b'A'));
        assert!(r.data[0x1000..].iter().all(|&b| b == b'B'));
    }

    #[test]
    fn qxfer_read_concatenates_chunks() {
        let mut input = Vec::new();
        input.extend_from_slice(&frame(b"mhello, "));
        input.extend_from_slice(&frame(b"lworld"));
        let mut s = session_with_input(&input);
        let data = qxfer_read(&mut s, "siginfo", "").unwrap();
        assert_eq!(data, b"hello, world");
    }

    #[test]
    fn vfile_readlink_success_truncates_and_nul_terminates() {
        let mut s = session_with_input(&frame(b"F4;/bin"));
        let mut buf = [0xffu8; 5];
        let n = vfile_readlink(&mut s, b"/proc/self/exe", &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"/bin\0");
    }

    #[test]
    fn vfile_readlink_error() {
        let mut s = session_with_input(&frame(b"F-1,2"));
        let mut buf = [0u8; 8];
        let err = vfile_readlink(&mut s, b"/proc/self/exe", &mut buf).unwrap_err();
        assert_eq!(err.errno, 2);
    }

    #[test]
    fn list_threads_comma_tokenizes_across_whole_reply() {
        let mut input = Vec::new();
        input.extend_from_slice(&frame(b"mp1.1,p1.2"));
        input.extend_from_slice(&frame(b"lp1.3"));
        let mut s = session_with_input(&input);
        let tids = list_threads(&mut s);
        assert_eq!(tids.len(), 3);
        assert_eq!(tids[2].tid, crate::thread_id::Id::Id(3));
    }
}
