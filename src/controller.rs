//! Event loop / controller (spec.md §4.7). Top of the stack: orchestrates
//! startup, the continue/stop cycle, tracee bookkeeping, per-event dispatch
//! into the external decoder, and teardown.
//!
//! No single pack file implements a full RSP client event loop; this is
//! built directly from spec.md §4.7, cross-checked against the `gdbstub`
//! examples' packet vocabulary and structured the way the teacher structures
//! its own single-owner session drivers
//! (`examples/khuey-rd/src/session/record_session.rs`'s `RecordSession`).

use std::rc::Rc;

use crate::dataplane;
use crate::external::{TcbSharedPtr, TraceeFlags, TraceeRegistry, SyscallDecoder};
use crate::hex;
use crate::kernel_metadata::{errno_name, signal_name};
use crate::session::Session;
use crate::signal_map::{Personality, SignalMap};
use crate::stop_reply::{StopKind, StopReply};
use crate::transport::Channel;

fn hex_i64(v: i64) -> String {
    format!("{:x}", v)
}

pub struct Controller<C: Channel, R: TraceeRegistry, D: SyscallDecoder> {
    session: Session<C>,
    registry: R,
    decoder: D,
    signal_map: SignalMap,
    personality: Personality,
    current_tcp: Option<TcbSharedPtr>,
    /// First tracee registered; used as the detach target and as the
    /// implicit current thread in non-multiprocess mode.
    strace_child: i64,
    /// `(rsp_signal, tid)` remembered from a `signal` dispatch, consumed by
    /// the next `resume()` call to emit a `vCont;C<sig>:<tid>;c` / `C<sig>`.
    pending_injection: Option<(u8, i64)>,
}

impl<C: Channel, R: TraceeRegistry, D: SyscallDecoder> Controller<C, R, D> {
    pub fn new(
        session: Session<C>,
        registry: R,
        decoder: D,
        signal_map: SignalMap,
        personality: Personality,
    ) -> Controller<C, R, D> {
        Controller {
            session,
            registry,
            decoder,
            signal_map,
            personality,
            current_tcp: None,
            strace_child: -1,
            pending_injection: None,
        }
    }

    pub fn session(&self) -> &Session<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }

    /// Precondition: `extended`. Builds `vRun;<hex-arg>;...`, registers the
    /// first trap as the first tracee.
    pub fn startup_child(&mut self, argv: &[Vec<u8>]) {
        if !self.session.extended {
            fatal!("vRun requires the stub to support extended mode");
        }
        let mut payload = Vec::from(&b"vRun"[..]);
        for arg in argv {
            payload.push(b';');
            payload.extend_from_slice(&hex::encode_buf(arg));
        }
        self.session.send(&payload);
        let body = self.session.recv(true);
        let stop = StopReply::parse(&body);
        if stop.kind != StopKind::Trap {
            fatal!("vRun did not produce a trap stop");
        }
        let pid = if stop.tid >= 0 { stop.tid } else { stop.pid };
        let tcb = self.registry.alloctcb(pid);
        tcb.borrow_mut().flags = TraceeFlags::ATTACHED | TraceeFlags::STARTUP;
        self.current_tcp = Some(Rc::clone(&tcb));
        self.strace_child = pid;
        self.session.catch_syscalls();
    }

    /// Precondition: `extended`. When `try_non_stop` is set, attempts the
    /// non-stop attach dance first and falls back to a synchronous all-stop
    /// attach if any step of it fails; otherwise goes straight to the
    /// fallback path.
    pub fn startup_attach(&mut self, pid: i64, try_non_stop: bool) {
        if !self.session.extended {
            fatal!("vAttach requires the stub to support extended mode");
        }

        let mut attached = false;
        if try_non_stop {
            self.session.send(b"QNonStop:1");
            if self.session.recv(true) == b"OK" {
                self.session.set_non_stop(true);
                self.session
                    .send(format!("vAttach;{}", hex_i64(pid)).as_bytes());
                if self.session.recv(true) == b"OK" {
                    self.session
                        .send(format!("vCont;t:p{}.-1", hex_i64(pid)).as_bytes());
                    if self.session.recv(true) == b"OK" {
                        self.drain_stopped();
                        attached = true;
                    }
                }
            }
        }

        if !attached {
            self.session.set_non_stop(false);
            self.session.send(b"QNonStop:0");
            let _ = self.session.recv(true);
            self.session
                .send(format!("vAttach;{}", hex_i64(pid)).as_bytes());
            let body = self.session.recv(true);
            let stop = StopReply::parse(&body);
            match &stop.kind {
                StopKind::Trap => {}
                StopKind::Signal(0) => {}
                _ => fatal!("vAttach fallback produced neither trap nor signal(0)"),
            }
        }

        self.enumerate_attach_threads();
    }

    /// `vStopped` drain loop: consumes queued `%Stop:` notifications until
    /// the stub answers `OK`.
    fn drain_stopped(&mut self) {
        loop {
            if self.session.pop_notification().is_some() {
                continue;
            }
            self.session.send(b"vStopped");
            if self.session.recv(true) == b"OK" {
                return;
            }
        }
    }

    fn enumerate_attach_threads(&mut self) {
        let tids = dataplane::list_threads(&mut self.session);
        for t in tids {
            let tid = match t.tid {
                crate::thread_id::Id::Id(v) => v,
                _ => continue,
            };
            if self.registry.pid2tcb(tid).is_some() {
                continue;
            }
            let tcb = self.registry.alloctcb(tid);
            tcb.borrow_mut().flags = TraceeFlags::ATTACHED | TraceeFlags::STARTUP;
            self.session.send(format!("Hg{:x}", tid).as_bytes());
            let _ = self.session.recv(true);
            self.session.catch_syscalls();
            if self.current_tcp.is_none() {
                self.current_tcp = Some(Rc::clone(&tcb));
                self.strace_child = tid;
            }
        }
    }

    /// `vCont;c` / `c`, or the signal-injection forms if a `signal` event
    /// was just dispatched.
    pub fn resume(&mut self) {
        let payload = if let Some((sig, tid)) = self.pending_injection.take() {
            if self.session.vcont {
                format!("vCont;C{}:{:x};c", String::from_utf8_lossy(&hex::encode(sig)), tid)
            } else {
                format!("C{}", String::from_utf8_lossy(&hex::encode(sig)))
            }
        } else if self.session.vcont {
            "vCont;c".to_string()
        } else {
            "c".to_string()
        };
        self.session.send(payload.as_bytes())
    }

    /// One `trace` invocation: receive a stop-reply, process it, then drain
    /// and process the notification queue inline. Returns `false` once the
    /// caller should stop looping.
    pub fn trace(&mut self) -> bool {
        let body = self.session.recv(true);
        let mut keep_going = self.process_stop(&body);
        while keep_going {
            match self.session.pop_notification() {
                Some(next) => keep_going = self.process_stop(&next),
                None => break,
            }
        }
        keep_going
    }

    /// The id a stop-reply's tracee should be looked up/registered under.
    /// `W`/`X` (exit/terminate) packets carry the real process id in the
    /// optional `;process:` field, parsed into `stop.pid` — `stop.tid` is
    /// always `-1` for these kinds (`StopReply::parse`'s lifecycle path
    /// never sets it). Every other kind carries the thread id in `stop.tid`.
    fn tracee_id(stop: &StopReply) -> i64 {
        match stop.kind {
            StopKind::Exited(_) | StopKind::Terminated(_) => stop.pid,
            _ => stop.tid,
        }
    }

    fn resolve_tracee(&mut self, stop: &StopReply) -> TcbSharedPtr {
        if self.session.multiprocess {
            let tid = Self::tracee_id(stop);
            let tcb = match self.registry.pid2tcb(tid) {
                Some(t) => t,
                None => {
                    let t = self.registry.alloctcb(tid);
                    t.borrow_mut().flags = TraceeFlags::ATTACHED | TraceeFlags::STARTUP;
                    self.session.send(format!("Hg{:x}", tid).as_bytes());
                    let _ = self.session.recv(true);
                    self.session.catch_syscalls();
                    t
                }
            };
            self.current_tcp = Some(Rc::clone(&tcb));
            tcb
        } else {
            match &self.current_tcp {
                Some(t) => Rc::clone(t),
                None => fatal!("no current tracee outside multiprocess mode"),
            }
        }
    }

    fn process_stop(&mut self, body: &[u8]) -> bool {
        let stop = StopReply::parse(body);

        match &stop.kind {
            StopKind::Unknown => fatal!("stub sent an unparseable stop-reply"),
            StopKind::Error(code) => {
                log!(
                    crate::log::LogError,
                    "stub returned error {}",
                    errno_name(*code as i32)
                );
                return false;
            }
            _ => {}
        }

        let tcp = self.resolve_tracee(&stop);

        match &stop.kind {
            StopKind::Exited(code) => {
                let status = crate::external::w_exitcode(*code as i32, 0);
                self.decoder.print_exited(&tcp, status);
                let pid = tcp.borrow().pid;
                self.registry.droptcb(pid);
                self.clear_current_if(pid);
                return self.session.multiprocess;
            }
            StopKind::Terminated(sig) => {
                let target = self.signal_map.translate(self.personality, *sig as i32);
                log!(
                    crate::log::LogInfo,
                    "tracee terminated by {}",
                    signal_name(target)
                );
                let status = crate::external::w_exitcode(0, target);
                self.decoder.print_signalled(&tcp, status);
                let pid = tcp.borrow().pid;
                self.registry.droptcb(pid);
                self.clear_current_if(pid);
                return self.session.multiprocess;
            }
            _ => {}
        }

        self.decoder.get_regs(tcp.borrow().pid);
        {
            let mut t = tcp.borrow_mut();
            if t.flags.contains(TraceeFlags::STARTUP) {
                t.flags.remove(TraceeFlags::STARTUP);
                drop(t);
                if self.decoder.get_scno(&tcp) == 1 {
                    let mut t = tcp.borrow_mut();
                    t.s_prev_ent = t.s_ent;
                }
            }
        }

        match stop.kind {
            StopKind::Trap => {}
            StopKind::SyscallEntry(scno) => {
                let mut t = tcp.borrow_mut();
                t.flags.remove(TraceeFlags::INSYSCALL);
                t.scno = scno;
                drop(t);
                self.decoder.trace_syscall(&tcp);
            }
            StopKind::SyscallReturn(scno) => {
                if self.decoder.exiting(&tcp) {
                    tcp.borrow_mut().scno = scno;
                    self.decoder.trace_syscall(&tcp);
                }
            }
            StopKind::Signal(sig) => {
                let siginfo = self.read_siginfo();
                let target = self.signal_map.translate(self.personality, sig as i32);
                log!(
                    crate::log::LogInfo,
                    "tracee stopped by {}",
                    signal_name(target)
                );
                self.decoder
                    .print_stopped(&tcp, siginfo.as_deref(), target);
                self.pending_injection = Some((sig, stop.tid));
            }
            _ => {}
        }

        true
    }

    fn clear_current_if(&mut self, pid: i64) {
        if let Some(cur) = &self.current_tcp {
            if cur.borrow().pid == pid {
                self.current_tcp = None;
            }
        }
    }

    /// `qXfer:siginfo:read::0,0xfff`; passed through only if its length
    /// matches the host `siginfo_t` (spec.md §4.7 step 9 / SPEC_FULL §3).
    fn read_siginfo(&mut self) -> Option<Vec<u8>> {
        match dataplane::qxfer_read(&mut self.session, "siginfo", "") {
            Ok(data) if data.len() == std::mem::size_of::<libc::siginfo_t>() => Some(data),
            _ => None,
        }
    }

    /// `D;<hex-pid>` (multiprocess) or `D`. Probes liveness with
    /// `T;<hex-pid>` on failure.
    pub fn detach(&mut self) {
        let pid = self
            .current_tcp
            .as_ref()
            .map(|t| t.borrow().pid)
            .unwrap_or(self.strace_child);
        let payload = if self.session.multiprocess {
            format!("D;{}", hex_i64(pid))
        } else {
            "D".to_string()
        };
        self.session.send(payload.as_bytes());
        let reply = self.session.recv(true);
        if reply == b"OK" {
            return;
        }
        self.session
            .send(format!("T;{}", hex_i64(pid)).as_bytes());
        let probe = self.session.recv(true);
        if probe == b"OK" {
            log!(crate::log::LogError, "target still alive after failed detach");
        }
    }
}
