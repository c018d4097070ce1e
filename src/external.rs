//! External tracer contracts (spec.md §6's "External tracer callbacks") and
//! a logging-only concrete pair (`NullTraceeRegistry`, `LoggingSyscallDecoder`)
//! for `connect_command.rs` and the test suite to drive `Controller` with.
//!
//! The `Rc<RefCell<>>` single-owner pattern for tracee records is grounded
//! on `examples/isgasho-rd/src/thread_group.rs`'s `ThreadGroupSharedPtr =
//! Rc<RefCell<ThreadGroup>>`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::signal_map::Personality;

bitflags! {
    pub struct TraceeFlags: u32 {
        const ATTACHED = 1 << 0;
        const STARTUP = 1 << 1;
        const INSYSCALL = 1 << 2;
    }
}

/// Minimum fields the core reads/writes through the external API
/// (spec.md §3 "Tracee record").
pub struct Tcb {
    pub pid: i64,
    pub flags: TraceeFlags,
    pub scno: u64,
    pub currpers: Personality,
    pub s_prev_ent: u64,
    pub s_ent: u64,
}

pub type TcbSharedPtr = Rc<RefCell<Tcb>>;

/// `W_EXITCODE(code, sig)`, the usual glibc macro: status word encoding
/// exit code and terminating signal.
pub fn w_exitcode(code: i32, sig: i32) -> i32 {
    ((code & 0xff) << 8) | (sig & 0x7f)
}

pub trait TraceeRegistry {
    fn alloctcb(&mut self, pid: i64) -> TcbSharedPtr;
    fn droptcb(&mut self, pid: i64);
    fn pid2tcb(&self, pid: i64) -> Option<TcbSharedPtr>;
    fn newoutf(&mut self, tcp: &TcbSharedPtr);
}

pub trait SyscallDecoder {
    fn get_regs(&mut self, tid: i64);
    fn get_scno(&self, tcp: &TcbSharedPtr) -> u64;
    fn exiting(&self, tcp: &TcbSharedPtr) -> bool;
    fn trace_syscall(&mut self, tcp: &TcbSharedPtr);
    fn print_stopped(&mut self, tcp: &TcbSharedPtr, siginfo: Option<&[u8]>, target_sig: i32);
    fn print_exited(&mut self, tcp: &TcbSharedPtr, status: i32);
    fn print_signalled(&mut self, tcp: &TcbSharedPtr, status: i32);
}

/// A registry with no backing ptrace/process state: tracees are bookkeeping
/// only. Enough for `connect_command.rs`'s demonstration run and for tests
/// that exercise `Controller`'s lifecycle bookkeeping without a real
/// tracee.
#[derive(Default)]
pub struct NullTraceeRegistry {
    tcbs: HashMap<i64, TcbSharedPtr>,
}

impl NullTraceeRegistry {
    pub fn new() -> NullTraceeRegistry {
        NullTraceeRegistry {
            tcbs: HashMap::new(),
        }
    }
}

impl TraceeRegistry for NullTraceeRegistry {
    fn alloctcb(&mut self, pid: i64) -> TcbSharedPtr {
        let tcb = Rc::new(RefCell::new(Tcb {
            pid,
            flags: TraceeFlags::empty(),
            scno: 0,
            currpers: Personality::X86_64,
            s_prev_ent: 0,
            s_ent: 0,
        }));
        self.tcbs.insert(pid, Rc::clone(&tcb));
        log!(crate::log::LogDebug, "registered tracee pid={:#x}", pid);
        tcb
    }

    fn droptcb(&mut self, pid: i64) {
        self.tcbs.remove(&pid);
        log!(crate::log::LogDebug, "dropped tracee pid={:#x}", pid);
    }

    fn pid2tcb(&self, pid: i64) -> Option<TcbSharedPtr> {
        self.tcbs.get(&pid).map(Rc::clone)
    }

    fn newoutf(&mut self, tcp: &TcbSharedPtr) {
        log!(
            crate::log::LogDebug,
            "newoutf for pid={:#x}",
            tcp.borrow().pid
        );
    }
}

/// A decoder that does no real register/syscall-table decoding; it logs
/// the dispatch it was asked to perform, in the shape a real decoder's
/// would take.
#[derive(Default)]
pub struct LoggingSyscallDecoder;

impl LoggingSyscallDecoder {
    pub fn new() -> LoggingSyscallDecoder {
        LoggingSyscallDecoder
    }
}

impl SyscallDecoder for LoggingSyscallDecoder {
    fn get_regs(&mut self, tid: i64) {
        log!(crate::log::LogDebug, "get_regs(tid={:#x})", tid);
    }

    fn get_scno(&self, tcp: &TcbSharedPtr) -> u64 {
        tcp.borrow().scno
    }

    /// A real decoder tracks its own notion of "is this thread currently
    /// inside a syscall it already reported entry for", independent of
    /// `TraceeFlags`. This stand-in has no such state, so it always reports
    /// exiting — every `syscall-return` it sees gets dispatched.
    fn exiting(&self, _tcp: &TcbSharedPtr) -> bool {
        true
    }

    fn trace_syscall(&mut self, tcp: &TcbSharedPtr) {
        let t = tcp.borrow();
        log!(
            crate::log::LogInfo,
            "pid={:#x} scno={:#x} insyscall={}",
            t.pid,
            t.scno,
            t.flags.contains(TraceeFlags::INSYSCALL)
        );
    }

    fn print_stopped(&mut self, tcp: &TcbSharedPtr, siginfo: Option<&[u8]>, target_sig: i32) {
        log!(
            crate::log::LogInfo,
            "pid={:#x} stopped by signal {} (siginfo {})",
            tcp.borrow().pid,
            target_sig,
            if siginfo.is_some() { "present" } else { "absent" }
        );
    }

    fn print_exited(&mut self, tcp: &TcbSharedPtr, status: i32) {
        log!(
            crate::log::LogInfo,
            "pid={:#x} exited, status={:#x}",
            tcp.borrow().pid,
            status
        );
    }

    fn print_signalled(&mut self, tcp: &TcbSharedPtr, status: i32) {
        log!(
            crate::log::LogInfo,
            "pid={:#x} terminated by signal, status={:#x}",
            tcp.borrow().pid,
            status
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn w_exitcode_packs_code_and_signal() {
        assert_eq!(w_exitcode(0, 0), 0);
        assert_eq!(w_exitcode(1, 0), 0x100);
        assert_eq!(w_exitcode(0, 9), 9);
    }

    #[test]
    fn registry_round_trips() {
        let mut reg = NullTraceeRegistry::new();
        let tcb = reg.alloctcb(0x1234);
        assert_eq!(tcb.borrow().pid, 0x1234);
        assert!(reg.pid2tcb(0x1234).is_some());
        reg.droptcb(0x1234);
        assert!(reg.pid2tcb(0x1234).is_none());
    }
}
