//! Signal map (spec.md §4.5): per-personality RSP-signal → target-signal
//! translation table, computed once at startup and immutable thereafter.
//!
//! `signame`/`nsignals` are external-tracer callbacks (spec.md §6); this
//! module only needs a closed set of personalities to index by, so the
//! contract is a small trait (`PersonalityCatalog`) the embedding tracer
//! implements. `StaticPersonalityCatalog` is the default/test double,
//! covering 32-bit and 64-bit x86 with the ordinary Linux signal table.

use std::collections::HashMap;

pub const GDB_SIGNAL_0: i32 = 0;
pub const GDB_SIGNAL_TRAP: i32 = 5;
pub const GDB_SIGNAL_REALTIME_32: i32 = 32;
pub const GDB_SIGNAL_REALTIME_33: i32 = 33;
pub const GDB_SIGNAL_REALTIME_63: i32 = 63;
pub const GDB_SIGNAL_REALTIME_64: i32 = 64;
pub const GDB_SIGNAL_REALTIME_127: i32 = 127;
pub const GDB_SIGNAL_LAST: i32 = 128;

/// A target-ABI flavor affecting signal numbering and syscall tables.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Personality {
    X86_32,
    X86_64,
}

pub const SUPPORTED_PERSONALITIES: [Personality; 2] = [Personality::X86_32, Personality::X86_64];

/// The external tracer's signal-name table and signal count, per
/// personality (spec.md §6: `signame`, `nsignals`).
pub trait PersonalityCatalog {
    fn nsignals(&self, personality: Personality) -> i32;
    fn signame(&self, personality: Personality, target_sig: i32) -> Option<&str>;
}

/// GDB's own RSP signal name table, standing in for the static name table
/// spec.md §4.5 step 5 refers to. Indices 1..=31 follow ordinary Linux
/// signal numbering, which is also what `StaticPersonalityCatalog` reports
/// through `signame`, so rule 6 resolves the common case directly.
fn gdb_signal_name(g: i32) -> Option<&'static str> {
    const NAMES: &[&str] = &[
        "SIGHUP", "SIGINT", "SIGQUIT", "SIGILL", "SIGTRAP", "SIGABRT", "SIGBUS", "SIGFPE",
        "SIGKILL", "SIGUSR1", "SIGSEGV", "SIGUSR2", "SIGPIPE", "SIGALRM", "SIGTERM", "SIGSTKFLT",
        "SIGCHLD", "SIGCONT", "SIGSTOP", "SIGTSTP", "SIGTTIN", "SIGTTOU", "SIGURG", "SIGXCPU",
        "SIGXFSZ", "SIGVTALRM", "SIGPROF", "SIGWINCH", "SIGIO", "SIGPWR", "SIGSYS",
    ];
    if g < 1 || g as usize > NAMES.len() {
        None
    } else {
        Some(NAMES[(g - 1) as usize])
    }
}

pub struct StaticPersonalityCatalog;

impl PersonalityCatalog for StaticPersonalityCatalog {
    fn nsignals(&self, _personality: Personality) -> i32 {
        65
    }

    fn signame(&self, _personality: Personality, target_sig: i32) -> Option<&str> {
        gdb_signal_name(target_sig)
    }
}

/// Precomputed `[personality][rsp_signal] -> target_signal | -1` table.
pub struct SignalMap {
    table: HashMap<(Personality, i32), i32>,
}

impl SignalMap {
    pub fn build(catalog: &dyn PersonalityCatalog) -> SignalMap {
        let mut table = HashMap::new();
        for &p in SUPPORTED_PERSONALITIES.iter() {
            for g in 0..GDB_SIGNAL_LAST {
                table.insert((p, g), translate_one(catalog, p, g));
            }
        }
        SignalMap { table }
    }

    /// `translate(personality, sig)`: `map[personality][sig]` with range
    /// checks; out-of-range inputs return `-1` rather than panicking, since
    /// a malformed stop-reply signal code is a data-plane concern, not a
    /// crash.
    pub fn translate(&self, personality: Personality, sig: i32) -> i32 {
        if sig < 0 || sig >= GDB_SIGNAL_LAST {
            return -1;
        }
        *self.table.get(&(personality, sig)).unwrap_or(&-1)
    }
}

fn translate_one(catalog: &dyn PersonalityCatalog, p: Personality, g: i32) -> i32 {
    if g == GDB_SIGNAL_0 {
        return 0;
    }
    if g == GDB_SIGNAL_REALTIME_32 {
        return 32;
    }
    if (GDB_SIGNAL_REALTIME_33..=GDB_SIGNAL_REALTIME_63).contains(&g) {
        return g - GDB_SIGNAL_REALTIME_33 + 33;
    }
    if (GDB_SIGNAL_REALTIME_64..=GDB_SIGNAL_REALTIME_127).contains(&g) {
        return g - GDB_SIGNAL_REALTIME_64 + 64;
    }
    let name = match gdb_signal_name(g) {
        Some(n) => n,
        None => return -1,
    };
    let nsignals = catalog.nsignals(p);
    if g < nsignals {
        if let Some(target_name) = catalog.signame(p, g) {
            if target_name == name {
                return g;
            }
        }
    }
    for candidate in 1..nsignals {
        if candidate == g {
            continue;
        }
        if let Some(target_name) = catalog.signame(p, candidate) {
            if target_name == name {
                return candidate;
            }
        }
    }
    -1
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gdb_signal_0_maps_to_zero() {
        let map = SignalMap::build(&StaticPersonalityCatalog);
        assert_eq!(map.translate(Personality::X86_64, GDB_SIGNAL_0), 0);
    }

    #[test]
    fn realtime_32_maps_to_32() {
        let map = SignalMap::build(&StaticPersonalityCatalog);
        assert_eq!(
            map.translate(Personality::X86_64, GDB_SIGNAL_REALTIME_32),
            32
        );
    }

    #[test]
    fn realtime_33_to_63_map_contiguously() {
        let map = SignalMap::build(&StaticPersonalityCatalog);
        assert_eq!(
            map.translate(Personality::X86_64, GDB_SIGNAL_REALTIME_33),
            33
        );
        assert_eq!(
            map.translate(Personality::X86_64, GDB_SIGNAL_REALTIME_63),
            63
        );
    }

    #[test]
    fn realtime_64_to_127_map_contiguously() {
        let map = SignalMap::build(&StaticPersonalityCatalog);
        assert_eq!(
            map.translate(Personality::X86_64, GDB_SIGNAL_REALTIME_64),
            64
        );
        assert_eq!(
            map.translate(Personality::X86_64, GDB_SIGNAL_REALTIME_127),
            127
        );
    }

    #[test]
    fn trap_maps_to_same_number_on_native_personality() {
        let map = SignalMap::build(&StaticPersonalityCatalog);
        assert_eq!(
            map.translate(Personality::X86_64, GDB_SIGNAL_TRAP),
            GDB_SIGNAL_TRAP
        );
    }

    #[test]
    fn out_of_range_signal_is_unmapped() {
        let map = SignalMap::build(&StaticPersonalityCatalog);
        assert_eq!(map.translate(Personality::X86_64, 200), -1);
        assert_eq!(map.translate(Personality::X86_64, -1), -1);
    }

    #[test]
    fn idempotent_on_shared_names() {
        let map = SignalMap::build(&StaticPersonalityCatalog);
        let t = map.translate(Personality::X86_64, 11); // SIGSEGV
        let back = map.translate(Personality::X86_64, t);
        assert_eq!(back, t);
    }
}
