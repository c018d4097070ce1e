//! Signal/errno display helpers for log lines only — never used in wire
//! encoding. Ported in spirit (not verbatim; only the subset this crate's
//! logging needs) from `examples/khuey-rd/src/kernel_metadata.rs`'s
//! `signal_name`/`errno_name`.

/// `"SIGTRAP"` for 5, `"signal(35)"` for anything outside the known table.
pub fn signal_name(sig: i32) -> String {
    match sig {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        3 => "SIGQUIT".to_string(),
        4 => "SIGILL".to_string(),
        5 => "SIGTRAP".to_string(),
        6 => "SIGABRT".to_string(),
        7 => "SIGBUS".to_string(),
        8 => "SIGFPE".to_string(),
        9 => "SIGKILL".to_string(),
        10 => "SIGUSR1".to_string(),
        11 => "SIGSEGV".to_string(),
        12 => "SIGUSR2".to_string(),
        13 => "SIGPIPE".to_string(),
        14 => "SIGALRM".to_string(),
        15 => "SIGTERM".to_string(),
        17 => "SIGCHLD".to_string(),
        18 => "SIGCONT".to_string(),
        19 => "SIGSTOP".to_string(),
        _ => format!("signal({})", sig),
    }
}

/// `"ENOENT"` for 2, `"errno(61)"` for anything outside the known table.
pub fn errno_name(errno: i32) -> String {
    match errno {
        1 => "EPERM".to_string(),
        2 => "ENOENT".to_string(),
        3 => "ESRCH".to_string(),
        4 => "EINTR".to_string(),
        5 => "EIO".to_string(),
        9 => "EBADF".to_string(),
        11 => "EAGAIN".to_string(),
        12 => "ENOMEM".to_string(),
        13 => "EACCES".to_string(),
        14 => "EFAULT".to_string(),
        22 => "EINVAL".to_string(),
        _ => format!("errno({})", errno),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_signal_names() {
        assert_eq!(signal_name(5), "SIGTRAP");
        assert_eq!(signal_name(11), "SIGSEGV");
    }

    #[test]
    fn unknown_signal_falls_back_to_number() {
        assert_eq!(signal_name(200), "signal(200)");
    }

    #[test]
    fn known_errno_names() {
        assert_eq!(errno_name(2), "ENOENT");
        assert_eq!(errno_name(22), "EINVAL");
    }
}
