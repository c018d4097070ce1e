use backtrace::Backtrace;
use std::collections::HashMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::io::{BufWriter, Result};
use std::path::Path;
use std::sync::Mutex;
use std::sync::MutexGuard;

#[derive(Clone)]
struct LogModule {
    name: String,
    level: LogLevel,
}

#[derive(Copy, Clone, Eq, PartialEq, PartialOrd)]
pub enum LogLevel {
    LogFatal,
    LogError,
    LogWarn,
    LogInfo,
    LogDebug,
}

pub use LogLevel::*;

struct LogGlobals {
    level_map: HashMap<String, LogLevel>,
    log_modules_cache: HashMap<String, LogModule>,
    log_file: Box<dyn Write + Send>,
    default_level: LogLevel,
}

lazy_static! {
    static ref LOG_GLOBALS: Mutex<LogGlobals> = {
        let maybe_filename = std::env::var("RSP_TRACE_LOG_FILE").ok();
        let maybe_append_filename = std::env::var("RSP_TRACE_APPEND_LOG_FILE").ok();
        let mut f: Box<dyn Write + Send>;
        if let Some(filename) = maybe_filename {
            f = Box::new(File::create(&filename).unwrap());
        } else if let Some(append_filename) = maybe_append_filename {
            f = Box::new(
                OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&append_filename)
                    .unwrap(),
            );
        } else {
            f = Box::new(io::stderr());
        }

        if let Some(buf_size) = std::env::var("RSP_TRACE_LOG_BUFFER").ok() {
            let log_buffer_size = buf_size.parse::<usize>().unwrap();
            f = Box::new(BufWriter::with_capacity(log_buffer_size, f));
        }

        let default_level = match std::env::var("RSP_TRACE_LOG").ok().as_deref() {
            Some("debug") => LogDebug,
            Some("info") => LogInfo,
            Some("warn") => LogWarn,
            _ => LogError,
        };

        Mutex::new(LogGlobals {
            level_map: HashMap::new(),
            log_modules_cache: HashMap::new(),
            log_file: f,
            default_level,
        })
    };
}

fn get_log_level(module_name: &str, l: &MutexGuard<LogGlobals>) -> LogLevel {
    match l.level_map.get(module_name) {
        Some(log_level) => *log_level,
        None => l.default_level,
    }
}

fn filename_to_module_name(filename: &str) -> String {
    let path = Path::new(filename);
    path.file_stem().unwrap().to_string_lossy().to_string()
}

fn get_log_module(filename: &str, l: &mut MutexGuard<LogGlobals>) -> LogModule {
    match l.log_modules_cache.get(filename) {
        Some(log_module) => log_module.to_owned(),
        None => {
            let name = filename_to_module_name(filename);
            let level = get_log_level(&name, l);
            let m = LogModule { level, name };
            l.log_modules_cache.insert(filename.to_owned(), m.clone());
            m
        }
    }
}

fn log_name(level: LogLevel) -> &'static str {
    match level {
        LogFatal => "FATAL",
        LogError => "ERROR",
        LogWarn => "WARN",
        LogInfo => "INFO",
        LogDebug => "DEBUG",
    }
}

pub struct NewLineTerminatingOstream {
    enabled: bool,
    message: Vec<u8>,
    lock: MutexGuard<'static, LogGlobals>,
}

impl NewLineTerminatingOstream {
    fn new(
        level: LogLevel,
        filename: &str,
        line: u32,
        func_name: &str,
    ) -> NewLineTerminatingOstream {
        let mut lock = LOG_GLOBALS.lock().unwrap();
        let m = get_log_module(filename, &mut lock);
        let enabled = level == LogFatal || level <= m.level;
        let mut this = NewLineTerminatingOstream {
            message: Vec::new(),
            enabled,
            lock,
        };
        if enabled {
            if level == LogDebug {
                write!(this, "[{}]", m.name).unwrap();
            } else {
                write_prefix(&mut this, level, filename, line, func_name);
            }
        }
        this
    }
}

fn write_prefix(
    stream: &mut dyn Write,
    level: LogLevel,
    filename: &str,
    line: u32,
    func_name: &str,
) {
    write!(stream, "[{}] ", log_name(level)).unwrap();
    if level <= LogError {
        write!(stream, "{}:{} ", filename, line).unwrap();
    }
    write!(stream, "{}() ", func_name).unwrap();
}

impl Drop for NewLineTerminatingOstream {
    fn drop(&mut self) {
        if self.enabled {
            let _ = self.write(b"\n");
            let _ = self.flush();
        }
    }
}

impl Write for NewLineTerminatingOstream {
    fn flush(&mut self) -> Result<()> {
        if !self.message.is_empty() && self.enabled {
            self.lock.log_file.write_all(&self.message)?;
            self.lock.log_file.flush()?;
        }
        self.message.clear();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.enabled {
            self.message.extend_from_slice(buf);
        }
        Ok(buf.len())
    }
}

pub fn log(
    log_level: LogLevel,
    filename: &str,
    line: u32,
    module_path: &str,
) -> NewLineTerminatingOstream {
    NewLineTerminatingOstream::new(log_level, filename, line, module_path)
}

pub fn notifying_abort(bt: Backtrace) -> ! {
    write!(io::stderr(), "=== Start rsp-trace-core backtrace:\n").unwrap();
    write!(io::stderr(), "{:?}", bt).unwrap();
    write!(io::stderr(), "=== End rsp-trace-core backtrace\n").unwrap();
    std::process::abort();
}

#[macro_export]
macro_rules! log {
    ($log_level:expr, $($args:tt)*) => {{
        use std::io::Write;
        let mut stream = $crate::log::log(
            $log_level,
            file!(),
            line!(),
            module_path!()
        );
        write!(stream, $($args)*).unwrap()
    }};
}

#[macro_export]
macro_rules! fatal {
    ($($args:tt)+) => {{
        {
            use std::io::Write;
            let mut stream = $crate::log::log(
                $crate::log::LogLevel::LogFatal,
                file!(),
                line!(),
                module_path!()
            );
            write!(stream, $($args)+).unwrap();
        }
        $crate::log::notifying_abort(backtrace::Backtrace::new())
    }};
}
