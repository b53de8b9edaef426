//! Scoped capture of everything a handler writes.
//!
//! While a [`CaptureGuard`] is alive, file descriptors 1 and 2 point at
//! anonymous in-memory files and `tracing` events from every thread go to a
//! private buffer. Dropping the guard (including during unwinding) puts the
//! original descriptors back and disarms the log sink.

use std::ffi::CStr;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

/// Only one capture may own the process streams at a time.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Buffer of the active capture. Events logged while it is empty are dropped.
static LOG_SINK: Mutex<Option<LogBuffer>> = Mutex::new(None);

static LOG_SINK_INSTALL: Once = Once::new();

/// Route `tracing` events from all threads into the active capture.
///
/// Installs the process-wide dispatcher once. Does nothing if another global
/// subscriber is already set.
pub fn install_log_sink() {
    LOG_SINK_INSTALL.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .event_format(LevelPrefixed)
            .with_writer(CaptureWriter)
            .with_max_level(Level::INFO)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn log_sink() -> MutexGuard<'static, Option<LogBuffer>> {
    LOG_SINK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Text captured from the three channels of one call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub logging: String,
}

impl CapturedOutput {
    /// Concatenate stdout, stderr and logging output, in that order.
    pub fn into_logs(self) -> String {
        let mut logs = self.stdout;
        logs.push_str(&self.stderr);
        logs.push_str(&self.logging);
        logs
    }
}

/// Run `f` with all of its output captured.
pub fn capture<T>(f: impl FnOnce() -> T) -> io::Result<(T, CapturedOutput)> {
    let guard = CaptureGuard::install()?;
    let value = f();
    let output = guard.finish()?;
    Ok((value, output))
}

/// Exclusive ownership of stdout, stderr and the `tracing` sink.
///
/// Fields drop in declaration order: the log sink is disarmed first, then
/// both descriptors are restored, then the capture slot is released.
pub struct CaptureGuard {
    logging: ArmedSink,
    stdout: Redirect,
    stderr: Redirect,
    _active: ActiveSlot,
}

impl CaptureGuard {
    pub fn install() -> io::Result<Self> {
        install_log_sink();
        let active = ActiveSlot::acquire()?;
        let stdout = Redirect::install(libc::STDOUT_FILENO, c"harness-stdout")?;
        let stderr = Redirect::install(libc::STDERR_FILENO, c"harness-stderr")?;

        Ok(Self {
            logging: ArmedSink::arm(),
            stdout,
            stderr,
            _active: active,
        })
    }

    /// Restore the original streams and return what was captured.
    pub fn finish(mut self) -> io::Result<CapturedOutput> {
        self.stdout.restore()?;
        self.stderr.restore()?;
        Ok(CapturedOutput {
            stdout: self.stdout.contents()?,
            stderr: self.stderr.contents()?,
            logging: self.logging.disarm(),
        })
    }
}

struct ActiveSlot;

impl ActiveSlot {
    fn acquire() -> io::Result<Self> {
        ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| io::Error::other("output capture is already active"))
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Release);
    }
}

/// The log buffer of one capture, armed in [`LOG_SINK`] while alive.
struct ArmedSink(LogBuffer);

impl ArmedSink {
    fn arm() -> Self {
        let buffer = LogBuffer::default();
        *log_sink() = Some(buffer.clone());
        Self(buffer)
    }

    /// Stop collecting and return what was logged.
    fn disarm(&mut self) -> String {
        *log_sink() = None;
        self.0.contents()
    }
}

impl Drop for ArmedSink {
    fn drop(&mut self) {
        *log_sink() = None;
    }
}

/// One standard descriptor pointed at an in-memory file.
struct Redirect {
    target: RawFd,
    saved: OwnedFd,
    sink: File,
    restored: bool,
}

impl Redirect {
    fn install(target: RawFd, name: &CStr) -> io::Result<Self> {
        let sink = memory_file(name)?;
        flush_std(target);

        // SAFETY: duplicating a descriptor number has no memory-safety
        // preconditions. CLOEXEC keeps the real stream out of handler children.
        let saved = unsafe { libc::fcntl(target, libc::F_DUPFD_CLOEXEC, 0) };
        if saved < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `saved` was just returned by fcntl and is owned by nobody else.
        let saved = unsafe { OwnedFd::from_raw_fd(saved) };

        // SAFETY: both descriptors are open for the duration of the call.
        if unsafe { libc::dup2(sink.as_raw_fd(), target) } < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            target,
            saved,
            sink,
            restored: false,
        })
    }

    fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        flush_std(self.target);
        // SAFETY: `saved` is owned by this struct and still open.
        if unsafe { libc::dup2(self.saved.as_raw_fd(), self.target) } < 0 {
            return Err(io::Error::last_os_error());
        }
        self.restored = true;
        Ok(())
    }

    fn contents(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for Redirect {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// Push anything buffered by `std::io` into the descriptor before it is swapped.
fn flush_std(target: RawFd) {
    if target == libc::STDOUT_FILENO {
        let _ = io::stdout().flush();
    } else {
        let _ = io::stderr().flush();
    }
}

#[cfg(target_os = "linux")]
fn memory_file(name: &CStr) -> io::Result<File> {
    // SAFETY: `name` is a valid NUL-terminated string.
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return tempfile::tempfile();
    }
    // SAFETY: `fd` was just returned by memfd_create and is owned by nobody else.
    Ok(unsafe { File::from_raw_fd(fd) })
}

#[cfg(not(target_os = "linux"))]
fn memory_file(_name: &CStr) -> io::Result<File> {
    tempfile::tempfile()
}

/// In-memory text of the `tracing` events of one capture.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        let bytes = match self.0.lock() {
            Ok(bytes) => bytes,
            Err(poisoned) => poisoned.into_inner(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer handed to the global subscriber; forwards to the armed buffer.
struct CaptureWriter;

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter(log_sink().clone())
    }
}

struct SinkWriter(Option<LogBuffer>);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.0 {
            Some(buffer) => buffer.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Formats events as `LEVEL: message key=value`.
struct LevelPrefixed;

impl<S, N> FormatEvent<S, N> for LevelPrefixed
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{}: ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Serializes tests that redirect the process-wide descriptors.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
