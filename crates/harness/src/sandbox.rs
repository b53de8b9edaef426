//! The execution sandbox: load the payload, resolve the handler and call it
//! with its output captured. Every outcome becomes an [`ExecutionResult`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use harness_common::{ExecutionResult, Handler, InvocationRequest, Registry, millis};

use crate::capture;
use crate::error::ExecError;
use crate::loader;

thread_local! {
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
    static PANIC_REPORT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record handler panics for the result instead of printing them.
///
/// Panics outside a handler call still reach the previous hook.
pub fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if IN_HANDLER.with(Cell::get) {
            let report = format!(
                "handler {info}\n\nstack backtrace:\n{}",
                Backtrace::force_capture()
            );
            PANIC_REPORT.with(|slot| *slot.borrow_mut() = Some(report));
        } else {
            previous(info);
        }
    }));
}

/// Marks the current thread as running handler code.
struct HandlerScope;

impl HandlerScope {
    fn enter() -> Self {
        IN_HANDLER.with(|flag| flag.set(true));
        PANIC_REPORT.with(|slot| *slot.borrow_mut() = None);
        Self
    }
}

impl Drop for HandlerScope {
    fn drop(&mut self) {
        IN_HANDLER.with(|flag| flag.set(false));
    }
}

/// Load `payload`, resolve `reference` and invoke it.
///
/// The payload is validated before the handler is even looked up, so a bad
/// payload never reaches user code.
pub fn execute(registry: &Registry, reference: &str, payload: &Path) -> ExecutionResult {
    match prepare(registry, reference, payload) {
        Ok((handler, request)) => invoke(handler, &request),
        Err(e) => ExecutionResult::failure(e.to_string(), String::new(), 0),
    }
}

fn prepare<'r>(
    registry: &'r Registry,
    reference: &str,
    payload: &Path,
) -> Result<(&'r dyn Handler, InvocationRequest), ExecError> {
    let request = loader::load(payload)?;
    let handler = registry.resolve(reference)?;
    Ok((handler, request))
}

/// Call `handler` under output capture and time it with a monotonic clock.
pub fn invoke(handler: &dyn Handler, request: &InvocationRequest) -> ExecutionResult {
    let captured = capture::capture(|| {
        let _scope = HandlerScope::enter();
        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.call(&request.event, &request.context)
        }));
        (outcome, start.elapsed())
    });

    let ((outcome, elapsed), output) = match captured {
        Ok(captured) => captured,
        Err(e) => {
            return ExecutionResult::failure(ExecError::Capture(e).to_string(), String::new(), 0);
        }
    };
    let duration_ms = millis(elapsed);
    let logs = output.into_logs();

    match outcome {
        Ok(Ok(value)) => ExecutionResult::success(value, logs, duration_ms),
        Ok(Err(err)) => ExecutionResult::failure(format!("{err:?}"), logs, duration_ms),
        Err(payload) => {
            ExecutionResult::failure(panic_report(payload.as_ref()), logs, duration_ms)
        }
    }
}

fn panic_report(payload: &(dyn Any + Send)) -> String {
    if let Some(report) = PANIC_REPORT.with(|slot| slot.borrow_mut().take()) {
        return report;
    }
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("handler panicked: {message}")
}
