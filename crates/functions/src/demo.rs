//! Handlers used to exercise the harness end to end.

use std::time::Duration;

use anyhow::{Context as _, anyhow};
use harness_common::{Context, Event, Module};
use serde_json::{Value, json};
use tracing::info;

pub(crate) fn register(module: &mut Module) {
    module
        .register("echo", echo)
        .register("context", context)
        .register("null", null)
        .register("sleep", sleep)
        .register("streams", streams)
        .register("threads", threads)
        .register("fail", fail)
        .register("panic", panic)
        .register("abort", abort)
        .register("exit", exit)
        .register("hang", hang)
        .register("spawn_and_hang", spawn_and_hang);
}

fn echo(event: &Event, _context: &Context) -> anyhow::Result<Value> {
    Ok(Value::Object(event.clone()))
}

fn context(_event: &Event, context: &Context) -> anyhow::Result<Value> {
    Ok(Value::Object(context.clone()))
}

fn null(_event: &Event, _context: &Context) -> anyhow::Result<Value> {
    Ok(Value::Null)
}

/// Sleep for `event.ms` milliseconds.
fn sleep(event: &Event, _context: &Context) -> anyhow::Result<Value> {
    let ms = event.get("ms").and_then(Value::as_u64).unwrap_or(0);
    std::thread::sleep(Duration::from_millis(ms));
    Ok(json!({ "slept_ms": ms }))
}

/// Write to the channels in the reverse of their order in `logs`.
fn streams(_event: &Event, _context: &Context) -> anyhow::Result<Value> {
    info!("third in logs");
    eprintln!("second in logs");
    println!("first in logs");
    Ok(json!("streams"))
}

/// Log from the handler thread and from a worker it spawns.
fn threads(_event: &Event, _context: &Context) -> anyhow::Result<Value> {
    info!("logged by the handler thread");
    let worker = std::thread::spawn(|| {
        info!("logged by a worker thread");
        println!("printed by a worker thread");
    });
    worker
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))?;
    Ok(json!("threads"))
}

fn fail(_event: &Event, _context: &Context) -> anyhow::Result<Value> {
    Err(anyhow!("disk quota exceeded").context("cannot write report"))
}

#[allow(clippy::panic)]
fn panic(event: &Event, _context: &Context) -> anyhow::Result<Value> {
    panic!("handler gave up after {} fields", event.len());
}

fn abort(_event: &Event, _context: &Context) -> anyhow::Result<Value> {
    std::process::abort();
}

/// Leave the process without producing a result.
fn exit(event: &Event, _context: &Context) -> anyhow::Result<Value> {
    let code = event
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or(0);
    std::process::exit(code);
}

fn hang(_event: &Event, _context: &Context) -> anyhow::Result<Value> {
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

/// Start a long-lived child, record its pid in `event.pid_file`, then hang.
fn spawn_and_hang(event: &Event, ctx: &Context) -> anyhow::Result<Value> {
    let pid_file = event
        .get("pid_file")
        .and_then(Value::as_str)
        .context("event field `pid_file` must be a string")?;
    let child = std::process::Command::new("sleep")
        .arg("300")
        .spawn()
        .context("spawn sleep")?;
    std::fs::write(pid_file, child.id().to_string()).context("write pid file")?;
    hang(event, ctx)
}
