//! Handlers compiled into `harness-exec`.
//!
//! `main.handler` is the reference quotient handler. The `demo` module holds
//! small handlers that drive an invocation down each of its outcomes.

mod demo;
mod quotient;

use harness_common::Registry;

/// Build the registry served by the execution process.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.module("main").register("handler", quotient::handler);
    demo::register(registry.module("demo"));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_all_handlers() {
        let registry = registry();
        for expected in [
            "main.handler",
            "demo.echo",
            "demo.context",
            "demo.null",
            "demo.sleep",
            "demo.streams",
            "demo.threads",
            "demo.fail",
            "demo.panic",
            "demo.abort",
            "demo.exit",
            "demo.hang",
            "demo.spawn_and_hang",
        ] {
            assert!(
                registry.resolve(expected).is_ok(),
                "{expected} is not registered"
            );
        }
    }
}
