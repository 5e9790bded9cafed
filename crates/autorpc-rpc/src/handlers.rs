//! Demo handler types hosted by the `serve` command.
//!
//! The same types back the `call` command: a client proxy is built from the
//! handler whose exports include the requested method.

use autorpc::{
    Exports, HandlerError, HandlerSet, RemoteHandler, SerializationHooks, Utf8BytesDecoder,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Service name used when none is given on the command line.
pub const DEFAULT_SERVICE: &str = "text_processor";

/// Stateless text utilities.
#[derive(Debug, Default)]
pub struct TextProcessor;

impl TextProcessor {
    fn process(&self, arg: &str) -> String {
        format!("Processed! (arg='{}')", arg)
    }
}

impl RemoteHandler for TextProcessor {
    fn export(exports: &mut Exports<Self>) {
        exports
            .method("process", |this, call| {
                let arg: String = call.require(0, "arg")?;
                Ok(json!(this.process(&arg)))
            })
            .method("word_count", |_, call| {
                let text: String = call.require(0, "text")?;
                Ok(json!(text.split_whitespace().count()))
            })
            .method("mean", |_, call| {
                let values: Vec<f64> = call.require(0, "values")?;
                if values.is_empty() {
                    return Err(HandlerError::new("value_error", "mean of empty sequence"));
                }
                Ok(json!(values.iter().sum::<f64>() / values.len() as f64))
            })
            .method_with(
                "process_bytes",
                SerializationHooks::new().with_decoder(Utf8BytesDecoder),
                |this, call| {
                    let arg: String = call.require(0, "arg")?;
                    Ok(json!(this.process(&arg)))
                },
            )
            .method("fail", |_, call| {
                let message = call.get_str(0, "message").unwrap_or("requested failure");
                Err(HandlerError::new("value_error", message))
            });
    }
}

/// Shared counter. Its `process` is shadowed when served after
/// [`TextProcessor`].
#[derive(Debug, Default)]
pub struct Counter {
    total: AtomicU64,
}

impl RemoteHandler for Counter {
    fn export(exports: &mut Exports<Self>) {
        exports
            .method("increment", |this, call| {
                let by: u64 = call
                    .get(0, "by")
                    .map(|v| serde_json::from_value(v.clone()))
                    .transpose()?
                    .unwrap_or(1);
                let previous = this
                    .total
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| t.checked_add(by))
                    .map_err(|current| {
                        HandlerError::new(
                            "overflow_error",
                            format!("cannot add {} to total {}", by, current),
                        )
                    })?;
                Ok(json!(previous + by))
            })
            .method("total", |this, _| Ok(json!(this.total.load(Ordering::SeqCst))))
            .method("process", |this, _| {
                Ok(json!(format!("counted {}", this.total.load(Ordering::SeqCst))))
            });
    }
}

/// Handler set served by the demo server, in registration order.
pub fn demo_handlers() -> HandlerSet {
    HandlerSet::new()
        .with(Arc::new(TextProcessor))
        .with(Arc::new(Counter::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autorpc::{DispatchTable, Envelope};

    #[test]
    fn test_demo_handlers_shadow_counter_process() {
        let handlers = demo_handlers();
        let table = DispatchTable::build(&handlers);

        let process = table.route("process").unwrap();
        let result = process.invoke(&Envelope::new().arg("x")).unwrap();
        assert_eq!(result, json!("Processed! (arg='x')"));
        assert!(table.route("increment").is_some());
    }

    #[test]
    fn test_counter_increments() {
        let handlers = HandlerSet::new().with(Arc::new(Counter::default()));
        let table = DispatchTable::build(&handlers);
        let increment = table.route("increment").unwrap();

        assert_eq!(increment.invoke(&Envelope::new()).unwrap(), json!(1));
        assert_eq!(increment.invoke(&Envelope::new().arg(4)).unwrap(), json!(5));
    }

    #[test]
    fn test_counter_overflow_is_a_handler_error() {
        let handlers = HandlerSet::new().with(Arc::new(Counter::default()));
        let table = DispatchTable::build(&handlers);
        let increment = table.route("increment").unwrap();

        let max = Envelope::new().arg(u64::MAX);
        assert_eq!(increment.invoke(&max).unwrap(), json!(u64::MAX));

        let err = increment.invoke(&max).unwrap_err();
        assert_eq!(err.kind, "overflow_error");
        // The total is left untouched.
        let total = table.route("total").unwrap();
        assert_eq!(total.invoke(&Envelope::new()).unwrap(), json!(u64::MAX));
    }

    #[test]
    fn test_mean_rejects_empty_input() {
        let handlers = HandlerSet::new().with(Arc::new(TextProcessor));
        let table = DispatchTable::build(&handlers);
        let err = table
            .route("mean")
            .unwrap()
            .invoke(&Envelope::new().arg(json!([])))
            .unwrap_err();
        assert_eq!(err.kind, "value_error");
    }
}
