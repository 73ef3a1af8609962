//! Remote log shipping to Better Stack.
//!
//! The layer turns each event into a JSON record and hands it to an
//! unbounded channel; a background task drains the channel in batches and
//! posts them with the source token. Nothing on the logging path waits for
//! the network.

use std::error::Error as StdError;
use std::fmt;
use std::io::Write as _;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

const MAX_BATCH: usize = 100;
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One log line as sent to the ingestion endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    /// RFC 3339 timestamp.
    pub dt: String,
    /// Lower-case level name.
    pub level: String,
    /// Event target (module path).
    pub target: String,
    /// Rendered message.
    pub message: String,
    /// Remaining structured fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug)]
enum SinkMessage {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// `tracing` layer forwarding events to the log sink worker.
#[derive(Debug)]
pub struct LogSinkLayer {
    sender: mpsc::UnboundedSender<SinkMessage>,
}

/// Handle used to drain pending records before exit.
#[derive(Clone, Debug)]
pub struct LogSinkHandle {
    sender: mpsc::UnboundedSender<SinkMessage>,
}

impl LogSinkHandle {
    /// Waits until every record queued before this call has been posted, or
    /// until `timeout` elapses. Returns `true` when the worker acknowledged.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let (done, acknowledged) = oneshot::channel();
        if self.sender.send(SinkMessage::Flush(done)).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, acknowledged).await, Ok(Ok(())))
    }
}

/// Starts the delivery worker on `runtime` and returns the layer feeding it.
#[must_use]
pub fn spawn_log_sink(
    endpoint: String,
    token: String,
    runtime: &Handle,
) -> (LogSinkLayer, LogSinkHandle) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let worker = Worker {
        client: reqwest::Client::new(),
        endpoint,
        token,
    };
    runtime.spawn(worker.run(receiver));
    (
        LogSinkLayer {
            sender: sender.clone(),
        },
        LogSinkHandle { sender },
    )
}

struct Worker {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<SinkMessage>) {
        while let Some(first) = receiver.recv().await {
            let mut batch = Vec::new();
            let mut waiters = Vec::new();
            let mut next = Some(first);
            while let Some(message) = next.take() {
                match message {
                    SinkMessage::Record(record) => batch.push(record),
                    SinkMessage::Flush(waiter) => waiters.push(waiter),
                }
                if batch.len() < MAX_BATCH {
                    next = receiver.try_recv().ok();
                }
            }

            if !batch.is_empty() {
                self.deliver(&batch).await;
            }
            for waiter in waiters {
                waiter.send(()).ok();
            }
        }
    }

    async fn deliver(&self, batch: &[LogRecord]) {
        let result = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .timeout(DELIVERY_TIMEOUT)
            .json(batch)
            .send()
            .await;
        // Logging from here would feed back into this sink.
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                writeln!(
                    std::io::stderr(),
                    "log sink rejected {} records with status {}",
                    batch.len(),
                    response.status()
                )
                .ok();
            }
            Err(err) => {
                writeln!(std::io::stderr(), "log sink delivery failed: {err}").ok();
            }
        }
    }
}

impl<S: Subscriber> Layer<S> for LogSinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        let record = LogRecord {
            dt: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: metadata.level().as_str().to_ascii_lowercase(),
            target: metadata.target().to_owned(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        };
        // A closed channel means the runtime is gone; the record is dropped.
        self.sender.send(SinkMessage::Record(record)).ok();
    }
}

#[derive(Debug, Default)]
struct RecordVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(text) => text,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_owned()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt as _;

    fn captured(emit: impl FnOnce()) -> Vec<LogRecord> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(LogSinkLayer { sender });
        tracing::subscriber::with_default(subscriber, emit);

        let mut records = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if let SinkMessage::Record(record) = message {
                records.push(record);
            }
        }
        records
    }

    #[test]
    fn layer_captures_message_level_and_fields() {
        let records = captured(|| {
            tracing::info!(vm = "vm-esmos", attempts = 2_u64, "VM Status: VM running");
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, "info");
        assert_eq!(record.message, "VM Status: VM running");
        assert_eq!(record.fields["vm"], "vm-esmos");
        assert_eq!(record.fields["attempts"], 2);
    }

    #[test]
    fn record_serialises_fields_inline() {
        let records = captured(|| tracing::error!(error = "boom", "Error in automation"));
        let json = serde_json::to_value(&records[0]).expect("serialise");

        assert_eq!(json["message"], "Error in automation");
        assert_eq!(json["level"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json["dt"].is_string());
    }
}
