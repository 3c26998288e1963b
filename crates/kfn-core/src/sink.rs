use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

/// Renders sink activity for the user. Implemented by the presentation
/// layer; the registry works without one.
pub trait SinkWriter: Send + Sync {
    fn append(&self, sink: &str, text: &str);
    fn clear(&self, sink: &str);
    /// Bring the sink to the foreground.
    fn show(&self, sink: &str);
}

/// Writer that renders nothing.
pub struct NullWriter;

impl SinkWriter for NullWriter {
    fn append(&self, _sink: &str, _text: &str) {}
    fn clear(&self, _sink: &str) {}
    fn show(&self, _sink: &str) {}
}

/// Which lifecycle operation a sink belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Invocation,
    Deployment,
    Logs,
}

impl SinkKind {
    /// Sink name for a function: `<id>`, `<id>-deployment` or `<id>-logs`.
    pub fn key(self, function_id: &str) -> String {
        match self {
            SinkKind::Invocation => function_id.to_string(),
            SinkKind::Deployment => format!("{function_id}-deployment"),
            SinkKind::Logs => format!("{function_id}-logs"),
        }
    }
}

/// A named, ordered text stream.
pub struct OutputSink {
    name: String,
    buffer: Mutex<String>,
    writer: Arc<dyn SinkWriter>,
}

impl OutputSink {
    fn new(name: String, writer: Arc<dyn SinkWriter>) -> Self {
        Self {
            name,
            buffer: Mutex::new(String::new()),
            writer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&self, text: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(text);
        self.writer.append(&self.name, text);
    }

    /// Append `text` followed by a newline.
    pub fn append_line(&self, text: &str) {
        self.append(&format!("{text}\n"));
    }

    pub fn clear(&self) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.clear();
        self.writer.clear(&self.name);
    }

    pub fn show(&self) {
        self.writer.show(&self.name);
    }

    /// Everything appended since creation or the last `clear`.
    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSink").field("name", &self.name).finish()
    }
}

/// Session-wide registry of output sinks.
///
/// Sinks are created on first request and live as long as the registry.
/// Asking for an existing name hands back the same `Arc`, so concurrent
/// operations writing to one name share one stream.
pub struct SinkRegistry {
    sinks: RwLock<HashMap<String, Arc<OutputSink>>>,
    writer: Arc<dyn SinkWriter>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::with_writer(Arc::new(NullWriter))
    }

    pub fn with_writer(writer: Arc<dyn SinkWriter>) -> Self {
        Self {
            sinks: RwLock::new(HashMap::new()),
            writer,
        }
    }

    pub async fn get_or_create(&self, name: &str) -> Arc<OutputSink> {
        {
            let sinks = self.sinks.read().await;
            if let Some(sink) = sinks.get(name) {
                return sink.clone();
            }
        }

        let mut sinks = self.sinks.write().await;
        sinks
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(sink = name, "Output sink created");
                Arc::new(OutputSink::new(name.to_string(), self.writer.clone()))
            })
            .clone()
    }

    /// Like [`get_or_create`](Self::get_or_create), but an existing sink is
    /// cleared first.
    pub async fn reset(&self, name: &str) -> Arc<OutputSink> {
        let mut sinks = self.sinks.write().await;
        if let Some(sink) = sinks.get(name) {
            sink.clear();
            return sink.clone();
        }
        let sink = Arc::new(OutputSink::new(name.to_string(), self.writer.clone()));
        sinks.insert(name.to_string(), sink.clone());
        sink
    }

    pub async fn get(&self, name: &str) -> Option<Arc<OutputSink>> {
        self.sinks.read().await.get(name).cloned()
    }

    /// Sink names in sorted order.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sinks.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingWriter {
        events: Mutex<Vec<String>>,
    }

    impl SinkWriter for RecordingWriter {
        fn append(&self, sink: &str, text: &str) {
            self.events.lock().unwrap().push(format!("append {sink} {text}"));
        }
        fn clear(&self, sink: &str) {
            self.events.lock().unwrap().push(format!("clear {sink}"));
        }
        fn show(&self, sink: &str) {
            self.events.lock().unwrap().push(format!("show {sink}"));
        }
    }

    #[test]
    fn keys_follow_operation_convention() {
        assert_eq!(SinkKind::Invocation.key("bar"), "bar");
        assert_eq!(SinkKind::Deployment.key("bar"), "bar-deployment");
        assert_eq!(SinkKind::Logs.key("bar"), "bar-logs");
    }

    #[tokio::test]
    async fn same_name_returns_same_sink() {
        let registry = SinkRegistry::new();
        let a = registry.get_or_create("bar").await;
        let b = registry.get_or_create("bar").await;
        assert!(Arc::ptr_eq(&a, &b));

        a.append("one ");
        b.append("two");
        assert_eq!(a.contents(), "one two");
        assert_eq!(registry.names().await, vec!["bar"]);
    }

    #[tokio::test]
    async fn reset_clears_existing_sink_without_replacing_it() {
        let registry = SinkRegistry::new();
        let first = registry.get_or_create("bar-logs").await;
        first.append("old line\n");

        let again = registry.reset("bar-logs").await;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.contents(), "");

        let fresh = registry.reset("baz-logs").await;
        assert_eq!(fresh.name(), "baz-logs");
        assert_eq!(registry.names().await.len(), 2);
    }

    #[tokio::test]
    async fn writer_sees_every_operation_in_order() {
        let writer = Arc::new(RecordingWriter::default());
        let registry = SinkRegistry::with_writer(writer.clone());

        let sink = registry.get_or_create("bar").await;
        sink.show();
        sink.append_line("Calling bar...");
        sink.clear();

        let events = writer.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["show bar", "append bar Calling bar...\n", "clear bar"]
        );
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_sink() {
        let registry = Arc::new(SinkRegistry::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create("shared").await.append(&format!("{i};"));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let sink = registry.get("shared").await.unwrap();
        assert_eq!(sink.contents().matches(';').count(), 16);
    }
}
