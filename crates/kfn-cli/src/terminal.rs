use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use kfn_core::{SinkWriter, UserInterface};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

/// Prompts on stderr, answers from stdin. Answers given on the command line
/// are used instead of asking.
pub struct TerminalInterface {
    preset: Mutex<HashMap<String, String>>,
    stdin: tokio::sync::Mutex<BufReader<Stdin>>,
    had_error: AtomicBool,
}

impl TerminalInterface {
    pub fn new(preset: impl IntoIterator<Item = (&'static str, Option<String>)>) -> Self {
        let preset = preset
            .into_iter()
            .filter_map(|(prompt, answer)| answer.map(|a| (prompt.to_string(), a)))
            .collect();
        Self {
            preset: Mutex::new(preset),
            stdin: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin())),
            had_error: AtomicBool::new(false),
        }
    }

    /// Whether any error has been shown.
    pub fn had_error(&self) -> bool {
        self.had_error.load(Ordering::Relaxed)
    }

    /// One line from stdin. EOF or a read error counts as cancel.
    async fn read_answer(&self, prompt: &str) -> Option<String> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(format!("{prompt}: ").as_bytes()).await.ok()?;
        stderr.flush().await.ok()?;

        let mut line = String::new();
        match self.stdin.lock().await.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl UserInterface for TerminalInterface {
    fn ask<'a>(&'a self, prompt: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let preset = self
                .preset
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(prompt);
            match preset {
                Some(answer) => Some(answer),
                None => self.read_answer(prompt).await,
            }
        })
    }

    fn show_info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn show_error(&self, message: &str) {
        self.had_error.store(true, Ordering::Relaxed);
        eprintln!("error: {message}");
    }
}

/// Renders sinks on stdout. A `==> <sink>` header is printed whenever output
/// switches to a different sink.
#[derive(Default)]
pub struct TerminalWriter {
    current: Mutex<Option<String>>,
}

impl TerminalWriter {
    fn switch_to(&self, sink: &str, out: &mut impl Write) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_deref() != Some(sink) {
            let _ = writeln!(out, "==> {sink}");
            *current = Some(sink.to_string());
        }
    }
}

impl SinkWriter for TerminalWriter {
    fn append(&self, sink: &str, text: &str) {
        let mut out = std::io::stdout().lock();
        self.switch_to(sink, &mut out);
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn clear(&self, _sink: &str) {}

    fn show(&self, sink: &str) {
        let mut out = std::io::stdout().lock();
        self.switch_to(sink, &mut out);
        let _ = out.flush();
    }
}
