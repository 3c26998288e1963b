use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// The presentation layer as seen by the lifecycle core: free-text prompts
/// and user-visible messages.
///
/// Uses `Pin<Box<dyn Future>>` so it can live behind `Arc<dyn ..>`.
pub trait UserInterface: Send + Sync {
    /// Ask for a line of input. `None` means the user cancelled.
    fn ask<'a>(&'a self, prompt: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

    fn show_info(&self, message: &str);

    fn show_error(&self, message: &str);
}

/// A message shown through [`ScriptedInterface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Info(String),
    Error(String),
}

/// Answers prompts from a fixed script and records everything shown.
///
/// Used for non-interactive runs, where answers come from the command line,
/// and in tests. Running out of answers counts as a cancelled prompt.
#[derive(Default)]
pub struct ScriptedInterface {
    answers: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
    shown: Mutex<Vec<Shown>>,
}

impl ScriptedInterface {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| a.map(Into::into)).collect()),
            ..Self::default()
        }
    }

    /// Every prompt asked so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every message shown so far.
    pub fn shown(&self) -> Vec<Shown> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|m| match m {
                Shown::Error(e) => Some(e),
                Shown::Info(_) => None,
            })
            .collect()
    }
}

impl UserInterface for ScriptedInterface {
    fn ask<'a>(&'a self, prompt: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            self.prompts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(prompt.to_string());
            self.answers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .flatten()
        })
    }

    fn show_info(&self, message: &str) {
        tracing::info!(message, "info shown");
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Shown::Info(message.to_string()));
    }

    fn show_error(&self, message: &str) {
        tracing::warn!(message, "error shown");
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Shown::Error(message.to_string()));
    }
}
