//! Batch events and listeners
//!
//! Workers never touch front-end state. They publish [`BatchEvent`]s to the
//! registered [`BatchListener`]s; a front end typically installs one
//! [`ChannelListener`] and drains the receiver on its own thread.

use crate::batch::Outcome;
use crate::pixel_buffer::PixelBuffer;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Semantic tag carried by every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Info,
    Success,
    Warning,
    Error,
    Cancel,
    /// Terminal line of a run that finished cleanly.
    Complete,
}

impl LogTag {
    /// Fixed human-readable prefix shown in front of the message.
    pub fn prefix(self) -> &'static str {
        match self {
            LogTag::Info => "",
            LogTag::Success => "✔️ ",
            LogTag::Warning => "⚠️ ",
            LogTag::Error => "❌ ",
            LogTag::Cancel => "⛔️ ",
            LogTag::Complete => "✅ ",
        }
    }
}

/// Per-item notification. Outcome and (for `Done`) the filtered image travel
/// together, after the output file is fully written.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub file_name: String,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub outcome: Outcome,
    pub image: Option<Arc<PixelBuffer>>,
}

impl ProcessedImage {
    pub fn status(&self) -> &'static str {
        self.outcome.status_text()
    }
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Log { tag: LogTag, message: String },
    /// Percentage 0..=100. Non-decreasing within a run.
    Progress(u8),
    ItemProcessed(ProcessedImage),
    StateChanged(bool),
}

impl BatchEvent {
    /// The log line as a front end would print it, prefix included.
    pub fn display_line(&self) -> Option<String> {
        match self {
            BatchEvent::Log { tag, message } => Some(format!("{}{}", tag.prefix(), message)),
            _ => None,
        }
    }
}

pub trait BatchListener: Send + Sync {
    fn on_event(&self, event: &BatchEvent);
}

/// Forwards every event into an mpsc channel. A dropped receiver is ignored.
pub struct ChannelListener {
    tx: Mutex<Sender<BatchEvent>>,
}

impl ChannelListener {
    pub fn new(tx: Sender<BatchEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl BatchListener for ChannelListener {
    fn on_event(&self, event: &BatchEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event.clone());
        }
    }
}

/// Closure adapter, handy in tests and small front ends.
pub struct FnListener<F>(pub F);

impl<F> BatchListener for FnListener<F>
where
    F: Fn(&BatchEvent) + Send + Sync,
{
    fn on_event(&self, event: &BatchEvent) {
        (self.0)(event)
    }
}

/// Fan-out to every registered listener, mirroring log lines to `tracing`.
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    listeners: Arc<Mutex<Vec<Arc<dyn BatchListener>>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self, listener: Arc<dyn BatchListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub(crate) fn publish(&self, event: BatchEvent) {
        if let BatchEvent::Log { tag, message } = &event {
            match tag {
                LogTag::Info => tracing::info!("{}", message),
                LogTag::Success | LogTag::Complete => {
                    tracing::info!(result = "success", "{}", message)
                }
                LogTag::Warning | LogTag::Cancel => tracing::warn!("{}", message),
                LogTag::Error => tracing::error!("{}", message),
            }
        }

        // Snapshot so listeners may subscribe or call back into the
        // coordinator without deadlocking on the list.
        let listeners: Vec<Arc<dyn BatchListener>> = match self.listeners.lock() {
            Ok(l) => l.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for listener in &listeners {
            listener.on_event(&event);
        }
    }

    pub(crate) fn log(&self, tag: LogTag, message: impl Into<String>) {
        self.publish(BatchEvent::Log {
            tag,
            message: message.into(),
        });
    }
}
