//! Request orchestration
//!
//! The interpreter's mode is fixed once from the startup [`LoadOutcome`]:
//!
//! | Outcome  | Fallback enabled | Mode          |
//! |----------|------------------|---------------|
//! | Loaded   | any              | `Model`       |
//! | Skipped  | yes              | `Fallback`    |
//! | Failed   | yes              | `Fallback`    |
//! | Skipped  | no               | `Unavailable` |
//! | Failed   | no               | `Unavailable` |
//!
//! Every call records its own [`InferenceLog`]. The most recent one is also
//! kept on the interpreter for the CLI summary, replaced as soon as a call is
//! accepted and again when it completes.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SomniaError};
use crate::fallback::FallbackAnalyzer;
use crate::model::{EngineInfo, ModelEngine};

/// Message returned when nothing can answer
pub const UNAVAILABLE_MESSAGE: &str = "AI Model not initialized";

/// Message returned for missing or blank text
pub const EMPTY_TEXT_MESSAGE: &str = "No text provided";

/// Ordered, human-readable steps of one interpretation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferenceLog {
    steps: Vec<String>,
}

impl InferenceLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn step(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(step = self.steps.len() + 1, "{message}");
        self.steps.push(message);
    }

    /// Steps in order
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Numbered listing, one step per line
    #[must_use]
    pub fn summary(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{:2}. {s}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Which path produced an interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Generated by the language model
    Model,
    /// Produced by the keyword analyzer
    Fallback,
}

/// Result of startup model loading
#[derive(Debug)]
pub enum LoadOutcome {
    /// Model ready
    Loaded(ModelEngine),
    /// Loading was not attempted
    Skipped,
    /// Loading failed
    Failed(SomniaError),
}

/// How requests are answered for the life of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpreterMode {
    /// Language model
    Model,
    /// Keyword analyzer
    Fallback,
    /// Every request fails with 503
    Unavailable,
}

impl InterpreterMode {
    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Fallback => "fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

/// One completed interpretation
#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    /// Interpretation text
    pub text: String,
    /// Producing path
    pub source: Source,
    /// Steps taken for this call
    pub log: InferenceLog,
    /// Wall-clock time spent
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Dream interpreter shared by all requests
#[derive(Debug)]
pub struct DreamInterpreter {
    mode: InterpreterMode,
    engine: Option<ModelEngine>,
    fallback: FallbackAnalyzer,
    load_error: Option<String>,
    last_log: Mutex<InferenceLog>,
}

impl DreamInterpreter {
    /// Fix the mode from the startup outcome
    #[must_use]
    pub fn from_outcome(outcome: LoadOutcome, fallback_enabled: bool) -> Self {
        let degraded = if fallback_enabled {
            InterpreterMode::Fallback
        } else {
            InterpreterMode::Unavailable
        };

        let (mode, engine, load_error) = match outcome {
            LoadOutcome::Loaded(engine) => (InterpreterMode::Model, Some(engine), None),
            LoadOutcome::Skipped => {
                info!(mode = degraded.as_str(), "Model loading skipped");
                (degraded, None, None)
            },
            LoadOutcome::Failed(e) => {
                warn!(error = %e, mode = degraded.as_str(), "Model unavailable");
                (degraded, None, Some(e.to_string()))
            },
        };

        Self {
            mode,
            engine,
            fallback: FallbackAnalyzer::new(),
            load_error,
            last_log: Mutex::new(InferenceLog::new()),
        }
    }

    /// Interpreter backed by a loaded engine
    #[must_use]
    pub fn with_engine(engine: ModelEngine) -> Self {
        Self::from_outcome(LoadOutcome::Loaded(engine), true)
    }

    /// Interpreter that only uses the keyword analyzer
    #[must_use]
    pub fn fallback_only() -> Self {
        Self::from_outcome(LoadOutcome::Skipped, true)
    }

    /// Interpreter that rejects every request
    #[must_use]
    pub fn unavailable() -> Self {
        Self::from_outcome(LoadOutcome::Skipped, false)
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> InterpreterMode {
        self.mode
    }

    /// Whether a model is loaded
    #[must_use]
    pub fn model_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Loaded model description
    #[must_use]
    pub fn engine_info(&self) -> Option<&EngineInfo> {
        self.engine.as_ref().map(ModelEngine::info)
    }

    /// Why loading failed, if it did
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Log of the most recent call
    #[must_use]
    pub fn last_log(&self) -> InferenceLog {
        self.last_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Interpret one dream description
    ///
    /// Blocks for the whole generation when a model is loaded.
    ///
    /// # Errors
    ///
    /// - [`SomniaError::Validation`] for blank text
    /// - [`SomniaError::Unavailable`] when neither model nor fallback exist
    /// - model-path failures (tokenizer, template, inference)
    pub fn interpret(&self, text: &str) -> Result<Interpretation> {
        if text.trim().is_empty() {
            return Err(SomniaError::Validation(EMPTY_TEXT_MESSAGE.to_string()));
        }

        let start = Instant::now();
        let mut log = InferenceLog::new();
        log.step(format!("Received dream description: {}", preview(text, 50)));
        self.store_log(&log);

        let result = self.run(text, &mut log);
        let elapsed = start.elapsed();
        self.store_log(&log);

        let (text, source) = result?;
        info!(
            source = ?source,
            elapsed_ms = elapsed.as_millis() as u64,
            chars = text.chars().count(),
            "Interpretation complete"
        );
        Ok(Interpretation {
            text,
            source,
            log,
            elapsed,
        })
    }

    fn store_log(&self, log: &InferenceLog) {
        if let Ok(mut last) = self.last_log.lock() {
            *last = log.clone();
        }
    }

    fn run(&self, text: &str, log: &mut InferenceLog) -> Result<(String, Source)> {
        match (self.mode, &self.engine) {
            (InterpreterMode::Model, Some(engine)) => {
                Ok((engine.interpret(text, log)?, Source::Model))
            },
            (InterpreterMode::Fallback, _) => {
                let matched = self.fallback.matched(text);
                log.step(format!("Keyword analysis matched {} symbol(s)", matched.len()));
                let out = self.fallback.analyze(text);
                log.step(format!("Response length: {} chars", out.chars().count()));
                Ok((out, Source::Fallback))
            },
            _ => {
                log.step("No interpreter available");
                Err(SomniaError::Unavailable(UNAVAILABLE_MESSAGE.to_string()))
            },
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::HEADER;
    use crate::model::test_helpers::gated_engine;
    use std::sync::{mpsc, Arc};

    #[test]
    fn test_mode_selection() {
        assert_eq!(
            DreamInterpreter::from_outcome(LoadOutcome::Skipped, true).mode(),
            InterpreterMode::Fallback
        );
        assert_eq!(
            DreamInterpreter::from_outcome(LoadOutcome::Skipped, false).mode(),
            InterpreterMode::Unavailable
        );
        let failed = DreamInterpreter::from_outcome(
            LoadOutcome::Failed(SomniaError::ModelLoad {
                reason: "no weights".into(),
            }),
            true,
        );
        assert_eq!(failed.mode(), InterpreterMode::Fallback);
        assert!(!failed.model_loaded());
        assert!(failed.load_error().is_some_and(|e| e.contains("no weights")));
    }

    #[test]
    fn test_fallback_interpretation() {
        let interpreter = DreamInterpreter::fallback_only();
        let result = interpreter.interpret("蛇").expect("interpret");
        assert_eq!(result.source, Source::Fallback);
        assert!(result.text.starts_with(HEADER));
        assert!(result.log.len() >= 2);
        assert_eq!(interpreter.last_log(), result.log);
    }

    #[test]
    fn test_blank_text_rejected() {
        let interpreter = DreamInterpreter::fallback_only();
        let err = interpreter.interpret(" \n\t").expect_err("blank");
        assert_eq!(err, SomniaError::Validation(EMPTY_TEXT_MESSAGE.into()));
        assert!(interpreter.last_log().is_empty());
    }

    #[test]
    fn test_unavailable() {
        let interpreter = DreamInterpreter::unavailable();
        let err = interpreter.interpret("梦").expect_err("unavailable");
        assert!(matches!(err, SomniaError::Unavailable(_)));
        assert_eq!(interpreter.last_log().len(), 2);
    }

    #[test]
    fn test_log_replaced_each_call() {
        let interpreter = DreamInterpreter::fallback_only();
        interpreter.interpret("第一个梦").expect("first");
        interpreter.interpret("第二个梦").expect("second");
        let log = interpreter.last_log();
        assert!(log.steps()[0].contains("第二个梦"));
        assert!(!log.summary().contains("第一个梦"));
    }

    #[test]
    fn test_last_log_replaced_when_call_starts() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let interpreter = Arc::new(DreamInterpreter::with_engine(gated_engine(
            entered_tx, release_rx,
        )));

        let worker = {
            let interpreter = Arc::clone(&interpreter);
            std::thread::spawn(move || interpreter.interpret("梦见自己在飞"))
        };
        entered_rx.recv().expect("generation started");

        let during = interpreter.last_log();
        assert!(during.steps()[0].contains("梦见自己在飞"));
        assert!(!during.summary().contains("Output tokens"));

        release_tx.send(()).expect("release");
        worker.join().expect("join").expect("interpret");
        assert!(interpreter.last_log().summary().contains("Output tokens: 1"));
    }

    #[test]
    fn test_preview_truncates_by_chars() {
        let long = "梦".repeat(60);
        let p = preview(&long, 50);
        assert_eq!(p.chars().count(), 53);
        assert!(p.ends_with("..."));
        assert_eq!(preview("短", 50), "短");
    }

    #[test]
    fn test_log_summary_numbering() {
        let mut log = InferenceLog::new();
        log.step("a");
        log.step("b");
        assert_eq!(log.summary(), " 1. a\n 2. b");
    }
}
