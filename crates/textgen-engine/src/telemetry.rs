//! Per-request timing and reporting.
//!
//! A [`RequestTimer`] follows one request through prompt evaluation and the
//! decode loop, forwarding each milestone to a [`TelemetryHook`]. The engine
//! owns one hook for its lifetime; [`TracingTelemetry`] is the default.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Timings and counts for one completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationMetrics {
    /// Resolved session key.
    pub session: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    /// Milliseconds from tokenization to the end of prompt evaluation.
    pub prompt_eval_ms: f64,
    /// Completion tokens per second of decode time. Zero when nothing was
    /// generated.
    pub decode_tokens_per_sec: f64,
    pub total_ms: f64,
}

/// Receives request milestones. Every method defaults to doing nothing.
///
/// Hooks are called with the engine lock held.
pub trait TelemetryHook: Send + Sync {
    fn on_prompt_evaluated(&self, _session: &str, _prompt_eval_ms: f64) {}

    /// `index` counts from 1.
    fn on_token(&self, _session: &str, _index: usize, _elapsed_ms: f64) {}

    fn on_request_complete(&self, _metrics: &GenerationMetrics) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetryHook for NoopTelemetry {}

/// Keeps the most recent request's metrics and a running request count.
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    record: Arc<Mutex<Record>>,
}

#[derive(Debug, Default)]
struct Record {
    last: Option<GenerationMetrics>,
    requests: usize,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_metrics(&self) -> Option<GenerationMetrics> {
        self.record().last.clone()
    }

    /// Completed requests seen so far.
    pub fn requests(&self) -> usize {
        self.record().requests
    }

    fn record(&self) -> std::sync::MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TelemetryHook for RecordingTelemetry {
    fn on_request_complete(&self, metrics: &GenerationMetrics) {
        let mut record = self.record();
        record.last = Some(metrics.clone());
        record.requests += 1;
    }
}

/// Reports through `tracing`: milestones at `trace`, completions at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetryHook for TracingTelemetry {
    fn on_prompt_evaluated(&self, session: &str, prompt_eval_ms: f64) {
        tracing::trace!(session, prompt_eval_ms, "prompt evaluated");
    }

    fn on_request_complete(&self, m: &GenerationMetrics) {
        tracing::info!(
            session = %m.session,
            prompt_tokens = m.prompt_tokens,
            completion_tokens = m.completion_tokens,
            prompt_eval_ms = m.prompt_eval_ms,
            decode_tokens_per_sec = m.decode_tokens_per_sec,
            total_ms = m.total_ms,
            "generation complete"
        );
    }
}

/// Clock for one request. Started once the prompt is tokenized.
pub struct RequestTimer<'a> {
    hook: &'a dyn TelemetryHook,
    session: String,
    prompt_tokens: usize,
    completion_tokens: usize,
    started: Instant,
    prompt_done: Option<Instant>,
}

fn millis_between(from: Instant, to: Instant) -> f64 {
    to.duration_since(from).as_secs_f64() * 1e3
}

impl<'a> RequestTimer<'a> {
    pub fn start(session: &str, prompt_tokens: usize, hook: &'a dyn TelemetryHook) -> Self {
        Self {
            hook,
            session: session.to_owned(),
            prompt_tokens,
            completion_tokens: 0,
            started: Instant::now(),
            prompt_done: None,
        }
    }

    pub fn prompt_evaluated(&mut self) {
        let now = Instant::now();
        self.prompt_done = Some(now);
        self.hook
            .on_prompt_evaluated(&self.session, millis_between(self.started, now));
    }

    pub fn token(&mut self) {
        self.completion_tokens += 1;
        let elapsed = millis_between(self.started, Instant::now());
        self.hook
            .on_token(&self.session, self.completion_tokens, elapsed);
    }

    /// Stop the clock and report. Not called for failed requests.
    pub fn finish(self) -> GenerationMetrics {
        let end = Instant::now();
        let prompt_end = self.prompt_done.unwrap_or(self.started);
        let decode_secs = end.duration_since(prompt_end).as_secs_f64();
        let decode_tokens_per_sec = match self.completion_tokens {
            0 => 0.0,
            _ if decode_secs <= 0.0 => 0.0,
            n => n as f64 / decode_secs,
        };

        let metrics = GenerationMetrics {
            session: self.session,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            prompt_eval_ms: millis_between(self.started, prompt_end),
            decode_tokens_per_sec,
            total_ms: millis_between(self.started, end),
        };
        self.hook.on_request_complete(&metrics);
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_latest_and_counts() {
        let hook = RecordingTelemetry::new();
        assert!(hook.last_metrics().is_none());

        for n in 1..=2 {
            RequestTimer::start("s", n, &hook).finish();
        }

        assert_eq!(hook.requests(), 2);
        assert_eq!(hook.last_metrics().unwrap().prompt_tokens, 2);
    }

    #[test]
    fn clones_share_the_record() {
        let hook = RecordingTelemetry::new();
        let view = hook.clone();
        RequestTimer::start("s", 1, &hook).finish();
        assert_eq!(view.requests(), 1);
    }

    #[test]
    fn timer_counts_tokens_and_orders_times() {
        let mut timer = RequestTimer::start("chat-1", 3, &NoopTelemetry);
        timer.prompt_evaluated();
        timer.token();
        timer.token();
        let m = timer.finish();

        assert_eq!(m.session, "chat-1");
        assert_eq!(m.prompt_tokens, 3);
        assert_eq!(m.completion_tokens, 2);
        assert!(m.prompt_eval_ms >= 0.0);
        assert!(m.total_ms >= m.prompt_eval_ms);
    }

    #[test]
    fn nothing_generated_means_zero_throughput() {
        let m = RequestTimer::start("s", 1, &NoopTelemetry).finish();
        assert_eq!(m.completion_tokens, 0);
        assert_eq!(m.decode_tokens_per_sec, 0.0);
        assert_eq!(m.prompt_eval_ms, 0.0);
    }

    /// Counts token callbacks.
    #[derive(Default)]
    struct TokenCounter(Mutex<Vec<usize>>);

    impl TelemetryHook for TokenCounter {
        fn on_token(&self, _session: &str, index: usize, _elapsed_ms: f64) {
            self.0.lock().unwrap().push(index);
        }
    }

    #[test]
    fn token_indices_start_at_one() {
        let hook = TokenCounter::default();
        let mut timer = RequestTimer::start("s", 1, &hook);
        timer.token();
        timer.token();
        timer.token();
        assert_eq!(*hook.0.lock().unwrap(), vec![1, 2, 3]);
    }
}
