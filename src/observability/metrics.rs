//! Thread-safe metrics collection system
//!
//! Atomic counters and mutex-protected collections tracking message
//! handling, generation attempts and reply delivery.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

const MAX_TIMING_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Message handling
    messages_received: AtomicU64,
    messages_ignored: AtomicU64,
    messages_in_flight: AtomicU64,
    replies_sent: AtomicU64,
    reply_failures: AtomicU64,
    silent_outcomes: AtomicU64,

    // Generation
    generation_attempts: AtomicU64,
    generation_retries: AtomicU64,
    generation_successes: AtomicU64,
    failures_by_class: Mutex<HashMap<String, u64>>,

    // Processing times in milliseconds
    processing_times: Mutex<Vec<u64>>,

    // Lifecycle
    client_available: AtomicBool,
    telegram_connected: AtomicBool,
    relay_state: Mutex<String>,
    uptime_start: AtomicU64,
    last_message_at: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
            messages_in_flight: AtomicU64::new(0),
            replies_sent: AtomicU64::new(0),
            reply_failures: AtomicU64::new(0),
            silent_outcomes: AtomicU64::new(0),
            generation_attempts: AtomicU64::new(0),
            generation_retries: AtomicU64::new(0),
            generation_successes: AtomicU64::new(0),
            failures_by_class: Mutex::new(HashMap::new()),
            processing_times: Mutex::new(Vec::new()),
            client_available: AtomicBool::new(false),
            telegram_connected: AtomicBool::new(false),
            relay_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
            last_message_at: AtomicU64::new(0),
        }
    }

    // Message handling metrics
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn message_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processing_started(&self) {
        self.messages_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processing_finished(&self, duration: Duration) {
        // Saturating decrement: reset() may race with in-flight tasks
        let _ = self
            .messages_in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        self.record_processing_time(duration);
    }

    pub fn reply_sent(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reply_failed(&self) {
        self.reply_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn silent_outcome(&self) {
        self.silent_outcomes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            times.push(duration.as_millis() as u64);

            if times.len() > MAX_TIMING_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Generation metrics
    pub fn generation_attempted(&self) {
        self.generation_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generation_retried(&self) {
        self.generation_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generation_succeeded(&self) {
        self.generation_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generation_failed(&self, classification: &str) {
        if let Ok(mut failures) = self.failures_by_class.lock() {
            *failures.entry(classification.to_string()).or_insert(0) += 1;
        }
    }

    // Lifecycle metrics
    pub fn set_client_available(&self, available: bool) {
        self.client_available.store(available, Ordering::Relaxed);
    }

    pub fn set_telegram_connected(&self, connected: bool) {
        self.telegram_connected.store(connected, Ordering::Relaxed);
    }

    pub fn set_relay_state(&self, state: &str) {
        if let Ok(mut current) = self.relay_state.lock() {
            *current = state.to_string();
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.messages_ignored,
            &self.messages_in_flight,
            &self.replies_sent,
            &self.reply_failures,
            &self.silent_outcomes,
            &self.generation_attempts,
            &self.generation_retries,
            &self.generation_successes,
            &self.last_message_at,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut failures) = self.failures_by_class.lock() {
            failures.clear();
        }
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        self.set_relay_state("initializing");
    }

    /// Calculate processing time statistics (pure function)
    fn calculate_processing_time_statistics(&self) -> (f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let mut sorted_times = times.clone();
        sorted_times.sort_unstable();

        let avg = sorted_times.iter().sum::<u64>() as f64 / sorted_times.len() as f64;
        (
            avg,
            percentile(&sorted_times, 50.0),
            percentile(&sorted_times, 95.0),
        )
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_processing_time_ms, p50, p95) = self.calculate_processing_time_statistics();
        let failures_by_class = self
            .failures_by_class
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();
        let current_state = self
            .relay_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                ignored: self.messages_ignored.load(Ordering::Relaxed),
                in_flight: self.messages_in_flight.load(Ordering::Relaxed),
                replies_sent: self.replies_sent.load(Ordering::Relaxed),
                reply_failures: self.reply_failures.load(Ordering::Relaxed),
                silent_outcomes: self.silent_outcomes.load(Ordering::Relaxed),
                avg_processing_time_ms,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                last_message_at: self.last_message_at.load(Ordering::Relaxed),
            },
            generation: GenerationMetrics {
                attempts: self.generation_attempts.load(Ordering::Relaxed),
                retries: self.generation_retries.load(Ordering::Relaxed),
                successes: self.generation_successes.load(Ordering::Relaxed),
                failures_by_class,
            },
            lifecycle: LifecycleMetrics {
                current_state,
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                client_available: self.client_available.load(Ordering::Relaxed),
                telegram_connected: self.telegram_connected.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages: MessageMetrics,
    pub generation: GenerationMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub ignored: u64,
    pub in_flight: u64,
    pub replies_sent: u64,
    pub reply_failures: u64,
    pub silent_outcomes: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub last_message_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationMetrics {
    pub attempts: u64,
    pub retries: u64,
    pub successes: u64,
    pub failures_by_class: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
    pub client_available: bool,
    pub telegram_connected: bool,
}

/// Nearest-rank percentile over a sorted slice
fn percentile(sorted: &[u64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)] as f64
}

pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
