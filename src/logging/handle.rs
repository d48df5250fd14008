use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Keeps the file writer alive and flushes it on shutdown.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    flush_count: AtomicU64,
    shutdown_in_progress: AtomicBool,
    flush_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingStats {
    pub flush_count: u64,
    pub shutdown_in_progress: bool,
    pub file_enabled: bool,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_count: AtomicU64::new(0),
            shutdown_in_progress: AtomicBool::new(false),
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Records a flush request; the worker flushes on its own schedule.
    pub fn flush(&self) {
        let count = self.flush_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(flush_count = count, "logging flush requested");
    }

    /// Drops the file guard, waiting for buffered lines to be written.
    pub fn shutdown(mut self) {
        self.shutdown_in_progress.store(true, Ordering::Release);
        tracing::info!(
            flushes = self.flush_count.load(Ordering::Relaxed),
            "logging shutdown"
        );

        let start = Instant::now();
        drop(self.file_guard.take());
        let elapsed = start.elapsed();
        if elapsed > self.flush_timeout {
            eprintln!(
                "logging shutdown took {}ms (timeout {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }

    /// Like [`shutdown`](Self::shutdown) but gives up after `timeout`.
    pub async fn shutdown_async(
        mut self,
        timeout: Duration,
    ) {
        self.shutdown_in_progress.store(true, Ordering::Release);
        let guard = self.file_guard.take();
        let flush = tokio::task::spawn_blocking(move || drop(guard));
        match tokio::time::timeout(timeout, flush).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("logging shutdown task failed: {e}"),
            Err(_) => eprintln!("logging shutdown exceeded {}ms", timeout.as_millis()),
        }
    }

    pub fn stats(&self) -> LoggingStats {
        LoggingStats {
            flush_count: self.flush_count.load(Ordering::Relaxed),
            shutdown_in_progress: self.shutdown_in_progress.load(Ordering::Acquire),
            file_enabled: self.file_guard.is_some(),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() && !self.shutdown_in_progress.load(Ordering::Acquire) {
            eprintln!("LoggingHandle dropped without shutdown(), some log lines may be lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_counts() {
        let handle = LoggingHandle::new(None);
        handle.flush();
        handle.flush();
        let stats = handle.stats();
        assert_eq!(stats.flush_count, 2);
        assert!(!stats.file_enabled);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_async_with_guard() {
        let (_writer, guard) = tracing_appender::non_blocking(std::io::sink());
        let handle = LoggingHandle::new(Some(guard)).with_flush_timeout(Duration::from_secs(1));
        assert!(handle.stats().file_enabled);
        handle.shutdown_async(Duration::from_secs(1)).await;
    }
}
