//! Progress tracking and reporting for batch collection

use super::status::CoreWebVitalsStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Progress callback for batch operations
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted while a batch runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    UrlStarted {
        url: String,
    },
    UrlCompleted {
        url: String,
        status: CoreWebVitalsStatus,
    },
    ThrottleRetry {
        url: String,
        attempt: u32,
        max_attempts: u32,
    },
    Error {
        url: String,
        error: String,
    },
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_url_started(&self, _url: &str) {}
    fn on_url_completed(&self, _url: &str, _status: CoreWebVitalsStatus) {}
    fn on_throttle_retry(&self, _url: &str, _attempt: u32, _max_attempts: u32) {}
    fn on_error(&self, _url: &str, _error: &str) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::UrlStarted { url } => self.on_url_started(&url),
            ProgressEvent::UrlCompleted { url, status } => self.on_url_completed(&url, status),
            ProgressEvent::ThrottleRetry { url, attempt, max_attempts } => {
                self.on_throttle_retry(&url, attempt, max_attempts);
            }
            ProgressEvent::Error { url, error } => self.on_error(&url, &error),
        })
    }
}

/// Console reporter printing one line per finished URL
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    total: usize,
    completed: AtomicUsize,
    pub verbose: bool,
}

impl ConsoleProgressReporter {
    pub fn new(total: usize, verbose: bool) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            verbose,
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn on_url_started(&self, url: &str) {
        if self.verbose {
            println!("-> {}", url);
        }
    }

    fn on_url_completed(&self, url: &str, status: CoreWebVitalsStatus) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{}/{}] {} {}", done, self.total, status, url);
    }

    fn on_throttle_retry(&self, url: &str, attempt: u32, max_attempts: u32) {
        println!("Throttled, retry {}/{} for: {}", attempt, max_attempts, url);
    }

    fn on_error(&self, url: &str, error: &str) {
        eprintln!("Error collecting {}: {}", url, error);
    }
}

/// Null progress reporter that does nothing
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Arc<Recorder> {
        fn on_url_completed(&self, url: &str, status: CoreWebVitalsStatus) {
            self.seen.lock().unwrap().push(format!("{url}:{status}"));
        }
    }

    #[test]
    fn test_reporter_receives_events_through_callback() {
        let recorder = Arc::new(Recorder::default());
        let callback = recorder.clone().into_callback();

        callback(ProgressEvent::UrlStarted { url: "https://a.example/".into() });
        callback(ProgressEvent::UrlCompleted {
            url: "https://a.example/".into(),
            status: CoreWebVitalsStatus::Passed,
        });

        assert_eq!(*recorder.seen.lock().unwrap(), vec!["https://a.example/:passed".to_string()]);
    }

    #[test]
    fn test_null_reporter_accepts_everything() {
        let callback = NullProgressReporter.into_callback();
        callback(ProgressEvent::Error { url: "u".into(), error: "e".into() });
    }
}
