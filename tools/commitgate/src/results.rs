use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use serde::{Serialize, Serializer};

/// How a check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    TimedOut,
    Canceled,
}

impl CheckStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Passed => "passed",
            CheckStatus::Failed => "failed",
            CheckStatus::TimedOut => "timed out",
            CheckStatus::Canceled => "canceled",
        }
    }
}

/// Outcome of one executed check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub success: bool,
    pub status: CheckStatus,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub files_processed: usize,
    /// Passed only because graceful degradation excused a missing tool.
    pub degraded: bool,
}

impl CheckResult {
    pub fn passed(name: &str, duration: Duration, files_processed: usize) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            status: CheckStatus::Passed,
            duration,
            error: None,
            suggestion: None,
            command: None,
            output: None,
            files_processed,
            degraded: false,
        }
    }
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Results {
    pub check_results: Vec<CheckResult>,
    #[serde(rename = "total_duration_ms", serialize_with = "as_millis")]
    pub total_duration: Duration,
    pub total_files: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Results {
    /// Derive the counts in one pass over the completed results.
    pub fn finalize(
        check_results: Vec<CheckResult>,
        total_duration: Duration,
        total_files: usize,
        skipped: usize,
    ) -> Self {
        let (passed, failed) = check_results
            .iter()
            .fold((0, 0), |(p, f), r| if r.success { (p + 1, f) } else { (p, f + 1) });
        Self {
            check_results,
            total_duration,
            total_files,
            passed,
            failed,
            skipped,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.check_results.iter().find(|r| r.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Single collection point for results arriving from worker threads.
///
/// Workers hold cloned senders; completion order is not preserved, so the
/// final list is sorted by the dispatch index each result was sent with.
pub struct Aggregator {
    tx: Sender<(usize, CheckResult)>,
    rx: Receiver<(usize, CheckResult)>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<(usize, CheckResult)> {
        self.tx.clone()
    }

    /// Drain every result sent so far and fold them into [`Results`].
    ///
    /// Call only after all senders handed out by [`Aggregator::sender`] are dropped.
    pub fn finish(self, total_duration: Duration, total_files: usize, skipped: usize) -> Results {
        drop(self.tx);
        let mut collected: Vec<(usize, CheckResult)> = self.rx.into_iter().collect();
        collected.sort_by_key(|(index, _)| *index);
        let check_results = collected.into_iter().map(|(_, result)| result).collect();
        Results::finalize(check_results, total_duration, total_files, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn failed(name: &str) -> CheckResult {
        CheckResult {
            success: false,
            status: CheckStatus::Failed,
            error: Some("boom".to_string()),
            ..CheckResult::passed(name, Duration::from_millis(5), 1)
        }
    }

    #[test]
    fn finalize_counts_in_one_pass() {
        let results = Results::finalize(
            vec![
                CheckResult::passed("eof", Duration::ZERO, 2),
                failed("lint"),
                CheckResult::passed("fmt", Duration::ZERO, 1),
            ],
            Duration::from_secs(1),
            3,
            1,
        );
        assert_eq!(results.passed, 2);
        assert_eq!(results.failed, 1);
        assert_eq!(results.passed + results.failed, results.check_results.len());
        assert!(!results.success());
        assert_eq!(results.get("lint").unwrap().status, CheckStatus::Failed);
    }

    #[test]
    fn aggregator_collects_from_many_threads_in_dispatch_order() {
        let aggregator = Aggregator::new();
        thread::scope(|scope| {
            for index in (0..8).rev() {
                let tx = aggregator.sender();
                scope.spawn(move || {
                    tx.send((index, CheckResult::passed(&format!("c{index}"), Duration::ZERO, 0)))
                        .unwrap();
                });
            }
        });
        let results = aggregator.finish(Duration::from_millis(10), 4, 0);
        assert_eq!(results.check_results.len(), 8);
        assert_eq!(results.check_results[0].name, "c0");
        assert_eq!(results.check_results[7].name, "c7");
        assert_eq!(results.passed, 8);
    }

    #[test]
    fn json_uses_millis_and_omits_empty_fields() {
        let results = Results::finalize(
            vec![CheckResult::passed("eof", Duration::from_millis(1500), 2)],
            Duration::from_secs(2),
            2,
            0,
        );
        let value: serde_json::Value = serde_json::from_str(&results.to_json().unwrap()).unwrap();
        assert_eq!(value["total_duration_ms"], 2000);
        assert_eq!(value["check_results"][0]["duration_ms"], 1500);
        assert_eq!(value["check_results"][0]["status"], "passed");
        assert!(value["check_results"][0].get("error").is_none());
    }
}
