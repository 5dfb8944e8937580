//! Polling of async controller tasks to a terminal state.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::types::{PollPolicy, TaskHandle, TaskRecord, TerminalStatus};
use std::time::Instant;

/// Something that can read the current status of a task.
pub trait TaskSource {
    fn read_task(&self, handle: &TaskHandle) -> Result<TaskRecord>;
}

/// Classify one status record.
///
/// `None` means the task has not finished yet.
pub fn classify(record: &TaskRecord, policy: &PollPolicy) -> Option<TerminalStatus> {
    if record.is_error || policy.failure_pattern.is_match(&record.progress) {
        let reason = record
            .failure_reason
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| record.progress.clone());
        return Some(TerminalStatus::Failure {
            reason,
            record: Some(record.clone()),
        });
    }

    let matched = policy
        .success_pattern
        .as_ref()
        .is_some_and(|p| p.is_match(&record.progress));
    if record.end_time.is_some() || matched {
        return Some(TerminalStatus::Success(record.clone()));
    }
    None
}

/// Poll `handle` until it terminates, the deadline passes, or `cancel` fires.
///
/// Errors reading the status are returned as-is; the deadline is measured
/// from the first poll.
pub fn await_task(
    source: &dyn TaskSource,
    handle: &TaskHandle,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<TerminalStatus> {
    let start = Instant::now();
    let mut polls = 0_u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(TerminalStatus::Cancelled);
        }

        let record = source.read_task(handle)?;
        polls += 1;
        if let Some(status) = classify(&record, policy) {
            log::debug!("task {} finished after {polls} polls", handle.id);
            return Ok(status);
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            log::warn!(
                "task {} still running after {:.1}s, giving up",
                handle.id,
                elapsed.as_secs_f64()
            );
            return Ok(TerminalStatus::DeadlineExceeded { elapsed });
        }

        log::trace!("task {}: {}", handle.id, record.progress);
        let pause = policy.interval.min(policy.timeout - elapsed);
        if !cancel.sleep(pause) {
            return Ok(TerminalStatus::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use regex::Regex;
    use std::cell::RefCell;
    use std::time::Duration;

    /// Replays a fixed list of records, repeating the last one.
    struct Scripted {
        records: RefCell<Vec<TaskRecord>>,
        reads: RefCell<u32>,
    }

    impl Scripted {
        fn new(records: Vec<TaskRecord>) -> Self {
            Self {
                records: RefCell::new(records),
                reads: RefCell::new(0),
            }
        }
    }

    impl TaskSource for Scripted {
        fn read_task(&self, _handle: &TaskHandle) -> Result<TaskRecord> {
            *self.reads.borrow_mut() += 1;
            let mut records = self.records.borrow_mut();
            if records.len() > 1 {
                Ok(records.remove(0))
            } else {
                records
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::Other("no records".to_string()))
            }
        }
    }

    fn record(progress: &str, end: bool, is_error: bool) -> TaskRecord {
        TaskRecord {
            id: "t-1".to_string(),
            is_error,
            progress: progress.to_string(),
            end_time: end.then(|| "1700000000000".to_string()),
            failure_reason: None,
            data: None,
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(200), Duration::from_millis(5))
    }

    #[test]
    fn test_classify() {
        let policy = PollPolicy::default();
        assert!(classify(&record("In progress", false, false), &policy).is_none());
        assert!(matches!(
            classify(&record("done", true, false), &policy),
            Some(TerminalStatus::Success(_))
        ));
        assert!(matches!(
            classify(&record("x", false, true), &policy),
            Some(TerminalStatus::Failure { .. })
        ));
        // progress text alone can signal failure
        assert!(matches!(
            classify(&record("Provisioning failed on device", true, false), &policy),
            Some(TerminalStatus::Failure { .. })
        ));
    }

    #[test]
    fn test_classify_success_pattern() {
        let policy = PollPolicy::default().with_success_pattern(Regex::new("(?i)created").unwrap());
        assert!(matches!(
            classify(&record("SSID created", false, false), &policy),
            Some(TerminalStatus::Success(_))
        ));
    }

    #[test]
    fn test_failure_reason_preferred() {
        let mut failed = record("step 3", true, true);
        failed.failure_reason = Some("duplicate name".to_string());
        match classify(&failed, &PollPolicy::default()) {
            Some(TerminalStatus::Failure { reason, .. }) => assert_eq!(reason, "duplicate name"),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_await_until_done() {
        let source = Scripted::new(vec![
            record("In progress", false, false),
            record("In progress", false, false),
            record("Done", true, false),
        ]);
        let status = await_task(&source, &TaskHandle::task("t-1"), &fast_policy(), &CancelToken::new()).unwrap();
        assert!(status.is_success());
        assert_eq!(*source.reads.borrow(), 3);
    }

    #[test]
    fn test_await_deadline() {
        let source = Scripted::new(vec![record("In progress", false, false)]);
        let policy = PollPolicy::new(Duration::from_millis(30), Duration::from_millis(10));
        let status = await_task(&source, &TaskHandle::task("t-1"), &policy, &CancelToken::new()).unwrap();
        match status {
            TerminalStatus::DeadlineExceeded { elapsed } => {
                assert!(elapsed >= Duration::from_millis(30));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[test]
    fn test_await_cancelled() {
        let source = Scripted::new(vec![record("In progress", false, false)]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let status = await_task(&source, &TaskHandle::task("t-1"), &fast_policy(), &cancel).unwrap();
        assert_eq!(status, TerminalStatus::Cancelled);
        assert_eq!(*source.reads.borrow(), 0);
    }
}
