use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total: u64 },
    TaskIncrement { amount: u64 },
    TaskFinish,

    StatusUpdate { text: String },
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

/// Shared probe counter that turns finished batches into progress events.
///
/// Emits `TaskIncrement` for every batch and a `StatusUpdate` each time the
/// completed count crosses another tenth of the total.
pub struct ProbeProgress<'a> {
    reporter: &'a ProgressReporter<'a>,
    total: usize,
    interval: usize,
    completed: AtomicUsize,
}

impl<'a> ProbeProgress<'a> {
    pub fn new(reporter: &'a ProgressReporter<'a>, total: usize) -> Self {
        Self {
            reporter,
            total,
            interval: (total / 10).max(1),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn advance(&self, probes: usize) {
        if probes == 0 {
            return;
        }
        let before = self.completed.fetch_add(probes, Ordering::Relaxed);
        let after = before + probes;
        self.reporter.report(Progress::TaskIncrement {
            amount: probes as u64,
        });
        if before / self.interval != after / self.interval {
            self.reporter.report(Progress::StatusUpdate {
                text: format!("Computing probe position #{after}/{}", self.total),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_is_silent() {
        let reporter = ProgressReporter::new();
        reporter.report(Progress::Message("ignored".into()));
    }

    #[test]
    fn reporter_forwards_events_in_order() {
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(event);
        }));
        reporter.report(Progress::TaskStart { total: 4 });
        reporter.report(Progress::TaskIncrement { amount: 2 });
        reporter.report(Progress::TaskFinish);
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], Progress::TaskStart { total: 4 }));
        assert!(matches!(events[1], Progress::TaskIncrement { amount: 2 }));
        assert!(matches!(events[2], Progress::TaskFinish));
    }

    #[test]
    fn probe_progress_reports_roughly_every_tenth() {
        let statuses = Mutex::new(Vec::new());
        let increments = AtomicUsize::new(0);
        let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
            Progress::StatusUpdate { text } => statuses.lock().unwrap().push(text),
            Progress::TaskIncrement { amount } => {
                increments.fetch_add(amount as usize, Ordering::Relaxed);
            }
            _ => {}
        }));
        let progress = ProbeProgress::new(&reporter, 100);
        for _ in 0..50 {
            progress.advance(2);
        }
        assert_eq!(progress.completed(), 100);
        drop(progress);
        drop(reporter);

        assert_eq!(increments.into_inner(), 100);
        let statuses = statuses.into_inner().unwrap();
        assert_eq!(statuses.len(), 10);
        assert_eq!(statuses[0], "Computing probe position #10/100");
        assert_eq!(statuses[9], "Computing probe position #100/100");
    }
}
