//! Progress fan-out for one upload invocation.

use chunkflow_transfer::ProgressSnapshot;

use crate::observer::UploadObserver;

/// Callback invoked with every progress snapshot.
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Delivers snapshots to callbacks and the observer, never going backwards.
pub(crate) struct ProgressReporter<'a> {
    callbacks: &'a [ProgressCallback],
    observer: Option<&'a dyn UploadObserver>,
    last: Option<ProgressSnapshot>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callbacks: &'a [ProgressCallback], observer: Option<&'a dyn UploadObserver>) -> Self {
        Self {
            callbacks,
            observer,
            last: None,
        }
    }

    /// Emits `snapshot` unless it would move progress backwards.
    pub fn report(&mut self, snapshot: ProgressSnapshot) {
        if let Some(last) = &self.last {
            if snapshot.confirmed_count < last.confirmed_count
                || snapshot.percentage < last.percentage
            {
                return;
            }
        }

        for cb in self.callbacks {
            cb(&snapshot);
        }
        if let Some(observer) = self.observer {
            observer.on_progress(&snapshot);
        }
        self.last = Some(snapshot);
    }
}
