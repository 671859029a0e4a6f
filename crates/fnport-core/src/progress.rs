use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

/// Total used when a caller drives one determinate indicator per operation.
pub const FULL_BUDGET: u32 = 100;

/// Receives coarse percentage increments; fire-and-forget.
pub trait ProgressSink: Send + Sync {
    fn report(&self, increment: u32, message: Option<&str>);
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _increment: u32, _message: Option<&str>) {}
}

/// Clamps increments so their running sum never exceeds `total`.
///
/// Budgets nest: a share carved out of a parent reports through it, so the
/// parent's ceiling still holds no matter how children spend theirs.
pub struct ProgressBudget<'a> {
    sink: &'a dyn ProgressSink,
    total: u32,
    reported: AtomicU32,
}

impl<'a> ProgressBudget<'a> {
    pub fn new(sink: &'a dyn ProgressSink, total: u32) -> Self {
        Self {
            sink,
            total,
            reported: AtomicU32::new(0),
        }
    }

    pub fn full(sink: &'a dyn ProgressSink) -> Self {
        Self::new(sink, FULL_BUDGET)
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn reported(&self) -> u32 {
        self.reported.load(AtomicOrdering::SeqCst)
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.reported())
    }

    /// `percent` of this budget's total, rounded down.
    #[must_use]
    pub fn portion(&self, percent: u32) -> u32 {
        self.total.saturating_mul(percent.min(100)) / 100
    }

    pub fn advance(&self, increment: u32, message: Option<&str>) {
        let mut granted = 0;
        let _ = self
            .reported
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |current| {
                granted = increment.min(self.total.saturating_sub(current));
                Some(current + granted)
            });
        if granted > 0 || message.is_some() {
            self.sink.report(granted, message);
        }
    }

    /// Reports whatever is left of the budget.
    pub fn complete(&self, message: Option<&str>) {
        self.advance(self.remaining(), message);
    }

    pub fn share(&self, amount: u32) -> ProgressBudget<'_> {
        ProgressBudget::new(self, amount.min(self.remaining()))
    }
}

impl ProgressSink for ProgressBudget<'_> {
    fn report(&self, increment: u32, message: Option<&str>) {
        self.advance(increment, message);
    }
}
