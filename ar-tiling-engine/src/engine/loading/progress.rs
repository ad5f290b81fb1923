use constants::streaming::{PROGRESS_MIN_VISIBLE_SECS, PROGRESS_SHOW_DELAY_SECS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressChange {
    Show { loaded: usize, total: usize },
    Update { loaded: usize, total: usize },
    Hide,
}

/// Delayed progress indicator for final-phase tile loads.
///
/// Appears only once loading has run for the show delay, and once shown stays
/// up for at least the minimum visible time so it never flickers.
#[derive(Debug, Clone)]
pub struct ProgressIndicator {
    show_delay: f64,
    min_visible: f64,
    started: Option<f64>,
    shown_at: Option<f64>,
    finished: bool,
    loaded: usize,
    total: usize,
    reported: usize,
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new(PROGRESS_SHOW_DELAY_SECS, PROGRESS_MIN_VISIBLE_SECS)
    }
}

impl ProgressIndicator {
    pub fn new(show_delay: f64, min_visible: f64) -> Self {
        Self {
            show_delay,
            min_visible,
            started: None,
            shown_at: None,
            finished: true,
            loaded: 0,
            total: 0,
            reported: 0,
        }
    }

    /// Start tracking a new load. A visible indicator stays visible.
    pub fn begin(&mut self, now: f64, total: usize) {
        self.started = Some(now);
        self.finished = false;
        self.loaded = 0;
        self.total = total;
        self.reported = 0;
    }

    pub fn set_loaded(&mut self, loaded: usize) {
        self.loaded = loaded.min(self.total);
    }

    pub fn finish(&mut self) {
        self.finished = true;
        self.loaded = self.total;
    }

    pub fn is_visible(&self) -> bool {
        self.shown_at.is_some()
    }

    pub fn tick(&mut self, now: f64) -> Option<ProgressChange> {
        match self.shown_at {
            None => {
                let started = self.started?;
                if self.finished {
                    self.started = None;
                    return None;
                }
                if now - started >= self.show_delay {
                    self.shown_at = Some(now);
                    self.reported = self.loaded;
                    return Some(ProgressChange::Show { loaded: self.loaded, total: self.total });
                }
                None
            }
            Some(shown_at) => {
                if self.finished && now - shown_at >= self.min_visible {
                    self.shown_at = None;
                    self.started = None;
                    return Some(ProgressChange::Hide);
                }
                if self.loaded != self.reported {
                    self.reported = self.loaded;
                    return Some(ProgressChange::Update { loaded: self.loaded, total: self.total });
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_loads_never_show() {
        let mut progress = ProgressIndicator::default();
        progress.begin(0.0, 3);
        assert_eq!(progress.tick(1.0), None);
        progress.finish();
        assert_eq!(progress.tick(1.5), None);
        assert_eq!(progress.tick(5.0), None);
        assert!(!progress.is_visible());
    }

    #[test]
    fn slow_loads_show_and_stay_for_minimum_time() {
        let mut progress = ProgressIndicator::default();
        progress.begin(0.0, 3);
        progress.set_loaded(1);
        assert_eq!(progress.tick(2.0), Some(ProgressChange::Show { loaded: 1, total: 3 }));
        progress.set_loaded(2);
        assert_eq!(progress.tick(2.1), Some(ProgressChange::Update { loaded: 2, total: 3 }));
        progress.finish();
        assert_eq!(progress.tick(2.2), Some(ProgressChange::Update { loaded: 3, total: 3 }));
        assert_eq!(progress.tick(2.3), None);
        assert_eq!(progress.tick(2.45), Some(ProgressChange::Hide));
        assert!(!progress.is_visible());
    }
}
