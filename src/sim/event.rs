use super::clock::Calendar;

/// Daily window during which the station may return energy to the grid.
///
/// The window opens at the start of `hour` and closes at the start of the
/// following hour (inclusive), every simulated day. A window starting at
/// 23:00 ends on the last tick of its day. Inside it, at most
/// `max_interactions` swaps per day run with grid discharge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridInteractionWindow {
    /// First tick of the window within a day.
    pub start_tick: usize,
    /// Last tick of the window within a day (inclusive).
    pub end_tick: usize,
    /// Swaps per day allowed to discharge.
    pub max_interactions: usize,
    calendar: Calendar,
}

impl GridInteractionWindow {
    /// Creates a window starting at `hour` (0-23).
    ///
    /// # Panics
    ///
    /// Panics if `hour > 23`, `interval_s` is not positive or does not fit in an hour.
    ///
    /// # Examples
    ///
    /// ```
    /// use swap_sim::sim::event::GridInteractionWindow;
    ///
    /// let window = GridInteractionWindow::new(18, 10.0, 1);
    /// assert!(!window.is_open(18 * 360 - 1));
    /// assert!(window.is_open(18 * 360));
    /// assert!(window.is_open(19 * 360));
    /// assert!(!window.is_open(19 * 360 + 1));
    /// ```
    pub fn new(hour: u32, interval_s: f64, max_interactions: usize) -> Self {
        assert!(hour < 24, "hour must be in 0..24");
        assert!(
            interval_s > 0.0 && interval_s <= 3600.0,
            "interval must be in (0, 3600] seconds"
        );
        let calendar = Calendar::new(interval_s);
        let last = calendar.ticks_per_day() - 1;
        Self {
            start_tick: calendar.hour_start(hour),
            end_tick: calendar.hour_start(hour + 1).min(last),
            max_interactions,
            calendar,
        }
    }

    /// Returns `true` when `tick` falls inside the window of its day.
    pub fn is_open(&self, tick: usize) -> bool {
        let t = self.calendar.tick_of_day(tick);
        t >= self.start_tick && t <= self.end_tick
    }

    /// Day index of `tick`, used to reset the interaction counter.
    pub fn day_of(&self, tick: usize) -> usize {
        self.calendar.day_of(tick)
    }

    /// Ticks in one simulated day.
    pub fn ticks_per_day(&self) -> usize {
        self.calendar.ticks_per_day()
    }
}

#[cfg(test)]
mod tests {
    use super::GridInteractionWindow;

    #[test]
    fn open_only_inside_window() {
        let window = GridInteractionWindow::new(5, 600.0, 2);
        assert_eq!(window.start_tick, 30);
        assert_eq!(window.end_tick, 36);
        assert!(!window.is_open(29));
        assert!(window.is_open(30));
        assert!(window.is_open(36));
        assert!(!window.is_open(37));
    }

    #[test]
    fn window_repeats_every_day() {
        let window = GridInteractionWindow::new(0, 3600.0, 1);
        assert_eq!(window.ticks_per_day(), 24);
        assert!(window.is_open(24));
        assert!(window.is_open(25));
        assert!(!window.is_open(26));
        assert_eq!(window.day_of(47), 1);
    }

    #[test]
    fn last_hour_ends_with_its_day() {
        let window = GridInteractionWindow::new(23, 60.0, 1);
        assert_eq!(window.start_tick, 1380);
        assert_eq!(window.end_tick, 1439);
        assert!(window.is_open(1439));
        assert!(!window.is_open(1440));
        assert!(window.is_open(1440 + 1380));
        assert!(!window.is_open(1440 + 1379));
    }

    #[test]
    #[should_panic]
    fn hour_out_of_range_panics() {
        GridInteractionWindow::new(24, 10.0, 1);
    }
}
