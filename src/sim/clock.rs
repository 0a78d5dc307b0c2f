//! Simulated time: fixed-length ticks grouped into days.
//!
//! [`Calendar`] maps tick indices onto days and hours of the day for one
//! tick length. [`Clock`] hands out the ticks of a run in order.

use tracing::debug;

use super::types::SECONDS_PER_DAY;

/// Day and hour arithmetic for one tick length.
///
/// Every day starts at a multiple of [`Calendar::ticks_per_day`]; a tick
/// belongs to exactly one day.
///
/// # Examples
///
/// ```
/// use swap_sim::sim::clock::Calendar;
///
/// let cal = Calendar::new(60.0);
/// assert_eq!(cal.ticks_per_day(), 1440);
/// assert_eq!(cal.hour_start(18), 1080);
/// assert_eq!(cal.day_of(1500), 1);
/// assert_eq!(cal.tick_of_day(1500), 60);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calendar {
    interval_s: f64,
    ticks_per_day: usize,
}

impl Calendar {
    /// Creates a calendar for ticks of `interval_s` seconds.
    ///
    /// # Panics
    ///
    /// Panics if `interval_s` is not positive.
    pub fn new(interval_s: f64) -> Self {
        assert!(interval_s > 0.0, "interval_s must be > 0");
        Self {
            interval_s,
            ticks_per_day: ((SECONDS_PER_DAY / interval_s) as usize).max(1),
        }
    }

    pub fn interval_s(&self) -> f64 {
        self.interval_s
    }

    /// Ticks in one day, at least 1.
    pub fn ticks_per_day(&self) -> usize {
        self.ticks_per_day
    }

    /// Tick within its day at which `second` of the day falls.
    ///
    /// Seconds past the last tick land on the last tick.
    pub fn tick_at_second(&self, second: f64) -> usize {
        ((second.max(0.0) / self.interval_s) as usize).min(self.ticks_per_day - 1)
    }

    /// First tick of `hour` (0-23) within a day.
    pub fn hour_start(&self, hour: u32) -> usize {
        (f64::from(hour) * 3600.0 / self.interval_s) as usize
    }

    /// Day index of an absolute tick.
    pub fn day_of(&self, tick: usize) -> usize {
        tick / self.ticks_per_day
    }

    /// Position of an absolute tick within its day.
    pub fn tick_of_day(&self, tick: usize) -> usize {
        tick % self.ticks_per_day
    }

    /// Absolute index of the first tick of `day`.
    pub fn day_start(&self, day: usize) -> usize {
        day * self.ticks_per_day
    }

    /// Hours elapsed at the start of `tick`.
    pub fn hours(&self, tick: usize) -> f64 {
        tick as f64 * self.interval_s / 3600.0
    }
}

/// A simulation clock counting fixed-length ticks.
///
/// The `Clock` hands out tick indices one at a time, or drives a closure
/// over every remaining tick.
///
/// # Examples
///
/// ```
/// use swap_sim::sim::clock::Clock;
///
/// let mut clock = Clock::for_days(2, 3600.0);
/// let mut days = Vec::new();
///
/// clock.run(|tick| days.push(tick / 24));
/// assert_eq!(days.len(), 48);
/// assert_eq!(clock.elapsed_s(), 2.0 * 86_400.0);
/// ```
pub struct Clock {
    /// Next tick to hand out
    current: usize,
    /// Total ticks in the run
    total: usize,
    calendar: Calendar,
}

impl Clock {
    /// Creates a clock for `total` ticks of `interval_s` seconds.
    ///
    /// # Panics
    ///
    /// Panics if `interval_s` is not positive.
    pub fn new(total: usize, interval_s: f64) -> Self {
        Self {
            current: 0,
            total,
            calendar: Calendar::new(interval_s),
        }
    }

    /// Creates a clock covering `days` whole days.
    pub fn for_days(days: usize, interval_s: f64) -> Self {
        let calendar = Calendar::new(interval_s);
        Self {
            current: 0,
            total: calendar.ticks_per_day() * days,
            calendar,
        }
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    /// Total ticks in the run.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Advances the clock by one tick.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The tick index before advancing
    /// * `None` - Once the run is over
    pub fn tick(&mut self) -> Option<usize> {
        if self.current >= self.total {
            return None;
        }
        let tick = self.current;
        self.current += 1;
        if self.calendar.tick_of_day(self.current) == 0 && self.current < self.total {
            debug!("day {} begins", self.calendar.day_of(self.current));
        }
        Some(tick)
    }

    /// Simulated seconds covered by the ticks handed out so far.
    pub fn elapsed_s(&self) -> f64 {
        self.current as f64 * self.calendar.interval_s()
    }

    /// Runs `f` for each remaining tick.
    pub fn run(&mut self, mut f: impl FnMut(usize)) {
        while let Some(tick) = self.tick() {
            f(tick);
        }
    }
}
