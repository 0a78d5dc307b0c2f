//! Arriving users and the service they choose.
//!
//! [`SeededArrivals`] draws each day's arrival times from a half-hourly
//! weight profile, gives every user a freshly built battery and decides
//! between swapping, charging and leaving according to a preference model.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clock::Calendar;
use crate::devices::{Battery, BatteryType};

/// Relative arrival weight of each half hour of the day, starting at midnight.
pub const DAILY_PROFILE: [f64; 48] = [
    0.5, 0.4, 0.3, 0.3, 0.2, 0.2, 0.2, 0.2, 0.3, 0.3, 0.5, 0.6, //
    1.0, 1.5, 2.2, 2.8, 3.0, 2.8, 2.4, 2.2, 2.2, 2.3, 2.5, 2.8, //
    3.0, 2.9, 2.6, 2.4, 2.3, 2.3, 2.4, 2.5, 2.7, 3.0, 3.3, 3.5, //
    3.6, 3.5, 3.2, 3.0, 2.8, 2.6, 2.4, 2.1, 1.8, 1.4, 1.0, 0.7,
];

/// Lowest and highest SOC a vehicle arrives with.
const ARRIVAL_SOC_RANGE: (f64, f64) = (0.05, 0.9);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Swap,
    Charge,
    Leave,
}

/// Swap-capable members or charge-only guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserClass {
    Member,
    Guest,
}

/// How members pick a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceModel {
    /// Every member swaps.
    #[default]
    FullSwap,
    /// Members swap with a fixed probability, otherwise charge.
    FixedRatio,
    /// One-step Markov chain conditioned on temperature, SOC and queue length.
    Markov,
}

/// A user showing up at the station.
#[derive(Debug)]
pub struct Arrival {
    pub user_id: usize,
    pub class: UserClass,
    /// Tick the user joined.
    pub tick: usize,
    pub battery: Battery,
    pub decision: Decision,
}

/// Supplies the users arriving on each tick.
pub trait ArrivalSource {
    /// Users arriving during `tick`, given the current total queue length.
    fn arrivals_at(&mut self, tick: usize, queue_len: usize) -> Vec<Arrival>;
}

/// Parameters of the seeded arrival model.
#[derive(Debug, Clone)]
pub struct ArrivalSettings {
    /// Members arriving per day.
    pub member_users: usize,
    /// Guests arriving per day.
    pub guest_users: usize,
    pub preference: PreferenceModel,
    /// Member swap probability under [`PreferenceModel::FixedRatio`] (percent).
    pub swap_ratio_pct: u32,
    /// Outside temperature seen by the Markov model (°C).
    pub ambient_temperature_c: f64,
    /// Temperature applied to arriving batteries (°C).
    pub battery_temperature_c: f64,
    /// Relative share of each battery type among arriving vehicles.
    pub battery_ratio: Vec<(BatteryType, u32)>,
    /// Serial number of the first arriving battery.
    pub first_battery_id: usize,
}

impl Default for ArrivalSettings {
    fn default() -> Self {
        Self {
            member_users: 200,
            guest_users: 20,
            preference: PreferenceModel::FullSwap,
            swap_ratio_pct: 80,
            ambient_temperature_c: 25.0,
            battery_temperature_c: 25.0,
            battery_ratio: vec![(BatteryType::Kwh100, 1), (BatteryType::Kwh75, 1)],
            first_battery_id: 0,
        }
    }
}

/// Samples a normal variate with the Box-Muller transform.
fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return mean;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z0 * std_dev
}

/// Samples Gamma(k, theta) for integer shape `k` as a sum of exponentials.
fn gamma_int(rng: &mut StdRng, k: u32, theta: f64) -> f64 {
    let product: f64 = (0..k)
        .map(|_| rng.random::<f64>().clamp(1e-12, 1.0))
        .product();
    -theta * product.ln()
}

/// Index picked with probability proportional to `weights`.
///
/// Falls back to the first index when the draw overshoots the total.
fn weighted_index(rng: &mut StdRng, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let x = rng.random::<f64>() * total;
    let mut acc = 0.0;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        if x < acc {
            return i;
        }
    }
    0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Probability of swapping, charging and leaving under the Markov model.
///
/// A prior of `[0.7, 0.25, 0.05]` is advanced one step through a fixed
/// transition matrix and weighted by an observation matrix chosen from
/// whether the temperature lies in 5..=26 °C, the SOC is at least 0.4
/// and the queue holds at most 12 users. Probabilities are rounded to
/// two decimals.
pub fn markov_distribution(temperature_c: f64, soc: f64, queue_len: usize) -> [f64; 3] {
    const PRIOR: [f64; 3] = [0.7, 0.25, 0.05];
    const TRANSITION: [[f64; 3]; 3] = [[0.8, 0.1, 0.1], [0.1, 0.1, 0.8], [0.0, 0.0, 1.0]];

    let mild = (5.0..=26.0).contains(&temperature_c);
    let high_soc = soc >= 0.4;
    let short_queue = queue_len <= 12;
    let observation = match (mild, high_soc, short_queue) {
        (true, true, true) => [0.5, 0.4, 0.1],
        (false, true, true) => [0.7, 0.2, 0.1],
        (true, false, true) => [0.9, 0.1, 0.0],
        (true, true, false) => [0.6, 0.3, 0.1],
        (false, false, true) => [0.8, 0.1, 0.1],
        (false, true, false) => [0.3, 0.3, 0.4],
        (true, false, false) => [0.6, 0.2, 0.2],
        (false, false, false) => [0.7, 0.1, 0.2],
    };

    let mut state = [0.0; 3];
    for (i, row) in TRANSITION.iter().enumerate() {
        let predicted: f64 = row.iter().zip(PRIOR).map(|(t, p)| t * p).sum();
        state[i] = observation[i] * predicted;
    }
    let total: f64 = state.iter().sum();
    state.map(|x| round2(x / total))
}

/// Arrival source driven by a seeded generator.
///
/// # Examples
///
/// ```
/// use swap_sim::sim::arrivals::{ArrivalSettings, ArrivalSource, SeededArrivals};
///
/// let settings = ArrivalSettings { member_users: 30, guest_users: 5, ..Default::default() };
/// let mut source = SeededArrivals::new(settings, 60.0, 7);
/// let total: usize = (0..1440).map(|t| source.arrivals_at(t, 0).len()).sum();
/// assert_eq!(total, 35);
/// ```
pub struct SeededArrivals {
    settings: ArrivalSettings,
    calendar: Calendar,
    rng: StdRng,
    sampled_day: Option<usize>,
    /// Arrival ticks (absolute) for the sampled day, sorted.
    schedule: Vec<(usize, UserClass)>,
    cursor: usize,
    next_user: usize,
    next_battery: usize,
}

impl SeededArrivals {
    /// Creates an arrival source.
    ///
    /// # Panics
    ///
    /// Panics if `interval_s` is not positive.
    pub fn new(settings: ArrivalSettings, interval_s: f64, seed: u64) -> Self {
        let next_battery = settings.first_battery_id;
        Self {
            settings,
            calendar: Calendar::new(interval_s),
            rng: StdRng::seed_from_u64(seed),
            sampled_day: None,
            schedule: Vec::new(),
            cursor: 0,
            next_user: 0,
            next_battery,
        }
    }

    fn sample_day(&mut self, day: usize) {
        let day_start = self.calendar.day_start(day);
        let classes = std::iter::repeat_n(UserClass::Member, self.settings.member_users)
            .chain(std::iter::repeat_n(UserClass::Guest, self.settings.guest_users));
        let mut schedule: Vec<(usize, UserClass)> = classes
            .map(|class| {
                let slot = weighted_index(&mut self.rng, &DAILY_PROFILE);
                let second = (slot as f64 + self.rng.random::<f64>()) * 1800.0;
                (day_start + self.calendar.tick_at_second(second), class)
            })
            .collect();
        schedule.sort_by_key(|(tick, _)| *tick);
        debug!("day {day}: {} arrivals scheduled", schedule.len());
        self.schedule = schedule;
        self.cursor = 0;
        self.sampled_day = Some(day);
    }

    fn battery_type(&mut self) -> BatteryType {
        let weights: Vec<f64> = self
            .settings
            .battery_ratio
            .iter()
            .map(|(_, w)| f64::from(*w))
            .collect();
        if weights.iter().sum::<f64>() <= 0.0 {
            return BatteryType::Kwh100;
        }
        let i = weighted_index(&mut self.rng, &weights);
        self.settings.battery_ratio[i].0
    }

    fn arrival_soc(&mut self, class: UserClass) -> f64 {
        let percent = match class {
            UserClass::Member => gamma_int(&mut self.rng, 3, 12.0),
            UserClass::Guest => gaussian(&mut self.rng, 33.13, 18.71),
        };
        let (lo, hi) = ARRIVAL_SOC_RANGE;
        round2(percent / 100.0).clamp(lo, hi)
    }

    fn decide(&mut self, class: UserClass, soc: f64, queue_len: usize) -> Decision {
        if class == UserClass::Guest {
            return Decision::Charge;
        }
        match self.settings.preference {
            PreferenceModel::FullSwap => Decision::Swap,
            PreferenceModel::FixedRatio => {
                let p = f64::from(self.settings.swap_ratio_pct.min(100)) / 100.0;
                if self.rng.random::<f64>() < p {
                    Decision::Swap
                } else {
                    Decision::Charge
                }
            }
            PreferenceModel::Markov => {
                let probs = markov_distribution(self.settings.ambient_temperature_c, soc, queue_len);
                match weighted_index(&mut self.rng, &probs) {
                    1 => Decision::Charge,
                    2 => Decision::Leave,
                    _ => Decision::Swap,
                }
            }
        }
    }
}

impl ArrivalSource for SeededArrivals {
    fn arrivals_at(&mut self, tick: usize, queue_len: usize) -> Vec<Arrival> {
        let day = self.calendar.day_of(tick);
        if self.sampled_day != Some(day) {
            self.sample_day(day);
            // skip arrivals scheduled before the first tick asked for
            while self.schedule.get(self.cursor).is_some_and(|(t, _)| *t < tick) {
                self.cursor += 1;
            }
        }

        let mut arrivals = Vec::new();
        while let Some(&(t, class)) = self.schedule.get(self.cursor) {
            if t > tick {
                break;
            }
            self.cursor += 1;

            let battery_type = self.battery_type();
            let soc = self.arrival_soc(class);
            let mut battery = Battery::new(self.next_battery, battery_type, soc);
            battery.set_temperature(self.settings.battery_temperature_c);
            self.next_battery += 1;

            let decision = self.decide(class, soc, queue_len + arrivals.len());
            arrivals.push(Arrival {
                user_id: self.next_user,
                class,
                tick,
                battery,
                decision,
            });
            self.next_user += 1;
        }
        arrivals
    }
}
