//! Simulation engine that feeds arriving users through one swap station.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::devices::Battery;

use super::arrivals::{ArrivalSource, Decision, UserClass};
use super::clock::Clock;
use super::station::{BayStatus, SwapOutcome, SwapStation};
use super::types::{SimConfig, StepResult};

/// Life cycle of one arriving user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub user_id: usize,
    pub class: UserClass,
    /// Service the user chose; `Leave` for users who went away unserved.
    pub decision: Decision,
    /// SOC of the vehicle battery on arrival.
    pub arrival_soc: f64,
    pub arrival_tick: usize,
    /// Tick the swap began or the vehicle was plugged in.
    pub start_tick: Option<usize>,
    /// Tick the swap finished or the vehicle was unplugged.
    pub completion_tick: Option<usize>,
}

impl ServiceRecord {
    /// Ticks spent queueing before service started.
    pub fn wait_ticks(&self) -> Option<usize> {
        self.start_tick.map(|s| s - self.arrival_tick)
    }

    /// Ticks from arrival to completion.
    pub fn service_ticks(&self) -> Option<usize> {
        self.completion_tick.map(|c| c - self.arrival_tick)
    }

    pub fn is_served(&self) -> bool {
        self.completion_tick.is_some()
    }
}

/// A user in a queue together with the battery in their vehicle.
#[derive(Debug)]
struct Waiting {
    record: usize,
    battery: Battery,
}

/// Simulation engine owning the station, the arrival source and the queues.
///
/// Generic over `A: ArrivalSource` so tests can script arrivals while runs
/// use [`SeededArrivals`](super::arrivals::SeededArrivals).
///
/// # Examples
///
/// ```
/// use swap_sim::devices::{Battery, BatteryType};
/// use swap_sim::sim::arrivals::{ArrivalSettings, SeededArrivals};
/// use swap_sim::sim::engine::Engine;
/// use swap_sim::sim::profile::StationProfile;
/// use swap_sim::sim::station::{StationSettings, SwapStation};
/// use swap_sim::sim::types::SimConfig;
///
/// let config = SimConfig::new(60.0, 1, 42);
/// let settings = StationSettings { interval_s: 60.0, ..Default::default() };
/// let mut station = SwapStation::new(0, StationProfile::Gen3Kw1200, 2, &settings);
/// for id in 0..20 {
///     station.load_battery_auto(Battery::new(id, BatteryType::Kwh100, 0.95)).ok();
/// }
/// station.init_charge();
///
/// let arrivals = SeededArrivals::new(ArrivalSettings { first_battery_id: 20, ..Default::default() }, 60.0, 42);
/// let mut engine = Engine::new(config, station, arrivals);
/// let results = engine.run();
/// assert_eq!(results.len(), 1440);
/// ```
pub struct Engine<A: ArrivalSource> {
    config: SimConfig,
    station: SwapStation,
    arrivals: A,
    swap_queue: VecDeque<Waiting>,
    charge_queue: VecDeque<Waiting>,
    /// Head of the swap queue, waiting for the bay or a charged battery.
    swap_user: Option<Waiting>,
    /// Record of the swap in progress.
    in_swap: Option<usize>,
    /// Head of the charge queue, waiting for a free pile.
    charge_user: Option<Waiting>,
    /// Battery id of each plugged vehicle to its record.
    on_pile: HashMap<usize, usize>,
    records: Vec<ServiceRecord>,
}

impl<A: ArrivalSource> Engine<A> {
    /// Creates a new engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation timing; its interval must match the station's
    /// * `station` - Stocked station, ready to run
    /// * `arrivals` - Source of arriving users
    pub fn new(config: SimConfig, station: SwapStation, arrivals: A) -> Self {
        Self {
            config,
            station,
            arrivals,
            swap_queue: VecDeque::new(),
            charge_queue: VecDeque::new(),
            swap_user: None,
            in_swap: None,
            charge_user: None,
            on_pile: HashMap::new(),
            records: Vec::new(),
        }
    }

    /// Executes one tick and returns its record.
    ///
    /// Phases run in a fixed order: admit arrivals, release charged
    /// vehicles, pull queue heads into service, advance the station.
    pub fn step(&mut self, t: usize) -> StepResult {
        // 1. Admit arrivals
        self.admit(t);
        let swap_queue = self.swap_queue.len() + usize::from(self.swap_user.is_some());
        let charge_queue = self.charge_queue.len() + usize::from(self.charge_user.is_some());

        // 2. Vehicles that reached the target leave their piles
        for battery in self.station.release_charged_vehicles() {
            match self.on_pile.remove(&battery.id) {
                Some(record) => {
                    self.records[record].completion_tick = Some(t);
                    debug!("tick {t}: user {} done charging", self.records[record].user_id);
                }
                None => warn!("tick {t}: unknown vehicle battery {} left a pile", battery.id),
            }
        }

        // 3. Pull queue heads
        if self.swap_user.is_none() {
            self.swap_user = self.swap_queue.pop_front();
        }
        if self.charge_user.is_none() {
            self.charge_user = self.charge_queue.pop_front();
        }

        // 4. Start a swap when the bay is free
        if self.station.status() == BayStatus::Free {
            if let Some(user) = self.swap_user.take() {
                self.try_start_swap(t, user);
            }
        }

        // 5. Plug in the charge user
        if let Some(user) = self.charge_user.take() {
            self.try_plug_in(t, user);
        }

        // 6. Station tick and dispatch
        let outcome = self.station.step(t);
        let swap_completed = outcome.is_completed();
        self.finish_swap(t, outcome);

        // 7. Build result
        let power_kw = self.station.power_kw();
        StepResult {
            tick: t,
            time_hr: self.config.calendar().hours(t),
            power_kw,
            residual_kw: self.station.max_power_kw() - power_kw,
            swap_queue,
            charge_queue,
            bay: self.station.status(),
            grid_discharge: self.station.grid_discharge_requested(),
            charging_piles: self.station.charging_piles(),
            ready_batteries: self.station.ready_battery_count(),
            swap_completed,
        }
    }

    fn admit(&mut self, t: usize) {
        let queued = self.swap_queue.len() + self.charge_queue.len();
        for arrival in self.arrivals.arrivals_at(t, queued) {
            let mut decision = arrival.decision;
            if decision == Decision::Charge && self.station.pile_count() == 0 {
                debug!("tick {t}: user {} wants a pile, station has none", arrival.user_id);
                decision = Decision::Leave;
            }
            let record = self.records.len();
            self.records.push(ServiceRecord {
                user_id: arrival.user_id,
                class: arrival.class,
                decision,
                arrival_soc: arrival.battery.soc,
                arrival_tick: t,
                start_tick: None,
                completion_tick: None,
            });
            let waiting = Waiting {
                record,
                battery: arrival.battery,
            };
            match decision {
                Decision::Swap => self.swap_queue.push_back(waiting),
                Decision::Charge => self.charge_queue.push_back(waiting),
                Decision::Leave => debug!("tick {t}: user {} left", arrival.user_id),
            }
        }
    }

    fn try_start_swap(&mut self, t: usize, user: Waiting) {
        let select_soc = self.station.select_soc();
        match self.station.start_swap(user.battery, select_soc) {
            Ok(_) => {
                self.records[user.record].start_tick = Some(t);
                self.in_swap = Some(user.record);
            }
            Err(rejected) => {
                debug!("tick {t}: swap postponed: {}", rejected.reason);
                self.swap_user = Some(Waiting {
                    record: user.record,
                    battery: rejected.battery,
                });
            }
        }
    }

    fn try_plug_in(&mut self, t: usize, user: Waiting) {
        let mut battery = user.battery;
        battery.target_max_soc = self.station.target_soc();
        let id = battery.id;
        match self.station.vehicle_charge(battery) {
            Ok(_) => {
                self.records[user.record].start_tick = Some(t);
                self.on_pile.insert(id, user.record);
            }
            Err(rejected) => {
                self.charge_user = Some(Waiting {
                    record: user.record,
                    battery: rejected.battery,
                });
            }
        }
    }

    fn finish_swap(&mut self, t: usize, outcome: SwapOutcome) {
        match outcome {
            SwapOutcome::NotYet => {}
            SwapOutcome::Completed(battery) => {
                if let Some(record) = self.in_swap.take() {
                    self.records[record].completion_tick = Some(t);
                    info!(
                        "tick {t}: user {} drove off with battery {} at soc {:.2}",
                        self.records[record].user_id, battery.id, battery.soc
                    );
                }
            }
            SwapOutcome::Aborted(battery) => {
                if let Some(record) = self.in_swap.take() {
                    self.records[record].start_tick = None;
                    warn!("tick {t}: swap for user {} aborted, requeued", self.records[record].user_id);
                    if let Some(next) = self.swap_user.replace(Waiting { record, battery }) {
                        self.swap_queue.push_front(next);
                    }
                }
            }
        }
    }

    /// Executes all ticks and returns the complete step record vector.
    pub fn run(&mut self) -> Vec<StepResult> {
        let mut clock = Clock::for_days(self.config.days, self.config.interval_s);
        let mut results = Vec::with_capacity(clock.total());
        clock.run(|t| results.push(self.step(t)));
        results
    }

    /// Every user admitted so far, in arrival order.
    pub fn records(&self) -> &[ServiceRecord] {
        &self.records
    }

    pub fn station(&self) -> &SwapStation {
        &self.station
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::BatteryType;
    use crate::sim::arrivals::Arrival;
    use crate::sim::profile::StationProfile;
    use crate::sim::station::StationSettings;

    /// Arrivals scripted as `(tick, decision, soc)`.
    struct Scripted {
        plan: Vec<(usize, Decision, f64)>,
        next_id: usize,
    }

    impl Scripted {
        fn new(plan: Vec<(usize, Decision, f64)>) -> Self {
            Self { plan, next_id: 100 }
        }
    }

    impl ArrivalSource for Scripted {
        fn arrivals_at(&mut self, tick: usize, _queue_len: usize) -> Vec<Arrival> {
            let due: Vec<_> = self.plan.iter().filter(|(t, _, _)| *t == tick).copied().collect();
            due.into_iter()
                .map(|(_, decision, soc)| {
                    self.next_id += 1;
                    Arrival {
                        user_id: self.next_id,
                        class: UserClass::Member,
                        tick,
                        battery: Battery::new(self.next_id, BatteryType::Kwh100, soc),
                        decision,
                    }
                })
                .collect()
        }
    }

    fn stocked_station(piles: usize, charged: usize) -> SwapStation {
        let settings = StationSettings {
            interval_s: 60.0,
            swap_minutes: 3.0,
            ..Default::default()
        };
        let mut station = SwapStation::new(0, StationProfile::Gen3Kw1200, piles, &settings);
        for id in 0..charged {
            station
                .load_battery_auto(Battery::new(id, BatteryType::Kwh100, 0.95))
                .ok();
        }
        station.init_charge();
        station
    }

    fn engine(piles: usize, charged: usize, plan: Vec<(usize, Decision, f64)>) -> Engine<Scripted> {
        Engine::new(
            SimConfig::new(60.0, 1, 0),
            stocked_station(piles, charged),
            Scripted::new(plan),
        )
    }

    #[test]
    fn swap_users_are_served_in_order() {
        let mut engine = engine(0, 4, vec![(0, Decision::Swap, 0.2), (0, Decision::Swap, 0.3)]);
        let results: Vec<_> = (0..10).map(|t| engine.step(t)).collect();

        let records = engine.records();
        assert_eq!(records[0].start_tick, Some(0));
        assert_eq!(records[0].completion_tick, Some(2));
        assert_eq!(records[1].start_tick, Some(3));
        assert_eq!(records[1].completion_tick, Some(5));
        assert_eq!(records[1].wait_ticks(), Some(3));
        assert_eq!(results.iter().filter(|r| r.swap_completed).count(), 2);
        assert_eq!(results[0].swap_queue, 2);
    }

    #[test]
    fn swap_waits_for_a_charged_battery() {
        let mut engine = engine(0, 0, vec![(0, Decision::Swap, 0.2)]);
        for t in 0..5 {
            let r = engine.step(t);
            assert_eq!(r.swap_queue, 1);
            assert_eq!(r.bay, BayStatus::Free);
        }
        assert_eq!(engine.records()[0].start_tick, None);
    }

    #[test]
    fn charge_users_leave_when_station_has_no_piles() {
        let mut engine = engine(0, 2, vec![(0, Decision::Charge, 0.5)]);
        let r = engine.step(0);
        assert_eq!(r.charge_queue, 0);
        assert_eq!(engine.records()[0].decision, Decision::Leave);
    }

    #[test]
    fn charge_user_is_plugged_and_released() {
        let mut engine = engine(2, 2, vec![(0, Decision::Charge, 0.85)]);
        let mut released = None;
        for t in 0..120 {
            engine.step(t);
            if let Some(done) = engine.records()[0].completion_tick {
                released = Some(done);
                break;
            }
        }
        assert_eq!(engine.records()[0].start_tick, Some(0));
        assert!(released.is_some(), "vehicle should reach target soc");
        assert_eq!(engine.station().charging_piles(), 0);
    }

    #[test]
    fn balking_users_are_recorded_but_not_queued() {
        let mut engine = engine(2, 2, vec![(0, Decision::Leave, 0.5)]);
        let r = engine.step(0);
        assert_eq!(r.swap_queue + r.charge_queue, 0);
        assert_eq!(engine.records().len(), 1);
        assert!(!engine.records()[0].is_served());
    }

    #[test]
    fn run_covers_every_tick() {
        let mut engine = engine(0, 2, Vec::new());
        let results = engine.run();
        assert_eq!(results.len(), 1440);
        assert_eq!(results[1439].tick, 1439);
    }
}
