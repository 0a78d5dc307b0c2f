//! The swap station: rack groups behind a single swap bay.
//!
//! The bay runs a three-state machine (`free`, `in_use`, `switch`). A swap
//! buffers the first rack holding a charged battery, counts down the swap
//! period and then trades that battery for the vehicle's. While the bay is
//! idle the station may move batteries between racks so that packs still
//! charging can reach an unused neighbor module.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::event::GridInteractionWindow;
use super::profile::StationProfile;
use super::swap_rack::{DistributionPolicy, SwapRack};
use crate::devices::{Battery, BatteryRack, PileStatus};
use crate::error::{Rejected, StationError};

/// Seconds the bay stays locked after a rebalancing move.
pub const SWITCH_DURATION_S: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BayStatus {
    Free,
    InUse,
    Switch,
}

impl fmt::Display for BayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BayStatus::Free => "free",
            BayStatus::InUse => "in_use",
            BayStatus::Switch => "switch",
        };
        f.write_str(s)
    }
}

/// How the idle bay reorganises batteries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceMode {
    #[default]
    Off,
    /// Moves inside one rack group only.
    WithinRack,
    /// Moves inside groups first, then between groups.
    AcrossRacks,
}

/// A rack addressed by group and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RackRef {
    pub group: usize,
    pub rack: usize,
}

/// A charge pile addressed by group and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PileRef {
    pub group: usize,
    pub pile: usize,
}

/// Result of advancing the bay by one tick.
#[derive(Debug)]
pub enum SwapOutcome {
    /// No swap finished this tick.
    NotYet,
    /// The swap finished; the charged battery now belongs to the vehicle.
    Completed(Battery),
    /// The buffered rack lost its battery; the vehicle keeps its own.
    Aborted(Battery),
}

impl SwapOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SwapOutcome::Completed(_))
    }
}

/// Operating parameters of a station.
#[derive(Debug, Clone)]
pub struct StationSettings {
    /// Tick length (s).
    pub interval_s: f64,
    /// Duration of one swap (min).
    pub swap_minutes: f64,
    /// SOC at which vehicles on piles stop charging.
    pub target_soc: f64,
    /// SOC a rack battery needs to be handed to a vehicle.
    pub select_soc: f64,
    pub policy: DistributionPolicy,
    pub rebalance: RebalanceMode,
    pub reclaim_pile_modules: bool,
    pub grid: Option<GridInteractionWindow>,
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            interval_s: 10.0,
            swap_minutes: 4.5,
            target_soc: 0.9,
            select_soc: 0.9,
            policy: DistributionPolicy::StationPreferred,
            rebalance: RebalanceMode::Off,
            reclaim_pile_modules: false,
            grid: None,
        }
    }
}

#[derive(Debug)]
pub struct SwapStation {
    pub id: usize,
    profile: StationProfile,
    groups: Vec<SwapRack>,
    status: BayStatus,
    swap_timer: usize,
    switch_timer: usize,
    buffered: Option<RackRef>,
    vehicle_battery: Option<Battery>,
    power_kw: f64,
    power_history: Vec<(usize, f64)>,
    grid: Option<GridInteractionWindow>,
    interactions: usize,
    interaction_day: usize,
    trigger_log: Vec<bool>,
    swap_period_s: f64,
    interval_s: f64,
    rebalance: RebalanceMode,
    target_soc: f64,
    select_soc: f64,
}

impl SwapStation {
    /// Builds an empty station of the given variant.
    ///
    /// # Arguments
    ///
    /// * `id` - Station identifier
    /// * `profile` - Hardware variant
    /// * `piles` - Requested charge piles, clipped to the variant's maximum
    /// * `settings` - Timing, thresholds and policies
    ///
    /// # Panics
    ///
    /// Panics if `settings.interval_s` or `settings.swap_minutes` is not positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use swap_sim::sim::profile::StationProfile;
    /// use swap_sim::sim::station::{StationSettings, SwapStation};
    ///
    /// let station = SwapStation::new(0, StationProfile::Gen3Kw1200, 4, &StationSettings::default());
    /// assert_eq!(station.groups().len(), 2);
    /// assert_eq!(station.pile_count(), 4);
    /// assert_eq!(station.battery_count(), 0);
    /// ```
    pub fn new(id: usize, profile: StationProfile, piles: usize, settings: &StationSettings) -> Self {
        assert!(settings.interval_s > 0.0, "interval must be positive");
        assert!(settings.swap_minutes > 0.0, "swap time must be positive");
        let groups = profile
            .rack_groups(piles)
            .iter()
            .enumerate()
            .map(|(i, layout)| {
                let mut group = SwapRack::from_layout(i, layout);
                group.target_soc = settings.target_soc;
                group.select_soc = settings.select_soc;
                group.policy = settings.policy;
                group.reclaim_pile_modules = settings.reclaim_pile_modules;
                group
            })
            .collect();
        Self {
            id,
            profile,
            groups,
            status: BayStatus::Free,
            swap_timer: 0,
            switch_timer: 0,
            buffered: None,
            vehicle_battery: None,
            power_kw: 0.0,
            power_history: Vec::new(),
            grid: settings.grid,
            interactions: 0,
            interaction_day: 0,
            trigger_log: Vec::new(),
            swap_period_s: settings.swap_minutes * 60.0,
            interval_s: settings.interval_s,
            rebalance: settings.rebalance,
            target_soc: settings.target_soc,
            select_soc: settings.select_soc,
        }
    }

    pub fn profile(&self) -> StationProfile {
        self.profile
    }

    pub fn groups(&self) -> &[SwapRack] {
        &self.groups
    }

    pub fn status(&self) -> BayStatus {
        self.status
    }

    /// Rack reserved for the swap in progress.
    pub fn buffered(&self) -> Option<RackRef> {
        self.buffered
    }

    /// SOC at which vehicles on piles stop charging.
    pub fn target_soc(&self) -> f64 {
        self.target_soc
    }

    /// SOC a rack battery needs before it is handed to a vehicle.
    pub fn select_soc(&self) -> f64 {
        self.select_soc
    }

    /// Net power of the last dispatch (kW); negative while feeding the grid.
    pub fn power_kw(&self) -> f64 {
        self.power_kw
    }

    pub fn max_power_kw(&self) -> f64 {
        self.profile.max_power_kw()
    }

    /// Every `(tick, power_kw)` pair recorded by [`SwapStation::dispatch`].
    pub fn power_history(&self) -> &[(usize, f64)] {
        &self.power_history
    }

    /// Grid-interaction gate recorded on every bay tick.
    pub fn trigger_log(&self) -> &[bool] {
        &self.trigger_log
    }

    /// Grid-discharging swaps completed today.
    pub fn interactions(&self) -> usize {
        self.interactions
    }

    /// Number of batteries held by racks.
    pub fn battery_count(&self) -> usize {
        self.all_racks().filter(|(_, r)| !r.is_free()).count()
    }

    /// Number of rack batteries at or above `select_soc`.
    pub fn ready_battery_count(&self) -> usize {
        self.all_racks()
            .filter(|(_, r)| r.soc().is_some_and(|soc| soc >= self.select_soc))
            .count()
    }

    pub fn pile_count(&self) -> usize {
        self.groups.iter().map(|g| g.piles().len()).sum()
    }

    /// Number of piles currently delivering current.
    pub fn charging_piles(&self) -> usize {
        self.groups
            .iter()
            .flat_map(SwapRack::piles)
            .filter(|p| p.status() == PileStatus::Charging)
            .count()
    }

    fn all_racks(&self) -> impl Iterator<Item = (RackRef, &BatteryRack)> {
        self.groups.iter().enumerate().flat_map(|(g, group)| {
            group
                .racks()
                .iter()
                .enumerate()
                .map(move |(r, rack)| (RackRef { group: g, rack: r }, rack))
        })
    }

    /// The rack at `at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` when the group or rack index is out of range.
    pub fn rack(&self, at: RackRef) -> Result<&BatteryRack, StationError> {
        self.group(at.group)?.rack(at.rack)
    }

    fn group(&self, index: usize) -> Result<&SwapRack, StationError> {
        self.groups.get(index).ok_or(StationError::InvalidReference {
            kind: "rack group",
            index,
            len: self.groups.len(),
        })
    }

    fn group_mut(&mut self, index: usize) -> Result<&mut SwapRack, StationError> {
        let len = self.groups.len();
        self.groups.get_mut(index).ok_or(StationError::InvalidReference {
            kind: "rack group",
            index,
            len,
        })
    }

    /// Applies the rack temperature (°C) to every rack battery.
    pub fn set_temperature(&mut self, rack_celsius: f64) {
        for group in &mut self.groups {
            group.set_temperature(rack_celsius);
        }
    }

    /// Loads a battery into the first free rack of any group.
    ///
    /// # Errors
    ///
    /// Hands the battery back when every rack is occupied.
    pub fn load_battery_auto(&mut self, battery: Battery) -> Result<RackRef, Rejected> {
        let mut battery = battery;
        for (g, group) in self.groups.iter_mut().enumerate() {
            match group.load_battery(battery, None) {
                Ok(rack) => {
                    debug!("station {}: battery loaded into group {g} rack {rack}", self.id);
                    return Ok(RackRef { group: g, rack });
                }
                Err(rejected) => battery = rejected.battery,
            }
        }
        warn!("station {}: no space to load battery {}", self.id, battery.id);
        let reason = StationError::IllegalStateTransition {
            component: "station",
            operation: "load a battery",
            state: "full".into(),
        };
        Err(Rejected::new(reason, battery))
    }

    /// Loads a battery into a specific rack.
    ///
    /// # Errors
    ///
    /// Hands the battery back on a bad reference or an occupied rack.
    pub fn load_battery_target(&mut self, battery: Battery, at: RackRef) -> Result<RackRef, Rejected> {
        match self.group_mut(at.group) {
            Ok(group) => group
                .load_battery(battery, Some(at.rack))
                .map(|rack| RackRef { group: at.group, rack }),
            Err(reason) => Err(Rejected::new(reason, battery)),
        }
    }

    /// Takes the battery out of a specific rack.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference`, `InvalidBattery` for an empty rack, or
    /// `IllegalStateTransition` for the rack reserved by a running swap.
    pub fn remove_battery_target(&mut self, at: RackRef) -> Result<Battery, StationError> {
        if self.buffered == Some(at) {
            return Err(StationError::IllegalStateTransition {
                component: "rack",
                operation: "give up its battery",
                state: "reserved for a swap".into(),
            });
        }
        self.group_mut(at.group)?.unload_battery(at.rack)
    }

    /// Replaces the battery of a specific rack, returning the old one.
    ///
    /// # Errors
    ///
    /// Hands the battery back on a bad reference, an empty rack, or the
    /// rack reserved by a running swap.
    pub fn exchange_battery_target(&mut self, battery: Battery, at: RackRef) -> Result<Battery, Rejected> {
        if self.buffered == Some(at) {
            let reason = StationError::IllegalStateTransition {
                component: "rack",
                operation: "exchange its battery",
                state: "reserved for a swap".into(),
            };
            return Err(Rejected::new(reason, battery));
        }
        match self.group_mut(at.group) {
            Ok(group) => group.exchange_battery(at.rack, battery),
            Err(reason) => Err(Rejected::new(reason, battery)),
        }
    }

    /// Plugs every loaded rack and runs a first distribution pass.
    pub fn init_charge(&mut self) {
        for group in self.groups.iter_mut().filter(|g| g.cabinet().is_some()) {
            group.target_soc = self.target_soc;
            group.select_soc = self.select_soc;
            group.start_charge_all();
            group.distribute();
        }
        info!(
            "station {} ({}): {} batteries, {} ready",
            self.id,
            self.profile,
            self.battery_count(),
            self.ready_battery_count()
        );
    }

    /// First rack across all groups holding a battery at or above `target_soc`.
    ///
    /// Battery types are not matched.
    pub fn select_rack(&self, target_soc: f64) -> Option<RackRef> {
        self.all_racks()
            .find(|(_, rack)| rack.soc().is_some_and(|soc| soc >= target_soc))
            .map(|(at, _)| at)
    }

    /// Reserves a charged rack and starts swapping `battery` in.
    ///
    /// # Errors
    ///
    /// Hands the battery back with `IllegalStateTransition` when the bay is
    /// busy, or `NoBatteryAvailable` when no rack battery reaches `target_soc`.
    pub fn start_swap(&mut self, battery: Battery, target_soc: f64) -> Result<RackRef, Rejected> {
        if self.status != BayStatus::Free {
            let reason = StationError::IllegalStateTransition {
                component: "swap bay",
                operation: "start a swap",
                state: self.status.to_string(),
            };
            return Err(Rejected::new(reason, battery));
        }
        let Some(at) = self.select_rack(target_soc) else {
            return Err(Rejected::new(
                StationError::NoBatteryAvailable { target_soc },
                battery,
            ));
        };
        info!(
            "station {}: swap started, vehicle battery {} for group {} rack {}",
            self.id, battery.id, at.group, at.rack
        );
        self.buffered = Some(at);
        self.vehicle_battery = Some(battery);
        self.swap_timer = 0;
        self.status = BayStatus::InUse;
        Ok(at)
    }

    fn grid_gate(&self, tick: usize) -> bool {
        self.grid
            .is_some_and(|w| w.is_open(tick) && self.interactions < w.max_interactions)
    }

    /// Whether the last bay tick asked for grid discharge.
    pub fn grid_discharge_requested(&self) -> bool {
        self.trigger_log.last().copied().unwrap_or(false)
    }

    /// Advances the bay state machine by one tick.
    pub fn tick(&mut self, tick: usize) -> SwapOutcome {
        if self.status == BayStatus::Switch {
            self.switch_timer += 1;
            if self.switch_timer as f64 * self.interval_s >= SWITCH_DURATION_S {
                self.status = BayStatus::Free;
            }
        }
        if let Some(window) = self.grid {
            let day = window.day_of(tick);
            if day != self.interaction_day {
                self.interaction_day = day;
                self.interactions = 0;
            }
        }

        if self.status != BayStatus::InUse {
            self.trigger_log.push(false);
            if self.status == BayStatus::Free {
                self.rebalance();
            }
            return SwapOutcome::NotYet;
        }

        let gate = self.grid_gate(tick);
        self.trigger_log.push(gate);
        self.swap_timer += 1;
        if (self.swap_timer as f64) * self.interval_s < self.swap_period_s {
            return SwapOutcome::NotYet;
        }
        self.complete_swap(tick, gate)
    }

    fn complete_swap(&mut self, tick: usize, gate: bool) -> SwapOutcome {
        self.swap_timer = 0;
        self.status = BayStatus::Free;
        let at = self.buffered.take();
        let Some(vehicle) = self.vehicle_battery.take() else {
            error!("station {}: swap finished without a vehicle battery", self.id);
            return SwapOutcome::NotYet;
        };
        let Some(at) = at else {
            error!("station {}: swap finished without a reserved rack", self.id);
            return SwapOutcome::Aborted(vehicle);
        };
        if gate {
            if let Some(window) = self.grid {
                self.interactions = (self.interactions + 1).min(window.max_interactions);
            }
        }
        let result = match self.groups.get_mut(at.group) {
            Some(group) => group.exchange_battery(at.rack, vehicle),
            None => Err(Rejected::new(
                StationError::InvalidReference {
                    kind: "rack group",
                    index: at.group,
                    len: self.groups.len(),
                },
                vehicle,
            )),
        };
        match result {
            Ok(charged) => {
                info!(
                    "station {} tick {tick}: swap completed, battery {} leaves at soc {:.3}",
                    self.id, charged.id, charged.soc
                );
                SwapOutcome::Completed(charged)
            }
            Err(rejected) => {
                warn!("station {} tick {tick}: swap aborted: {}", self.id, rejected.reason);
                SwapOutcome::Aborted(rejected.battery)
            }
        }
    }

    /// Runs distribution and charging on every group and records the station power.
    pub fn apply_charge(&mut self, tick: usize) {
        let mut power = 0.0;
        for group in &mut self.groups {
            group.distribute();
            group.apply_charge(tick, self.interval_s);
            power += group.power_kw();
        }
        self.record_power(tick, power);
    }

    /// Discharges every rack battery to the grid for one tick.
    pub fn apply_grid_discharge(&mut self, tick: usize) {
        let mut power = 0.0;
        for group in &mut self.groups {
            group.distribute_for_grid_discharge();
            group.apply_grid_discharge(tick, self.interval_s);
            power += group.power_kw();
        }
        self.record_power(tick, power);
    }

    fn record_power(&mut self, tick: usize, power: f64) {
        self.power_kw = power;
        self.power_history.push((tick, power));
    }

    /// Charges, or discharges when the last bay tick opened the grid gate.
    pub fn dispatch(&mut self, tick: usize) {
        if self.grid_discharge_requested() {
            self.apply_grid_discharge(tick);
        } else {
            self.apply_charge(tick);
        }
    }

    /// One full station tick: bay state machine, then dispatch.
    pub fn step(&mut self, tick: usize) -> SwapOutcome {
        let outcome = self.tick(tick);
        self.dispatch(tick);
        outcome
    }

    /// Connects a vehicle to the first free pile of any group.
    ///
    /// # Errors
    ///
    /// Hands the battery back with `ConfigurationMismatch` when the station
    /// has no piles, or `IllegalStateTransition` when every pile is busy.
    pub fn vehicle_charge(&mut self, battery: Battery) -> Result<PileRef, Rejected> {
        if self.pile_count() == 0 {
            let reason = StationError::ConfigurationMismatch(format!(
                "{} has no charge piles",
                self.profile
            ));
            return Err(Rejected::new(reason, battery));
        }
        let free = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(g, group)| group.first_free_pile().map(|p| (g, p)));
        let Some((g, p)) = free else {
            let reason = StationError::IllegalStateTransition {
                component: "station",
                operation: "connect a vehicle",
                state: "all piles busy".into(),
            };
            return Err(Rejected::new(reason, battery));
        };
        let pile = self.groups[g].connect_vehicle(battery, p)?;
        info!("station {}: vehicle connected to group {g} pile {pile}", self.id);
        Ok(PileRef { group: g, pile })
    }

    /// Detaches the vehicle on a pile and returns its battery.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` for a bad pile or `InvalidBattery` if no vehicle is attached.
    pub fn vehicle_stop_charge(&mut self, at: PileRef) -> Result<Battery, StationError> {
        let group = self.group_mut(at.group)?;
        if at.pile >= group.piles().len() {
            return Err(StationError::InvalidReference {
                kind: "pile",
                index: at.pile,
                len: group.piles().len(),
            });
        }
        group.vehicle_leave(at.pile).ok_or(StationError::InvalidBattery {
            holder: "pile",
            index: at.pile,
        })
    }

    /// Detaches every vehicle that reached `target_soc`.
    pub fn release_charged_vehicles(&mut self) -> Vec<Battery> {
        self.groups
            .iter_mut()
            .flat_map(SwapRack::release_charged_vehicles)
            .collect()
    }

    /// Trades the batteries of two racks and locks the bay for the move.
    ///
    /// One of the two racks may be empty. A moved battery starts charging
    /// only in a group with a cabinet; storage racks stay loaded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` for bad or identical references and
    /// `InvalidBattery` when both racks are empty.
    pub fn switch_battery(&mut self, a: RackRef, b: RackRef) -> Result<(), StationError> {
        if self.rack(a)?.is_free() && self.rack(b)?.is_free() {
            return Err(StationError::InvalidBattery {
                holder: "rack",
                index: a.rack,
            });
        }
        let powered = |station: &Self, at: RackRef| {
            station.group(at.group).is_ok_and(|g| g.cabinet().is_some())
        };
        let (a_powered, b_powered) = (powered(self, a), powered(self, b));
        let (first, second) = self.rack_pair_mut(a, b)?;
        first.swap_battery_with(second);
        for (rack, powered) in [(first, a_powered), (second, b_powered)] {
            if powered && !rack.is_free() {
                rack.start_charge()?;
            }
        }
        debug!(
            "station {}: switched group {} rack {} with group {} rack {}",
            self.id, a.group, a.rack, b.group, b.rack
        );
        self.status = BayStatus::Switch;
        self.switch_timer = 0;
        Ok(())
    }

    fn rack_pair_mut(
        &mut self,
        a: RackRef,
        b: RackRef,
    ) -> Result<(&mut BatteryRack, &mut BatteryRack), StationError> {
        if a == b {
            return Err(StationError::InvalidReference {
                kind: "rack",
                index: b.rack,
                len: self.group(b.group)?.racks().len(),
            });
        }
        if a.group == b.group {
            let racks = self.group_mut(a.group)?.racks_mut();
            let (lo, hi) = (a.rack.min(b.rack), a.rack.max(b.rack));
            let (left, right) = racks.split_at_mut(hi);
            return Ok((&mut left[lo], &mut right[0]));
        }
        let (lo, hi) = (a.group.min(b.group), a.group.max(b.group));
        let (left, right) = self.groups.split_at_mut(hi);
        let (ga, gb) = if a.group < b.group {
            (&mut left[lo], &mut right[0])
        } else {
            (&mut right[0], &mut left[lo])
        };
        Ok((&mut ga.racks_mut()[a.rack], &mut gb.racks_mut()[b.rack]))
    }

    /// Performs at most one rebalancing move according to the configured mode.
    fn rebalance(&mut self) {
        let moved = match self.rebalance {
            RebalanceMode::Off => false,
            RebalanceMode::WithinRack => self.rebalance_within_rack(),
            RebalanceMode::AcrossRacks => {
                self.rebalance_within_rack() || self.rebalance_across_racks()
            }
        };
        if moved {
            debug!("station {}: bay locked for rebalancing", self.id);
        }
    }

    /// Moves a battery out of a fully charging rack pair into an idle pair.
    pub fn rebalance_within_rack(&mut self) -> bool {
        let candidate = self.groups.iter().enumerate().find_map(|(g, group)| {
            group.cabinet()?;
            let from = group.charging_pair()?;
            let to = group.idle_pair()?;
            Some((RackRef { group: g, rack: from }, RackRef { group: g, rack: to }))
        });
        self.try_switch(candidate)
    }

    /// Moves batteries between rack groups.
    ///
    /// With a storage-only second group, a storage battery below
    /// `select_soc` trades places with a charged battery in the charging
    /// group or moves into an empty charging rack. With two charging
    /// groups, a fully charging pair hands one battery to an idle pair of
    /// another group.
    pub fn rebalance_across_racks(&mut self) -> bool {
        if self.groups.len() < 2 {
            return false;
        }
        let candidate = if self.groups[1].cabinet().is_none() {
            self.storage_candidate()
        } else {
            self.cross_group_candidate()
        };
        self.try_switch(candidate)
    }

    fn storage_candidate(&self) -> Option<(RackRef, RackRef)> {
        let storage = &self.groups[1];
        let charging = &self.groups[0];
        let from = storage
            .racks()
            .iter()
            .position(|r| r.soc().is_some_and(|soc| soc < self.select_soc))?;
        let to = charging.racks().iter().position(|r| {
            r.is_free() || r.soc().is_some_and(|soc| soc >= self.select_soc)
        })?;
        Some((RackRef { group: 1, rack: from }, RackRef { group: 0, rack: to }))
    }

    fn cross_group_candidate(&self) -> Option<(RackRef, RackRef)> {
        let (g, from) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(g, group)| group.charging_pair().map(|i| (g, i)))?;
        let (t, to) = self
            .groups
            .iter()
            .enumerate()
            .filter(|(t, _)| *t != g)
            .find_map(|(t, group)| group.idle_pair().map(|j| (t, j)))?;
        Some((RackRef { group: g, rack: from }, RackRef { group: t, rack: to }))
    }

    fn try_switch(&mut self, candidate: Option<(RackRef, RackRef)>) -> bool {
        let Some((a, b)) = candidate else {
            return false;
        };
        match self.switch_battery(a, b) {
            Ok(()) => true,
            Err(e) => {
                warn!("station {}: rebalancing failed: {e}", self.id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{BatteryType, RackStatus};

    fn settings() -> StationSettings {
        StationSettings::default()
    }

    fn pack(id: usize, soc: f64) -> Battery {
        Battery::new(id, BatteryType::Kwh100, soc)
    }

    fn at(group: usize, rack: usize) -> RackRef {
        RackRef { group, rack }
    }

    #[test]
    fn swap_completes_on_the_27th_tick() {
        let mut station = SwapStation::new(0, StationProfile::Gen3Kw1200, 0, &settings());
        assert!(station.load_battery_target(pack(1, 0.95), at(1, 4)).is_ok());
        assert!(station.start_swap(pack(99, 0.2), 0.9).is_ok());
        assert_eq!(station.status(), BayStatus::InUse);
        assert_eq!(station.buffered(), Some(at(1, 4)));

        for t in 0..26 {
            assert!(!station.tick(t).is_completed(), "completed early at {t}");
        }
        match station.tick(26) {
            SwapOutcome::Completed(battery) => assert_eq!(battery.id, 1),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(station.status(), BayStatus::Free);
        assert_eq!(station.buffered(), None);
        let held = station.rack(at(1, 4)).ok().and_then(BatteryRack::battery);
        assert_eq!(held.map(|b| b.id), Some(99));
    }

    #[test]
    fn start_swap_refuses_without_charged_battery() {
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &settings());
        assert!(station.load_battery_auto(pack(1, 0.5)).is_ok());
        let rejected = station.start_swap(pack(2, 0.2), 0.9);
        let rejected = rejected.err();
        assert!(matches!(
            rejected.as_ref().map(|r| &r.reason),
            Some(StationError::NoBatteryAvailable { .. })
        ));
        assert_eq!(rejected.map(|r| r.battery.id), Some(2));
        assert_eq!(station.status(), BayStatus::Free);
    }

    #[test]
    fn busy_bay_rejects_second_swap() {
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &settings());
        assert!(station.load_battery_auto(pack(1, 0.95)).is_ok());
        assert!(station.load_battery_auto(pack(2, 0.95)).is_ok());
        assert!(station.start_swap(pack(10, 0.2), 0.9).is_ok());
        let second = station.start_swap(pack(11, 0.2), 0.9);
        assert_eq!(second.err().map(|r| r.battery.id), Some(11));
    }

    #[test]
    fn selects_first_charged_rack_across_groups() {
        let mut station = SwapStation::new(0, StationProfile::Gen3Kw1200, 0, &settings());
        assert!(station.load_battery_target(pack(1, 0.5), at(0, 0)).is_ok());
        assert!(station.load_battery_target(pack(2, 0.92), at(1, 3)).is_ok());
        assert!(station.load_battery_target(pack(3, 0.99), at(1, 7)).is_ok());
        assert_eq!(station.select_rack(0.9), Some(at(1, 3)));
    }

    #[test]
    fn reserved_rack_cannot_be_emptied() {
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &settings());
        assert!(station.load_battery_auto(pack(1, 0.95)).is_ok());
        assert!(station.start_swap(pack(10, 0.2), 0.9).is_ok());
        assert!(station.remove_battery_target(at(0, 0)).is_err());
        assert!(station.exchange_battery_target(pack(3, 0.4), at(0, 0)).is_err());
    }

    #[test]
    fn load_auto_fills_groups_in_order_and_reports_full() {
        let profile = StationProfile::UserDefined {
            module: crate::devices::ModuleRating::Uu40,
            module_count: 2,
        };
        let mut station = SwapStation::new(0, profile, 0, &settings());
        assert_eq!(station.load_battery_auto(pack(1, 0.5)).ok(), Some(at(0, 0)));
        assert_eq!(station.load_battery_auto(pack(2, 0.5)).ok(), Some(at(0, 1)));
        let full = station.load_battery_auto(pack(3, 0.5));
        assert_eq!(full.err().map(|r| r.battery.id), Some(3));
        assert_eq!(station.battery_count(), 2);
    }

    #[test]
    fn bad_references_are_reported() {
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &settings());
        assert!(station.load_battery_target(pack(1, 0.5), at(1, 0)).is_err());
        assert!(station.load_battery_target(pack(1, 0.5), at(0, 13)).is_err());
        assert!(station.remove_battery_target(at(0, 2)).is_err());
        assert!(station.vehicle_stop_charge(PileRef { group: 0, pile: 0 }).is_err());
    }

    #[test]
    fn vehicle_charge_needs_piles() {
        let mut gen2 = SwapStation::new(0, StationProfile::Gen2Kw530, 4, &settings());
        let rejected = gen2.vehicle_charge(pack(1, 0.2));
        assert!(matches!(
            rejected.map_err(|r| r.reason),
            Err(StationError::ConfigurationMismatch(_))
        ));

        let mut gen3 = SwapStation::new(0, StationProfile::Gen3Kw1200, 2, &settings());
        assert_eq!(gen3.vehicle_charge(pack(1, 0.2)).ok(), Some(PileRef { group: 0, pile: 0 }));
        assert_eq!(gen3.vehicle_charge(pack(2, 0.2)).ok(), Some(PileRef { group: 1, pile: 0 }));
        let busy = gen3.vehicle_charge(pack(3, 0.2));
        assert_eq!(busy.err().map(|r| r.battery.id), Some(3));

        let left = gen3.vehicle_stop_charge(PileRef { group: 1, pile: 0 });
        assert_eq!(left.ok().map(|b| b.id), Some(2));
    }

    #[test]
    fn switch_lock_lasts_thirty_seconds() {
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &settings());
        assert!(station.load_battery_target(pack(1, 0.5), at(0, 0)).is_ok());
        assert!(station.switch_battery(at(0, 0), at(0, 5)).is_ok());
        assert_eq!(station.status(), BayStatus::Switch);
        let moved = station.rack(at(0, 5)).ok().and_then(BatteryRack::battery);
        assert_eq!(moved.map(|b| b.id), Some(1));

        station.tick(0);
        station.tick(1);
        assert_eq!(station.status(), BayStatus::Switch);
        station.tick(2);
        assert_eq!(station.status(), BayStatus::Free);
        assert_eq!(station.trigger_log(), &[false, false, false]);
    }

    #[test]
    fn switch_between_two_empty_racks_fails() {
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &settings());
        assert!(station.switch_battery(at(0, 0), at(0, 1)).is_err());
        assert!(station.switch_battery(at(0, 0), at(0, 0)).is_err());
        assert_eq!(station.status(), BayStatus::Free);
    }

    #[test]
    fn within_rack_rebalancing_uses_idle_pair() {
        let mut s = settings();
        s.rebalance = RebalanceMode::WithinRack;
        let mut station = SwapStation::new(0, StationProfile::Gen3Kw1200, 0, &s);
        assert!(station.load_battery_target(pack(1, 0.5), at(0, 0)).is_ok());
        assert!(station.load_battery_target(pack(2, 0.5), at(0, 1)).is_ok());
        assert!(station.load_battery_target(pack(3, 0.95), at(0, 4)).is_ok());
        station.init_charge();
        let status = |st: &SwapStation, r| st.rack(at(0, r)).map(BatteryRack::status).ok();
        assert_eq!(status(&station, 0), Some(RackStatus::Charging));
        assert_eq!(status(&station, 1), Some(RackStatus::Charging));

        station.tick(0);
        assert_eq!(station.status(), BayStatus::Switch);
        let moved = station.rack(at(0, 4)).ok().and_then(BatteryRack::battery);
        assert_eq!(moved.map(|b| b.id), Some(1));
    }

    #[test]
    fn storage_battery_moves_into_charging_group() {
        let mut s = settings();
        s.rebalance = RebalanceMode::AcrossRacks;
        let mut station = SwapStation::new(0, StationProfile::Gen3Kw600, 0, &s);
        assert!(station.load_battery_target(pack(1, 0.95), at(0, 0)).is_ok());
        assert!(station.load_battery_target(pack(2, 0.3), at(1, 2)).is_ok());
        station.init_charge();

        station.tick(0);
        assert_eq!(station.status(), BayStatus::Switch);
        let charging = station.rack(at(0, 0)).ok().and_then(BatteryRack::battery);
        let storage = station.rack(at(1, 2)).ok().and_then(BatteryRack::battery);
        assert_eq!(charging.map(|b| b.id), Some(2));
        assert_eq!(storage.map(|b| b.id), Some(1));
    }

    #[test]
    fn battery_switched_into_storage_stays_loaded() {
        let mut station = SwapStation::new(0, StationProfile::Gen3Kw600, 0, &settings());
        assert!(station.load_battery_target(pack(1, 0.5), at(0, 3)).is_ok());
        station.init_charge();
        assert!(station.switch_battery(at(0, 3), at(1, 6)).is_ok());

        let status = |st: &SwapStation, r: RackRef| st.rack(r).map(BatteryRack::status).ok();
        assert_eq!(status(&station, at(1, 6)), Some(RackStatus::Loaded));
        assert_eq!(status(&station, at(0, 3)), Some(RackStatus::Free));
        assert!(station.rack(at(1, 6)).is_ok_and(|r| !r.is_plugged()));

        assert!(station.load_battery_target(pack(2, 0.4), at(1, 7)).is_ok());
        assert!(station.switch_battery(at(1, 7), at(0, 3)).is_ok());
        assert_eq!(status(&station, at(0, 3)), Some(RackStatus::Charging));
    }

    #[test]
    fn grid_gate_opens_once_per_window() {
        let mut s = settings();
        s.interval_s = 60.0;
        s.swap_minutes = 2.0;
        s.grid = Some(GridInteractionWindow::new(0, 60.0, 1));
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &s);
        for id in 0..3 {
            assert!(station.load_battery_auto(pack(id, 0.95)).is_ok());
        }
        station.init_charge();

        assert!(station.start_swap(pack(10, 0.2), 0.9).is_ok());
        assert!(!station.step(0).is_completed());
        assert!(station.grid_discharge_requested());
        assert!(station.power_kw() < 0.0);
        assert!(station.step(1).is_completed());
        assert_eq!(station.interactions(), 1);

        assert!(station.start_swap(pack(11, 0.2), 0.9).is_ok());
        station.step(2);
        assert!(!station.grid_discharge_requested());
        assert!(station.power_kw() >= 0.0);
        assert_eq!(station.trigger_log(), &[true, true, false]);
        assert_eq!(station.power_history().len(), 3);
    }

    #[test]
    fn charging_station_draws_power() {
        let mut station = SwapStation::new(0, StationProfile::Gen2Kw530, 0, &settings());
        for id in 0..13 {
            assert!(station.load_battery_auto(pack(id, 0.3)).is_ok());
        }
        station.init_charge();
        station.step(0);
        assert!(station.power_kw() > 0.0);
        assert!(station.power_kw() <= station.max_power_kw() + 1e-6);
        assert_eq!(station.power_history()[0].0, 0);
    }
}
