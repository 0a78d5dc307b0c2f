//! A rack group: battery racks, charge piles and the cabinet feeding them.
//!
//! The group owns the connection map, one slot per power module, and
//! recomputes it every tick before driving current into the consumers.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::profile::RackGroupLayout;
use crate::devices::{
    Battery, BatteryRack, ChargePile, Consumer, ModuleRating, PileStatus, PowerCabinet,
    RackStatus,
};
use crate::error::{Rejected, StationError};

/// Current a rack battery may ask for inside the station (A).
pub const RACK_CURRENT_LIMIT: f64 = 250.0;

/// Upper bound on modules feeding one consumer.
pub const MAX_MODULES_PER_CONSUMER: usize = 2;

/// Which consumers get first pick of free power modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistributionPolicy {
    /// Internal racks first, piles take what is left.
    #[default]
    StationPreferred,
    /// Piles first, and may preempt charging racks.
    PilePreferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Charge,
    Discharge,
}

/// Smallest number of modules (1..=10) that can carry the battery's allowable load.
///
/// Returns 0 for a missing battery or one already at its target maximum.
/// A divisor qualifies when *either* the per-module power or the
/// per-module current fits the rating.
pub fn modules_needed(battery: Option<&Battery>, current_limit: f64, rating: ModuleRating) -> usize {
    let Some(battery) = battery else {
        return 0;
    };
    if battery.soc >= battery.target_max_soc {
        return 0;
    }
    let current = battery.current_limit().min(current_limit);
    let power = current * battery.voltage / 1000.0;
    (1..=10)
        .find(|&d| {
            let d = d as f64;
            power / d <= rating.max_power_kw() || current / d <= rating.max_current()
        })
        .unwrap_or(10)
}

/// Groups map slots by consumer, in order of first appearance.
fn consumer_groups(map: &[Option<Consumer>]) -> Vec<(Consumer, Vec<usize>)> {
    let mut groups: Vec<(Consumer, Vec<usize>)> = Vec::new();
    for (slot, link) in map.iter().enumerate() {
        let Some(consumer) = *link else { continue };
        match groups.iter_mut().find(|(c, _)| *c == consumer) {
            Some((_, slots)) => slots.push(slot),
            None => groups.push((consumer, vec![slot])),
        }
    }
    groups
}

/// The battery behind `consumer` with the current ceiling of its holder.
fn consumer_battery<'a>(
    racks: &'a mut [BatteryRack],
    piles: &'a mut [ChargePile],
    consumer: Consumer,
) -> Option<(&'a mut Battery, f64)> {
    match consumer {
        Consumer::Rack(r) => racks
            .get_mut(r)?
            .battery_mut()
            .map(|b| (b, RACK_CURRENT_LIMIT)),
        Consumer::Pile(p) => {
            let pile = piles.get_mut(p)?;
            let limit = pile.max_current;
            pile.battery_mut().map(|b| (b, limit))
        }
    }
}

fn paired_slot(index: usize) -> usize {
    if index % 2 == 0 { index + 1 } else { index - 1 }
}

/// One rack group of a station.
#[derive(Debug)]
pub struct SwapRack {
    pub id: usize,
    racks: Vec<BatteryRack>,
    piles: Vec<ChargePile>,
    cabinet: Option<PowerCabinet>,
    connection_map: Vec<Option<Consumer>>,
    /// SOC at which a vehicle on a pile is considered done.
    pub target_soc: f64,
    /// SOC at which a rack battery is ready to be swapped out.
    pub select_soc: f64,
    pub policy: DistributionPolicy,
    /// Lets a rack take its own module back from a pile holding two.
    pub reclaim_pile_modules: bool,
}

impl SwapRack {
    /// Creates an empty group.
    ///
    /// # Arguments
    ///
    /// * `id` - Group index inside the station
    /// * `racks` - Number of battery racks
    /// * `cabinet` - Power cabinet, `None` for storage-only groups
    /// * `piles` - Number of external charge piles
    pub fn new(id: usize, racks: usize, cabinet: Option<PowerCabinet>, piles: usize) -> Self {
        let modules = cabinet.as_ref().map_or(0, PowerCabinet::module_count);
        Self {
            id,
            racks: (0..racks).map(BatteryRack::new).collect(),
            piles: (0..piles).map(ChargePile::new).collect(),
            cabinet,
            connection_map: vec![None; modules],
            target_soc: 0.9,
            select_soc: 0.9,
            policy: DistributionPolicy::default(),
            reclaim_pile_modules: false,
        }
    }

    /// Creates an empty group from a profile layout.
    pub fn from_layout(id: usize, layout: &RackGroupLayout) -> Self {
        let cabinet = layout
            .cabinet
            .map(|(rating, count)| PowerCabinet::new(rating, count));
        Self::new(id, layout.racks, cabinet, layout.piles)
    }

    pub fn racks(&self) -> &[BatteryRack] {
        &self.racks
    }

    pub(crate) fn racks_mut(&mut self) -> &mut [BatteryRack] {
        &mut self.racks
    }

    pub fn piles(&self) -> &[ChargePile] {
        &self.piles
    }

    pub fn cabinet(&self) -> Option<&PowerCabinet> {
        self.cabinet.as_ref()
    }

    pub fn connection_map(&self) -> &[Option<Consumer>] {
        &self.connection_map
    }

    pub fn rack(&self, index: usize) -> Result<&BatteryRack, StationError> {
        self.racks.get(index).ok_or(StationError::InvalidReference {
            kind: "rack",
            index,
            len: self.racks.len(),
        })
    }

    fn rack_mut(&mut self, index: usize) -> Result<&mut BatteryRack, StationError> {
        let len = self.racks.len();
        self.racks.get_mut(index).ok_or(StationError::InvalidReference {
            kind: "rack",
            index,
            len,
        })
    }

    fn pile_mut(&mut self, index: usize) -> Result<&mut ChargePile, StationError> {
        let len = self.piles.len();
        self.piles.get_mut(index).ok_or(StationError::InvalidReference {
            kind: "pile",
            index,
            len,
        })
    }

    /// Number of modules currently mapped to `consumer`.
    pub fn assigned(&self, consumer: Consumer) -> usize {
        self.connection_map
            .iter()
            .filter(|&&link| link == Some(consumer))
            .count()
    }

    /// Modules `battery` could use behind `current_limit`; 0 without a cabinet.
    pub fn module_count_for(&self, battery: Option<&Battery>, current_limit: f64) -> usize {
        self.cabinet
            .as_ref()
            .map_or(0, |c| modules_needed(battery, current_limit, c.rating()))
    }

    /// Modules a consumer could use right now.
    pub fn module_count_for_consumer(&self, consumer: Consumer) -> usize {
        match consumer {
            Consumer::Rack(r) => self.module_count_for(
                self.racks.get(r).and_then(BatteryRack::battery),
                RACK_CURRENT_LIMIT,
            ),
            Consumer::Pile(p) => self.piles.get(p).map_or(0, |pile| {
                self.module_count_for(pile.battery(), pile.max_current)
            }),
        }
    }

    /// Power drawn by the cabinet (kW); 0 for storage-only groups.
    pub fn power_kw(&self) -> f64 {
        self.cabinet.as_ref().map_or(0.0, PowerCabinet::total_power_kw)
    }

    /// Loads a battery at `position`, or the first free rack when `None`.
    ///
    /// # Errors
    ///
    /// Hands the battery back on a bad index or when no rack is free.
    pub fn load_battery(
        &mut self,
        battery: Battery,
        position: Option<usize>,
    ) -> Result<usize, Rejected> {
        let index = match position {
            Some(i) if i < self.racks.len() => i,
            Some(i) => {
                let reason = StationError::InvalidReference {
                    kind: "rack",
                    index: i,
                    len: self.racks.len(),
                };
                return Err(Rejected::new(reason, battery));
            }
            None => match self.racks.iter().position(BatteryRack::is_free) {
                Some(i) => i,
                None => {
                    let reason = StationError::IllegalStateTransition {
                        component: "rack group",
                        operation: "load a battery",
                        state: "full".into(),
                    };
                    return Err(Rejected::new(reason, battery));
                }
            },
        };
        self.racks[index].load(battery)
    }

    /// Takes the battery out of rack `index` and frees its modules.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` for a bad index, `InvalidBattery` for an empty rack.
    pub fn unload_battery(&mut self, index: usize) -> Result<Battery, StationError> {
        let rack = self.rack_mut(index)?;
        let battery = rack.remove().ok_or(StationError::InvalidBattery {
            holder: "rack",
            index,
        })?;
        self.release_consumer(Consumer::Rack(index));
        Ok(battery)
    }

    /// Puts `battery` into an occupied rack and returns the one it replaces.
    ///
    /// The rack is stopped for the exchange and charging again afterwards.
    ///
    /// # Errors
    ///
    /// Hands the battery back on a bad index or an empty rack.
    pub fn exchange_battery(&mut self, index: usize, battery: Battery) -> Result<Battery, Rejected> {
        let id = self.id;
        let rack = match self.rack_mut(index) {
            Ok(rack) => rack,
            Err(reason) => return Err(Rejected::new(reason, battery)),
        };
        rack.stop_charge();
        let previous = rack.exchange(battery)?;
        if let Err(e) = rack.start_charge() {
            warn!("group {id}: {e}");
        }
        Ok(previous)
    }

    /// Connects a vehicle battery to pile `index`.
    ///
    /// # Errors
    ///
    /// Hands the battery back on a bad index or an occupied pile.
    pub fn connect_vehicle(&mut self, battery: Battery, index: usize) -> Result<usize, Rejected> {
        match self.pile_mut(index) {
            Ok(pile) => pile.connect(battery),
            Err(reason) => Err(Rejected::new(reason, battery)),
        }
    }

    /// Detaches the vehicle on pile `index` and frees its modules.
    pub fn vehicle_leave(&mut self, index: usize) -> Option<Battery> {
        let battery = self.piles.get_mut(index)?.vehicle_leave();
        self.release_consumer(Consumer::Pile(index));
        battery
    }

    /// First pile with no vehicle attached.
    pub fn first_free_pile(&self) -> Option<usize> {
        self.piles.iter().position(ChargePile::is_free)
    }

    /// Detaches every vehicle whose battery reached `target_soc`.
    pub fn release_charged_vehicles(&mut self) -> Vec<Battery> {
        let done: Vec<usize> = self
            .piles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.battery().is_some_and(|b| b.soc >= self.target_soc))
            .map(|(i, _)| i)
            .collect();
        done.into_iter()
            .filter_map(|i| {
                info!("group {}: vehicle leaves pile {i}", self.id);
                self.vehicle_leave(i)
            })
            .collect()
    }

    /// Starts charging one consumer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` or `InvalidBattery`.
    pub fn start_charge(&mut self, consumer: Consumer) -> Result<(), StationError> {
        match consumer {
            Consumer::Rack(r) => self.rack_mut(r)?.start_charge(),
            Consumer::Pile(p) => self.pile_mut(p)?.start_charge(),
        }
    }

    /// Stops charging one consumer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` for a bad index.
    pub fn stop_charge(&mut self, consumer: Consumer) -> Result<(), StationError> {
        match consumer {
            Consumer::Rack(r) => self.rack_mut(r)?.stop_charge(),
            Consumer::Pile(p) => self.pile_mut(p)?.stop_charge(),
        }
        Ok(())
    }

    /// Starts returning energy from rack `index`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` or `InvalidBattery`.
    pub fn start_discharge(&mut self, index: usize) -> Result<(), StationError> {
        self.rack_mut(index)?.start_discharge()
    }

    /// Plugs in every loaded rack.
    pub fn start_charge_all(&mut self) {
        for rack in self.racks.iter_mut().filter(|r| !r.is_free()) {
            if let Err(e) = rack.start_charge() {
                warn!("group {}: {e}", self.id);
            }
        }
    }

    /// Stops every rack and pile.
    pub fn stop_charge_all(&mut self) {
        for rack in &mut self.racks {
            rack.stop_charge();
        }
        for pile in &mut self.piles {
            pile.stop_charge();
        }
    }

    /// Applies a rack temperature (°C) to every rack battery.
    pub fn set_temperature(&mut self, celsius: f64) {
        for battery in self.racks.iter_mut().filter_map(BatteryRack::battery_mut) {
            battery.set_temperature(celsius);
        }
    }

    /// First even rack whose pair is charging on both sides.
    pub fn charging_pair(&self) -> Option<usize> {
        let charging = |i: usize| {
            self.racks
                .get(i)
                .is_some_and(|r| r.status() == RackStatus::Charging)
        };
        (0..self.racks.len().saturating_sub(1))
            .step_by(2)
            .find(|&i| charging(i) && charging(i + 1))
    }

    /// First even rack holding a battery whose pair is not charging at all.
    pub fn idle_pair(&self) -> Option<usize> {
        let idle = |i: usize| {
            self.racks
                .get(i)
                .is_none_or(|r| r.status() != RackStatus::Charging)
        };
        (0..self.racks.len())
            .step_by(2)
            .find(|&j| idle(j) && idle(j + 1) && !self.racks[j].is_free())
    }

    fn release_consumer(&mut self, consumer: Consumer) {
        for (slot, link) in self.connection_map.iter_mut().enumerate() {
            if *link == Some(consumer) {
                *link = None;
                if let Some(module) = self.cabinet.as_mut().and_then(|c| c.module_mut(slot)) {
                    module.stop_charge();
                }
            }
        }
    }

    /// Recomputes the connection map under the group's policy and commits it.
    pub fn distribute(&mut self) {
        if self.cabinet.is_none() {
            return;
        }
        self.release_stale();
        self.trim_over_allocation();
        match self.policy {
            DistributionPolicy::StationPreferred => {
                self.assign_racks();
                for p in 0..self.piles.len() {
                    if self.piles[p].status() == PileStatus::Charging {
                        self.connect_pile(p);
                    }
                }
                for p in 0..self.piles.len() {
                    if self.piles[p].status() == PileStatus::Connected
                        && self.assigned(Consumer::Pile(p)) == 0
                    {
                        self.connect_pile(p);
                    }
                }
            }
            DistributionPolicy::PilePreferred => {
                for p in 0..self.piles.len() {
                    let waiting = self.piles[p].status() == PileStatus::Connected
                        && self.assigned(Consumer::Pile(p)) == 0;
                    if self.piles[p].status() == PileStatus::Charging || waiting {
                        self.connect_pile(p);
                    }
                }
                self.assign_racks();
            }
        }
        self.commit(Mode::Charge);
    }

    /// Maps every loaded rack to its own module and starts discharging them.
    ///
    /// Piles lose their modules for the tick; attached vehicles stay connected.
    pub fn distribute_for_grid_discharge(&mut self) {
        if self.cabinet.is_none() {
            return;
        }
        for (slot, link) in self.connection_map.iter_mut().enumerate() {
            *link = self
                .racks
                .get(slot)
                .filter(|r| !r.is_free())
                .map(|_| Consumer::Rack(slot));
        }
        self.commit(Mode::Discharge);
    }

    fn release_stale(&mut self) {
        for slot in 0..self.connection_map.len() {
            let Some(consumer) = self.connection_map[slot] else {
                continue;
            };
            let stale = match consumer {
                Consumer::Rack(r) => self.racks.get(r).is_none_or(|rack| {
                    rack.battery()
                        .is_none_or(|b| b.soc >= self.select_soc || !rack.is_plugged())
                }),
                Consumer::Pile(p) => self.piles.get(p).is_none_or(|pile| {
                    pile.battery().is_none_or(|b| {
                        b.soc >= self.target_soc || pile.status() != PileStatus::Charging
                    })
                }),
            };
            if !stale {
                continue;
            }
            self.connection_map[slot] = None;
            match consumer {
                Consumer::Rack(r) => {
                    if let Some(rack) = self.racks.get_mut(r) {
                        rack.plug_out();
                    }
                }
                Consumer::Pile(p) => {
                    if let Some(pile) = self.piles.get_mut(p) {
                        pile.stop_charge();
                    }
                }
            }
            debug!("group {}: module {slot} released from {consumer}", self.id);
        }
    }

    fn trim_over_allocation(&mut self) {
        for r in 0..self.racks.len() {
            let rack = Consumer::Rack(r);
            if self.assigned(rack) < 2 || self.module_count_for_consumer(rack) >= 2 {
                continue;
            }
            let neighbor = paired_slot(r);
            if self.connection_map.get(neighbor) == Some(&Some(rack)) {
                self.connection_map[neighbor] = None;
                debug!("group {}: rack {r} gave back module {neighbor}", self.id);
            }
        }
    }

    fn assign_racks(&mut self) {
        let modules = self.connection_map.len();
        for r in 0..self.racks.len().min(modules) {
            let rack = &self.racks[r];
            let eligible = rack.is_plugged()
                && rack.battery().is_some_and(|b| b.soc < self.select_soc);
            if !eligible {
                continue;
            }
            let wanted = self.module_count_for_consumer(Consumer::Rack(r));
            if wanted == 0 {
                continue;
            }

            let own = Some(Consumer::Rack(r));
            let pile_keeps = match self.connection_map[r] {
                Some(Consumer::Pile(p)) => {
                    self.policy == DistributionPolicy::PilePreferred
                        || (!self.reclaim_pile_modules && self.assigned(Consumer::Pile(p)) > 1)
                }
                _ => false,
            };
            if !pile_keeps {
                self.connection_map[r] = own;
            }

            let neighbor = paired_slot(r);
            if neighbor >= modules {
                continue;
            }
            let has_own = self.connection_map[r] == own;
            if (wanted > 1 || !has_own) && self.connection_map[neighbor].is_none() {
                self.connection_map[neighbor] = own;
            } else if wanted == 1 && has_own && self.connection_map[neighbor] == own {
                self.connection_map[neighbor] = None;
            }
        }
    }

    fn connect_pile(&mut self, p: usize) {
        let Some(pile) = self.piles.get(p) else {
            return;
        };
        if pile.battery().is_none() {
            warn!("group {}: pile {p} has no vehicle to serve", self.id);
            return;
        }
        let consumer = Consumer::Pile(p);
        let wanted = self
            .module_count_for_consumer(consumer)
            .min(MAX_MODULES_PER_CONSUMER);
        let mut need = wanted as isize - self.assigned(consumer) as isize;

        for link in &mut self.connection_map {
            if need == 0 {
                break;
            }
            if link.is_none() && need > 0 {
                *link = Some(consumer);
                need -= 1;
            } else if *link == Some(consumer) && need < 0 {
                *link = None;
                need += 1;
            }
        }

        if need > 0 && self.policy == DistributionPolicy::PilePreferred {
            self.preempt_racks(p, need as usize);
        }
    }

    /// Hands modules of the lowest-SOC charging racks to pile `p`.
    fn preempt_racks(&mut self, p: usize, mut need: usize) {
        while need > 0 {
            let victim = (0..self.racks.len())
                .filter(|&r| self.assigned(Consumer::Rack(r)) > 0)
                .filter_map(|r| self.racks[r].soc().map(|soc| (r, soc)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(r, _)| r);
            let Some(victim) = victim else {
                break;
            };
            for link in &mut self.connection_map {
                if *link == Some(Consumer::Rack(victim)) {
                    *link = if need > 0 {
                        need -= 1;
                        Some(Consumer::Pile(p))
                    } else {
                        None
                    };
                }
            }
            self.racks[victim].stop_charge();
            info!("group {}: pile {p} preempted rack {victim}", self.id);
        }
    }

    fn commit(&mut self, mode: Mode) {
        let Some(cabinet) = self.cabinet.as_mut() else {
            return;
        };
        if let Err(e) = cabinet.configure_modules(&self.connection_map) {
            warn!("group {}: {e}", self.id);
            return;
        }
        self.stop_charge_all();
        for (consumer, _) in consumer_groups(&self.connection_map) {
            let started = match (consumer, mode) {
                (Consumer::Rack(r), Mode::Charge) => self.start_charge(Consumer::Rack(r)),
                (Consumer::Rack(r), Mode::Discharge) => self.start_discharge(r),
                (Consumer::Pile(p), Mode::Charge) => self.start_charge(Consumer::Pile(p)),
                (Consumer::Pile(p), Mode::Discharge) => Err(StationError::ConfigurationMismatch(
                    format!("pile {p} cannot discharge to the grid"),
                )),
            };
            if let Err(e) = started {
                warn!("group {}: {e}", self.id);
            }
        }
    }

    /// Drives current from every linked module into its consumer for one tick.
    pub fn apply_charge(&mut self, tick: usize, interval_s: f64) {
        let Some(cabinet) = self.cabinet.as_mut() else {
            return;
        };
        for (consumer, slots) in consumer_groups(&self.connection_map) {
            let Some((battery, limit)) = consumer_battery(&mut self.racks, &mut self.piles, consumer)
            else {
                warn!("group {}: {consumer} lost its battery", self.id);
                continue;
            };
            battery.request_power(limit);

            let share = battery.current_command / slots.len() as f64;
            let mut delivered = 0.0;
            for slot in slots {
                if let Some(module) = cabinet.module_mut(slot) {
                    module.output_power(share, battery.voltage);
                    delivered += module.output_current;
                }
            }
            battery.charge(delivered, tick, interval_s);
        }
    }

    /// Pulls current from every linked rack battery back to the grid for one tick.
    pub fn apply_grid_discharge(&mut self, tick: usize, interval_s: f64) {
        let Some(cabinet) = self.cabinet.as_mut() else {
            return;
        };
        for (consumer, slots) in consumer_groups(&self.connection_map) {
            let Consumer::Rack(r) = consumer else {
                warn!("group {}: {consumer} cannot discharge to the grid", self.id);
                continue;
            };
            let Some(battery) = self.racks.get_mut(r).and_then(BatteryRack::battery_mut) else {
                warn!("group {}: {consumer} lost its battery", self.id);
                continue;
            };
            battery.request_power(RACK_CURRENT_LIMIT);

            let share = battery.current_command / slots.len() as f64;
            let mut delivered = 0.0;
            for slot in slots {
                let Some(module) = cabinet.module_mut(slot) else {
                    continue;
                };
                match module.grid_interactive_output_power(share, battery.voltage) {
                    Ok(()) => delivered += module.output_current,
                    Err(e) => warn!("group {}: {e}", self.id),
                }
            }
            battery.discharge(delivered, tick, interval_s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{BatteryType, Device};

    fn pack(id: usize, soc: f64) -> Battery {
        Battery::new(id, BatteryType::Kwh100, soc)
    }

    /// Ten racks on ten 60 kW modules with optional piles.
    fn group(piles: usize) -> SwapRack {
        SwapRack::new(0, 10, Some(PowerCabinet::new(ModuleRating::Uu60, 10)), piles)
    }

    fn load_plugged(group: &mut SwapRack, rack: usize, soc: f64) {
        assert!(group.load_battery(pack(rack, soc), Some(rack)).is_ok());
        assert!(group.start_charge(Consumer::Rack(rack)).is_ok());
    }

    fn assert_allocation_bounds(group: &SwapRack) {
        let consumers = consumer_groups(group.connection_map());
        for (consumer, slots) in consumers {
            assert!(slots.len() <= MAX_MODULES_PER_CONSUMER, "{consumer} has {slots:?}");
            assert!(
                slots.len() <= group.module_count_for_consumer(consumer),
                "{consumer} has {} modules but needs {}",
                slots.len(),
                group.module_count_for_consumer(consumer)
            );
        }
    }

    #[test]
    fn modules_needed_is_zero_without_demand() {
        assert_eq!(modules_needed(None, 250.0, ModuleRating::Uu60), 0);
        let mut full = pack(0, 1.0);
        assert_eq!(modules_needed(Some(&full), 250.0, ModuleRating::Uu60), 0);
        full.soc = 0.8;
        full.target_max_soc = 0.8;
        assert_eq!(modules_needed(Some(&full), 250.0, ModuleRating::Uu60), 0);
    }

    #[test]
    fn modules_needed_uses_either_ceiling() {
        // 250 A at 362.5 V is 90.6 kW: two 60 kW modules
        let battery = pack(0, 0.5);
        assert_eq!(modules_needed(Some(&battery), 250.0, ModuleRating::Uu60), 2);
        // 200 A per module already fits the current ceiling
        assert_eq!(modules_needed(Some(&battery), 250.0, ModuleRating::Uu80), 2);
        assert_eq!(modules_needed(Some(&battery), 150.0, ModuleRating::Uu80), 1);
        // neither fits at d = 2 for 40 kW: 45.3 kW and 125 A
        assert_eq!(modules_needed(Some(&battery), 250.0, ModuleRating::Uu40), 3);
    }

    #[test]
    fn empty_group_distributes_nothing() {
        let mut g = group(0);
        g.distribute();
        assert!(g.connection_map().iter().all(Option::is_none));
        assert_eq!(g.power_kw(), 0.0);
    }

    #[test]
    fn low_rack_gets_own_and_paired_module() {
        let mut g = group(0);
        load_plugged(&mut g, 4, 0.5);
        g.distribute();
        assert_eq!(g.connection_map()[4], Some(Consumer::Rack(4)));
        assert_eq!(g.connection_map()[5], Some(Consumer::Rack(4)));
        assert_eq!(g.racks()[4].status(), RackStatus::Charging);

        let mut odd = group(0);
        load_plugged(&mut odd, 7, 0.5);
        odd.distribute();
        assert_eq!(odd.connection_map()[7], Some(Consumer::Rack(7)));
        assert_eq!(odd.connection_map()[6], Some(Consumer::Rack(7)));
        assert_allocation_bounds(&odd);
    }

    #[test]
    fn neighbours_each_keep_their_own_module() {
        let mut g = group(0);
        load_plugged(&mut g, 2, 0.5);
        load_plugged(&mut g, 3, 0.5);
        g.distribute();
        assert_eq!(g.connection_map()[2], Some(Consumer::Rack(2)));
        assert_eq!(g.connection_map()[3], Some(Consumer::Rack(3)));
        assert_allocation_bounds(&g);
    }

    #[test]
    fn full_rack_releases_its_module() {
        let mut g = group(0);
        g.select_soc = 0.9;
        load_plugged(&mut g, 3, 0.5);
        g.distribute();
        assert_eq!(g.connection_map()[3], Some(Consumer::Rack(3)));

        if let Some(b) = g.racks_mut()[3].battery_mut() {
            b.soc = 0.95;
        }
        g.distribute();
        assert_eq!(g.connection_map()[3], None);
        assert_eq!(g.connection_map()[2], None);
        assert!(!g.racks()[3].is_plugged());
    }

    #[test]
    fn unplugged_rack_is_not_served() {
        let mut g = group(0);
        assert!(g.load_battery(pack(0, 0.3), Some(0)).is_ok());
        g.distribute();
        assert!(g.connection_map().iter().all(Option::is_none));
    }

    #[test]
    fn secondary_module_is_returned_when_demand_drops() {
        let mut g = group(0);
        load_plugged(&mut g, 0, 0.5);
        g.distribute();
        assert_eq!(g.assigned(Consumer::Rack(0)), 2);

        // 74 A at 0 °C fits one module
        if let Some(b) = g.racks_mut()[0].battery_mut() {
            b.soc = 0.88;
            b.set_temperature(0.0);
        }
        assert_eq!(g.module_count_for_consumer(Consumer::Rack(0)), 1);
        g.distribute();
        assert_eq!(g.assigned(Consumer::Rack(0)), 1);
        assert_eq!(g.connection_map()[0], Some(Consumer::Rack(0)));
        assert_allocation_bounds(&g);
    }

    #[test]
    fn station_preferred_pile_takes_free_modules_only() {
        let mut g = group(1);
        for r in 0..10 {
            load_plugged(&mut g, r, 0.5);
        }
        assert!(g.connect_vehicle(pack(100, 0.2), 0).is_ok());
        g.distribute();
        assert_eq!(g.assigned(Consumer::Pile(0)), 0);
        assert_eq!(g.piles()[0].status(), PileStatus::Connected);
        assert_allocation_bounds(&g);
    }

    #[test]
    fn station_preferred_pile_charges_on_idle_modules() {
        let mut g = group(1);
        assert!(g.connect_vehicle(pack(100, 0.2), 0).is_ok());
        g.distribute();
        assert_eq!(g.assigned(Consumer::Pile(0)), 2);
        assert_eq!(g.piles()[0].status(), PileStatus::Charging);
        assert_allocation_bounds(&g);
    }

    #[test]
    fn pile_preferred_preempts_lowest_soc_rack() {
        let mut g = group(1);
        g.policy = DistributionPolicy::PilePreferred;
        let socs = [0.5, 0.6, 0.3, 0.7, 0.55, 0.65, 0.45, 0.75, 0.62, 0.58];
        for (r, soc) in socs.iter().enumerate() {
            load_plugged(&mut g, r, *soc);
        }
        g.distribute();
        assert!(g.connection_map().iter().all(|l| matches!(l, Some(Consumer::Rack(_)))));

        assert!(g.connect_vehicle(pack(100, 0.2), 0).is_ok());
        g.distribute();
        assert_eq!(g.assigned(Consumer::Pile(0)), 2);
        assert_eq!(g.assigned(Consumer::Rack(2)), 0);
        assert!(!g.racks()[2].is_plugged());
        assert_eq!(g.piles()[0].status(), PileStatus::Charging);
        assert_allocation_bounds(&g);
    }

    #[test]
    fn pile_preferred_rack_never_takes_a_pile_slot() {
        let mut g = group(1);
        g.policy = DistributionPolicy::PilePreferred;
        load_plugged(&mut g, 0, 0.2);
        let mut vehicle = pack(100, 0.9);
        vehicle.target_max_soc = 0.95;
        assert!(g.connect_vehicle(vehicle, 0).is_ok());
        g.target_soc = 0.95;
        assert_eq!(g.module_count_for_consumer(Consumer::Pile(0)), 1);

        g.distribute();
        assert_eq!(g.assigned(Consumer::Pile(0)), 1);
        assert_eq!(g.connection_map()[0], Some(Consumer::Pile(0)));
        assert_eq!(g.connection_map()[1], Some(Consumer::Rack(0)));
        assert_eq!(g.piles()[0].status(), PileStatus::Charging);
        assert_allocation_bounds(&g);
    }

    #[test]
    fn vehicle_leave_frees_modules() {
        let mut g = group(1);
        assert!(g.connect_vehicle(pack(100, 0.2), 0).is_ok());
        g.distribute();
        let battery = g.vehicle_leave(0);
        assert_eq!(battery.map(|b| b.id), Some(100));
        assert_eq!(g.assigned(Consumer::Pile(0)), 0);
        assert!(g.cabinet().is_some_and(|c| c.modules().iter().all(|m| m.link.is_none())));
    }

    #[test]
    fn charging_raises_soc_and_draws_power() {
        let mut g = group(0);
        load_plugged(&mut g, 0, 0.5);
        g.distribute();
        g.apply_charge(0, 10.0);
        let soc = g.racks()[0].soc().unwrap_or(0.0);
        assert!(soc > 0.5);
        assert!(g.power_kw() > 0.0);
        assert!(g.cabinet().is_some_and(|c| c.power_kw() > 80.0));
    }

    #[test]
    fn vehicle_reaching_target_is_released() {
        let mut g = group(1);
        g.target_soc = 0.9;
        let mut vehicle = pack(100, 0.895);
        vehicle.target_max_soc = 0.9;
        assert!(g.connect_vehicle(vehicle, 0).is_ok());
        for tick in 0..20 {
            g.distribute();
            g.apply_charge(tick, 10.0);
        }
        assert!(g.piles()[0].battery().is_some_and(|b| (b.soc - 0.9).abs() < 1e-12));
        let released = g.release_charged_vehicles();
        assert_eq!(released.len(), 1);
        assert!(g.first_free_pile() == Some(0));
    }

    #[test]
    fn grid_discharge_maps_racks_one_to_one() {
        let mut g = group(1);
        for r in [0, 1, 5] {
            load_plugged(&mut g, r, 0.95);
        }
        assert!(g.connect_vehicle(pack(100, 0.2), 0).is_ok());
        g.distribute();
        g.distribute_for_grid_discharge();
        assert_eq!(g.connection_map()[0], Some(Consumer::Rack(0)));
        assert_eq!(g.connection_map()[1], Some(Consumer::Rack(1)));
        assert_eq!(g.connection_map()[5], Some(Consumer::Rack(5)));
        assert_eq!(g.assigned(Consumer::Pile(0)), 0);
        assert_eq!(g.racks()[5].status(), RackStatus::Discharging);
        assert_eq!(g.piles()[0].status(), PileStatus::Connected);

        g.apply_grid_discharge(0, 10.0);
        assert!(g.power_kw() < 0.0);
        assert!(g.racks()[5].soc().is_some_and(|soc| soc < 0.95));
    }

    #[test]
    fn storage_only_group_never_distributes() {
        let mut g = SwapRack::new(1, 10, None, 0);
        load_plugged(&mut g, 0, 0.2);
        g.distribute();
        g.apply_charge(0, 10.0);
        assert_eq!(g.racks()[0].soc(), Some(0.2));
        assert_eq!(g.power_kw(), 0.0);
        assert_eq!(g.module_count_for(g.racks()[0].battery(), 250.0), 0);
    }

    #[test]
    fn bad_indices_are_reported() {
        let mut g = group(0);
        let rejected = g.load_battery(pack(1, 0.5), Some(10));
        assert!(matches!(
            rejected.map_err(|r| r.reason),
            Err(StationError::InvalidReference { kind: "rack", index: 10, .. })
        ));
        assert!(g.unload_battery(3).is_err());
        assert!(g.start_charge(Consumer::Pile(0)).is_err());
        assert!(g.vehicle_leave(0).is_none());
    }

    #[test]
    fn exchange_requires_occupied_rack() {
        let mut g = group(0);
        let rejected = g.exchange_battery(0, pack(1, 0.1));
        assert_eq!(rejected.err().map(|r| r.battery.id), Some(1));

        load_plugged(&mut g, 0, 0.95);
        let out = g.exchange_battery(0, pack(2, 0.1));
        assert_eq!(out.ok().map(|b| b.id), Some(0));
        assert_eq!(g.racks()[0].battery().map(|b| b.id), Some(2));
        assert_eq!(g.racks()[0].status(), RackStatus::Charging);
    }

    #[test]
    fn pairs_for_rebalancing() {
        let mut g = group(0);
        load_plugged(&mut g, 0, 0.5);
        load_plugged(&mut g, 1, 0.5);
        assert!(g.load_battery(pack(4, 0.95), Some(4)).is_ok());
        assert_eq!(g.charging_pair(), Some(0));
        assert_eq!(g.idle_pair(), Some(4));
    }
}
