use super::power_module::{ModuleRating, PowerModule};
use super::types::{Consumer, Device};
use crate::error::StationError;

/// A fixed, ordered bank of identical power modules serving one rack group.
#[derive(Debug, Clone)]
pub struct PowerCabinet {
    rating: ModuleRating,
    modules: Vec<PowerModule>,
}

impl PowerCabinet {
    /// Creates a cabinet of `count` modules of one rating.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn new(rating: ModuleRating, count: usize) -> Self {
        assert!(count > 0, "cabinet needs at least one module");
        Self {
            rating,
            modules: (0..count).map(|i| PowerModule::new(i, rating)).collect(),
        }
    }

    pub fn rating(&self) -> ModuleRating {
        self.rating
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Per-module power ceiling (kW).
    pub fn module_power_kw(&self) -> f64 {
        self.rating.max_power_kw()
    }

    /// Per-module current ceiling (A).
    pub fn module_current(&self) -> f64 {
        self.rating.max_current()
    }

    pub fn modules(&self) -> &[PowerModule] {
        &self.modules
    }

    pub fn module_mut(&mut self, index: usize) -> Option<&mut PowerModule> {
        self.modules.get_mut(index)
    }

    /// Wires module `i` to `map[i]`; modules mapped to nothing are stopped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMismatch` and leaves every module untouched
    /// if `map.len()` differs from the module count.
    pub fn configure_modules(&mut self, map: &[Option<Consumer>]) -> Result<(), StationError> {
        if map.len() != self.modules.len() {
            return Err(StationError::ConfigurationMismatch(format!(
                "connection map has {} slots, cabinet has {} modules",
                map.len(),
                self.modules.len()
            )));
        }
        for (module, &link) in self.modules.iter_mut().zip(map) {
            match link {
                Some(consumer) => module.link = Some(consumer),
                None => module.stop_charge(),
            }
        }
        Ok(())
    }

    /// Sum of the power of every linked module (kW).
    pub fn total_power_kw(&self) -> f64 {
        self.modules
            .iter()
            .filter(|m| m.link.is_some())
            .map(|m| m.power_kw())
            .sum()
    }
}

impl Device for PowerCabinet {
    fn power_kw(&self) -> f64 {
        self.total_power_kw()
    }

    fn device_type(&self) -> &'static str {
        "PowerCabinet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cabinet() {
        let cabinet = PowerCabinet::new(ModuleRating::Uu60, 10);
        assert_eq!(cabinet.module_count(), 10);
        assert_eq!(cabinet.module_power_kw(), 60.0);
        assert_eq!(cabinet.module_current(), 150.0);
        assert!(cabinet.modules().iter().all(|m| m.link.is_none()));
    }

    #[test]
    #[should_panic]
    fn empty_cabinet_panics() {
        PowerCabinet::new(ModuleRating::Uu40, 0);
    }

    #[test]
    fn wrong_map_length_is_rejected_without_change() {
        let mut cabinet = PowerCabinet::new(ModuleRating::Uu40, 3);
        let map = [Some(Consumer::Rack(0)), None];
        assert!(cabinet.configure_modules(&map).is_err());
        assert!(cabinet.modules().iter().all(|m| m.link.is_none()));
    }

    #[test]
    fn configure_links_and_stops_modules() {
        let mut cabinet = PowerCabinet::new(ModuleRating::Uu40, 3);
        let map = [Some(Consumer::Rack(0)), Some(Consumer::Rack(0)), Some(Consumer::Pile(0))];
        assert!(cabinet.configure_modules(&map).is_ok());
        for i in 0..3 {
            if let Some(m) = cabinet.module_mut(i) {
                m.output_power(50.0, 360.0);
            }
        }
        assert!(cabinet.total_power_kw() > 0.0);

        let map = [Some(Consumer::Rack(0)), None, None];
        assert!(cabinet.configure_modules(&map).is_ok());
        assert_eq!(cabinet.modules()[1].link, None);
        assert_eq!(cabinet.modules()[1].power, 0.0);
        let single = cabinet.modules()[0].power;
        assert!((cabinet.power_kw() - single).abs() < 1e-9);
    }
}
