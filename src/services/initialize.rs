//! Rebuilds the container and thermometer inventory from the live sources.

use log::info;
use rand::Rng;
use std::collections::HashSet;

use super::checking::save_driver_checks;
use super::runtime::{ProcessError, Runtime};
use crate::db::models::{Container, Thermometer};

const LABELS: &[&str] = &[
    "Marcin", "Klops", "Marchew", "Ziemia", "Ojczyzna", "Kazimierz", "Marta", "Fasola", "Orzeszek", "Rodzynek",
    "Skrzypce", "Kandelabr", "Basia", "Zofia", "Tango", "Rosja", "Ryba", "Manometr", "Fajans", "Inferencja",
    "Coulomb", "Skrzypłocze", "Gwint",
];

/// Human-friendly container labels, drawn at random without replacement.
#[derive(Debug, Clone)]
pub struct LabelPool {
    remaining: Vec<&'static str>,
}

impl Default for LabelPool {
    fn default() -> Self {
        LabelPool::new(LABELS)
    }
}

impl LabelPool {
    pub fn new(labels: &[&'static str]) -> Self {
        LabelPool {
            remaining: labels.to_vec(),
        }
    }

    /// Draws an unused label, or returns `fallback` once the pool is empty.
    pub fn draw(&mut self, rng: &mut impl Rng, fallback: &str) -> String {
        if self.remaining.is_empty() {
            return fallback.to_string();
        }
        let i = rng.random_range(0..self.remaining.len());
        self.remaining.swap_remove(i).to_string()
    }
}

/// Clears the scraped tables and repopulates containers, their checks and
/// thermometers. Tasks and settings are kept.
pub fn initialize(rt: &mut Runtime) -> Result<(), ProcessError> {
    info!("Clearing data tables");
    rt.store.clear_data_tables()?;

    let rows = rt.driver.read_checks()?;
    let mut labels = LabelPool::default();
    let mut rng = rand::rng();
    let containers: Vec<Container> = rows
        .iter()
        .map(|r| Container {
            name: r.name.clone(),
            label: labels.draw(&mut rng, &r.name),
        })
        .collect();
    let inserted = rt.store.insert_containers(&containers)?;
    info!("Inserted {} container(s)", inserted);
    save_driver_checks(rt.store, &rows)?;

    let mut seen = HashSet::new();
    let thermometers: Vec<Thermometer> = rt
        .thermometers
        .read_all()?
        .into_iter()
        .filter(|d| seen.insert(d.device_id.clone()))
        .map(|d| Thermometer {
            device_id: d.device_id,
            device_group: d.device_group,
            device_name: d.device_name,
        })
        .collect();
    let inserted = rt.store.insert_thermometers(&thermometers)?;
    info!("Inserted {} thermometer(s)", inserted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Task;
    use crate::testing::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn labels_are_unique_until_exhausted() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pool = LabelPool::new(&["a", "b", "c"]);
        let mut drawn: Vec<String> = (0..3).map(|i| pool.draw(&mut rng, &format!("C{}", i))).collect();
        drawn.sort();
        assert_eq!(drawn, vec!["a", "b", "c"]);
        assert_eq!(pool.draw(&mut rng, "C9"), "C9");
    }

    #[test]
    fn initialize_rebuilds_inventory_and_keeps_tasks() {
        let task = Task {
            id: "t1".into(),
            start: 0,
            duration: 1,
            t_start: 5.into(),
            t_min: 2.into(),
            t_max: 8.into(),
            t_freeze: (-18).into(),
            status: "running".into(),
        };
        let mut store = MemoryStore::with_task(task, "OLD");
        store.push_check("OLD", 1, "1.0");
        let driver = FakeDriver::new(vec![row("C1", "On", "5.0", 10), row("C2", "On", "", 10)]);
        let thermometers = FakeThermometers::with(vec![
            device_reading("dev-1", "1.0°C", "04/11/24 12:00:00"),
            device_reading("dev-2", "2.0°C", "04/11/24 12:00:00"),
            device_reading("dev-1", "1.5°C", "04/11/24 12:30:00"),
        ]);
        {
            let mut rt = runtime(&mut store, &driver, &thermometers, noon());
            initialize(&mut rt).unwrap();
        }

        assert_eq!(store.tasks.len(), 1);
        assert!(store.container_tasks.is_empty());
        let names: Vec<_> = store.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["C1", "C2"]);
        assert_ne!(store.containers[0].label, store.containers[1].label);
        assert!(store.containers.iter().all(|c| LABELS.contains(&c.label.as_str())));
        assert_eq!(store.checks.len(), 2);
        assert!(store.checks.iter().all(|c| c.container != "OLD"));
        let ids: Vec<_> = store.thermometers.iter().map(|t| t.device_id.as_str()).collect();
        assert_eq!(ids, vec!["dev-1", "dev-2"]);
    }
}
