use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hashbrown::HashMap;
use serde::Deserialize;

use crate::{Error, Millis};

/// Default parameters of the router. Requests override some of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Weight penalty per transfer, in milliseconds
    pub beta_transfers: Millis,
    /// Weight of walking time relative to riding time
    pub beta_street_time: f64,
    /// Weight of walking time on the far side of the journey
    pub beta_egress_time: f64,
    /// Extra weight of entering a vehicle of a route type, in milliseconds
    pub boarding_penalties_by_route_type: HashMap<i32, Millis>,
    pub limit_trip_time: Millis,
    pub limit_street_time: Millis,
    pub limit_street_time_access: Millis,
    pub limit_street_time_egress: Millis,
    pub max_visited_nodes: usize,
    pub limit_solutions: usize,
    pub max_profile_duration: Millis,
    pub default_walk_speed_kmh: f64,
    /// Maximum distance in metres between a query point and the street node
    /// it is snapped to
    pub max_snap_distance: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            beta_transfers: 0,
            beta_street_time: 1.0,
            beta_egress_time: 1.0,
            boarding_penalties_by_route_type: HashMap::new(),
            limit_trip_time: 24 * 60 * 60 * 1000,
            limit_street_time: 30 * 60 * 1000,
            limit_street_time_access: 30 * 60 * 1000,
            limit_street_time_egress: 30 * 60 * 1000,
            max_visited_nodes: 1_000_000,
            limit_solutions: 5,
            max_profile_duration: 60 * 60 * 1000,
            default_walk_speed_kmh: 5.0,
            max_snap_distance: 1_000.0,
        }
    }
}

impl RouterConfig {
    /// Reads a configuration from a JSON file. Missing fields take their
    /// default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.default_walk_speed_kmh.is_finite() && self.default_walk_speed_kmh > 0.0) {
            return Err(Error::InvalidData(format!(
                "walk speed must be positive, got {}",
                self.default_walk_speed_kmh
            )));
        }
        if self.beta_street_time < 0.0 || self.beta_egress_time < 0.0 {
            return Err(Error::InvalidData(
                "street time weights must not be negative".to_string(),
            ));
        }
        if self.max_snap_distance < 0.0 {
            return Err(Error::InvalidData(
                "snap distance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"beta_transfers": 300000, "boarding_penalties_by_route_type": {{"3": 60000}}}}"#
        )
        .unwrap();
        let config = RouterConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.beta_transfers, 300_000);
        assert_eq!(config.boarding_penalties_by_route_type.get(&3), Some(&60_000));
        assert_eq!(config.max_visited_nodes, 1_000_000);
        assert!((config.default_walk_speed_kmh - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_zero_walk_speed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_walk_speed_kmh": 0.0}}"#).unwrap();
        assert!(matches!(
            RouterConfig::from_json_file(file.path()),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            RouterConfig::from_json_file("/nonexistent/router.json"),
            Err(Error::IoError(_))
        ));
    }
}
