use serde::Deserialize;

use crate::Time;

/// Parameters of the network build
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransitModelConfig {
    /// Maximum distance in metres between a stop and the street node it is
    /// connected to
    pub max_snap_distance: f64,
    /// Maximum walking time in seconds for transfers between nearby stations
    pub max_transfer_walk_time: Time,
    /// Walking speed used for walking transfers
    pub walk_speed_kmh: f64,
    /// Allow transfers between all routes serving the same stop unless a
    /// transfer rule says otherwise
    pub implicit_same_stop_transfers: bool,
}

impl Default for TransitModelConfig {
    fn default() -> Self {
        Self {
            max_snap_distance: 300.0,
            max_transfer_walk_time: 300,
            walk_speed_kmh: 5.0,
            implicit_same_stop_transfers: true,
        }
    }
}
