//! Multi-criteria journey planning
//!
//! A request runs two label settings: a walk-only search from the far end
//! that collects the places where the transit network can be left (or
//! entered, for arrive-by requests), and the main search from the near end.
//! Main search labels meeting a far side label are spliced into complete
//! journeys and kept while no other journey dominates them.

pub mod config;
pub mod criteria;
pub(crate) mod dijkstra;
pub mod explorer;
pub mod itinerary;
pub mod label;
pub mod label_setting;
pub mod request;
pub mod router;

pub use config::RouterConfig;
pub use criteria::Criteria;
pub use explorer::{ExploreMode, GraphEdge, GraphExplorer, StreetHop};
pub use itinerary::{Instruction, Itinerary, Leg, StopVisit, TransitLeg, TurnSign, WalkLeg};
pub use label::{Label, Transition};
pub use label_setting::{LabelIter, LabelSetting, SearchLimits, Solutions};
pub use request::{Location, PtRequest, PtResponse};
pub use router::PtRouter;
