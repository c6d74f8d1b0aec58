//! Request orchestration: snapping, station search, main search and
//! splicing both halves into itineraries

use std::cell::Cell;
use std::rc::Rc;

use hashbrown::HashMap;
use log::{debug, info};
use rayon::prelude::*;

use crate::model::transit::EdgeType;
use crate::model::{FootWeighting, NodeId, StreetWeighting, TransitModel};
use crate::realtime::RealtimeOverlay;
use crate::{Error, Millis};

use super::config::RouterConfig;
use super::criteria::Criteria;
use super::explorer::{ExploreMode, GraphExplorer};
use super::itinerary::{Itinerary, build_itinerary, path_steps};
use super::label::Label;
use super::label_setting::{LabelSetting, SearchLimits, Solutions};
use super::request::{Location, PtRequest, PtResponse};

/// Journey planner over a read-only model and an optional realtime overlay.
/// Every request owns its search state, so one router serves many threads.
pub struct PtRouter<'a> {
    model: &'a TransitModel,
    overlay: Option<&'a RealtimeOverlay>,
    config: RouterConfig,
    weighting: &'a dyn StreetWeighting,
}

/// An accepted solution and the two labels it was spliced from
struct Splice {
    combined: Rc<Label>,
    main: Rc<Label>,
    station: Rc<Label>,
}

/// Parameters of one request after applying router defaults
struct Resolved {
    walk_speed_kmh: f64,
    max_visited_nodes: usize,
    limit_solutions: usize,
    max_profile_duration: Millis,
}

impl<'a> PtRouter<'a> {
    pub fn new(model: &'a TransitModel, config: RouterConfig) -> Self {
        Self {
            model,
            overlay: None,
            config,
            weighting: &FootWeighting,
        }
    }

    #[must_use]
    pub fn with_overlay(mut self, overlay: &'a RealtimeOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    #[must_use]
    pub fn with_weighting(mut self, weighting: &'a dyn StreetWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Answers independent requests in parallel
    pub fn route_many(&self, requests: &[PtRequest]) -> Vec<Result<PtResponse, Error>> {
        info!("Routing {} requests", requests.len());
        requests.par_iter().map(|request| self.route(request)).collect()
    }

    /// Finds the Pareto-optimal itineraries of `request`.
    ///
    /// # Errors
    ///
    /// [`Error::NoPointsFound`] or [`Error::StationNotFound`] if an endpoint
    /// cannot be snapped, [`Error::BudgetExceeded`] if the visited node
    /// budget ran out before any feasible itinerary was found, and
    /// [`Error::NoRouteFound`] otherwise when there is none.
    pub fn route(&self, request: &PtRequest) -> Result<PtResponse, Error> {
        let resolved = self.resolve(request)?;
        let arrive_by = request.arrive_by;
        let (main_location, far_location) = if arrive_by {
            (&request.to, &request.from)
        } else {
            (&request.from, &request.to)
        };
        let main_start = self.snap(main_location)?;
        let far_start = self.snap(far_location)?;

        let station_limits = SearchLimits {
            street_time: if arrive_by {
                self.config.limit_street_time_access
            } else {
                self.config.limit_street_time_egress
            },
            trip_time: self.config.limit_trip_time,
            max_visited_nodes: resolved.max_visited_nodes,
            boarding_penalties: HashMap::new(),
        };
        let station_criteria = Criteria {
            beta_street_time: self.config.beta_egress_time,
            ..Criteria::new(request.instant, !arrive_by)
        };
        let station_setting = LabelSetting::new(
            self.explorer(request, !arrive_by, ExploreMode::WalkOnly, resolved.walk_speed_kmh),
            station_criteria,
            &station_limits,
        );
        let station_labels = collect_station_labels(
            &station_setting,
            far_start,
            main_start,
            request.instant,
            if arrive_by {
                EdgeType::EnterPt
            } else {
                EdgeType::ExitPt
            },
        );
        let Some(smallest_station_weight) = station_labels
            .values()
            .flatten()
            .map(|label| station_criteria.weight(label))
            .min()
        else {
            debug!("No transit boundary within walking distance of the far end");
            return Err(Error::NoRouteFound);
        };

        let main_criteria = Criteria {
            reverse: arrive_by,
            mind_transfers: !request.ignore_transfers,
            profile: request.profile,
            max_profile_duration: resolved.max_profile_duration,
            beta_transfers: self.config.beta_transfers,
            beta_street_time: self.config.beta_street_time,
            start_time: request.instant,
        };
        let main_limits = SearchLimits {
            street_time: self.config.limit_street_time,
            trip_time: self.config.limit_trip_time,
            max_visited_nodes: resolved.max_visited_nodes,
            boarding_penalties: self.config.boarding_penalties_by_route_type.clone(),
        };
        let solutions = Solutions::default();
        let main_setting = LabelSetting::new(
            self.explorer(request, arrive_by, ExploreMode::PtOnly, resolved.walk_speed_kmh),
            main_criteria,
            &main_limits,
        )
        .with_solutions(Rc::clone(&solutions));

        let mut accepted: Vec<Splice> = Vec::new();
        let mut highest_weight: Option<Millis> = None;
        let mut search = main_setting.search(main_start, request.instant);
        while let Some(label) = search.next() {
            if highest_weight
                .is_some_and(|highest| main_criteria.weight(&label) + smallest_station_weight > highest)
            {
                break;
            }
            let Some(candidates) = station_labels.get(&label.node) else {
                continue;
            };
            for station in candidates {
                let Some(combined) = self.splice(&label, station, request.instant) else {
                    continue;
                };
                let dominated = solutions.borrow().iter().any(|solution| {
                    main_criteria.profile_comparable(solution, &combined)
                        && main_criteria.dominates(solution, &combined)
                });
                if dominated {
                    continue;
                }
                let combined = Rc::new(combined);
                accepted.retain(|splice| {
                    !(main_criteria.profile_comparable(&combined, &splice.combined)
                        && main_criteria.dominates(&combined, &splice.combined))
                });
                accepted.push(Splice {
                    combined,
                    main: Rc::clone(&label),
                    station: Rc::clone(station),
                });
                *solutions.borrow_mut() = accepted
                    .iter()
                    .map(|splice| Rc::clone(&splice.combined))
                    .collect();
            }
            highest_weight = highest_weight_for_domination(
                &main_criteria,
                &accepted,
                request.profile,
                resolved.limit_solutions,
            );
        }
        let visited_nodes = search.visited_nodes();
        let budget_exceeded = search.budget_exceeded();
        drop(search);
        debug!(
            "Main search visited {visited_nodes} nodes and kept {} solutions",
            accepted.len()
        );

        if !accepted.iter().any(|splice| !splice.combined.impossible) {
            return Err(if budget_exceeded {
                Error::BudgetExceeded { visited_nodes }
            } else {
                Error::NoRouteFound
            });
        }

        if request.profile {
            accepted.retain(|splice| {
                splice.combined.departure_time.is_none_or(|departure| {
                    (departure - request.instant).abs() <= resolved.max_profile_duration
                })
            });
            accepted.sort_by_key(|splice| {
                let departure = splice.combined.departure_time.unwrap_or(Millis::MAX);
                if arrive_by { -departure } else { departure }
            });
        } else {
            accepted.sort_by_key(|splice| main_criteria.key(&splice.combined));
        }

        let itineraries = accepted
            .iter()
            .map(|splice| self.itinerary(splice, arrive_by))
            .collect();
        Ok(PtResponse {
            itineraries,
            visited_nodes,
        })
    }

    fn resolve(&self, request: &PtRequest) -> Result<Resolved, Error> {
        let walk_speed_kmh = request
            .walk_speed_kmh
            .unwrap_or(self.config.default_walk_speed_kmh);
        if !(walk_speed_kmh.is_finite() && walk_speed_kmh > 0.0) {
            return Err(Error::InvalidData(format!(
                "walk speed must be positive, got {walk_speed_kmh}"
            )));
        }
        Ok(Resolved {
            walk_speed_kmh,
            max_visited_nodes: request
                .max_visited_nodes
                .unwrap_or(self.config.max_visited_nodes),
            limit_solutions: request
                .limit_solutions
                .unwrap_or(self.config.limit_solutions),
            max_profile_duration: request
                .max_profile_duration
                .unwrap_or(self.config.max_profile_duration),
        })
    }

    fn explorer(
        &self,
        request: &PtRequest,
        reverse: bool,
        mode: ExploreMode,
        walk_speed_kmh: f64,
    ) -> GraphExplorer<'a> {
        GraphExplorer::new(self.model, reverse, mode)
            .with_overlay(self.overlay)
            .with_weighting(self.weighting)
            .with_walk_speed(walk_speed_kmh)
            .with_blocked_route_types(request.blocked_route_types)
            .ignoring_validity(request.ignore_validity)
    }

    fn snap(&self, location: &Location) -> Result<NodeId, Error> {
        match location {
            Location::Point(point) => self
                .model
                .street_graph
                .nearest_accessible_node(point, self.config.max_snap_distance, self.weighting)
                .map(|(node, _)| self.model.node_for_street(node))
                .ok_or(Error::NoPointsFound),
            Location::Station { feed_id, stop_id } => {
                let station = self.model.station(feed_id, stop_id)?;
                Ok(self.model.node_for_pt(station.pt_node))
            }
        }
    }

    /// Joins a main search label with a station label at the same node into
    /// a label for the complete journey
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn splice(&self, main: &Rc<Label>, station: &Rc<Label>, initial_time: Millis) -> Option<Label> {
        let walk_time = main.walk_time + station.walk_time;
        if walk_time > self.config.limit_street_time {
            return None;
        }
        // far side walking is weighted with its own factor
        let egress_penalty = (station.walk_time as f64
            * (self.config.beta_egress_time - self.config.beta_street_time))
            .round() as Millis;
        Some(Label {
            node: station.node,
            time: main.time - station.time + initial_time,
            edge: None,
            transfers: main.transfers + station.transfers,
            departure_time: main.departure_time,
            walk_time,
            extra_weight: main.extra_weight + station.extra_weight + egress_penalty,
            residual_delay: main.residual_delay,
            impossible: main.impossible || station.impossible,
            parent: Some(Rc::clone(main)),
            deleted: Cell::new(false),
        })
    }

    fn itinerary(&self, splice: &Splice, arrive_by: bool) -> Itinerary {
        let offset = splice.main.time - splice.station.time;
        let main = Label::transitions(&splice.main, arrive_by);
        let station = Label::transitions(&splice.station, !arrive_by);
        let mut path = Vec::with_capacity(main.len() + station.len());
        if arrive_by {
            path.extend(path_steps(&station, offset));
            path.extend(path_steps(&main[1..], 0));
        } else {
            path.extend(path_steps(&main, 0));
            path.extend(path_steps(&station[1..], offset));
        }
        build_itinerary(self.model, self.overlay, &path, splice.combined.impossible)
    }
}

/// Labels of the far side search where it enters or leaves the transit
/// network, or reaches the start of the main search directly
fn collect_station_labels(
    setting: &LabelSetting<'_>,
    far_start: NodeId,
    main_start: NodeId,
    time: Millis,
    boundary: EdgeType,
) -> HashMap<NodeId, Vec<Rc<Label>>> {
    let mut labels: HashMap<NodeId, Vec<Rc<Label>>> = HashMap::new();
    for label in setting.search(far_start, time) {
        if label.node == main_start {
            labels.entry(label.node).or_default().push(label);
            break;
        }
        if label
            .edge
            .as_ref()
            .is_some_and(|edge| edge.edge_type() == boundary)
        {
            labels.entry(label.node).or_default().push(label);
        }
    }
    debug!(
        "Far side search reached {} transit boundary nodes",
        labels.len()
    );
    labels
}

/// Weight bound above which main search labels cannot lead to a new
/// solution. Only feasible solutions count.
fn highest_weight_for_domination(
    criteria: &Criteria,
    accepted: &[Splice],
    profile: bool,
    limit_solutions: usize,
) -> Option<Millis> {
    let feasible: Vec<&Label> = accepted
        .iter()
        .map(|splice| splice.combined.as_ref())
        .filter(|label| !label.impossible)
        .collect();
    if feasible.is_empty() {
        return None;
    }
    if profile {
        let walk_only = feasible.iter().any(|label| label.departure_time.is_none());
        let beyond_window = feasible.iter().any(|label| {
            label.departure_time.is_some_and(|departure| {
                (departure - criteria.start_time).abs() > criteria.max_profile_duration
            })
        });
        let finished = feasible.len() >= limit_solutions && (walk_only || beyond_window);
        if !finished {
            return None;
        }
    }
    feasible.iter().map(|label| criteria.weight(label)).max()
}
