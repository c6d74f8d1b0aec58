//! This module turns already-parsed schedule feeds and a street graph into a
//! multimodal routing model.

mod builder;
mod config;
pub mod schedule;
pub(crate) mod time_expanded;
mod transfers;

pub use builder::create_transit_model;
pub use config::TransitModelConfig;
