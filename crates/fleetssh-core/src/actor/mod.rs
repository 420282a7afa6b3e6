//! Actor front-end

pub mod fleet;

pub use fleet::{FleetActor, FleetActorArgs};
