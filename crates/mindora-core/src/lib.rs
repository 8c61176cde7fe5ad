pub mod behavior;
pub mod belief;
pub mod learning;
pub mod maintenance;
pub mod model;
pub mod pattern;
pub mod store;
