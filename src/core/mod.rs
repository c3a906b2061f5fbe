pub mod distance;
pub mod index;
pub mod query;
pub mod store;
pub mod video;
