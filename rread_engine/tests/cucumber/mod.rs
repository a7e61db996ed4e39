mod setups;
mod steps;
pub mod store_world;

pub use store_world::StoreWorld;
