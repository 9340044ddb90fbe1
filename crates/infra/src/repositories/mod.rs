pub mod trips;

pub use trips::SqlTripStore;
