pub mod clock;
pub mod search;
pub mod store;
