pub mod coverage;
pub mod model;
pub mod period;
pub mod progress;
pub mod record;
pub mod slot;
