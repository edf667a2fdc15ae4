pub mod config;
pub mod local_store;
pub mod logging;
pub mod reqwest_search;
pub mod system_clock;
pub mod time;
