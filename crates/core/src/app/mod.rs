pub mod accumulator;
pub mod context;
pub mod fetcher;
pub mod inventory;
pub mod periods;
pub mod pipeline;
pub mod progress;
pub mod verifier;
pub mod writer;
