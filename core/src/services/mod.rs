mod sweep_service;

pub use sweep_service::{SliceOutcome, SweepService};
