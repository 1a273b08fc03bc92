pub mod service;
pub mod sweeper;

pub use service::{OddsService, ScanReport};
pub use sweeper::spawn_sweeper;
