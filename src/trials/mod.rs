pub mod client;
pub mod normalize;
pub mod query;

pub use client::{ClientError, SearchPage, TrialsApi, TrialsClient, DEFAULT_FIELDS};
pub use normalize::{normalize, unique_locations, Location, LocationSummary, TrialRecord};
pub use query::{OverallStatus, Phase, Recognized, Sex, TrialQuery};
