//! Chart-ready views derived from stored readings. Everything here is pure:
//! callers fetch readings from a store and pass `now` explicitly.

pub mod demand;
pub mod summary;

pub use demand::{
    daily_profile, hourly_profile, realtime_series, DemandBucket, DemandPoint, DemandProfile,
    DemandStats, DemandView, RealtimeDemand,
};
pub use summary::{summarize, ReadingSummary};
