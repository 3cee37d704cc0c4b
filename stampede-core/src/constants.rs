use std::time::Duration;

/// Time allowed for in-flight iterations to finish once a scenario stops.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status code treated as success unless the endpoint says otherwise.
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Arrival rates are expressed per this unit unless configured.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

/// Pre-allocated workers for arrival-rate scenarios, relative to the peak per-second rate.
pub const DEFAULT_PRE_ALLOCATED_FACTOR: f64 = 0.75;

/// Maximum workers for arrival-rate scenarios, relative to the peak per-second rate.
pub const DEFAULT_MAX_VUS_FACTOR: f64 = 2.0;

/// Upper bound for a scenario's schedule length, start offset and graceful stop.
pub const MAX_SCENARIO_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
