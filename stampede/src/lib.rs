//! Stampede drives staged load against HTTP targets.
//!
//! A scenario is either closed-model (a pool of workers whose size follows a [`Schedule`]) or
//! open-model (iterations started on a clock whose rate follows a [`Schedule`]). The
//! [`Dispatcher`] runs any number of scenarios side by side and the [`ResultAggregator`]
//! collects their outcomes.
//!
//! ```no_run
//! use stampede::core::{Executor, ScenarioConfig, Target};
//! use stampede::Dispatcher;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stampede::Error> {
//!     let scenario = ScenarioConfig::new(
//!         "smoke",
//!         Executor::ConstantConcurrency {
//!             vus: 10,
//!             duration: Duration::from_secs(30),
//!             max_vus: None,
//!         },
//!         Target::from_address("localhost:8080"),
//!     );
//!     let snapshot = Dispatcher::new(vec![scenario])?.run().await?;
//!     println!("{}", snapshot.total());
//!     Ok(())
//! }
//! ```
//!
//! [`Schedule`]: stampede_core::Schedule

#[cfg(test)]
#[macro_use]
mod testing;

mod aggregator;
mod arrival;
pub mod controller;
mod dispatcher;
mod error;
mod http;
mod iteration;
mod pool;
mod scenario;
mod signal;
mod timer;

pub use aggregator::{Recorder, ResultAggregator};
pub use dispatcher::{plan, Dispatcher};
pub use error::{Error, RequestFailure};
pub use http::{client, HttpRequest};
pub use signal::StopSignal;
pub use timer::Timer;

pub use stampede_core as core;
