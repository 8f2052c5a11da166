//! Barrage: DSL-driven load testing for Rust.
//!
//! A load test is described declaratively, as a tree of small specs (wait, run a request,
//! map a result, iterate over a collection, run custom code) composed with [`LoadDsl`]. The
//! engine materializes that tree once per virtual user: every spec is turned into a
//! non-blocking computation bound to the user's [`UserSession`], sequenced step after step,
//! with loops fanning out concurrently and merging back deterministically.
//!
//! # Architecture
//!
//! - [`Spec`](spec::Spec): one declarative node. A closed sum type tagged by
//!   [`SpecTag`](spec::SpecTag), plus a capability record (measurement mode, retry policy).
//! - [`LoadDsl`]: the composition surface. Building a DSL has no side effects.
//! - [`Materializer`](materializer::Materializer): one per spec tag, resolved through the
//!   [`MaterializerFactory`](materializer::MaterializerFactory) dispatch table.
//! - [`Transport`](transport::Transport): the HTTP client the engine drives, reporting every
//!   stage of a request to a [`RequestLifecycle`](lifecycle::RequestLifecycle).
//! - [`EventDispatcher`]: the sink for [`Measurement`](measurement::Measurement)s, drained
//!   into an [`Aggregate`], turned into a [`Report`] and handed to a [`Reporter`].
//! - [`Runner`](runner::Runner): spawns one task per virtual user, injects the
//!   [`Simulation`](runner::Simulation) through its [`Injector`](inject::Injector) and applies
//!   the configured failure policy.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use barrage::{
//!     LoadDsl, Reporter,
//!     aggregate::BasicAggregate,
//!     config::RunnerConfig,
//!     inject::{InjectionPoint, Injectable},
//!     report::{BasicReport, StdoutReporter},
//!     runner::{Runner, Simulation},
//!     spec::http,
//!     transport::ReqwestTransport,
//! };
//!
//! #[derive(Default)]
//! struct Health;
//!
//! impl Injectable for Health {
//!     fn injection_points() -> Vec<InjectionPoint<Self>> {
//!         Vec::new()
//!     }
//! }
//!
//! impl Simulation for Health {
//!     fn scenarios(&self) -> Vec<LoadDsl> {
//!         vec![LoadDsl::new("health").run(http("ping").get("http://localhost:3000/health"))]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RunnerConfig::builder().users(100).iterations(Some(10)).build();
//!     let transport = ReqwestTransport::new(config.request_timeout).unwrap();
//!     let results = Runner::<BasicAggregate>::builder()
//!         .config(config)
//!         .transport(Arc::new(transport))
//!         .build()
//!         .run::<Health>()
//!         .await
//!         .unwrap();
//!
//!     StdoutReporter.report(BasicReport::from(results)).await.unwrap();
//! }
//! ```
//!
//! # Feature flags
//!
//! - `macros`: re-exports `#[derive(Injectable)]`. (Enabled by default)
//! - `builtins`: the reqwest transport, builtin providers and users, `BasicAggregate`,
//!   `BasicReport`, `StdoutReporter` and `JsonReporter`. (Enabled by default)

extern crate self as barrage;

/// Measurement aggregation
pub mod aggregate;
/// Run configuration
pub mod config;
pub mod dispatcher;
pub mod dsl;
pub mod error;
pub mod inject;
pub mod lifecycle;
pub mod materializer;
pub mod measurement;
/// Feeders
pub mod provider;
/// Reports and Reporters
pub mod report;
pub mod runner;
pub mod session;
pub mod spec;
pub mod transport;
pub mod user;

#[cfg(test)]
mod testing;

pub use aggregate::Aggregate;
pub use dispatcher::{EventDispatcher, EventStream};
pub use dsl::LoadDsl;
pub use report::{Report, Reporter};
pub use runner::{Runner, Simulation};
pub use session::UserSession;

#[cfg(feature = "macros")]
/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use barrage_macros::*;
}
