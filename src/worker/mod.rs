//! Worker-process internals: the synthetic CPU load generator and the HTTP
//! handler that fronts it.
//!
//! A worker container runs [`handler::router`] on port 8080. Each `/submit`
//! request burns CPU at the requested duty cycle for the requested duration
//! and returns a Monte Carlo π estimate computed by the busy phase.

pub mod handler;
pub mod load;
