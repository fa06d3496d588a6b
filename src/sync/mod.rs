//! NTP-style clock offset estimation shared by the server and the probe
//! client.
//!
//! The server side of the exchange is purely reactive: it stamps `t1` on
//! receipt and `t2` on send. Everything else (sample collection, averaging,
//! request cadence) runs on the client end.

pub mod cadence;
pub mod estimator;

pub use cadence::ProbeCadence;
pub use estimator::{ClockEstimator, ClockSample};
