//! Host networking helpers used when a workload needs a published port.

pub mod port;
