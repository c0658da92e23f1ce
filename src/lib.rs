//! envctl: launch, scale and tear down container environments on a
//! Mesos/Marathon cluster.

pub mod cli;
pub mod client;
pub mod cluster;
pub mod config;
pub mod context;
pub mod environment;
pub mod runtime;
