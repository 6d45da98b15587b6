//! Supervision for agents: one-for-one and one-for-all restart policies with
//! intensity windows, built as an ordinary agent over a heterogeneous set of
//! named children.

mod policy;
mod supervisable;
mod supervisor;

pub use policy::{Intensity, Policy};
pub use supervisable::Supervisable;
pub use supervisor::{Supervisor, SupervisorError, ONE_FOR_ALL_MAX_RESTARTS};
