// Library for tests to access modules

pub mod aggregation;
pub mod config;
pub mod delta;
pub mod diagnostic;
pub mod models;
pub mod monitor;
pub mod retention;
pub mod routes;
pub mod session;
pub mod source;
pub mod version;
pub mod worker;
