/// Cluster API lifecycle driver for OpenStack managed Kubernetes clusters
///
/// Translates a managed cluster record (cluster, node groups, lifecycle
/// status) into Cluster API resources on a management cluster, and folds the
/// reconciled state of those resources back into the record.
pub mod capi;
pub mod config;
pub mod driver;
pub mod error;
pub mod keystone;
pub mod model;
pub mod store;
pub mod utils;

pub use driver::Driver;
pub use error::{Error, Result};
