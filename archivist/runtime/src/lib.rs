pub use namespace_archivist_core as core;
pub use namespace_archivist_k8s_api as k8s;
pub use namespace_archivist_k8s_archive as archive;
pub use namespace_archivist_k8s_index as index;
pub use namespace_archivist_k8s_transfer as transfer;

mod args;
pub mod config;
mod monitor;

pub use self::{
    args::Args,
    config::Config,
    monitor::{Monitor, MonitorMetrics},
};
