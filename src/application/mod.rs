pub mod service;

pub use service::MetricService;
