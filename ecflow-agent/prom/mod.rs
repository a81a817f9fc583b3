pub mod power_sense;

pub use power_sense::{PowerSenseExporter, PowerSenseMetric};
