use prometheus::{Gauge, IntCounter, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cells::{PowerReading, SubDeviceHandle};
use crate::error::{EcflowError, Result};

crate::named_enum! {
    pub enum PowerSenseMetric {
        CurrentMicroamps => "ec_current_now_microamps",
        VoltageMillivolts => "ec_voltage_now_millivolts",
        CapacityPercent => "ec_capacity_percent",
        Status => "ec_status",
        Discharging => "ec_discharging",
    }
}

impl PowerSenseMetric {
    fn help(&self) -> &'static str {
        match self {
            PowerSenseMetric::CurrentMicroamps => "Battery current, negative while discharging",
            PowerSenseMetric::VoltageMillivolts => "Battery voltage",
            PowerSenseMetric::CapacityPercent => "Remaining battery capacity",
            PowerSenseMetric::Status => "Raw controller status word",
            PowerSenseMetric::Discharging => "1 while the battery is discharging",
        }
    }

    fn value(&self, reading: &PowerReading) -> f64 {
        match self {
            PowerSenseMetric::CurrentMicroamps => reading.current.microamps() as f64,
            PowerSenseMetric::VoltageMillivolts => reading.voltage_mv as f64,
            PowerSenseMetric::CapacityPercent => reading.capacity_percent as f64,
            PowerSenseMetric::Status => reading.status as f64,
            PowerSenseMetric::Discharging => {
                if reading.current.is_discharging() {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Exports the power-sense readout as Prometheus gauges
pub struct PowerSenseExporter {
    registry: Arc<Registry>,
    sense: SubDeviceHandle,
    gauges: HashMap<PowerSenseMetric, Gauge>,
    read_errors: IntCounter,
}

impl PowerSenseExporter {
    pub fn new(sense: SubDeviceHandle) -> Result<Self> {
        if sense.as_readout().is_none() {
            return Err(EcflowError::ConfigError(format!(
                "sub-device {} has no readout",
                sense.name()
            )));
        }

        let registry = Arc::new(Registry::new());
        let mut gauges = HashMap::new();
        for metric in PowerSenseMetric::all() {
            let opts = Opts::new(metric.name(), metric.help()).const_label("device", sense.name());
            let gauge = Gauge::with_opts(opts)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(metric, gauge);
        }

        let read_errors = IntCounter::with_opts(
            Opts::new("ec_read_errors_total", "Failed power-sense readouts")
                .const_label("device", sense.name()),
        )?;
        registry.register(Box::new(read_errors.clone()))?;

        Ok(Self {
            registry,
            sense,
            gauges,
            read_errors,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn gauge(&self, metric: PowerSenseMetric) -> Option<&Gauge> {
        self.gauges.get(&metric)
    }

    pub fn read_errors(&self) -> u64 {
        self.read_errors.get()
    }

    /// Read the sub-device once and update every gauge
    ///
    /// Blocks for the bus round trips and any retry delays. On failure the
    /// gauges keep their previous values.
    pub fn collect(&self) -> Result<PowerReading> {
        let readout = self.sense.as_readout().ok_or_else(|| {
            EcflowError::ConfigError(format!("sub-device {} has no readout", self.sense.name()))
        })?;

        match readout.read() {
            Ok(reading) => {
                for (metric, gauge) in &self.gauges {
                    gauge.set(metric.value(&reading));
                }
                Ok(reading)
            }
            Err(e) => {
                self.read_errors.inc();
                tracing::error!("Failed to read {}: {}", self.sense.name(), e);
                Err(e)
            }
        }
    }

    /// Collect every `period` until `cancel_token` fires
    pub fn start(
        self: Arc<Self>,
        cancel_token: CancellationToken,
        period: Duration,
    ) -> JoinHandle<()> {
        tracing::warn!("Starting power-sense export loop");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::info!("Power-sense export loop stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let exporter = Arc::clone(&self);
                        // Bus exchanges block, keep them off the runtime workers
                        if let Err(e) = tokio::task::spawn_blocking(move || exporter.collect()).await {
                            tracing::error!("Collection task failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}
