use crate::ActivityIndex;
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Debug)]
struct Instrumented(ActivityIndex);

pub fn register(reg: &mut Registry, index: ActivityIndex) {
    reg.register_collector(Box::new(Instrumented(index)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let sizes = [
            (
                "namespace_index_size",
                "The number of namespaces in the index",
                self.0.namespaces().read().len(),
            ),
            (
                "build_index_size",
                "The number of builds in the index",
                self.0.builds().read().len(),
            ),
            (
                "replication_controller_index_size",
                "The number of replication controllers in the index",
                self.0.replication_controllers().read().len(),
            ),
        ];

        for (name, help, size) in sizes {
            let gauge_encoder = encoder.encode_descriptor(name, help, None, MetricType::Gauge)?;
            ConstGauge::new(size as u32).encode(gauge_encoder)?;
        }

        Ok(())
    }
}
