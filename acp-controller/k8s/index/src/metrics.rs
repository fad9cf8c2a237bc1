use crate::{ingress_class, policy};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Debug)]
struct Instrumented {
    classes: ingress_class::SharedIndex,
    policies: policy::SharedIndex,
}

pub fn register(
    reg: &mut Registry,
    classes: ingress_class::SharedIndex,
    policies: policy::SharedIndex,
) {
    reg.register_collector(Box::new(Instrumented { classes, policies }));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let classes = ConstGauge::new(self.classes.read().len() as u32);
        let classes_encoder = encoder.encode_descriptor(
            "ingress_class_index_size",
            "The number of ingress classes in index",
            None,
            MetricType::Gauge,
        )?;
        classes.encode(classes_encoder)?;

        let mut policies_encoder = encoder.encode_descriptor(
            "access_control_policy_index_size",
            "The number of valid access control policies in index",
            None,
            MetricType::Gauge,
        )?;
        let mut kinds = self.policies.read().kinds().into_iter().collect::<Vec<_>>();
        kinds.sort_unstable();
        for (kind, count) in kinds {
            let labels = [("kind", kind)];
            let policies = ConstGauge::new(count as u32);
            let policies_encoder = policies_encoder.encode_family(&labels)?;
            policies.encode(policies_encoder)?;
        }

        Ok(())
    }
}
