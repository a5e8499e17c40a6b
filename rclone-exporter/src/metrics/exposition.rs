//! Text exposition encoding.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};

use super::collector::REMOTE_LABEL;
use crate::Result;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Encode metric families into the text exposition format.
pub fn encode(families: &[MetricFamily]) -> Result<String> {
    Ok(TextEncoder::new().encode_to_string(families)?)
}

/// Encode metric families into `writer`.
pub fn encode_into<W: std::io::Write>(families: &[MetricFamily], writer: &mut W) -> Result<()> {
    TextEncoder::new().encode(families, writer)?;
    Ok(())
}

/// Drop series labeled with a remote other than `remote`.
///
/// Series without a remote label (lifetime counters, build info) are kept.
/// Families left without any series are removed.
pub fn retain_remote(families: Vec<MetricFamily>, remote: &str) -> Vec<MetricFamily> {
    families
        .into_iter()
        .filter_map(|mut family| {
            let metrics: Vec<_> = family
                .take_metric()
                .into_vec()
                .into_iter()
                .filter(|metric| {
                    metric
                        .get_label()
                        .iter()
                        .find(|pair| pair.get_name() == REMOTE_LABEL)
                        .is_none_or(|pair| pair.get_value() == remote)
                })
                .collect();

            if metrics.is_empty() {
                return None;
            }
            family.set_metric(metrics.into());
            Some(family)
        })
        .collect()
}
