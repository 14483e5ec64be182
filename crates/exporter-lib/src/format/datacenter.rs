//! Data centers (`GET /datacenters`) with MAC pools, QoS entries and quotas

use super::{items, lookup, Exposition, Gauge, LabelSet, LabelSpec};
use serde_json::Value;

const PREFIX: &str = "zvirt_datacenter";

#[rustfmt::skip]
const LABELS: &[LabelSpec] = &[
    ("storage_format", &["storage_format"]),
    ("supported_versions_major", &["supported_versions", "version", "0", "major"]),
    ("supported_versions_minor", &["supported_versions", "version", "0", "minor"]),
    ("version_major", &["version", "major"]),
    ("version_minor", &["version", "minor"]),
    ("name", &["name"]),
    ("id", &["id"]),
];

#[rustfmt::skip]
const GAUGES: &[Gauge] = &[
    Gauge::flag("local", &["local"], "Data center uses local storage (1) or shared storage (0) (bool)."),
    Gauge::choice("quota_mode", &["quota_mode"], &["audit", "disabled", "enabled"],
        "Quota enforcement mode: 0/1/2/3 - audit/disabled/enabled/unknown (number)."),
    Gauge::choice("status", &["status"],
        &["contend", "maintenance", "not_operational", "problematic", "uninitialized", "up"],
        "Data center status: 0/1/2/3/4/5/6 - contend/maintenance/not_operational/problematic/uninitialized/up/unknown (number)."),
];

#[rustfmt::skip]
const MAC_POOL_LABELS: &[LabelSpec] = &[
    ("mac_pool_name", &["name"]),
    ("mac_pool_description", &["description"]),
    ("mac_pool_id", &["id"]),
];

#[rustfmt::skip]
const MAC_RANGE_LABELS: &[LabelSpec] = &[("range_from", &["from"]), ("range_to", &["to"])];

#[rustfmt::skip]
const MAC_POOL_GAUGES: &[Gauge] = &[
    Gauge::flag("allow_duplicates", &["allow_duplicates"], "Duplicate MAC addresses are permitted in the pool (bool)."),
    Gauge::flag("default_pool", &["default_pool"], "This is the default MAC pool (bool)."),
];

#[rustfmt::skip]
const QOS_LABELS: &[LabelSpec] = &[("qos_type", &["type"]), ("qos_name", &["name"]), ("qos_id", &["id"])];

#[rustfmt::skip]
const QOS_GAUGES: &[Gauge] = &[
    Gauge::number("max_read_iops", &["max_read_iops"], "Maximum permitted input operations per second (number)."),
    Gauge::number("max_read_throughput", &["max_read_throughput"], "Maximum permitted read throughput (number)."),
    Gauge::number("max_write_iops", &["max_write_iops"], "Maximum permitted output operations per second (number)."),
    Gauge::number("max_write_throughput", &["max_write_throughput"], "Maximum permitted write throughput (number)."),
];

#[rustfmt::skip]
const QUOTA_LABELS: &[LabelSpec] = &[
    ("quota_name", &["name"]),
    ("quota_description", &["description"]),
    ("quota_id", &["id"]),
];

#[rustfmt::skip]
const QUOTA_GAUGES: &[Gauge] = &[
    Gauge::number("cluster_hard_limit_pct", &["cluster_hard_limit_pct"],
        "Hard cluster resource limit as a percentage of physical capacity (number)."),
    Gauge::number("cluster_soft_limit_pct", &["cluster_soft_limit_pct"],
        "Soft cluster resource limit as a percentage of physical capacity (number)."),
    Gauge::number("storage_hard_limit_pct", &["storage_hard_limit_pct"],
        "Hard storage limit as a percentage of total storage capacity (number)."),
    Gauge::number("storage_soft_limit_pct", &["storage_soft_limit_pct"],
        "Soft storage limit as a percentage of total storage capacity (number)."),
];

#[rustfmt::skip]
const CLUSTER_LIMIT_LABELS: &[LabelSpec] = &[("limit_cluster_id", &["cluster", "id"])];

#[rustfmt::skip]
const CLUSTER_LIMIT_GAUGES: &[Gauge] = &[
    Gauge::number("memory_limit", &["memory_limit"], "Quota memory limit at cluster level, -1 means unlimited (bytes)."),
    Gauge::number("memory_usage", &["memory_usage"], "Quota memory usage at cluster level (bytes)."),
    Gauge::number("vcpu_limit", &["vcpu_limit"], "Quota virtual CPU limit at cluster level, -1 means unlimited (number)."),
    Gauge::number("vcpu_usage", &["vcpu_usage"], "Virtual CPUs allocated under the quota at cluster level (number)."),
];

#[rustfmt::skip]
const STORAGE_LIMIT_LABELS: &[LabelSpec] = &[("limit_storage_domain_id", &["storage_domain", "id"])];

#[rustfmt::skip]
const STORAGE_LIMIT_GAUGES: &[Gauge] = &[
    Gauge::number("storage_limit", &["limit"], "Quota storage limit, -1 means unlimited (bytes)."),
    Gauge::number("storage_usage", &["usage"], "Quota storage usage (bytes)."),
];

fn mac_pool(exp: &mut Exposition, labels: &LabelSet, datacenter: &Value) {
    let Some(pool) = lookup(datacenter, &["mac_pool"]) else {
        return;
    };

    let pool_labels = labels.child(pool, MAC_POOL_LABELS);
    exp.gauges("mac_pool", MAC_POOL_GAUGES, &pool_labels, pool);

    for range in items(pool, &["ranges", "range"]) {
        let range_labels = pool_labels.child(range, MAC_RANGE_LABELS);
        exp.gauge("mac_pool_range", "MAC address range of the pool (info).", &range_labels, "1");
    }
}

fn quotas(exp: &mut Exposition, labels: &LabelSet, datacenter: &Value) {
    for quota in items(datacenter, &["quotas", "quota"]) {
        let quota_labels = labels.child(quota, QUOTA_LABELS);
        exp.gauges("quota", QUOTA_GAUGES, &quota_labels, quota);

        for limit in items(quota, &["quota_cluster_limits", "quota_cluster_limit"]) {
            let limit_labels = quota_labels.child(limit, CLUSTER_LIMIT_LABELS);
            exp.gauges("quota", CLUSTER_LIMIT_GAUGES, &limit_labels, limit);
        }

        for limit in items(quota, &["quota_storage_limits", "quota_storage_limit"]) {
            let limit_labels = quota_labels.child(limit, STORAGE_LIMIT_LABELS);
            exp.gauges("quota", STORAGE_LIMIT_GAUGES, &limit_labels, limit);
        }
    }
}

/// Render the `data_center` collection
pub fn format(datacenters: &[Value]) -> Vec<String> {
    let mut exp = Exposition::new(PREFIX);

    for datacenter in datacenters {
        let mut labels = LabelSet::new();
        labels.push("object_type", "data_center");
        labels.extend_from(datacenter, LABELS);

        exp.gauges("", GAUGES, &labels, datacenter);
        mac_pool(&mut exp, &labels, datacenter);

        for qos in items(datacenter, &["qoss", "qos"]) {
            let qos_labels = labels.child(qos, QOS_LABELS);
            exp.gauges("qos", QOS_GAUGES, &qos_labels, qos);
        }

        quotas(&mut exp, &labels, datacenter);
    }

    exp.into_fragments()
}
