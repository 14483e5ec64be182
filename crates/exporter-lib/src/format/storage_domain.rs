//! Storage domains (`GET /storagedomains`)

use super::{items, text, Exposition, Gauge, LabelSet, LabelSpec};
use serde_json::Value;

const PREFIX: &str = "zvirt_storagedomain";

#[rustfmt::skip]
const LABELS: &[LabelSpec] = &[
    ("storage_type", &["storage", "type"]),
    ("name", &["name"]),
    ("id", &["id"]),
];

#[rustfmt::skip]
const GAUGES: &[Gauge] = &[
    Gauge::number("available", &["available"], "Free space available in the storage domain (bytes)."),
    Gauge::flag("backup", &["backup"], "Data storage domain is used as backup domain (bool)."),
    Gauge::number("block_size", &["block_size"], "Block size of the storage domain (bytes)."),
    Gauge::number("committed", &["committed"], "Total logical size of all virtual disks on the domain (bytes)."),
    Gauge::number("critical_space_action_blocker", &["critical_space_action_blocker"],
        "Free space threshold below which operations are blocked (percent)."),
    Gauge::flag("discard_after_delete", &["discard_after_delete"],
        "Disk blocks are discarded before deletion (bool)."),
    Gauge::choice("external_status", &["external_status"], &["error", "failure", "info", "ok", "warning"],
        "External status: 0/1/2/3/4/5 - error/failure/info/ok/warning/unknown (number)."),
    Gauge::flag("master", &["master"], "Storage domain is the master domain of its data center (bool)."),
    Gauge::choice("storage_format", &["storage_format"], &["v1", "v2", "v3", "v4", "v5"],
        "Metadata format version: 0/1/2/3/4/5 - v1/v2/v3/v4/v5/unknown (number)."),
    Gauge::flag("supports_discard", &["supports_discard"], "Block storage domain supports discard (bool)."),
    Gauge::flag("supports_discard_zeroes_data", &["supports_discard_zeroes_data"],
        "Discarded blocks read back as zeroes (bool)."),
    Gauge::choice("type", &["type"], &["data", "export", "image", "iso", "managed_block_storage", "volume"],
        "Storage domain role: 0/1/2/3/4/5/6 - data/export/image/iso/managed_block_storage/volume/unknown (number)."),
    Gauge::number("used", &["used"], "Used space in the storage domain (bytes)."),
    Gauge::number("warning_low_space_indicator", &["warning_low_space_indicator"],
        "Warning threshold for low free space (percent)."),
    Gauge::flag("wipe_after_delete", &["wipe_after_delete"], "Default wipe_after_delete for new disks (bool)."),
];

#[rustfmt::skip]
const LUN_LABELS: &[LabelSpec] = &[
    ("logical_unit_id", &["id"]),
    ("logical_unit_product_id", &["product_id"]),
    ("logical_unit_serial", &["serial"]),
    ("logical_unit_address", &["address"]),
    ("logical_unit_portal", &["portal"]),
    ("logical_unit_target", &["target"]),
    ("logical_unit_vendor_id", &["vendor_id"]),
    ("logical_unit_volume_group_id", &["volume_group_id"]),
    ("logical_unit_lun_mapping", &["lun_mapping"]),
];

#[rustfmt::skip]
const LUN_GAUGES: &[Gauge] = &[
    Gauge::number("discard_max_size", &["discard_max_size"],
        "Maximum bytes the LUN can discard in a single operation (bytes)."),
    Gauge::flag("discard_zeroes_data", &["discard_zeroes_data"], "Discarded blocks read back as zeroes (bool)."),
    Gauge::number("paths", &["paths"], "Number of active multipaths to the LUN (number)."),
    Gauge::number("port", &["port"], "Network port used to access the LUN (number)."),
    Gauge::number("size", &["size"], "Size of the LUN (bytes)."),
];

/// Render the `storage_domain` collection
pub fn format(domains: &[Value]) -> Vec<String> {
    let mut exp = Exposition::new(PREFIX);

    for domain in domains {
        let mut labels = LabelSet::new();
        labels.push("object_type", "storagedomain");
        labels.extend_from(domain, LABELS);

        exp.gauges("", GAUGES, &labels, domain);

        for lun in items(domain, &["storage", "volume_group", "logical_units", "logical_unit"]) {
            let lun_labels = labels.child(lun, LUN_LABELS);
            exp.gauges("logical_unit", LUN_GAUGES, &lun_labels, lun);
        }

        for datacenter in items(domain, &["data_centers", "data_center"]) {
            let mut member = labels.clone();
            member.push("data_center_id", text(datacenter.get("id")));
            exp.gauge(
                "data_center",
                "Data center the storage domain is attached to (info).",
                &member,
                "1",
            );
        }
    }

    exp.into_fragments()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::sample_line;
    use serde_json::json;

    #[test]
    fn test_storage_domain_gauges_and_luns() {
        let domain = json!({
            "name": "data-fc",
            "id": "sd1",
            "type": "data",
            "master": "true",
            "available": "5497558138880",
            "storage_format": "v5",
            "storage": {"type": "fcp", "volume_group": {"logical_units": {"logical_unit": [
                {"id": "3600a098", "paths": "4", "size": "5497558138880", "vendor_id": "NETAPP"}
            ]}}},
            "data_centers": {"data_center": [{"id": "dc1"}, {"id": "dc2"}]}
        });

        let text = format(&[domain]).concat();

        let available = sample_line(&text, "zvirt_storagedomain_available");
        assert!(available.contains("storage_type=\"fcp\""));
        assert!(available.ends_with(" 5497558138880"));
        assert!(sample_line(&text, "zvirt_storagedomain_storage_format").ends_with(" 4"));
        assert!(sample_line(&text, "zvirt_storagedomain_type").ends_with(" 0"));

        let paths = sample_line(&text, "zvirt_storagedomain_logical_unit_paths");
        assert!(paths.contains("logical_unit_vendor_id=\"NETAPP\""));
        assert!(paths.ends_with(" 4"));

        let members: Vec<_> = text
            .lines()
            .filter(|l| l.starts_with("zvirt_storagedomain_data_center{"))
            .collect();
        assert_eq!(members.len(), 2);
        assert!(members[1].contains("data_center_id=\"dc2\""));
        assert_eq!(text.matches("# HELP zvirt_storagedomain_data_center ").count(), 1);
    }
}
