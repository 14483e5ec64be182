//! Clusters (`GET /clusters`)

use super::{items, numeric, snake_case, text, Exposition, Gauge, LabelSet, LabelSpec};
use serde_json::Value;

const PREFIX: &str = "zvirt_cluster";

#[rustfmt::skip]
const LABELS: &[LabelSpec] = &[
    ("bios_type", &["bios_type"]),
    ("cpu_architecture", &["cpu", "architecture"]),
    ("cpu_type", &["cpu", "type"]),
    ("migration_policy_id", &["migration", "policy", "id"]),
    ("version_major", &["version", "major"]),
    ("version_minor", &["version", "minor"]),
    ("name", &["name"]),
    ("id", &["id"]),
];

const INHERITABLE: &[&str] = &["false", "true", "inherit"];

#[rustfmt::skip]
const GAUGES: &[Gauge] = &[
    Gauge::choice("error_handling_on_error", &["error_handling", "on_error"],
        &["do_not_migrate", "migrate", "migrate_highly_available"],
        "VMs migrated on cluster failure: 0/1/2/3 - do_not_migrate/migrate/migrate_highly_available/unknown (number)."),
    Gauge::choice("firewall_type", &["firewall_type"], &["firewalld", "iptables"],
        "Host firewall type: 0/1/2 - firewalld/iptables/unknown (number)."),
    Gauge::flag("ballooning_enabled", &["ballooning_enabled"], "Memory ballooning is enabled (bool)."),
    Gauge::flag("fencing_policy_enabled", &["fencing_policy", "enabled"], "Fencing is enabled (bool)."),
    Gauge::flag("fencing_policy_skip_if_connectivity_broken_enabled",
        &["fencing_policy", "skip_if_connectivity_broken", "enabled"],
        "Fencing is skipped when many hosts lost connectivity (bool)."),
    Gauge::number("fencing_policy_skip_if_connectivity_broken_threshold",
        &["fencing_policy", "skip_if_connectivity_broken", "threshold"],
        "Percentage of hosts losing connectivity above which fencing is skipped (number)."),
    Gauge::flag("fencing_policy_skip_if_gluster_bricks_up", &["fencing_policy", "skip_if_gluster_bricks_up"],
        "Fencing is skipped while Gluster bricks are up (bool)."),
    Gauge::flag("fencing_policy_skip_if_gluster_quorum_not_met",
        &["fencing_policy", "skip_if_gluster_quorum_not_met"],
        "Fencing is skipped when Gluster quorum would be lost (bool)."),
    Gauge::flag("fencing_policy_skip_if_sd_active_enabled", &["fencing_policy", "skip_if_sd_active", "enabled"],
        "Fencing is skipped while the host holds its storage lease (bool)."),
    Gauge::is("fips_mode", &["fips_mode"], "enabled", "FIPS mode is enabled (bool)."),
    Gauge::flag("gluster_service", &["gluster_service"], "GlusterFS service is enabled (bool)."),
    Gauge::flag("ha_reservation", &["ha_reservation"], "High availability resource reservation is enabled (bool)."),
    Gauge::flag("ksm_enabled", &["ksm", "enabled"], "Kernel Samepage Merging is enabled (bool)."),
    Gauge::flag("ksm_merge_across_nodes", &["ksm", "merge_across_nodes"],
        "KSM merges pages across NUMA nodes (bool)."),
    Gauge::number("log_max_memory_used_threshold", &["log_max_memory_used_threshold"],
        "Memory consumption threshold for audit log events (number)."),
    Gauge::is("log_max_memory_used_threshold_type", &["log_max_memory_used_threshold_type"], "percentage",
        "Memory threshold type, 1 if percentage, 0 if absolute_value_in_mb (bool)."),
    Gauge::number("memory_policy_over_commit_percent", &["memory_policy", "over_commit", "percent"],
        "Allowed memory overcommit as a percentage of physical memory (number)."),
    Gauge::flag("memory_policy_transparent_hugepages_enabled",
        &["memory_policy", "transparent_hugepages", "enabled"],
        "Transparent huge pages are enabled (bool)."),
    Gauge::choice("migration_auto_converge", &["migration", "auto_converge"], INHERITABLE,
        "Migration auto converge: 0/1/2/3 - false/true/inherit/unknown (number)."),
    Gauge::choice("migration_bandwidth_assignment_method", &["migration", "bandwidth", "assignment_method"],
        &["auto", "custom", "hypervisor_default"],
        "Migration bandwidth assignment: 0/1/2/3 - auto/custom/hypervisor_default/unknown (number)."),
    Gauge::choice("migration_compressed", &["migration", "compressed"], INHERITABLE,
        "Migration memory compression: 0/1/2/3 - false/true/inherit/unknown (number)."),
    Gauge::choice("migration_encrypted", &["migration", "encrypted"], INHERITABLE,
        "Migration encryption: 0/1/2/3 - false/true/inherit/unknown (number)."),
    Gauge::choice("required_rng_source", &["required_rng_sources", "required_rng_source", "0"],
        &["hwrng", "random", "urandom"],
        "Required random generator backend: 0/1/2/3 - hwrng/random/urandom/unknown (number)."),
    Gauge::choice("switch_type", &["switch_type"], &["legacy", "ovs"],
        "Network switch type: 0/1/2 - legacy/ovs/unknown (number)."),
    Gauge::flag("threads_as_cores", &["threads_as_cores"], "CPU threads are treated as cores (bool)."),
    Gauge::flag("trusted_service", &["trusted_service"], "Trusted services are enabled (bool)."),
    Gauge::flag("tunnel_migration", &["tunnel_migration"], "Migration is tunnelled (bool)."),
    Gauge::flag("virt_service", &["virt_service"], "Virtualization service is enabled (bool)."),
    Gauge::flag("vnc_encryption", &["vnc_encryption"], "VNC console connections are encrypted (bool)."),
];

/// Custom scheduling policy properties (`HighUtilization` -> `scheduling_high_utilization`)
fn scheduling_properties(exp: &mut Exposition, labels: &LabelSet, cluster: &Value) {
    for property in items(cluster, &["custom_scheduling_policy_properties", "property"]) {
        let raw = text(property.get("name"));
        let name = format!("scheduling_{}", snake_case(&raw));
        let help = format!("Custom scheduling policy property {raw} (number).");
        exp.gauge(&name, &help, labels, &numeric(property.get("value")));
    }
}

/// Render the `cluster` collection
pub fn format(clusters: &[Value]) -> Vec<String> {
    let mut exp = Exposition::new(PREFIX);

    for cluster in clusters {
        let mut labels = LabelSet::new();
        labels.push("object_type", "cluster");
        labels.extend_from(cluster, LABELS);

        scheduling_properties(&mut exp, &labels, cluster);
        exp.gauges("", GAUGES, &labels, cluster);
    }

    exp.into_fragments()
}
