//! Hypervisor hosts (`GET /hosts`)

use super::{items, numeric, statistics, text, Exposition, Gauge, LabelSet, LabelSpec};
use serde_json::Value;

const PREFIX: &str = "zvirt_host";

#[rustfmt::skip]
const LABELS: &[LabelSpec] = &[
    ("address", &["address"]),
    ("name", &["name"]),
    ("id", &["id"]),
    ("certificate_organization", &["certificate", "organization"]),
    ("certificate_subject", &["certificate", "subject"]),
    ("cpu_name", &["cpu", "name"]),
    ("cpu_type", &["cpu", "type"]),
    ("hardware_information_family", &["hardware_information", "family"]),
    ("hardware_information_manufacturer", &["hardware_information", "manufacturer"]),
    ("hardware_information_product_name", &["hardware_information", "product_name"]),
    ("hardware_information_serial_number", &["hardware_information", "serial_number"]),
    ("hardware_information_uuid", &["hardware_information", "uuid"]),
    ("hardware_information_version", &["hardware_information", "version"]),
    ("iscsi_initiator", &["iscsi", "initiator"]),
    ("libvirt_version_build", &["libvirt_version", "build"]),
    ("libvirt_version_full_version", &["libvirt_version", "full_version"]),
    ("libvirt_version_major", &["libvirt_version", "major"]),
    ("libvirt_version_minor", &["libvirt_version", "minor"]),
    ("libvirt_version_revision", &["libvirt_version", "revision"]),
    ("os_type", &["os", "type"]),
    ("os_version_full_version", &["os", "version", "full_version"]),
    ("os_version_major", &["os", "version", "major"]),
    ("os_version_minor", &["os", "version", "minor"]),
    ("version_build", &["version", "build"]),
    ("version_full_version", &["version", "full_version"]),
    ("version_major", &["version", "major"]),
    ("version_minor", &["version", "minor"]),
    ("version_revision", &["version", "revision"]),
    ("vgpu_placement", &["vgpu_placement"]),
    ("cluster_id", &["cluster", "id"]),
];

const RNG_SOURCES: &[&str] = &[
    "hardware_information",
    "supported_rng_sources",
    "supported_rng_source",
];
const PM_PROXIES: &[&str] = &["power_management", "pm_proxies", "pm_proxy"];

const HOST_STATUSES: &[&str] = &[
    "connecting", "down", "error", "initializing", "install_failed", "installing",
    "installing_os", "kdumping", "maintenance", "non_operational", "non_responsive",
    "pending_approval", "preparing_for_maintenance", "reboot", "unassigned", "up",
];

#[rustfmt::skip]
const GAUGES: &[Gauge] = &[
    Gauge::choice("auto_numa_status", &["auto_numa_status"], &["disable", "enable"],
        "Automatic NUMA status: 0/1/2 - disable/enable/unknown (number)."),
    Gauge::number("cpu_speed", &["cpu", "speed"], "Current CPU speed (MHz)."),
    Gauge::number("cpu_topology_cores", &["cpu", "topology", "cores"], "Number of host CPU cores (number)."),
    Gauge::number("cpu_topology_sockets", &["cpu", "topology", "sockets"], "Number of host CPU sockets (number)."),
    Gauge::number("cpu_topology_threads", &["cpu", "topology", "threads"], "Number of host CPU threads (number)."),
    Gauge::flag("device_passthrough_enabled", &["device_passthrough", "enabled"],
        "Host device passthrough is enabled (bool)."),
    Gauge::choice("external_status", &["external_status"], &["error", "failure", "info", "ok", "warning"],
        "External status: 0/1/2/3/4/5 - error/failure/info/ok/warning/unknown (number)."),
    Gauge::contains("supported_rng_source_hwrng", RNG_SOURCES, "hwrng",
        "Random data from /dev/hwrng is supported (bool)."),
    Gauge::contains("supported_rng_source_random", RNG_SOURCES, "random",
        "Random data from /dev/random is supported (bool)."),
    Gauge::contains("supported_rng_source_urandom", RNG_SOURCES, "urandom",
        "Random data from /dev/urandom is supported (bool)."),
    Gauge::choice("kdump_status", &["kdump_status"], &["disabled", "enabled"],
        "KDUMP status: 0/1/2 - disabled/enabled/unknown (number)."),
    Gauge::flag("ksm_enabled", &["ksm", "enabled"], "Kernel SamePage Merging is enabled (bool)."),
    Gauge::number("max_scheduling_memory", &["max_scheduling_memory"], "Max scheduling memory on this host (bytes)."),
    Gauge::number("memory", &["memory"], "Physical memory on this host (bytes)."),
    Gauge::flag("numa_supported", &["numa_supported"], "NUMA is supported on this host (bool)."),
    Gauge::number("port", &["port"], "Host port (number)."),
    Gauge::flag("power_management_automatic_pm_enabled", &["power_management", "automatic_pm_enabled"],
        "Automated power control of the host is enabled (bool)."),
    Gauge::flag("power_management_enabled", &["power_management", "enabled"],
        "Power management configuration is enabled (bool)."),
    Gauge::flag("power_management_kdump_detection", &["power_management", "kdump_detection"],
        "Kdump detection before host shutdown is enabled (bool)."),
    Gauge::contains("power_management_pm_proxies_cluster", PM_PROXIES, "cluster",
        "Fence proxy is selected from the same cluster (bool)."),
    Gauge::contains("power_management_pm_proxies_dc", PM_PROXIES, "dc",
        "Fence proxy is selected from the same data center (bool)."),
    Gauge::contains("power_management_pm_proxies_other_dc", PM_PROXIES, "other_dc",
        "Fence proxy is selected from a different data center (bool)."),
    Gauge::choice("protocol", &["protocol"], &["stomp", "xml"],
        "Engine to host protocol: 0/1/2 - stomp/xml/unknown (number)."),
    Gauge::flag("reinstallation_required", &["reinstallation_required"], "Host should be reinstalled (bool)."),
    Gauge::choice("se_linux_mode", &["se_linux", "mode"], &["disabled", "enforcing", "permissive"],
        "SELinux status: 0/1/2/3 - disabled/enforcing/permissive/unknown (number)."),
    Gauge::number("spm_priority", &["spm", "priority"], "Storage pool manager priority (number)."),
    Gauge::choice("spm_status", &["spm", "status"], &["contending", "none", "spm"],
        "Storage pool manager status: 0/1/2/3 - contending/none/spm/unknown (number)."),
    Gauge::number("ssh_port", &["ssh", "port"], "Host SSH port (number)."),
    Gauge::choice("status", &["status"], HOST_STATUSES,
        "Host status: 0-15 - connecting/down/error/initializing/install_failed/installing/installing_os/\
         kdumping/maintenance/non_operational/non_responsive/pending_approval/preparing_for_maintenance/\
         reboot/unassigned/up, 16 - unknown (number)."),
    Gauge::number("summary_active", &["summary", "active"], "Virtual machines active on the host (number)."),
    Gauge::number("summary_migrating", &["summary", "migrating"], "Virtual machines migrating to or from the host (number)."),
    Gauge::number("summary_total", &["summary", "total"], "Virtual machines present on the host (number)."),
    Gauge::flag("transparent_hugepages_enabled", &["transparent_hugepages", "enabled"],
        "Transparent huge pages are enabled (bool)."),
    Gauge::choice("type", &["type"], &["ovirt_node", "rhel", "rhev_h"],
        "Host installation type: 0/1/2/3 - ovirt_node/rhel/rhev_h/unknown (number)."),
    Gauge::flag("update_available", &["update_available"], "An update is available for this host (bool)."),
];

#[rustfmt::skip]
const NIC_LABELS: &[LabelSpec] = &[
    ("nic_name", &["name"]),
    ("nic_id", &["id"]),
    ("nic_mac", &["mac", "address"]),
    ("base_interface", &["base_interface"]),
    ("bonding_ad_partner_mac_address", &["bonding", "ad_partner_mac", "address"]),
    ("ip_address", &["ip", "address"]),
    ("ip_gateway", &["ip", "gateway"]),
    ("ip_netmask", &["ip", "netmask"]),
    ("ip_version", &["ip", "version"]),
    ("ipv6_address", &["ipv6", "address"]),
    ("ipv6_gateway", &["ipv6", "gateway"]),
    ("ipv6_netmask", &["ipv6", "netmask"]),
    ("ipv6_version", &["ipv6", "version"]),
    ("vlan_id", &["vlan", "id"]),
];

const BOOT_PROTOCOLS: &[&str] = &["autoconf", "dhcp", "none", "poly_dhcp_autoconf", "static"];

#[rustfmt::skip]
const NIC_GAUGES: &[Gauge] = &[
    Gauge::choice("boot_protocol", &["boot_protocol"], BOOT_PROTOCOLS,
        "IPv4 boot protocol: 0/1/2/3/4/5 - autoconf/dhcp/none/poly_dhcp_autoconf/static/unknown (number)."),
    Gauge::choice("ipv6_boot_protocol", &["ipv6_boot_protocol"], BOOT_PROTOCOLS,
        "IPv6 boot protocol: 0/1/2/3/4/5 - autoconf/dhcp/none/poly_dhcp_autoconf/static/unknown (number)."),
    Gauge::number("ad_aggregator_id", &["ad_aggregator_id"], "ad_aggregator_id of a mode 4 bond or bond slave (number)."),
    Gauge::flag("bridged", &["bridged"], "Network is bridged (bool)."),
    Gauge::flag("custom_configuration", &["custom_configuration"],
        "Interface has non-default custom configuration (bool)."),
    Gauge::number("mtu", &["mtu"], "Maximum transmission unit (number)."),
    Gauge::number("speed", &["speed"], "Negotiated link speed (bits_per_second)."),
    Gauge::is("status", &["status"], "up", "1 if the interface is up (bool)."),
    Gauge::flag("check_connectivity", &["check_connectivity"], "Connectivity check is enabled (bool)."),
];

/// Bonding options as gauges named after the option (`miimon`, `mode`, ...)
fn bonding_options(exp: &mut Exposition, labels: &LabelSet, nic: &Value) {
    for option in items(nic, &["bonding", "options", "option"]) {
        let name = format!("nic_bonding_{}", text(option.get("name")).replace('.', "_"));
        let help = format!("Bonding option {} (number).", text(option.get("type")));
        exp.gauge(&name, &help, labels, &numeric(option.get("value")));
    }
}

/// Render the `host` collection
pub fn format(hosts: &[Value]) -> Vec<String> {
    let mut exp = Exposition::new(PREFIX);

    for host in hosts {
        let mut labels = LabelSet::new();
        labels.push("object_type", "host");
        labels.extend_from(host, LABELS);

        exp.gauges("", GAUGES, &labels, host);

        for nic in items(host, &["nics", "host_nic"]) {
            let nic_labels = labels.child(nic, NIC_LABELS);
            exp.gauges("nic", NIC_GAUGES, &nic_labels, nic);
            bonding_options(&mut exp, &nic_labels, nic);
            statistics::emit(&mut exp, "nic", &nic_labels, nic);
        }

        statistics::emit(&mut exp, "", &labels, host);
    }

    exp.into_fragments()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::sample_line;
    use serde_json::json;

    fn sample_host() -> Value {
        json!({
            "name": "hv-01",
            "id": "h1",
            "address": "10.0.0.11",
            "status": "up",
            "memory": "270582939648",
            "max_scheduling_memory": "260000000000",
            "spm": {"status": "spm", "priority": "5"},
            "summary": {"active": "12", "migrating": "0", "total": "14"},
            "hardware_information": {"supported_rng_sources": {"supported_rng_source": ["hwrng", "urandom"]}},
            "power_management": {"enabled": "true", "pm_proxies": {"pm_proxy": [{"type": "cluster"}, {"type": "dc"}]}},
            "nics": {"host_nic": [
                {"name": "bond0", "id": "n1", "mtu": 9000, "status": "up", "boot_protocol": "static",
                 "ip": {"address": "10.0.0.11"},
                 "bonding": {"options": {"option": [
                     {"name": "mode", "type": "Dynamic link aggregation (802.3ad)", "value": "4"},
                     {"name": "miimon", "value": "100"}
                 ]}},
                 "statistics": {"statistic": [
                     {"name": "data.current.tx", "kind": "gauge", "unit": "bytes_per_second",
                      "values": {"value": [{"datum": 1500}]}}
                 ]}}
            ]},
            "statistics": {"statistic": [
                {"name": "cpu.load.avg.5m", "description": "CPU 5 minute load average", "unit": "percent",
                 "kind": "gauge", "values": {"value": [{"datum": 0.4}]}}
            ]}
        })
    }

    fn value_of<'a>(text: &'a str, family: &str) -> &'a str {
        text.lines()
            .find(|l| l.starts_with(&format!("{family}{{")))
            .and_then(|l| l.rsplit(' ').next())
            .unwrap()
    }

    #[test]
    fn test_host_gauges() {
        let text = format(&[sample_host()]).concat();

        assert_eq!(value_of(&text, "zvirt_host_status"), "15");
        assert_eq!(value_of(&text, "zvirt_host_spm_status"), "2");
        assert_eq!(value_of(&text, "zvirt_host_memory"), "270582939648");
        assert_eq!(value_of(&text, "zvirt_host_max_scheduling_memory"), "260000000000");
        assert_eq!(value_of(&text, "zvirt_host_summary_active"), "12");
        assert_eq!(value_of(&text, "zvirt_host_protocol"), "2");
        assert_eq!(value_of(&text, "zvirt_host_supported_rng_source_hwrng"), "1");
        assert_eq!(value_of(&text, "zvirt_host_supported_rng_source_random"), "0");
        assert_eq!(value_of(&text, "zvirt_host_power_management_pm_proxies_dc"), "1");
        assert_eq!(value_of(&text, "zvirt_host_power_management_pm_proxies_other_dc"), "0");
        assert_eq!(value_of(&text, "zvirt_host_cpu_load_avg_5m"), "0.4");
    }

    #[test]
    fn test_host_nics() {
        let text = format(&[sample_host()]).concat();

        assert_eq!(value_of(&text, "zvirt_host_nic_mtu"), "9000");
        assert_eq!(value_of(&text, "zvirt_host_nic_boot_protocol"), "4");
        assert_eq!(value_of(&text, "zvirt_host_nic_bonding_mode"), "4");
        assert_eq!(value_of(&text, "zvirt_host_nic_bonding_miimon"), "100");
        assert_eq!(value_of(&text, "zvirt_host_nic_data_current_tx"), "1500");
        assert!(text.contains("# HELP zvirt_host_nic_bonding_miimon Bonding option unknown (number).\n"));

        let mtu = sample_line(&text, "zvirt_host_nic_mtu");
        assert!(mtu.contains("name=\"hv-01\""));
        assert!(mtu.contains("nic_name=\"bond0\""));
        assert!(mtu.contains("vlan_id=\"unknown\""));
    }

    #[test]
    fn test_missing_fields_render_defaults() {
        let text = format(&[json!({"name": "bare"})]).concat();

        assert_eq!(value_of(&text, "zvirt_host_status"), "16");
        assert_eq!(value_of(&text, "zvirt_host_cpu_speed"), "0");
        assert!(text.contains("address=\"unknown\""));
        assert!(!text.contains("zvirt_host_nic_"));
    }
}
