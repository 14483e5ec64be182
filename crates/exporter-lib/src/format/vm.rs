//! Virtual machines (`GET /vms`)

use super::{items, lookup, statistics, text, Exposition, Gauge, LabelSet, LabelSpec, UNKNOWN};
use serde_json::Value;

const PREFIX: &str = "zvirt_vm";

/// CMDB tags every VM carries as labels, `unknown` unless tagged
const CMDB_TAGS: &[&str] = &["CMDB_AS_ID", "CMDB_GAS_ID", "CMDB_ENV", "CMDB_CRIT"];

#[rustfmt::skip]
const LABELS: &[LabelSpec] = &[
    ("fqdn", &["fqdn"]),
    ("name", &["name"]),
    ("id", &["id"]),
    ("ip", &["display", "address"]),
    ("os_architecture", &["guest_operating_system", "architecture"]),
    ("codename", &["guest_operating_system", "codename"]),
    ("distribution", &["guest_operating_system", "distribution"]),
    ("family", &["guest_operating_system", "family"]),
    ("kernel_build", &["guest_operating_system", "kernel", "version", "build"]),
    ("kernel_full_version", &["guest_operating_system", "kernel", "version", "full_version"]),
    ("kernel_major", &["guest_operating_system", "kernel", "version", "major"]),
    ("kernel_minor", &["guest_operating_system", "kernel", "version", "minor"]),
    ("kernel_revision", &["guest_operating_system", "kernel", "version", "revision"]),
    ("distribution_full_version", &["guest_operating_system", "version", "full_version"]),
    ("distribution_major", &["guest_operating_system", "version", "major"]),
    ("distribution_minor", &["guest_operating_system", "version", "minor"]),
    ("distribution_revision", &["guest_operating_system", "version", "revision"]),
    ("time_zone", &["time_zone", "name"]),
    ("guest_time_zone_name", &["guest_time_zone", "name"]),
    ("guest_time_zone_utc_offset", &["guest_time_zone", "utc_offset"]),
    ("bios_type", &["bios", "type"]),
    ("cpu_architecture", &["cpu", "architecture"]),
    ("template_id", &["template", "id"]),
    ("cluster_id", &["cluster", "id"]),
    ("quota_id", &["quota", "id"]),
    ("cpu_profile_id", &["cpu_profile", "id"]),
];

#[rustfmt::skip]
const GAUGES: &[Gauge] = &[
    Gauge::flag("next_run_configuration_exists", &["next_run_configuration_exists"],
        "Are there any configuration changes made to the VM that are pending confirmation (bool)."),
    Gauge::flag("run_once", &["run_once"], "Is VM Run Once (bool)."),
    Gauge::number("creation_time", &["creation_time"], "VM creation date (timestamp)."),
    Gauge::number("start_time", &["start_time"], "VM start date (timestamp)."),
    Gauge::number("stop_time", &["stop_time"], "VM stop date (timestamp)."),
    Gauge::is("status", &["status"], "up", "VM status, 1 if up (bool)."),
    Gauge::flag("boot_menu_enabled", &["bios", "boot_menu", "enabled"], "Is the VM boot menu enabled (bool)."),
    Gauge::choice("cpu_mode", &["cpu", "mode"], &["custom", "host_model", "host_passthrough"],
        "Current CPU mode: 0/1/2/3 - custom/host_model/host_passthrough/unknown (number)."),
    Gauge::number("cpu_topology_cores", &["cpu", "topology", "cores"], "Number of VM CPU cores (number)."),
    Gauge::number("cpu_topology_sockets", &["cpu", "topology", "sockets"], "Number of VM CPU sockets (number)."),
    Gauge::number("cpu_topology_threads", &["cpu", "topology", "threads"], "Number of VM CPU threads (number)."),
    Gauge::choice("placement_policy_affinity", &["placement_policy", "affinity"],
        &["migratable", "pinned", "user_migratable"],
        "Placement policy of the VM: 0/1/2/3 - migratable/pinned/user_migratable/unknown (number)."),
    Gauge::choice("storage_error_resume_behaviour", &["storage_error_resume_behaviour"],
        &["auto_resume", "kill", "leave_paused"],
        "How the VM is resumed after a storage error: 0/1/2/3 - auto_resume/kill/leave_paused/unknown (number)."),
    Gauge::number("io_threads", &["io", "threads"],
        "Number of I/O threads. VirtIO disks are pinned to an I/O thread using a round-robin algorithm (number)."),
    Gauge::number("memory", &["memory"], "Assigned memory during configuration (bytes)."),
    Gauge::flag("stateless", &["stateless"], "VM is stateless (bool)."),
    Gauge::flag("usb_enabled", &["usb", "enabled"], "VM USB is enabled (bool)."),
    Gauge::number("cpu_shares", &["cpu_shares"], "CPU shares weight (0 == auto) (number)."),
    Gauge::flag("delete_protected", &["delete_protected"], "Is the VM protected from deletion (bool)."),
    Gauge::flag("high_availability_enabled", &["high_availability", "enabled"], "VM HA is enabled (bool)."),
    Gauge::number("high_availability_priority", &["high_availability", "priority"], "VM HA priority (number)."),
    Gauge::flag("memory_policy_ballooning", &["memory_policy", "ballooning"],
        "Memory balloon device enabled; requires memory overcommitment in the cluster (bool)."),
    Gauge::number("memory_policy_guaranteed", &["memory_policy", "guaranteed"], "VM guaranteed memory (bytes)."),
    Gauge::number("memory_policy_max", &["memory_policy", "max"], "VM max memory (bytes)."),
    Gauge::number("migration_downtime", &["migration_downtime"],
        "Max allowed VM downtime during live migration (-1 == cluster default) (number)."),
    Gauge::flag("multi_queues_enabled", &["multi_queues_enabled"],
        "Multiple queues per virtual network card are allowed (bool)."),
    Gauge::flag("start_paused", &["start_paused"], "1 if start paused VM enabled (bool)."),
    Gauge::flag("virtio_scsi_multi_queues_enabled", &["virtio_scsi_multi_queues_enabled"],
        "1 if multiqueue virtio-scsi enabled (bool)."),
];

#[rustfmt::skip]
const NIC_LABELS: &[LabelSpec] = &[
    ("interface", &["interface"]),
    ("nic_mac", &["mac", "address"]),
    ("nic_profile_id", &["vnic_profile", "id"]),
    ("nic_name", &["name"]),
    ("nic_id", &["id"]),
];

#[rustfmt::skip]
const NIC_GAUGES: &[Gauge] = &[
    Gauge::flag("plugged", &["plugged"],
        "1 if the VM network interface is plugged (attached) to the VM, else 0 (bool)."),
    Gauge::flag("synced", &["synced"],
        "1 if the VM network interface configuration is fully synced with next-run settings, else 0 (bool)."),
];

#[rustfmt::skip]
const DISK_LABELS: &[LabelSpec] = &[
    ("logical_name", &["logical_name"]),
    ("alias", &["disk", "alias"]),
    ("disk_name", &["disk", "name"]),
    ("disk_id", &["disk", "id"]),
    ("image_id", &["disk", "image_id"]),
    ("disk_profile_id", &["disk", "disk_profile", "id"]),
    ("disk_quota_id", &["disk", "quota", "id"]),
    ("storage_domain_id", &["disk", "storage_domains", "storage_domain", "0", "id"]),
];

/// Per-attachment gauges; disk properties live under the nested `disk`
#[rustfmt::skip]
const DISK_GAUGES: &[Gauge] = &[
    Gauge::choice("interface", &["interface"], &["ide", "sata", "spapr_vscsi", "virtio", "virtio_scsi"],
        "Disk interface driver: 0/1/2/3/4/5 - ide/sata/spapr_vscsi/virtio/virtio_scsi/unknown (number)."),
    Gauge::choice("backup", &["disk", "backup"], &["incremental", "none"],
        "Backup behavior supported by the disk: 0/1/2 - incremental/none/unknown (number)."),
    Gauge::choice("content_type", &["disk", "content_type"], &[
            "backup_scratch", "data", "hosted_engine", "hosted_engine_configuration",
            "hosted_engine_metadata", "hosted_engine_sanlock", "iso", "memory_dump_volume",
            "memory_metadata_volume", "ovf_store",
        ],
        "Content residing on the disk: 0-9 - backup_scratch/data/hosted_engine/hosted_engine_configuration/\
         hosted_engine_metadata/hosted_engine_sanlock/iso/memory_dump_volume/memory_metadata_volume/ovf_store, 10 - unknown (number)."),
    Gauge::choice("format", &["disk", "format"], &["cow", "raw"],
        "Underlying storage format: 0/1/2 - cow/raw/unknown (number)."),
    Gauge::choice("qcow_version", &["disk", "qcow_version"], &["qcow2_v2", "qcow2_v3"],
        "QCOW version of a QCOW volume: 0/1/2 - qcow2_v2/qcow2_v3/unknown (number)."),
    Gauge::choice("storage_type", &["disk", "storage_type"], &["cinder", "image", "lun", "managed_block_storage"],
        "Disk storage type: 0/1/2/3/4 - cinder/image/lun/managed_block_storage/unknown (number)."),
    Gauge::flag("active", &["active"], "1 if the disk is currently active, else 0 (bool)."),
    Gauge::flag("bootable", &["bootable"], "1 if the disk is marked as bootable for the VM, else 0 (bool)."),
    Gauge::flag("pass_discard", &["pass_discard"],
        "1 if discard/UNMAP/TRIM operations from the guest are passed to storage, else 0 (bool)."),
    Gauge::flag("read_only", &["read_only"], "1 if the disk is attached as read-only, else 0 (bool)."),
    Gauge::flag("uses_scsi_reservation", &["uses_scsi_reservation"],
        "1 if SCSI reservations are enabled for this disk, else 0 (bool)."),
    Gauge::number("actual_size", &["disk", "actual_size"], "Actual allocated size of the disk on storage (bytes)."),
    Gauge::flag("propagate_errors", &["disk", "propagate_errors"],
        "1 if disk I/O errors propagate to the guest, else 0 (bool)."),
    Gauge::number("provisioned_size", &["disk", "provisioned_size"], "Provisioned (virtual) size of the disk (bytes)."),
    Gauge::flag("shareable", &["disk", "shareable"], "1 if the disk is shareable between VMs, else 0 (bool)."),
    Gauge::flag("sparse", &["disk", "sparse"], "1 if the disk is thin-provisioned (sparse), else 0 (bool)."),
    Gauge::is("status", &["disk", "status"], "ok", "1 if the disk status is ok, else 0 (bool)."),
    Gauge::number("total_size", &["disk", "total_size"], "Total space consumed by the disk on storage (bytes)."),
    Gauge::flag("wipe_after_delete", &["disk", "wipe_after_delete"],
        "1 if secure wipe after delete is enabled, else 0 (bool)."),
];

#[rustfmt::skip]
const SNAPSHOT_DISK_LABELS: &[LabelSpec] = &[
    ("snapshot_id", &["snapshot", "id"]),
    ("alias", &["alias"]),
    ("backup", &["backup"]),
    ("content_type", &["content_type"]),
    ("format", &["format"]),
    ("image_id", &["image_id"]),
    ("storage_type", &["storage_type"]),
    ("disk_profile_id", &["disk_profile", "id"]),
    ("disk_quota_id", &["quota", "id"]),
    ("storage_domain_id", &["storage_domains", "storage_domain", "0", "id"]),
];

/// Read from the snapshot that owns the disk
#[rustfmt::skip]
const SNAPSHOT_GAUGES: &[Gauge] = &[
    Gauge::number("date", &["date"], "Snapshot creation date (timestamp)."),
    Gauge::flag("persist_memorystate", &["persist_memorystate"], "1 if the snapshot includes memory state (bool)."),
    Gauge::is("status", &["snapshot_status"], "ok", "1 if the snapshot status is ok (bool)."),
    Gauge::is("type_active", &["snapshot_type"], "active", "1 if this is the active snapshot (bool)."),
];

/// Read from the snapshot disk itself
#[rustfmt::skip]
const SNAPSHOT_DISK_GAUGES: &[Gauge] = &[
    Gauge::number("actual_size", &["actual_size"], "Actual allocated size of the snapshot disk (bytes)."),
    Gauge::flag("propagate_errors", &["propagate_errors"], "1 if disk I/O errors propagate to the guest (bool)."),
    Gauge::number("provisioned_size", &["provisioned_size"], "Provisioned size of the snapshot disk (bytes)."),
    Gauge::flag("shareable", &["shareable"], "1 if the snapshot disk is shareable (bool)."),
    Gauge::flag("sparse", &["sparse"], "1 if the snapshot disk is sparse (bool)."),
    Gauge::is("disk_status", &["status"], "ok", "1 if the snapshot disk status is ok (bool)."),
    Gauge::number("total_size", &["total_size"], "Total space consumed by the snapshot disk (bytes)."),
    Gauge::flag("wipe_after_delete", &["wipe_after_delete"], "1 if secure wipe after delete is enabled (bool)."),
];

/// Base labels plus CMDB tag labels.
///
/// Tags named `KEY.VALUE` set label `KEY`; a tag without a dot becomes a
/// label with value `unknown`. Tags never override identity labels.
fn labels(vm: &Value) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.push("object_type", "vm");
    labels.extend_from(vm, LABELS);

    let mut tags: Vec<(String, String)> = CMDB_TAGS
        .iter()
        .map(|tag| (tag.to_string(), UNKNOWN.to_string()))
        .collect();

    for tag in items(vm, &["tags", "tag"]) {
        let name = text(tag.get("name"));
        let parts: Vec<&str> = name.split('.').collect();
        let (key, value) = match parts.as_slice() {
            [key, value] => (*key, *value),
            [key] if !key.is_empty() && name != UNKNOWN => (*key, UNKNOWN),
            _ => continue,
        };
        match tags.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => tags.push((key.to_string(), value.to_string())),
        }
    }

    for (key, value) in tags {
        labels.push(&key, value);
    }
    labels
}

/// Render the `vm` collection
pub fn format(vms: &[Value]) -> Vec<String> {
    let mut exp = Exposition::new(PREFIX);

    for vm in vms {
        let labels = labels(vm);
        exp.gauges("", GAUGES, &labels, vm);
        statistics::emit(&mut exp, "", &labels, vm);

        for nic in items(vm, &["nics", "nic"]) {
            let nic_labels = labels.child(nic, NIC_LABELS);
            exp.gauges("nic", NIC_GAUGES, &nic_labels, nic);
            statistics::emit(&mut exp, "nic", &nic_labels, nic);
        }

        for attachment in items(vm, &["disk_attachments", "disk_attachment"]) {
            let disk_labels = labels.child(attachment, DISK_LABELS);
            exp.gauges("disk", DISK_GAUGES, &disk_labels, attachment);
            if let Some(disk) = lookup(attachment, &["disk"]) {
                statistics::emit(&mut exp, "disk", &disk_labels, disk);
            }
        }

        for snapshot in items(vm, &["snapshots", "snapshot"]) {
            for disk in items(snapshot, &["disks", "disk"]) {
                let snapshot_labels = labels.child(disk, SNAPSHOT_DISK_LABELS);
                exp.gauges("snapshot", SNAPSHOT_GAUGES, &snapshot_labels, snapshot);
                exp.gauges("snapshot", SNAPSHOT_DISK_GAUGES, &snapshot_labels, disk);
            }
        }
    }

    exp.into_fragments()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::sample_line;
    use serde_json::json;

    fn sample_vm() -> Value {
        json!({
            "name": "web-01",
            "id": "vm-1",
            "fqdn": "web-01.example.com",
            "status": "up",
            "memory": "4294967296",
            "stateless": "false",
            "cpu": {"mode": "host_passthrough", "topology": {"cores": "2", "sockets": "1", "threads": "1"}},
            "tags": {"tag": [
                {"name": "CMDB_ENV.prod"},
                {"name": "owner.team-a"},
                {"name": "legacy"},
                {"name": "name.spoofed"}
            ]},
            "statistics": {"statistic": [
                {"name": "memory.used", "description": "Memory used", "unit": "bytes",
                 "kind": "gauge", "type": "integer", "values": {"value": [{"datum": 1024}]}}
            ]},
            "nics": {"nic": [
                {"name": "nic1", "id": "n1", "plugged": "true", "synced": "true", "mac": {"address": "00:1a"},
                 "statistics": {"statistic": [
                     {"name": "data.current.rx", "kind": "gauge", "values": {"value": [{"datum": 5}]}}
                 ]}}
            ]},
            "disk_attachments": {"disk_attachment": [
                {"logical_name": "/dev/vda", "interface": "virtio_scsi", "bootable": "true", "active": "true",
                 "disk": {"alias": "web-01_Disk1", "id": "d1", "format": "cow", "status": "ok",
                          "provisioned_size": "10737418240",
                          "storage_domains": {"storage_domain": [{"id": "sd1"}]},
                          "statistics": {"statistic": [
                              {"name": "disk.read.latency", "kind": "gauge", "values": {"value": [{"datum": 0.001}]}}
                          ]}}}
            ]},
            "snapshots": {"snapshot": [
                {"date": 1700000000000i64, "snapshot_status": "ok", "snapshot_type": "regular",
                 "disks": {"disk": [{"alias": "snap-disk", "actual_size": "123", "status": "ok",
                                     "snapshot": {"id": "s1"}}]}},
                {"date": 1700000001000i64, "snapshot_status": "ok", "snapshot_type": "active"}
            ]}
        })
    }

    #[test]
    fn test_cmdb_tag_labels() {
        let labels = labels(&sample_vm());

        assert_eq!(labels.get("CMDB_ENV"), Some("prod"));
        assert_eq!(labels.get("CMDB_AS_ID"), Some(UNKNOWN));
        assert_eq!(labels.get("owner"), Some("team-a"));
        assert_eq!(labels.get("legacy"), Some(UNKNOWN));
        // Tags cannot override identity labels
        assert_eq!(labels.get("name"), Some("web-01"));
        assert_eq!(labels.get("os_architecture"), Some(UNKNOWN));
    }

    #[test]
    fn test_vm_gauges() {
        let text = format(&[sample_vm()]).concat();

        assert!(text.contains("# TYPE zvirt_vm_status gauge\n"));
        assert!(text.contains("zvirt_vm_status{object_type=\"vm\",fqdn=\"web-01.example.com\",name=\"web-01\""));
        assert!(text.contains("} 4294967296\n"));
        assert!(text.contains("zvirt_vm_memory_used{"));
        // host_passthrough is option 2
        let cpu_mode = sample_line(&text, "zvirt_vm_cpu_mode");
        assert!(cpu_mode.ends_with(" 2"));
    }

    #[test]
    fn test_nested_objects() {
        let text = format(&[sample_vm()]).concat();

        let plugged = sample_line(&text, "zvirt_vm_nic_plugged");
        assert!(plugged.contains("nic_name=\"nic1\""));
        assert!(plugged.ends_with(" 1"));
        assert!(text.contains("zvirt_vm_nic_data_current_rx{"));

        let interface = sample_line(&text, "zvirt_vm_disk_interface");
        assert!(interface.contains("storage_domain_id=\"sd1\""));
        assert!(interface.ends_with(" 4"));
        assert!(text.contains("zvirt_vm_disk_disk_read_latency{"));

        let actual = sample_line(&text, "zvirt_vm_snapshot_actual_size");
        assert!(actual.contains("snapshot_id=\"s1\""));
        assert!(actual.ends_with(" 123"));
        // Snapshots without disks contribute nothing
        assert_eq!(text.lines().filter(|l| l.starts_with("zvirt_vm_snapshot_date{")).count(), 1);
    }

    #[test]
    fn test_metadata_once_per_family() {
        let mut second = sample_vm();
        second["name"] = json!("web-02");
        second["id"] = json!("vm-2");

        let fragments = format(&[sample_vm(), second]);

        for fragment in &fragments {
            assert_eq!(fragment.matches("# HELP").count(), 1, "{fragment}");
            assert_eq!(fragment.matches("# TYPE").count(), 1, "{fragment}");
        }
        let status = fragments
            .iter()
            .find(|f| f.starts_with("# HELP zvirt_vm_status "))
            .unwrap();
        assert_eq!(status.lines().count(), 4);
    }

    #[test]
    fn test_empty_collection() {
        assert!(format(&[]).is_empty());
    }
}
