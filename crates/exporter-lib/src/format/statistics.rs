//! Engine `statistics.statistic` lists
//!
//! VMs, hosts, NICs and disks all report statistics in the same shape:
//! `{name, description, unit, kind, type, values: {value: [{datum, detail}]}}`.

use super::{as_f64, items, lookup, numeric, text, Exposition, LabelSet, MetricKind};
use serde_json::Value;

/// Statistic names containing this marker carry sample history, not a value
const HISTORY_MARKER: &str = ".history";

fn family_name(scope: &str, statistic: &Value) -> String {
    let name = text(statistic.get("name")).replace('.', "_");
    if scope.is_empty() {
        name
    } else {
        format!("{scope}_{name}")
    }
}

fn help(statistic: &Value) -> String {
    format!(
        "{} ({}).",
        text(statistic.get("description")),
        text(statistic.get("unit"))
    )
}

fn kind(statistic: &Value) -> MetricKind {
    match statistic.get("kind").and_then(Value::as_str) {
        Some("counter") => MetricKind::Counter,
        _ => MetricKind::Gauge,
    }
}

/// Emit every numeric statistic of `holder` under `scope`.
///
/// String statistics are skipped except the guest filesystem report, which
/// is expanded into `fs_total`, `fs_used` and `fs_percentage` per mount.
pub(crate) fn emit(exp: &mut Exposition, scope: &str, labels: &LabelSet, holder: &Value) {
    for statistic in items(holder, &["statistics", "statistic"]) {
        let name = text(statistic.get("name"));
        if name.contains(HISTORY_MARKER) {
            continue;
        }

        if statistic.get("type").and_then(Value::as_str) == Some("string") {
            emit_filesystems(exp, labels, statistic);
            continue;
        }

        let value = numeric(lookup(statistic, &["values", "value", "0", "datum"]));
        exp.sample(
            &family_name(scope, statistic),
            &help(statistic),
            kind(statistic),
            labels,
            &value,
        );
    }
}

/// Guest filesystem usage carried as a JSON document in `detail`
fn emit_filesystems(exp: &mut Exposition, labels: &LabelSet, statistic: &Value) {
    let detail = lookup(statistic, &["values", "value", "0", "detail"]).and_then(Value::as_str);
    let Some(detail) = detail else {
        return;
    };
    let Ok(Value::Array(mounts)) = serde_json::from_str::<Value>(detail) else {
        return;
    };

    let unit = text(statistic.get("unit"));
    for mount in &mounts {
        let mut mount_labels = labels.clone();
        mount_labels.push("path", text(mount.get("path")));
        mount_labels.push("fs", text(mount.get("fs")));

        let total = as_f64(mount.get("total"));
        let used = as_f64(mount.get("used"));
        let percentage = if total > 0.0 { used / total * 100.0 } else { 0.0 };

        exp.gauge(
            "fs_total",
            &format!("Guest filesystem total space ({unit})."),
            &mount_labels,
            &numeric(mount.get("total")),
        );
        exp.gauge(
            "fs_used",
            &format!("Guest filesystem used space ({unit})."),
            &mount_labels,
            &numeric(mount.get("used")),
        );
        exp.gauge(
            "fs_percentage",
            "Guest filesystem used space (percent).",
            &mount_labels,
            &format!("{percentage:.2}"),
        );
    }
}
