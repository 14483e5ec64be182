//! Per-resource-kind formatters
//!
//! Each formatter is a pure function turning one engine collection (the JSON
//! array under the collection's root key) into exposition fragments. A
//! fragment is one complete metric family: `# HELP`, `# TYPE` and every
//! sample of that family, so metadata lines appear once per collector output
//! no matter how many objects the engine returned.
//!
//! Conventions shared by all formatters:
//! - metric names are namespaced per resource kind (`zvirt_vm_*`, ...)
//! - missing label sources render as `unknown`, missing values as `0`
//! - enumerations render as the index of the value in the documented option
//!   list; the list length means "unknown"

pub mod cluster;
pub mod datacenter;
pub mod host;
pub mod storage_domain;
pub mod vm;

mod statistics;

use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Label value used when the engine did not report a field
pub const UNKNOWN: &str = "unknown";

/// Path of nested keys inside an engine object; numeric segments index arrays
pub type Path = &'static [&'static str];

/// Follow `path` through nested objects and arrays
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Elements of the array found at `path`, or nothing
pub fn items<'a>(value: &'a Value, path: &[&str]) -> impl Iterator<Item = &'a Value> {
    lookup(value, path)
        .and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

/// Render a JSON scalar as a label value
pub fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Render a JSON scalar as a sample value; non-numeric input becomes `0`.
///
/// The engine serializes most numbers as strings, which are kept verbatim
/// when they parse so large byte counts keep full precision.
pub fn numeric(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if s.trim().parse::<f64>().is_ok() => s.trim().to_string(),
        Some(Value::Bool(b)) => u8::from(*b).to_string(),
        _ => "0".to_string(),
    }
}

fn as_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn is_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

fn str_value(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

/// How a gauge value is derived from an engine object
#[derive(Debug, Clone, Copy)]
pub enum Field {
    /// Numeric value, `0` when missing
    Number(Path),
    /// `1` when the value is `true`
    Flag(Path),
    /// `1` when the value equals the given string
    Is(Path, &'static str),
    /// Index of the value within the options, `options.len()` when unknown
    Choice(Path, &'static [&'static str]),
    /// `1` when the list (or object) at the path contains the given entry
    Contains(Path, &'static str),
}

impl Field {
    pub fn render(&self, object: &Value) -> String {
        match self {
            Field::Number(path) => numeric(lookup(object, path)),
            Field::Flag(path) => u8::from(is_true(lookup(object, path))).to_string(),
            Field::Is(path, expected) => {
                u8::from(str_value(lookup(object, path)) == Some(*expected)).to_string()
            }
            Field::Choice(path, options) => {
                let value = str_value(lookup(object, path));
                options
                    .iter()
                    .position(|option| Some(*option) == value)
                    .unwrap_or(options.len())
                    .to_string()
            }
            Field::Contains(path, needle) => {
                u8::from(contains(lookup(object, path), needle)).to_string()
            }
        }
    }
}

fn contains(value: Option<&Value>, needle: &str) -> bool {
    match value {
        Some(Value::Array(items)) => items.iter().any(|item| match item {
            Value::String(s) => s == needle,
            Value::Object(_) => str_value(item.get("type")) == Some(needle),
            _ => false,
        }),
        Some(Value::Object(map)) => map.contains_key(needle),
        Some(Value::String(s)) => s == needle,
        _ => false,
    }
}

/// Static description of one gauge family
#[derive(Debug, Clone, Copy)]
pub struct Gauge {
    pub name: &'static str,
    pub help: &'static str,
    pub field: Field,
}

impl Gauge {
    pub const fn number(name: &'static str, path: Path, help: &'static str) -> Self {
        Self {
            name,
            help,
            field: Field::Number(path),
        }
    }

    pub const fn flag(name: &'static str, path: Path, help: &'static str) -> Self {
        Self {
            name,
            help,
            field: Field::Flag(path),
        }
    }

    pub const fn is(
        name: &'static str,
        path: Path,
        expected: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            help,
            field: Field::Is(path, expected),
        }
    }

    pub const fn choice(
        name: &'static str,
        path: Path,
        options: &'static [&'static str],
        help: &'static str,
    ) -> Self {
        Self {
            name,
            help,
            field: Field::Choice(path, options),
        }
    }

    pub const fn contains(
        name: &'static str,
        path: Path,
        needle: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            name,
            help,
            field: Field::Contains(path, needle),
        }
    }
}

/// Label name and the path its value is read from
pub type LabelSpec = (&'static str, Path);

/// Ordered label set attached to samples
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<(String, String)>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend_from(&mut self, object: &Value, specs: &[LabelSpec]) {
        for (name, path) in specs {
            self.push(name, text(lookup(object, path)));
        }
    }

    /// Add a label; a name already present keeps its first value
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        let name = sanitize_name(name);
        if !self.contains(&name) {
            self.labels.push((name, value.into()));
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.labels.iter().any(|(n, _)| n == name)
    }

    /// Copy of this set extended with labels read from a nested object
    pub fn child(&self, object: &Value, specs: &[LabelSpec]) -> Self {
        let mut labels = self.clone();
        labels.extend_from(object, specs);
        labels
    }

    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn render(&self, out: &mut String) {
        if self.labels.is_empty() {
            return;
        }
        out.push('{');
        for (i, (name, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(name);
            out.push_str("=\"");
            escape_label_value(value, out);
            out.push('"');
        }
        out.push('}');
    }
}

fn escape_label_value(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Replace characters not allowed in metric or label names with `_`
pub fn sanitize_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// `HighUtilization` -> `high_utilization`
pub fn snake_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Metric type of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

#[derive(Debug)]
struct Family {
    name: String,
    help: String,
    kind: MetricKind,
    samples: String,
}

/// Builder grouping samples into families in first-seen order
#[derive(Debug)]
pub struct Exposition {
    prefix: String,
    families: Vec<Family>,
    index: HashMap<String, usize>,
}

impl Exposition {
    /// All family names get `prefix` followed by `_`
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: sanitize_name(prefix),
            families: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add one sample; the first sample of a family fixes its help and type
    pub fn sample(
        &mut self,
        name: &str,
        help: &str,
        kind: MetricKind,
        labels: &LabelSet,
        value: &str,
    ) {
        let full_name = format!("{}_{}", self.prefix, sanitize_name(name));

        let idx = match self.index.get(&full_name) {
            Some(&idx) => idx,
            None => {
                self.families.push(Family {
                    name: full_name.clone(),
                    help: escape_help(help),
                    kind,
                    samples: String::new(),
                });
                self.index.insert(full_name, self.families.len() - 1);
                self.families.len() - 1
            }
        };

        let family = &mut self.families[idx];
        family.samples.push_str(&family.name);
        labels.render(&mut family.samples);
        family.samples.push(' ');
        family.samples.push_str(value);
        family.samples.push('\n');
    }

    pub fn gauge(&mut self, name: &str, help: &str, labels: &LabelSet, value: &str) {
        self.sample(name, help, MetricKind::Gauge, labels, value);
    }

    /// Emit every gauge of `table` for one engine object
    pub fn gauges(&mut self, scope: &str, table: &[Gauge], labels: &LabelSet, object: &Value) {
        for gauge in table {
            let name = if scope.is_empty() {
                gauge.name.to_string()
            } else {
                format!("{scope}_{}", gauge.name)
            };
            self.gauge(&name, gauge.help, labels, &gauge.field.render(object));
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// One fragment per family, in first-seen order
    pub fn into_fragments(self) -> Vec<String> {
        self.families
            .into_iter()
            .map(|family| {
                let mut out = String::with_capacity(family.samples.len() + 96);
                let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
                let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str());
                out.push_str(&family.samples);
                out
            })
            .collect()
    }
}

/// First sample line of family `name`
#[cfg(test)]
pub(crate) fn sample_line<'a>(text: &'a str, name: &str) -> &'a str {
    let prefix = format!("{name}{{");
    text.lines()
        .find(|l| l.starts_with(&prefix))
        .unwrap_or_else(|| panic!("no sample for {name}"))
}
