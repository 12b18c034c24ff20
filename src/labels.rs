//! Label constants and helpers shared by every engine object a workload owns.
//!
//! Label values are bit-exact per the external-interfaces contract: any
//! change here changes what `list(label_filter)` and `is_workload_container`
//! can see, so the literal strings are not an implementation detail.

use std::collections::HashMap;

/// Label marking any container or network owned by this runtime.
pub const TOOLHIVE_LABEL: &str = "toolhive";
pub const TOOLHIVE_VALUE: &str = "true";

/// Label carrying the workload name, present on every owned object.
pub const NAME_LABEL: &str = "toolhive-name";

/// Label marking the `main` container specifically (not egress/dns).
pub const MAIN_WORKLOAD_LABEL: &str = "toolhive-main-workload";

/// Transport mode label, main container only.
pub const TRANSPORT_LABEL: &str = "toolhive-transport";

/// Host port label, main container only.
pub const PORT_LABEL: &str = "toolhive-port";

/// Label carrying the owning network's logical name, networks only.
pub const NETWORK_NAME_LABEL: &str = "toolhive-network-name";

/// Apply the labels common to every container belonging to `workload_name`.
pub fn add_workload_labels(labels: &mut HashMap<String, String>, workload_name: &str) {
    labels.insert(TOOLHIVE_LABEL.to_string(), TOOLHIVE_VALUE.to_string());
    labels.insert(NAME_LABEL.to_string(), workload_name.to_string());
}

/// Apply the additional labels that mark the `main` container, on top of
/// [`add_workload_labels`].
pub fn add_main_labels(
    labels: &mut HashMap<String, String>,
    workload_name: &str,
    transport: &str,
    host_port: u16,
) {
    add_workload_labels(labels, workload_name);
    labels.insert(MAIN_WORKLOAD_LABEL.to_string(), "true".to_string());
    labels.insert(TRANSPORT_LABEL.to_string(), transport.to_string());
    labels.insert(PORT_LABEL.to_string(), host_port.to_string());
}

/// Apply the labels for a network owned by `workload_name`.
pub fn add_network_labels(
    labels: &mut HashMap<String, String>,
    workload_name: &str,
    network_name: &str,
) {
    labels.insert(TOOLHIVE_LABEL.to_string(), TOOLHIVE_VALUE.to_string());
    labels.insert(NAME_LABEL.to_string(), workload_name.to_string());
    labels.insert(NETWORK_NAME_LABEL.to_string(), network_name.to_string());
}

pub fn get_transport(labels: &HashMap<String, String>) -> &str {
    labels.get(TRANSPORT_LABEL).map_or("unknown", |s| s.as_str())
}

pub fn get_port(labels: &HashMap<String, String>) -> u16 {
    labels
        .get(PORT_LABEL)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0)
}

pub fn get_workload_name(labels: &HashMap<String, String>) -> Option<&str> {
    labels.get(NAME_LABEL).map(|s| s.as_str())
}

pub fn is_workload_container(labels: &HashMap<String, String>) -> bool {
    labels
        .get(TOOLHIVE_LABEL)
        .map_or(false, |value| value == TOOLHIVE_VALUE)
}

pub fn is_main_container(labels: &HashMap<String, String>) -> bool {
    labels
        .get(MAIN_WORKLOAD_LABEL)
        .map_or(false, |value| value == "true")
}

pub fn format_label_filter(key: &str, value: &str) -> String {
    format!("{}={}", key, value)
}

/// The filter passed to `list()` to select every object this runtime owns.
pub fn format_toolhive_filter() -> String {
    format_label_filter(TOOLHIVE_LABEL, TOOLHIVE_VALUE)
}

/// The filter passed to `list()` to select only objects belonging to one
/// workload (any of its three containers).
pub fn format_workload_filter(workload_name: &str) -> String {
    format_label_filter(NAME_LABEL, workload_name)
}
