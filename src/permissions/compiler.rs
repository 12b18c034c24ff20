//! Output B of the Permission Compiler (§4.2): the forward-proxy ACL
//! document for the egress container. Structurally grounded on a Squid
//! forward-proxy pattern seen in the retrieval pack (bridge network +
//! bind-mounted config file); the ACL algorithm itself follows §4.2 and
//! the worked example in §8 scenario 5 exactly.

use std::io::Write;

use tempfile::NamedTempFile;

use crate::error::Result;
use crate::permissions::profile::OutboundNetworkPermissions;

pub const EGRESS_PROXY_PORT: u16 = 3128;
pub const EGRESS_CONFIG_MOUNT_PATH: &str = "/etc/squid/squid.conf";

/// `TCP` is the one method name the spec calls out as expanding to a
/// concrete method list; anything else in `allow_transport` is passed
/// through as a literal Squid `http_access` method token is not how Squid
/// ACLs work for methods, so non-TCP entries are instead treated as
/// additional `dstdomain`-style method names under the `allowed_methods`
/// acl via `method`.
fn expand_transport(transport: &str) -> Vec<&'static str> {
    match transport.to_ascii_uppercase().as_str() {
        "TCP" => vec!["CONNECT", "GET", "POST", "HEAD"],
        _ => vec![],
    }
}

/// Build the Squid configuration text for one workload's egress container.
///
/// `main_hostname` is the main container's resolvable name (used for the
/// reverse-proxy accelerator blocks); `ingress_ports` are the ports the
/// workload exposes that should be reverse-proxied through the egress
/// container's public entry point.
pub fn generate_acl_document(
    outbound: Option<&OutboundNetworkPermissions>,
    main_hostname: &str,
    ingress_ports: &[u16],
) -> String {
    let mut doc = String::new();
    doc.push_str(&format!("http_port {}\n", EGRESS_PROXY_PORT));
    doc.push_str("acl localnet src 0.0.0.0/0\n");

    let allow_all = outbound.map(|o| o.insecure_allow_all).unwrap_or(true);

    if allow_all {
        doc.push_str("http_access allow all\n");
    } else {
        let outbound = outbound.expect("allow_all is false only when outbound is Some");
        let mut gate_acls = Vec::new();

        let ports = outbound.effective_allow_port();
        if !ports.is_empty() {
            let port_list = ports.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" ");
            doc.push_str(&format!("acl allowed_ports port {}\n", port_list));
            gate_acls.push("allowed_ports");
        }

        let hosts = outbound.effective_allow_host();
        if !hosts.is_empty() {
            let host_list = hosts.join(" ");
            doc.push_str(&format!("acl allowed_dsts dstdomain {}\n", host_list));
            gate_acls.push("allowed_dsts");
        }

        let transports = outbound.effective_allow_transport();
        if !transports.is_empty() {
            let methods: Vec<&str> = transports.iter().flat_map(|t| expand_transport(t)).collect();
            if !methods.is_empty() {
                doc.push_str(&format!("acl allowed_methods method {}\n", methods.join(" ")));
                gate_acls.push("allowed_methods");
            }
        }

        if !gate_acls.is_empty() {
            doc.push_str(&format!("http_access allow {}\n", gate_acls.join(" ")));
        }
    }

    for port in ingress_ports {
        doc.push_str(&format!(
            "\n# reverse-proxy accelerator for ingress port {port}\n\
             http_port {port} accel defaultsite={host}\n\
             cache_peer {host} parent {port} 0 no-query originserver name=ingress_{port}\n\
             cache_peer_access ingress_{port} allow all\n",
            port = port,
            host = main_hostname,
        ));
    }

    doc.push_str("\nhttp_access deny all\n");
    doc.push_str("access_log /var/log/squid/access.log\n");
    doc.push_str("cache_log /var/log/squid/cache.log\n");
    doc.push_str("cache deny all\n");

    doc
}

/// Write the ACL document to a host-side temp file suitable for a
/// read-only bind mount at [`EGRESS_CONFIG_MOUNT_PATH`]. The returned
/// `NamedTempFile` must be kept alive for the lifetime of the egress
/// container; dropping it removes the backing file.
pub fn write_acl_document(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::profile::OutboundNetworkPermissions;

    #[test]
    fn insecure_allow_all_emits_allow_all() {
        let outbound = OutboundNetworkPermissions {
            insecure_allow_all: true,
            allow_transport: vec![],
            allow_host: vec![],
            allow_port: vec![],
        };
        let doc = generate_acl_document(Some(&outbound), "wl", &[]);
        assert!(doc.contains("http_access allow all"));
        assert!(doc.contains("http_access deny all"));
    }

    #[test]
    fn no_outbound_section_defaults_to_allow_all() {
        let doc = generate_acl_document(None, "wl", &[]);
        assert!(doc.contains("http_access allow all"));
    }

    #[test]
    fn host_only_profile_matches_scenario_5() {
        let outbound = OutboundNetworkPermissions {
            insecure_allow_all: false,
            allow_transport: vec![],
            allow_host: vec!["api.example.com".to_string()],
            allow_port: vec![443],
        };
        let doc = generate_acl_document(Some(&outbound), "wl", &[]);

        assert!(doc.contains("acl allowed_dsts dstdomain api.example.com"));
        assert!(doc.contains("acl allowed_ports port 443"));
        assert!(doc.contains("http_access allow allowed_ports allowed_dsts"));
        assert!(doc.trim_end().ends_with("cache deny all"));
        assert!(doc.contains("http_access deny all"));
    }

    #[test]
    fn p8_exactly_one_dstdomain_line_for_single_host() {
        let outbound = OutboundNetworkPermissions {
            insecure_allow_all: false,
            allow_transport: vec![],
            allow_host: vec!["H".to_string()],
            allow_port: vec![],
        };
        let doc = generate_acl_document(Some(&outbound), "wl", &[]);
        let count = doc.matches("acl allowed_dsts dstdomain H").count();
        assert_eq!(count, 1);
        assert!(doc.trim_end().ends_with("cache deny all") || doc.contains("http_access deny all"));
    }

    #[test]
    fn tcp_transport_expands_to_method_list() {
        let outbound = OutboundNetworkPermissions {
            insecure_allow_all: false,
            allow_transport: vec!["TCP".to_string()],
            allow_host: vec![],
            allow_port: vec![],
        };
        let doc = generate_acl_document(Some(&outbound), "wl", &[]);
        assert!(doc.contains("acl allowed_methods method CONNECT GET POST HEAD"));
    }

    #[test]
    fn empty_allow_lists_emit_no_gate_line() {
        let outbound = OutboundNetworkPermissions {
            insecure_allow_all: false,
            allow_transport: vec![],
            allow_host: vec![],
            allow_port: vec![],
        };
        let doc = generate_acl_document(Some(&outbound), "wl", &[]);
        assert!(!doc.contains("http_access allow allowed"));
        assert!(doc.contains("http_access deny all"));
    }

    #[test]
    fn ingress_ports_get_reverse_proxy_blocks() {
        let outbound = OutboundNetworkPermissions {
            insecure_allow_all: true,
            allow_transport: vec![],
            allow_host: vec![],
            allow_port: vec![],
        };
        let doc = generate_acl_document(Some(&outbound), "wl-main", &[8080]);
        assert!(doc.contains("defaultsite=wl-main"));
        assert!(doc.contains("http_port 8080 accel"));
    }

    #[test]
    fn document_always_terminates_with_deny_all() {
        let doc = generate_acl_document(None, "wl", &[]);
        let deny_pos = doc.find("http_access deny all").unwrap();
        let allow_pos = doc.find("http_access allow all").unwrap();
        assert!(deny_pos > allow_pos);
    }

    #[test]
    fn write_acl_document_round_trips_to_disk() {
        let doc = generate_acl_document(None, "wl", &[]);
        let file = write_acl_document(&doc).unwrap();
        let read_back = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(read_back, doc);
    }
}
