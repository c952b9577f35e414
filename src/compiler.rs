//! Blocklist compiler: renders the IP blacklist as an nftables ruleset.
//!
//! The output is a pure function of the ordered input. Given the same
//! sequence of addresses it is byte-identical, so the ruleset file only
//! changes when the blacklist does.

use tracing::warn;

pub const TABLE_NAME: &str = "intelsync";
pub const SET_NAME: &str = "blacklist";
pub const CHAIN_NAME: &str = "output";

/// Only digits, dots and slashes can appear in an IPv4 address or CIDR.
fn is_safe_nft_element(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '/')
}

/// Compile the blacklist into an nftables ruleset.
///
/// ```
/// let ruleset = intelsync::compiler::compile(&["1.2.3.4".to_string()]);
/// assert!(ruleset.contains("\t\t\t1.2.3.4\n\t\t}\n"));
/// ```
pub fn compile(ips: &[String]) -> String {
    let elements: Vec<&str> = ips
        .iter()
        .map(String::as_str)
        .filter(|s| {
            let safe = is_safe_nft_element(s);
            if !safe {
                warn!("Filtered unsafe nftables element: {}", s);
            }
            safe
        })
        .collect();

    let mut script = String::with_capacity(256 + elements.len() * 24);

    script.push_str(&format!("table ip {} {{\n", TABLE_NAME));
    script.push_str(&format!("\tset {} {{\n", SET_NAME));
    script.push_str("\t\ttype ipv4_addr\n");
    script.push_str("\t\tflags interval\n");

    if elements.is_empty() {
        script.push_str("\t\telements = { }\n");
    } else {
        script.push_str("\t\telements = {\n");
        for (i, element) in elements.iter().enumerate() {
            script.push_str("\t\t\t");
            script.push_str(element);
            if i + 1 < elements.len() {
                script.push(',');
            }
            script.push('\n');
        }
        script.push_str("\t\t}\n");
    }

    script.push_str("\t}\n\n");

    script.push_str(&format!("\tchain {} {{\n", CHAIN_NAME));
    script.push_str("\t\ttype filter hook output priority 0; policy accept;\n");
    script.push_str(&format!("\t\tip daddr @{} drop\n", SET_NAME));
    script.push_str("\t}\n");
    script.push_str("}\n");

    script
}
