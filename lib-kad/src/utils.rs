//! Bit-prefix helpers used by the routing table's depth rule.

/// Expand bytes to a '0'/'1' string, most significant bit first.
pub fn bytes_to_bitstring(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            out.push(if byte >> shift & 1 == 1 { '1' } else { '0' });
        }
    }
    out
}

/// Longest common leading substring of the inputs.
///
/// An empty input list shares everything with nothing: returns "".
pub fn shared_prefix(strings: &[String]) -> String {
    let Some(first) = strings.first() else {
        return String::new();
    };
    let mut prefix_len = first.len();
    for other in &strings[1..] {
        let common = first
            .bytes()
            .zip(other.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        prefix_len = prefix_len.min(common);
    }
    first[..prefix_len].to_string()
}
