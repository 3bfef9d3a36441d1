//! Probe request synthesis

use bytes::Bytes;

use super::spec::ProbeSpec;

/// Build the fixed wire bytes sent on every probe
///
/// A raw `request` in the spec is used verbatim; otherwise a minimal
/// HTTP/1.1 GET with an optional Host header is synthesized.
pub(crate) fn build_request(spec: &ProbeSpec, host: Option<&str>) -> Bytes {
    if let Some(raw) = spec.request.as_deref() {
        if !raw.is_empty() {
            return Bytes::copy_from_slice(raw.as_bytes());
        }
    }

    let url = if spec.url.is_empty() { "/" } else { &spec.url };
    let mut req = format!("GET {} HTTP/1.1\r\n", url);
    if let Some(host) = host {
        req.push_str(&format!("Host: {}\r\n", host));
    }
    req.push_str("Connection: close\r\n\r\n");
    Bytes::from(req)
}
