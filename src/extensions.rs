use crate::error::Error;

const PERMESSAGE_DEFLATE: &str = "permessage-deflate";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";

/// It's important to enhance that some compression extensions,
/// in some cases affects compression and
/// decompression(client_no_context_takeover, server_no_context_takeover),
/// while another one affects only compression(client_max_window_bits, server_max_window_bits).
/// Larger window sizes (closer to 15) result in better compression ratios but
/// are slower and use more memory. Smaller window sizes (closer to 8) offer
/// faster performance but with worse compression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    /// Dictates if compression is enabled
    pub permessage_deflate: bool,
    /// Client resets its compression context after every message it sends.
    pub client_no_context_takeover: Option<bool>,
    /// Server resets its compression context after every message it sends.
    pub server_no_context_takeover: Option<bool>,
    /// Window size the client uses to compress.
    pub client_max_window_bits: Option<u8>,
    /// Window size the server uses to compress.
    pub server_max_window_bits: Option<u8>,
}

/// Parses a single offered/accepted `Sec-WebSocket-Extensions` value.
/// Unknown parameters and out-of-range window-bit values are rejected
/// rather than silently ignored, per RFC 7692 §7.1.2.
pub fn parse_extensions(extensions_header_value: &str) -> Result<Option<Extensions>, Error> {
    let mut extensions = Extensions::default();
    let mut saw_permessage_deflate = false;

    for part in extensions_header_value.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part == PERMESSAGE_DEFLATE {
            saw_permessage_deflate = true;
            extensions.permessage_deflate = true;
            continue;
        }

        let (name, value) = match part.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
            None => (part, None),
        };

        match name {
            CLIENT_NO_CONTEXT_TAKEOVER => extensions.client_no_context_takeover = Some(true),
            SERVER_NO_CONTEXT_TAKEOVER => extensions.server_no_context_takeover = Some(true),
            CLIENT_MAX_WINDOW_BITS => {
                extensions.client_max_window_bits = Some(parse_window_bits(value)?);
            }
            SERVER_MAX_WINDOW_BITS => {
                extensions.server_max_window_bits = Some(parse_window_bits(value)?);
            }
            other => return Err(Error::ExtensionUnsupportedParameter(other.to_string())),
        }
    }

    if !saw_permessage_deflate {
        return Ok(None);
    }
    Ok(Some(extensions))
}

fn parse_window_bits(value: Option<&str>) -> Result<u8, Error> {
    let bits: u8 = match value {
        None => 15,
        Some(raw) => raw.parse().map_err(|_| Error::InvalidMaxWindowBits)?,
    };
    if !(8..=15).contains(&bits) {
        return Err(Error::InvalidMaxWindowBits);
    }
    Ok(bits)
}

/// Intersects a server's response extensions against what the client
/// actually offered, picking the more conservative (smaller) window where
/// both sides name one. Used to validate a server response; for a client
/// this is mostly a sanity check since the server is not supposed to widen
/// anything the client didn't offer.
pub fn merge_extensions(
    server_extensions: Option<Extensions>,
    client_extensions: Option<Extensions>,
) -> Option<Extensions> {
    let server_ext = server_extensions?;
    let client_ext = client_extensions?;
    Some(Extensions {
        permessage_deflate: client_ext.permessage_deflate && server_ext.permessage_deflate,
        client_no_context_takeover: server_ext
            .client_no_context_takeover
            .and(client_ext.client_no_context_takeover),
        server_no_context_takeover: server_ext
            .server_no_context_takeover
            .and(client_ext.server_no_context_takeover),
        client_max_window_bits: min_of(
            server_ext.client_max_window_bits,
            client_ext.client_max_window_bits,
        ),
        server_max_window_bits: min_of(
            server_ext.server_max_window_bits,
            client_ext.server_max_window_bits,
        ),
    })
}

fn min_of(a: Option<u8>, b: Option<u8>) -> Option<u8> {
    match (a, b) {
        (Some(a), Some(b)) => Some(std::cmp::min(a, b)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Appends a `Sec-WebSocket-Extensions` header line (without the trailing
/// CRLF, which the caller's request builder is responsible for) to `request`.
pub fn add_extension_headers(request: &mut String, extensions: Option<&Extensions>) {
    let Some(extensions) = extensions else {
        return;
    };
    if !extensions.permessage_deflate {
        return;
    }
    request.push_str(&format!("Sec-WebSocket-Extensions: {}", PERMESSAGE_DEFLATE));
    if let Some(true) = extensions.client_no_context_takeover {
        request.push_str(&format!("; {}", CLIENT_NO_CONTEXT_TAKEOVER));
    }
    if let Some(true) = extensions.server_no_context_takeover {
        request.push_str(&format!("; {}", SERVER_NO_CONTEXT_TAKEOVER));
    }
    if let Some(bits) = extensions.client_max_window_bits {
        request.push_str(&format!("; {}={}", CLIENT_MAX_WINDOW_BITS, bits));
    }
    if let Some(bits) = extensions.server_max_window_bits {
        request.push_str(&format!("; {}={}", SERVER_MAX_WINDOW_BITS, bits));
    }
    request.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_permessage_deflate() {
        let ext = parse_extensions("permessage-deflate").unwrap().unwrap();
        assert!(ext.permessage_deflate);
        assert_eq!(ext.client_max_window_bits, None);
    }

    #[test]
    fn parses_parameters() {
        let ext = parse_extensions(
            "permessage-deflate; client_no_context_takeover; server_max_window_bits=10",
        )
        .unwrap()
        .unwrap();
        assert_eq!(ext.client_no_context_takeover, Some(true));
        assert_eq!(ext.server_max_window_bits, Some(10));
    }

    #[test]
    fn rejects_unknown_parameter() {
        let err = parse_extensions("permessage-deflate; something_else").unwrap_err();
        assert!(matches!(err, Error::ExtensionUnsupportedParameter(_)));
    }

    #[test]
    fn rejects_out_of_range_window_bits() {
        let err = parse_extensions("permessage-deflate; client_max_window_bits=7").unwrap_err();
        assert!(matches!(err, Error::InvalidMaxWindowBits));
    }

    #[test]
    fn no_permessage_deflate_token_is_none() {
        assert_eq!(parse_extensions("some-other-extension").unwrap(), None);
    }

    #[test]
    fn merge_takes_minimum_window() {
        let mut server = Extensions {
            permessage_deflate: true,
            ..Default::default()
        };
        server.client_max_window_bits = Some(15);
        let mut client = Extensions {
            permessage_deflate: true,
            ..Default::default()
        };
        client.client_max_window_bits = Some(10);
        let merged = merge_extensions(Some(server), Some(client)).unwrap();
        assert_eq!(merged.client_max_window_bits, Some(10));
    }
}
