//! TLS ClientHello inspection
//!
//! Recognises the TLS record header and, when SNI hostnames or ALPN protocols
//! are configured for a protocol entry, walks the ClientHello to compare the
//! offered server name and application protocols against them.

use log::{debug, trace};

/// TLS handshake record content type
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;

/// Handshake message type of a ClientHello
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;

/// Record header: type (1), version (2), length (2)
const RECORD_HEADER_LEN: usize = 5;

/// 2^14 plaintext plus the expansion allowed for compressed records
const MAX_RECORD_LEN: usize = 16384 + 2048;

const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_ALPN: u16 = 0x0010;

/// Host name entry inside the server_name extension
const SNI_HOST_NAME: u8 = 0x00;

/// Three-way outcome of looking at a TLS prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsParse {
    /// A ClientHello satisfying the configured criteria
    Match,
    /// Not TLS, malformed, or offering a different SNI/ALPN
    NoMatch,
    /// The record is not complete yet
    NeedMoreData,
}

/// What a ClientHello offered
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientHelloInfo {
    /// Host name from the server_name extension
    pub server_name: Option<String>,
    /// Protocols from the ALPN extension, in client preference order
    pub alpn_protocols: Vec<Vec<u8>>,
}

/// SNI and ALPN constraints for one TLS protocol entry
#[derive(Debug, Clone, Default)]
pub struct TlsCriteria {
    sni_hostnames: Vec<String>,
    alpn_protocols: Vec<String>,
}

/// Bounds-checked big-endian reader over a byte slice
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Option<usize> {
        self.bytes(3)
            .map(|b| ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize)
    }

    /// A sub-reader over a vector prefixed by an 8-bit length
    fn vec8(&mut self) -> Option<Reader<'a>> {
        let len = self.u8()? as usize;
        self.bytes(len).map(Reader::new)
    }

    /// A sub-reader over a vector prefixed by a 16-bit length
    fn vec16(&mut self) -> Option<Reader<'a>> {
        let len = self.u16()? as usize;
        self.bytes(len).map(Reader::new)
    }
}

/// Extract SNI and ALPN from a complete ClientHello handshake message
///
/// `handshake` starts at the handshake type byte (just after the record
/// header). Returns `None` if the message is not a ClientHello or if any
/// length field points past the available bytes.
pub fn parse_client_hello(handshake: &[u8]) -> Option<ClientHelloInfo> {
    let mut r = Reader::new(handshake);

    if r.u8()? != HANDSHAKE_CLIENT_HELLO {
        return None;
    }
    let body_len = r.u24()?;
    // Tolerate a message longer than this record by using what we have
    let available = handshake.len() - r.pos;
    let mut body = Reader::new(r.bytes(body_len.min(available))?);

    // client_version + random
    body.bytes(2 + 32)?;
    body.vec8()?; // session_id
    body.vec16()?; // cipher_suites
    body.vec8()?; // compression_methods

    let mut info = ClientHelloInfo::default();

    // SSL 3.0 and early TLS 1.0 clients may omit extensions altogether
    if body.is_empty() {
        return Some(info);
    }

    let mut extensions = body.vec16()?;
    while !extensions.is_empty() {
        let ext_type = extensions.u16()?;
        let mut ext = extensions.vec16()?;

        match ext_type {
            EXT_SERVER_NAME => {
                let mut names = ext.vec16()?;
                while !names.is_empty() {
                    let name_type = names.u8()?;
                    let name = names.vec16()?;
                    if name_type == SNI_HOST_NAME && info.server_name.is_none() {
                        info.server_name = std::str::from_utf8(name.buf)
                            .ok()
                            .map(|s| s.to_ascii_lowercase());
                    }
                }
            }
            EXT_ALPN => {
                let mut protocols = ext.vec16()?;
                while !protocols.is_empty() {
                    let proto = protocols.vec8()?;
                    info.alpn_protocols.push(proto.buf.to_vec());
                }
            }
            _ => {}
        }
    }

    Some(info)
}

/// Does `hostname` satisfy `pattern`? `*.example.org` accepts any subdomain.
fn sni_matches(pattern: &str, hostname: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) if suffix.starts_with('.') => {
            hostname.len() > suffix.len() && hostname.ends_with(suffix)
        }
        _ => pattern == hostname,
    }
}

impl TlsCriteria {
    /// Create criteria; empty lists mean "accept anything"
    pub fn new(sni_hostnames: Vec<String>, alpn_protocols: Vec<String>) -> Self {
        Self {
            sni_hostnames: sni_hostnames.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
            alpn_protocols,
        }
    }

    /// True when neither SNI nor ALPN is constrained
    pub fn is_empty(&self) -> bool {
        self.sni_hostnames.is_empty() && self.alpn_protocols.is_empty()
    }

    /// Check a ClientHello's offer against the configured lists
    pub fn accepts(&self, hello: &ClientHelloInfo) -> bool {
        let sni_ok = self.sni_hostnames.is_empty()
            || hello.server_name.as_deref().map_or(false, |name| {
                self.sni_hostnames.iter().any(|pattern| sni_matches(pattern, name))
            });

        let alpn_ok = self.alpn_protocols.is_empty()
            || hello.alpn_protocols.iter().any(|offered| {
                self.alpn_protocols.iter().any(|wanted| wanted.as_bytes() == offered.as_slice())
            });

        sni_ok && alpn_ok
    }

    /// Inspect a connection prefix
    pub fn parse(&self, data: &[u8]) -> TlsParse {
        let Some(header) = data.get(..RECORD_HEADER_LEN) else {
            return TlsParse::NeedMoreData;
        };

        if header[0] != CONTENT_TYPE_HANDSHAKE {
            trace!("Not a TLS handshake record: first byte is {:#04x}", header[0]);
            return TlsParse::NoMatch;
        }

        // SSLv3 and every TLS version use major 3
        if header[1] < 3 {
            trace!("Unsupported record version {}.{}", header[1], header[2]);
            return TlsParse::NoMatch;
        }

        let record_len = u16::from_be_bytes([header[3], header[4]]) as usize;
        if record_len == 0 || record_len > MAX_RECORD_LEN {
            trace!("Invalid TLS record length: {}", record_len);
            return TlsParse::NoMatch;
        }

        if self.is_empty() {
            return TlsParse::Match;
        }

        let Some(record) = data.get(RECORD_HEADER_LEN..RECORD_HEADER_LEN + record_len) else {
            return TlsParse::NeedMoreData;
        };

        match parse_client_hello(record) {
            Some(hello) => {
                let accepted = self.accepts(&hello);
                debug!(
                    "ClientHello sni={:?} alpn={:?}: {}",
                    hello.server_name,
                    hello
                        .alpn_protocols
                        .iter()
                        .map(|p| String::from_utf8_lossy(p).into_owned())
                        .collect::<Vec<_>>(),
                    if accepted { "accepted" } else { "rejected" }
                );
                if accepted { TlsParse::Match } else { TlsParse::NoMatch }
            }
            None => {
                debug!("Malformed ClientHello in {} byte record", record_len);
                TlsParse::NoMatch
            }
        }
    }
}
