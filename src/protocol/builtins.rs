//! Built-in protocol probes
//!
//! Each probe inspects only `data[..data.len()]` and answers `NeedMoreData`
//! whenever the bytes it needs for a decision have not arrived yet.

use super::detector::Verdict;

/// Methods from RFC 2616 section 5.1.1, tried in this order
const HTTP_METHODS: &[&[u8]] = &[
    b"OPTIONS", b"GET", b"HEAD", b"POST", b"PUT", b"DELETE", b"TRACE", b"CONNECT",
];

/// ADB message header (24 bytes) plus the 5 byte `host:` tag and one payload byte
const ADB_MIN_PACKET: usize = 30;

/// Empty message some ADB 26.0.0 rc builds send ahead of CNXN
const ADB_EMPTY_MESSAGE: [u8; 24] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff,
];

/// Highest method count a SOCKS5 greeting may announce
const SOCKS5_MAX_METHODS: u8 = 10;

/// Highest IANA-assigned SOCKS5 authentication method we accept
const SOCKS5_MAX_METHOD_ID: u8 = 9;

/// XMPP clients may put the `jabber` token late in a wordy preamble
const XMPP_MIN_PREAMBLE: usize = 50;

#[inline]
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// `SSH-` banner
pub fn is_ssh(data: &[u8]) -> Verdict {
    if data.len() < 4 {
        return Verdict::NeedMoreData;
    }
    data.starts_with(b"SSH-").into()
}

/// OpenVPN over TCP: a big-endian length field covering the rest of the packet
///
/// Opcode and key id are deliberately left alone: clients using pre-shared
/// secrets leave the key id uninitialised and key method 1 changes the opcode.
pub fn is_openvpn(data: &[u8]) -> Verdict {
    let Some(len_field) = data.get(..2) else {
        return Verdict::NeedMoreData;
    };
    let packet_len = u16::from_be_bytes([len_field[0], len_field[1]]) as usize;
    (packet_len == data.len() - 2).into()
}

/// tinc 1.0 opens with `"0 "`
pub fn is_tinc(data: &[u8]) -> Verdict {
    if data.len() < 2 {
        return Verdict::NeedMoreData;
    }
    data.starts_with(b"0 ").into()
}

/// XMPP: look for `jabber` anywhere in the stream header
pub fn is_xmpp(data: &[u8]) -> Verdict {
    if contains(data, b"jabber") {
        return Verdict::Match;
    }
    if data.len() < XMPP_MIN_PREAMBLE {
        return Verdict::NeedMoreData;
    }
    Verdict::NotThisOne
}

fn probe_http_method(data: &[u8], method: &[u8]) -> Verdict {
    if data.len() < method.len() {
        return Verdict::NeedMoreData;
    }
    data.starts_with(method).into()
}

/// HTTP: a version token anywhere, or a request line starting with a known method
pub fn is_http(data: &[u8]) -> Verdict {
    if contains(data, b"HTTP") {
        return Verdict::Match;
    }

    // HTTP/1.0 simple requests carry no version, fall back on the method
    for method in HTTP_METHODS {
        match probe_http_method(data, method) {
            Verdict::NotThisOne => continue,
            other => return other,
        }
    }
    Verdict::NotThisOne
}

/// Initial host-to-device packet: command `CNXN` and a payload starting `host:`
fn probe_adb_cnxn_message(data: &[u8]) -> bool {
    data.get(0..4) == Some(b"CNXN".as_slice()) && data.get(24..29) == Some(b"host:".as_slice())
}

/// Android Debug Bridge
///
/// The payload length field is not checked: a packet of at least 30 bytes is
/// assumed to carry something after `host:`.
pub fn is_adb(data: &[u8]) -> Verdict {
    if data.len() < ADB_MIN_PACKET {
        return Verdict::NeedMoreData;
    }

    if probe_adb_cnxn_message(data) {
        return Verdict::Match;
    }

    // Room for an empty message plus a CNXN is needed before rejecting
    if data.len() < ADB_MIN_PACKET + ADB_EMPTY_MESSAGE.len() {
        return Verdict::NeedMoreData;
    }

    if data[..ADB_EMPTY_MESSAGE.len()] != ADB_EMPTY_MESSAGE {
        return Verdict::NotThisOne;
    }

    probe_adb_cnxn_message(&data[ADB_EMPTY_MESSAGE.len()..]).into()
}

/// SOCKS5 greeting: version, method count, method ids
pub fn is_socks5(data: &[u8]) -> Verdict {
    let (version, method_count) = match data {
        [version, count, ..] => (*version, *count),
        _ => return Verdict::NeedMoreData,
    };

    if version != 5 {
        return Verdict::NotThisOne;
    }

    if !(1..=SOCKS5_MAX_METHODS).contains(&method_count) {
        return Verdict::NotThisOne;
    }

    let Some(methods) = data.get(2..2 + method_count as usize) else {
        return Verdict::NeedMoreData;
    };

    methods.iter().all(|&method| method <= SOCKS5_MAX_METHOD_ID).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh() {
        assert_eq!(is_ssh(b"SSH-2.0-OpenSSH_8.4"), Verdict::Match);
        assert_eq!(is_ssh(b"SSH"), Verdict::NeedMoreData);
        assert_eq!(is_ssh(b""), Verdict::NeedMoreData);
        assert_eq!(is_ssh(b"SSL-"), Verdict::NotThisOne);
    }

    #[test]
    fn test_openvpn() {
        let packet = [0x00, 0x05, 0x38, 0x01, 0x02, 0x03, 0x04];
        assert_eq!(is_openvpn(&packet), Verdict::Match);
        // Declared 5, only 3 follow
        assert_eq!(is_openvpn(&packet[..5]), Verdict::NotThisOne);
        assert_eq!(is_openvpn(&packet[..1]), Verdict::NeedMoreData);
        assert_eq!(is_openvpn(&[]), Verdict::NeedMoreData);
        // Zero length field with nothing after it
        assert_eq!(is_openvpn(&[0x00, 0x00]), Verdict::Match);
    }

    #[test]
    fn test_tinc() {
        assert_eq!(is_tinc(b"0 home 17"), Verdict::Match);
        assert_eq!(is_tinc(b"0"), Verdict::NeedMoreData);
        assert_eq!(is_tinc(b"1 home"), Verdict::NotThisOne);
    }

    #[test]
    fn test_xmpp() {
        let stream = b"<?xml version='1.0'?><stream:stream xmlns='jabber:client'";
        assert_eq!(is_xmpp(stream), Verdict::Match);
        assert_eq!(is_xmpp(b"<?xml version='1.0'?>"), Verdict::NeedMoreData);
        assert_eq!(is_xmpp(&[b'x'; 49]), Verdict::NeedMoreData);
        assert_eq!(is_xmpp(&[b'x'; 50]), Verdict::NotThisOne);
    }

    #[test]
    fn test_http_version_token() {
        assert_eq!(is_http(b"GET / HTTP/1.1\r\n"), Verdict::Match);
        assert_eq!(is_http(b"BREW /pot HTTP/1.1"), Verdict::Match);
    }

    #[test]
    fn test_http_methods() {
        assert_eq!(is_http(b"GE"), Verdict::NeedMoreData);
        assert_eq!(is_http(b"OPTIONS *"), Verdict::Match);
        assert_eq!(is_http(b"GET /index"), Verdict::Match);
        assert_eq!(is_http(b"CONNECT host:443"), Verdict::Match);
        // Shorter than OPTIONS: cannot rule anything out yet
        assert_eq!(is_http(b"XYZ"), Verdict::NeedMoreData);
        assert_eq!(is_http(b"SSH-2.0-OpenSSH"), Verdict::NotThisOne);
    }

    fn adb_cnxn() -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(b"CNXN");
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        packet.extend_from_slice(&[0x00, 0x10, 0x00, 0x00]);
        packet.extend_from_slice(&[0x07, 0x00, 0x00, 0x00]);
        packet.extend_from_slice(&[0x32, 0x02, 0x00, 0x00]);
        packet.extend_from_slice(&[0xbc, 0xb1, 0xa7, 0xb1]);
        packet.extend_from_slice(b"host::\0");
        packet
    }

    #[test]
    fn test_adb() {
        let packet = adb_cnxn();
        assert_eq!(packet.len(), 31);
        assert_eq!(is_adb(&packet), Verdict::Match);
        assert_eq!(is_adb(&packet[..29]), Verdict::NeedMoreData);

        let mut other = packet.clone();
        other[0] = b'X';
        assert_eq!(is_adb(&other), Verdict::NeedMoreData);
        other.resize(54, 0x41);
        assert_eq!(is_adb(&other), Verdict::NotThisOne);
    }

    #[test]
    fn test_adb_waits_for_a_second_packet() {
        assert_eq!(is_adb(&[0x41; 40]), Verdict::NeedMoreData);
        assert_eq!(is_adb(&[0x41; 53]), Verdict::NeedMoreData);
        assert_eq!(is_adb(&[0x41; 54]), Verdict::NotThisOne);
    }

    #[test]
    fn test_adb_empty_message_quirk() {
        let mut data = ADB_EMPTY_MESSAGE.to_vec();
        data.extend_from_slice(&adb_cnxn());

        assert_eq!(is_adb(&data[..40]), Verdict::NeedMoreData);
        assert_eq!(is_adb(&data), Verdict::Match);

        let mut garbage = ADB_EMPTY_MESSAGE.to_vec();
        garbage.extend_from_slice(&[0x41; 31]);
        assert_eq!(is_adb(&garbage), Verdict::NotThisOne);
    }

    #[test]
    fn test_socks5() {
        assert_eq!(is_socks5(&[0x05, 0x02, 0x00, 0x01]), Verdict::Match);
        assert_eq!(is_socks5(&[0x05, 0x00]), Verdict::NotThisOne);
        assert_eq!(is_socks5(&[0x05, 0x0b]), Verdict::NotThisOne);
        assert_eq!(is_socks5(&[0x04, 0x01, 0x00]), Verdict::NotThisOne);
        assert_eq!(is_socks5(&[0x05, 0x02, 0x00]), Verdict::NeedMoreData);
        assert_eq!(is_socks5(&[0x05]), Verdict::NeedMoreData);
        assert_eq!(is_socks5(&[0x05, 0x01, 0x0a]), Verdict::NotThisOne);
        assert_eq!(is_socks5(&[0x05, 0x01, 0x09, 0xff]), Verdict::Match);
    }
}
