//! Network address classification for outbound webhook requests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns `true` when the address is routable on the public internet.
///
/// Anything private, loopback, link-local, shared (CGNAT), reserved,
/// multicast or reserved for documentation is treated as non-public.
/// IPv6 forms that carry an IPv4 address (mapped, compatible, 6to4) are
/// judged by the embedded address. Teredo is never public.
pub fn is_public_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_ipv4(v4),
        IpAddr::V6(v6) => is_public_ipv6(v6),
    }
}

fn is_public_ipv4(ip: &Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();

    let non_public = ip.is_private()          // 10/8, 172.16/12, 192.168/16
        || ip.is_loopback()                   // 127/8
        || ip.is_link_local()                 // 169.254/16, cloud metadata
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_documentation()              // 192.0.2/24, 198.51.100/24, 203.0.113/24
        || a == 0                             // 0/8
        || (a == 100 && (b & 0xC0) == 64)     // 100.64/10 shared address space
        || (a == 192 && b == 0 && c == 0)     // 192.0.0/24 protocol assignments
        || (a == 198 && (b & 0xFE) == 18)     // 198.18/15 benchmarking
        || a >= 240; // 240/4 reserved

    !non_public
}

fn is_public_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_ipv4(&mapped);
    }

    let segments = ip.segments();
    if ip.is_loopback() || ip.is_unspecified() {
        return false;
    }

    // ::a.b.c.d, deprecated IPv4-compatible form
    if segments[..6].iter().all(|s| *s == 0) {
        return is_public_ipv4(&embedded_ipv4(segments[6], segments[7]));
    }

    // 2002:aabb:ccdd::/48, 6to4 relay for a.b.c.d
    if segments[0] == 0x2002 {
        return is_public_ipv4(&embedded_ipv4(segments[1], segments[2]));
    }

    let non_public = ip.is_multicast()
        || (segments[0] & 0xfe00) == 0xfc00          // fc00::/7 unique local
        || (segments[0] & 0xffc0) == 0xfe80          // fe80::/10 link-local
        || (segments[0] == 0x2001 && segments[1] == 0x0db8) // 2001:db8::/32 documentation
        || (segments[0] == 0x2001 && segments[1] == 0x0000) // 2001::/32 Teredo
        || (segments[0] == 0x0064 && segments[1] == 0xff9b); // 64:ff9b::/96 NAT64

    !non_public
}

fn embedded_ipv4(high: u16, low: u16) -> Ipv4Addr {
    let [a, b] = high.to_be_bytes();
    let [c, d] = low.to_be_bytes();
    Ipv4Addr::new(a, b, c, d)
}
