//! Bootstrap peer loading.
//!
//! Reads a file containing multiaddrs (one per line) for the swarm to dial
//! on startup.

use std::fs;
use std::path::Path;

use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use tracing::{debug, info, warn};

/// Load bootstrap peer multiaddrs from a file.
///
/// Empty lines and lines starting with `#` are ignored. Malformed lines are
/// logged and skipped; an unreadable file yields an empty list.
///
/// ```text
/// # LAN peers
/// /ip4/192.168.1.20/udp/4001/quic-v1/p2p/12D3KooW...
/// ```
pub fn load_bootstrap_peers(path: &Path) -> Vec<Multiaddr> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read bootstrap peers file"
            );
            return Vec::new();
        }
    };

    let addrs = parse_multiaddrs(content.lines());

    info!(
        count = addrs.len(),
        path = %path.display(),
        "Loaded bootstrap peers"
    );

    addrs
}

/// Parse multiaddr strings, skipping blanks, comments and invalid entries.
pub fn parse_multiaddrs<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<Multiaddr> {
    raw.into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<Multiaddr>() {
            Ok(addr) => {
                debug!(addr = %addr, "Parsed peer address");
                Some(addr)
            }
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping invalid multiaddr");
                None
            }
        })
        .collect()
}

/// Extract a `PeerId` from a multiaddr, if one is present.
pub fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}
