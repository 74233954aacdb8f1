use sha1::{Digest, Sha1};
use std::net::IpAddr;

/// Derives the allowed-fast set for a peer (BEP-6).
///
/// Deterministically maps the peer's masked IP and the torrent's info hash
/// to a set of piece indices the peer may request even while choked: hash
/// `(ip & /24) || infohash` with SHA-1, take big-endian u32 chunks modulo
/// the piece count, and re-hash until `set_size` distinct indices have been
/// produced.
pub fn allowed_fast_set(
    info_hash: &[u8; 20],
    peer_ip: IpAddr,
    piece_count: u32,
    set_size: usize,
) -> Vec<u32> {
    if piece_count == 0 {
        return Vec::new();
    }
    let set_size = set_size.min(piece_count as usize);

    let ip_bytes = match peer_ip {
        IpAddr::V4(ip) => {
            let octets = ip.octets();
            [octets[0], octets[1], octets[2], 0]
        }
        IpAddr::V6(ip) => {
            let octets = ip.octets();
            [octets[0], octets[1], octets[2], octets[3]]
        }
    };

    let mut seed = Vec::with_capacity(24);
    seed.extend_from_slice(&ip_bytes);
    seed.extend_from_slice(info_hash);

    let mut allowed = Vec::with_capacity(set_size);
    while allowed.len() < set_size {
        let mut hasher = Sha1::new();
        hasher.update(&seed);
        let hash = hasher.finalize();

        for chunk in hash.chunks(4) {
            if allowed.len() >= set_size {
                break;
            }
            let index =
                u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) % piece_count;
            if !allowed.contains(&index) {
                allowed.push(index);
            }
        }

        seed = hash.to_vec();
    }

    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_allowed_fast_deterministic() {
        let info_hash = [0xAA; 20];
        let ip = IpAddr::V4(Ipv4Addr::new(80, 4, 4, 200));

        let a = allowed_fast_set(&info_hash, ip, 1000, 10);
        let b = allowed_fast_set(&info_hash, ip, 1000, 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.iter().all(|&p| p < 1000));
    }

    #[test]
    fn test_allowed_fast_masks_low_octet() {
        let info_hash = [0x11; 20];
        let a = allowed_fast_set(&info_hash, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 64, 4);
        let b = allowed_fast_set(&info_hash, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 99)), 64, 4);
        let c = allowed_fast_set(&info_hash, IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1)), 64, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_allowed_fast_distinct_indices() {
        let set = allowed_fast_set(&[7; 20], IpAddr::V4(Ipv4Addr::LOCALHOST), 5, 10);
        assert_eq!(set.len(), 5);
        let mut sorted = set.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), set.len());
    }

    #[test]
    fn test_allowed_fast_empty_torrent() {
        assert!(allowed_fast_set(&[0; 20], IpAddr::V4(Ipv4Addr::LOCALHOST), 0, 10).is_empty());
    }
}
