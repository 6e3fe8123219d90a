//! Per-peer reply cache.
//!
//! A client that missed a reply resends the request with the same
//! sequence number. Answering such a retry from the cache instead of
//! processing it again keeps mutating requests at-most-once.

use nd_proto::MAX_PACKET;
use std::net::{Ipv4Addr, SocketAddrV4};

const REPLY_CACHE_SIZE: usize = 16;

/// The last reply sent to one peer.
pub struct ReplyInfo {
    /// The entire packet that was sent.
    pub packet: [u8; MAX_PACKET],
    /// Length of the packet; zero marks the content as invalid.
    pub len: usize,
    pub peer: SocketAddrV4,
    /// Time of the answer, so a full cache drops the oldest peer.
    pub timestamp: i64,
}

impl Default for ReplyInfo {
    fn default() -> Self {
        Self {
            packet: [0; MAX_PACKET],
            len: 0,
            peer: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            timestamp: 0,
        }
    }
}

/// A ring of the most recent replies, one slot per peer.
pub struct ReplyCache {
    items: [ReplyInfo; REPLY_CACHE_SIZE],
}

impl ReplyCache {
    pub fn new() -> Self {
        Self {
            items: std::array::from_fn(|_| ReplyInfo::default()),
        }
    }

    /// The entry for `peer`, or the oldest slot repurposed for it.
    pub fn entry(&mut self, peer: SocketAddrV4) -> &mut ReplyInfo {
        let mut found = None;
        let mut oldest = 0;
        for i in 0..self.items.len() {
            if self.items[i].peer == peer {
                found = Some(i);
                break;
            }
            if self.items[i].timestamp < self.items[oldest].timestamp {
                oldest = i;
            }
        }
        match found {
            Some(i) => &mut self.items[i],
            None => {
                // invalidate the old content before the caller fills it
                let entry = &mut self.items[oldest];
                entry.len = 0;
                entry.peer = peer;
                entry
            }
        }
    }
}

impl Default for ReplyCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, n), 1000 + n as u16)
    }

    #[test]
    fn same_peer_gets_the_same_slot() {
        let mut cache = ReplyCache::new();
        let entry = cache.entry(peer(1));
        entry.len = 42;
        entry.timestamp = 10;
        let entry = cache.entry(peer(1));
        assert_eq!(entry.len, 42);
    }

    #[test]
    fn new_peer_starts_invalidated() {
        let mut cache = ReplyCache::new();
        let entry = cache.entry(peer(1));
        entry.len = 42;
        entry.timestamp = 10;
        // a different peer lands elsewhere and starts empty
        let entry = cache.entry(peer(2));
        assert_eq!(entry.len, 0);
        assert_eq!(entry.peer, peer(2));
    }

    #[test]
    fn a_full_cache_drops_the_oldest_peer() {
        let mut cache = ReplyCache::new();
        for n in 0..REPLY_CACHE_SIZE as u8 {
            let entry = cache.entry(peer(n));
            entry.len = 1;
            entry.timestamp = 100 + n as i64;
        }
        // one more peer reuses the slot of peer 0
        let entry = cache.entry(peer(100));
        assert_eq!(entry.len, 0);
        entry.len = 1;
        entry.timestamp = 200;
        assert_eq!(cache.entry(peer(1)).len, 1);
        // peer 0 lost its slot
        assert_eq!(cache.entry(peer(0)).len, 0);
    }
}
