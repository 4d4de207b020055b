use garnet_binary::MacAddr;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// How long a learned mapping stays valid. Expiry is lazy: stale entries
/// are simply not returned by lookups and overwritten by inserts.
pub const ENTRY_TTL: Duration = Duration::from_secs(15);

/// Minimum spacing between retransmissions of one request.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Requests are abandoned after this many transmissions.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
struct ArpEntry {
    mac: MacAddr,
    learned_at: Instant,
}

/// A frame parked while its next hop resolves. Owned copy; the substrate's
/// buffer is never retained.
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub frame: Vec<u8>,
    pub iface: String,
}

/// Outstanding resolution for one next-hop address. At most one of these
/// exists per target IP; frames for the same target coalesce onto its queue.
#[derive(Debug)]
pub struct PendingRequest {
    pub target_ip: Ipv4Addr,
    pub last_sent: Option<Instant>,
    pub retries: u32,
    pub frames: VecDeque<QueuedFrame>,
}

impl PendingRequest {
    /// True when a (re)transmission is due.
    pub fn due(&self, now: Instant) -> bool {
        self.last_sent
            .is_none_or(|sent| now.duration_since(sent) >= RETRY_INTERVAL)
    }

    /// True when the request has used up its transmissions.
    pub fn exhausted(&self) -> bool {
        self.retries >= MAX_RETRIES
    }
}

/// The ARP cache plus its pending-request list. Callers wrap this in a
/// mutex; every read-modify-write happens under one lock acquisition so a
/// reply's insert-and-drain is atomic with respect to new queue attempts.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, ArpEntry>,
    pending: HashMap<Ipv4Addr, PendingRequest>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mapping for `ip` if present and younger than
    /// [`ENTRY_TTL`].
    pub fn lookup(&self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        self.entries
            .get(&ip)
            .filter(|entry| now.duration_since(entry.learned_at) < ENTRY_TTL)
            .map(|entry| entry.mac)
    }

    /// Records a mapping and hands back the pending request it satisfies,
    /// if any, for the caller to drain while still holding the lock.
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> Option<PendingRequest> {
        self.entries.insert(
            ip,
            ArpEntry {
                mac,
                learned_at: now,
            },
        );
        self.pending.remove(&ip)
    }

    /// Parks a frame until `ip` resolves, creating the pending request on
    /// first miss and appending on subsequent ones.
    pub fn queue(&mut self, ip: Ipv4Addr, frame: &[u8], iface: &str) {
        let request = self.pending.entry(ip).or_insert_with(|| PendingRequest {
            target_ip: ip,
            last_sent: None,
            retries: 0,
            frames: VecDeque::new(),
        });
        request.frames.push_back(QueuedFrame {
            frame: frame.to_vec(),
            iface: iface.to_string(),
        });
    }

    pub fn pending_mut(&mut self, ip: Ipv4Addr) -> Option<&mut PendingRequest> {
        self.pending.get_mut(&ip)
    }

    /// Removes and returns every request that has exhausted its retries and
    /// is due again, leaving live requests in place.
    pub fn take_exhausted(&mut self, now: Instant) -> Vec<PendingRequest> {
        let expired: Vec<Ipv4Addr> = self
            .pending
            .values()
            .filter(|req| req.exhausted() && req.due(now))
            .map(|req| req.target_ip)
            .collect();
        expired
            .into_iter()
            .filter_map(|ip| self.pending.remove(&ip))
            .collect()
    }

    /// Targets with a transmission due and retries remaining.
    pub fn due_targets(&self, now: Instant) -> Vec<Ipv4Addr> {
        self.pending
            .values()
            .filter(|req| !req.exhausted() && req.due(now))
            .map(|req| req.target_ip)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddr = MacAddr([0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xFE]);

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 2, last)
    }

    #[test]
    fn test_lookup_expires_after_ttl() {
        let mut cache = ArpCache::new();
        let t0 = Instant::now();
        cache.insert(ip(254), MAC, t0);

        assert_eq!(cache.lookup(ip(254), t0), Some(MAC));
        assert_eq!(
            cache.lookup(ip(254), t0 + Duration::from_secs(14)),
            Some(MAC)
        );
        assert_eq!(cache.lookup(ip(254), t0 + Duration::from_secs(15)), None);
    }

    #[test]
    fn test_queue_coalesces_one_request_per_target() {
        let mut cache = ArpCache::new();
        cache.queue(ip(254), &[1, 2, 3], "eth1");
        cache.queue(ip(254), &[4, 5, 6], "eth1");

        let request = cache.pending_mut(ip(254)).unwrap();
        assert_eq!(request.frames.len(), 2);
        assert_eq!(request.retries, 0);
        assert_eq!(cache.due_targets(Instant::now()), vec![ip(254)]);
    }

    #[test]
    fn test_insert_drains_pending_atomically() {
        let mut cache = ArpCache::new();
        cache.queue(ip(254), &[1, 2, 3], "eth1");

        let now = Instant::now();
        let drained = cache.insert(ip(254), MAC, now).unwrap();
        assert_eq!(drained.frames.len(), 1);
        assert_eq!(drained.frames[0].frame, vec![1, 2, 3]);

        // Mapping present, no pending request left behind.
        assert_eq!(cache.lookup(ip(254), now), Some(MAC));
        assert!(cache.pending_mut(ip(254)).is_none());
        assert!(cache.insert(ip(254), MAC, now).is_none());
    }

    #[test]
    fn test_retry_pacing_and_exhaustion() {
        let mut cache = ArpCache::new();
        cache.queue(ip(254), &[0xFF], "eth1");
        let t0 = Instant::now();

        // Fresh request is due immediately.
        assert_eq!(cache.due_targets(t0), vec![ip(254)]);

        let request = cache.pending_mut(ip(254)).unwrap();
        request.last_sent = Some(t0);
        request.retries = 1;

        assert!(cache.due_targets(t0 + Duration::from_millis(500)).is_empty());
        assert_eq!(cache.due_targets(t0 + Duration::from_secs(1)), vec![ip(254)]);

        let request = cache.pending_mut(ip(254)).unwrap();
        request.retries = MAX_RETRIES;
        request.last_sent = Some(t0);

        // Exhausted requests stop being due targets and surface for teardown
        // once their interval elapses again.
        assert!(cache.due_targets(t0 + Duration::from_secs(2)).is_empty());
        assert!(cache.take_exhausted(t0 + Duration::from_millis(100)).is_empty());
        let torn_down = cache.take_exhausted(t0 + Duration::from_secs(1));
        assert_eq!(torn_down.len(), 1);
        assert_eq!(torn_down[0].frames.len(), 1);
        assert!(cache.pending_mut(ip(254)).is_none());
    }
}
