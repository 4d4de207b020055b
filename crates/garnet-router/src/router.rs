use crate::arp_cache::{ArpCache, PendingRequest};
use crate::error::{Result, RouterError};
use crate::iface::Interface;
use crate::rib::RoutingTable;
use crate::substrate::FrameSink;
use crate::wire::arp::{ArpPacket, ARP_OP_REPLY, ARP_OP_REQUEST};
use crate::wire::ethernet::{EthernetHeader, ETHERTYPE_ARP, ETHERTYPE_IPV4};
use crate::wire::icmp::{
    IcmpEcho, IcmpError, ICMP_CODE_HOST_UNREACHABLE, ICMP_CODE_NET_UNREACHABLE,
    ICMP_CODE_PORT_UNREACHABLE, ICMP_DEST_UNREACHABLE, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST,
    ICMP_TIME_EXCEEDED,
};
use crate::wire::ipv4::{Ipv4Header, IP_FLAG_DF, IP_PROTO_ICMP};
use crate::MTU;
use bytes::{Bytes, BytesMut};
use garnet_binary::MacAddr;
use log::{debug, error, trace, warn};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// TTL on ICMP messages the router originates.
const ICMP_TTL: u8 = 60;

/// `next_mtu` value when the field is unused by the message type.
const ICMP_UNUSED_MTU: u16 = MTU as u16;

/// The forwarding engine. Shared between the frame dispatch thread and the
/// ARP timeout thread; the ARP cache mutex is the only synchronization.
pub struct Router<S: FrameSink> {
    sink: S,
    interfaces: Vec<Interface>,
    rib: RoutingTable,
    cache: Mutex<ArpCache>,
}

impl<S: FrameSink> Router<S> {
    pub fn new(sink: S, interfaces: Vec<Interface>, rib: RoutingTable) -> Self {
        Self {
            sink,
            interfaces,
            rib,
            cache: Mutex::new(ArpCache::new()),
        }
    }

    pub fn iface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }

    fn iface_by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.ip == ip)
    }

    fn lock_cache(&self) -> MutexGuard<'_, ArpCache> {
        self.cache.lock().expect("arp cache lock poisoned")
    }

    /// Frame classifier. The substrate lends `frame` for the duration of
    /// this call only; anything kept is copied.
    pub fn handle_frame(&self, frame: &[u8], iface_name: &str) {
        trace!("Received {}-byte frame on {}", frame.len(), iface_name);

        let mut reader = Bytes::copy_from_slice(frame);
        let eth = match EthernetHeader::decode(&mut reader) {
            Ok(eth) => eth,
            Err(e) => {
                error!("Dropping frame on {}: {}", iface_name, e);
                return;
            }
        };

        let outcome = match eth.ethertype {
            ETHERTYPE_IPV4 => self.handle_ip(&eth, reader, iface_name),
            ETHERTYPE_ARP => self.handle_arp(&eth, reader, iface_name),
            other => {
                debug!(
                    "Dropping frame with unknown ethertype {:#06x} on {}",
                    other, iface_name
                );
                Ok(())
            }
        };

        if let Err(e) = outcome {
            warn!("Dropping frame on {}: {}", iface_name, e);
        }
    }

    /// IP forwarding engine: validate, deliver locally or forward, emit
    /// ICMP errors along the way.
    fn handle_ip(&self, eth: &EthernetHeader, packet: Bytes, iface_name: &str) -> Result<()> {
        let in_iface = self
            .iface(iface_name)
            .ok_or_else(|| RouterError::UnknownInterface(iface_name.to_string()))?;

        let mut body = packet.clone();
        let ip = Ipv4Header::decode(&mut body)?;
        if !ip.checksum_ok() {
            return Err(RouterError::ChecksumMismatch);
        }

        if self.iface_by_ip(ip.dst).is_some() {
            return self.deliver_local(eth, in_iface, &ip, &packet, body);
        }

        // Transit. The TTL comes off before anything quotes the header, so
        // ICMP errors carry the packet in its post-decrement state.
        let mut fwd = ip;
        fwd.ttl = fwd.ttl.saturating_sub(1);
        if fwd.ttl == 0 {
            debug!("TTL expired for packet to {}", fwd.dst);
            let quote = encode_packet(&fwd, &body)?;
            return self.send_icmp_error(eth, in_iface, &fwd, &quote, ICMP_TIME_EXCEEDED, 0);
        }
        fwd.fill_checksum();

        let Some(route) = self.rib.lookup(fwd.dst) else {
            debug!("No route to {}", fwd.dst);
            let quote = encode_packet(&fwd, &body)?;
            return self.send_icmp_error(
                eth,
                in_iface,
                &fwd,
                &quote,
                ICMP_DEST_UNREACHABLE,
                ICMP_CODE_NET_UNREACHABLE,
            );
        };
        let out_iface = self
            .iface(&route.iface)
            .ok_or_else(|| RouterError::UnknownInterface(route.iface.clone()))?;
        let next_hop = route.next_hop(fwd.dst);

        let now = Instant::now();
        let mut cache = self.lock_cache();
        match cache.lookup(next_hop, now) {
            Some(mac) => {
                let out_eth = EthernetHeader {
                    dst: mac,
                    src: out_iface.mac,
                    ethertype: ETHERTYPE_IPV4,
                };
                let frame = assemble_frame(&out_eth, &fwd, &body)?;
                trace!("Forwarding packet to {} via {}", fwd.dst, out_iface.name);
                self.sink.send_frame(&frame, &out_iface.name)?;
            }
            None => {
                debug!(
                    "No mapping for next hop {}, queueing packet and resolving",
                    next_hop
                );
                let out_eth = EthernetHeader {
                    dst: MacAddr::ZERO,
                    src: out_iface.mac,
                    ethertype: ETHERTYPE_IPV4,
                };
                let frame = assemble_frame(&out_eth, &fwd, &body)?;
                cache.queue(next_hop, &frame, &out_iface.name);
                // First request goes out right away; the ticker takes over
                // from here.
                self.transmit_request(&mut cache, next_hop, now)?;
            }
        }
        Ok(())
    }

    /// The packet is addressed to one of our interfaces.
    fn deliver_local(
        &self,
        eth: &EthernetHeader,
        in_iface: &Interface,
        ip: &Ipv4Header,
        packet: &Bytes,
        mut body: Bytes,
    ) -> Result<()> {
        if ip.protocol == IP_PROTO_ICMP {
            let echo = IcmpEcho::decode(&mut body)?;
            if echo.icmp_type != ICMP_ECHO_REQUEST {
                trace!("Ignoring local ICMP type {} from {}", echo.icmp_type, ip.src);
                return Ok(());
            }
            if !echo.checksum_ok() {
                return Err(RouterError::ChecksumMismatch);
            }
            debug!("Echo request from {}, replying", ip.src);
            return self.send_echo_reply(eth, in_iface, ip, echo);
        }

        // TCP/UDP or anything else aimed at us: we serve no ports.
        debug!(
            "Protocol {} addressed to {} on {}, sending port unreachable",
            ip.protocol, ip.dst, in_iface.name
        );
        self.send_icmp_error(
            eth,
            in_iface,
            ip,
            packet,
            ICMP_DEST_UNREACHABLE,
            ICMP_CODE_PORT_UNREACHABLE,
        )
    }

    /// Synthesizes an echo reply using the inbound packet as template:
    /// identifier, sequence and payload are carried over verbatim.
    fn send_echo_reply(
        &self,
        eth: &EthernetHeader,
        in_iface: &Interface,
        ip: &Ipv4Header,
        mut echo: IcmpEcho,
    ) -> Result<()> {
        echo.icmp_type = ICMP_ECHO_REPLY;
        echo.code = 0;
        echo.fill_checksum();

        let mut reply_ip = Ipv4Header {
            tos: ip.tos,
            total_len: ip.total_len,
            id: ip.id,
            flags_frag: IP_FLAG_DF,
            ttl: ICMP_TTL,
            protocol: IP_PROTO_ICMP,
            checksum: 0,
            src: in_iface.ip,
            dst: ip.src,
        };
        reply_ip.fill_checksum();

        let out_eth = EthernetHeader {
            dst: eth.src,
            src: in_iface.mac,
            ethertype: ETHERTYPE_IPV4,
        };

        let mut echo_bytes = BytesMut::new();
        echo.encode(&mut echo_bytes)?;
        let frame = assemble_frame(&out_eth, &reply_ip, &echo_bytes)?;
        self.sink.send_frame(&frame, &in_iface.name)?;
        Ok(())
    }

    /// Emits a type-3 or type-11 ICMP error back toward the sender of
    /// `packet`, out the interface the packet arrived on.
    fn send_icmp_error(
        &self,
        eth: &EthernetHeader,
        in_iface: &Interface,
        ip: &Ipv4Header,
        packet: &[u8],
        icmp_type: u8,
        code: u8,
    ) -> Result<()> {
        let message = IcmpError::quoting(icmp_type, code, ICMP_UNUSED_MTU, packet);

        let mut error_ip = Ipv4Header {
            tos: ip.tos,
            total_len: (Ipv4Header::LEN + IcmpError::LEN) as u16,
            id: ip.id,
            flags_frag: IP_FLAG_DF,
            ttl: ICMP_TTL,
            protocol: IP_PROTO_ICMP,
            checksum: 0,
            src: in_iface.ip,
            dst: ip.src,
        };
        error_ip.fill_checksum();

        let out_eth = EthernetHeader {
            dst: eth.src,
            src: in_iface.mac,
            ethertype: ETHERTYPE_IPV4,
        };

        let mut message_bytes = BytesMut::new();
        message.encode(&mut message_bytes)?;
        let frame = assemble_frame(&out_eth, &error_ip, &message_bytes)?;
        self.sink.send_frame(&frame, &in_iface.name)?;
        Ok(())
    }

    /// ARP inbound: answer requests for our addresses, learn from replies
    /// addressed to us, and drive any packets the reply unblocks.
    fn handle_arp(&self, eth: &EthernetHeader, mut packet: Bytes, iface_name: &str) -> Result<()> {
        let arp = ArpPacket::decode(&mut packet)?;
        let in_iface = self
            .iface(iface_name)
            .ok_or_else(|| RouterError::UnknownInterface(iface_name.to_string()))?;

        match arp.opcode {
            ARP_OP_REQUEST => {
                if arp.target_ip != in_iface.ip {
                    trace!(
                        "Ignoring ARP request for {} on {}",
                        arp.target_ip,
                        in_iface.name
                    );
                    return Ok(());
                }
                debug!("ARP request for {} from {}, replying", arp.target_ip, arp.sender_ip);
                let reply = ArpPacket::reply_to(&arp, in_iface.mac, in_iface.ip);
                let out_eth = EthernetHeader {
                    dst: eth.src,
                    src: in_iface.mac,
                    ethertype: ETHERTYPE_ARP,
                };
                let frame = assemble_arp_frame(&out_eth, &reply)?;
                self.sink.send_frame(&frame, &in_iface.name)?;
            }
            ARP_OP_REPLY => {
                if arp.target_ip != in_iface.ip {
                    trace!(
                        "Ignoring ARP reply not addressed to {} on {}",
                        in_iface.ip,
                        in_iface.name
                    );
                    return Ok(());
                }
                debug!("Learned {} -> {}", arp.sender_ip, arp.sender_mac);
                let now = Instant::now();
                // Insert and drain under one lock acquisition so no second
                // request for this target can appear mid-drain.
                let mut cache = self.lock_cache();
                if let Some(request) = cache.insert(arp.sender_ip, arp.sender_mac, now) {
                    self.drain_request(request, arp.sender_mac);
                }
            }
            other => {
                debug!("Ignoring ARP opcode {} on {}", other, in_iface.name);
            }
        }
        Ok(())
    }

    /// Sends every frame parked on a freshly resolved request.
    fn drain_request(&self, request: PendingRequest, mac: MacAddr) {
        for mut queued in request.frames {
            let Some(out_iface) = self.iface(&queued.iface) else {
                warn!("Dropping queued frame for missing interface {}", queued.iface);
                continue;
            };
            queued.frame[..6].copy_from_slice(&mac.octets());
            queued.frame[6..12].copy_from_slice(&out_iface.mac.octets());
            trace!(
                "Transmitting queued frame for {} on {}",
                request.target_ip,
                queued.iface
            );
            if let Err(e) = self.sink.send_frame(&queued.frame, &queued.iface) {
                warn!("Failed to transmit queued frame on {}: {}", queued.iface, e);
            }
        }
    }

    /// Broadcasts one ARP request for `target` if its pending record says a
    /// transmission is due. Called with the cache lock held.
    fn transmit_request(
        &self,
        cache: &mut ArpCache,
        target: Ipv4Addr,
        now: Instant,
    ) -> Result<()> {
        let Some(request) = cache.pending_mut(target) else {
            return Ok(());
        };
        if !request.due(now) || request.exhausted() {
            return Ok(());
        }
        let Some(iface_name) = request.frames.front().map(|f| f.iface.clone()) else {
            return Ok(());
        };
        let out_iface = self
            .iface(&iface_name)
            .ok_or_else(|| RouterError::UnknownInterface(iface_name))?;

        let arp = ArpPacket::request(out_iface.mac, out_iface.ip, target);
        let out_eth = EthernetHeader {
            dst: MacAddr::BROADCAST,
            src: out_iface.mac,
            ethertype: ETHERTYPE_ARP,
        };
        let frame = assemble_arp_frame(&out_eth, &arp)?;
        debug!(
            "ARP request for {} on {} (attempt {})",
            target,
            out_iface.name,
            request.retries + 1
        );
        self.sink.send_frame(&frame, &out_iface.name)?;
        request.retries += 1;
        request.last_sent = Some(now);
        Ok(())
    }

    /// One pass of the 1 Hz ARP maintenance: retransmit due requests, and
    /// fail the ones that have used up their five attempts.
    pub fn tick(&self, now: Instant) {
        let mut cache = self.lock_cache();

        for target in cache.due_targets(now) {
            if let Err(e) = self.transmit_request(&mut cache, target, now) {
                warn!("ARP request for {} failed: {}", target, e);
            }
        }

        for request in cache.take_exhausted(now) {
            warn!(
                "{} unresolved after {} attempts, failing {} queued packet(s)",
                request.target_ip,
                request.retries,
                request.frames.len()
            );
            self.abandon_request(&mut cache, request, now);
        }
    }

    /// Returns ICMP host-unreachable to the source of every frame parked on
    /// a request that never resolved.
    fn abandon_request(&self, cache: &mut ArpCache, request: PendingRequest, now: Instant) {
        for queued in &request.frames {
            let mut reader = Bytes::copy_from_slice(&queued.frame);
            if EthernetHeader::decode(&mut reader).is_err() {
                warn!("Malformed queued frame for {}", request.target_ip);
                continue;
            }
            let packet = reader.clone();
            let ip = match Ipv4Header::decode(&mut reader) {
                Ok(ip) => ip,
                Err(e) => {
                    warn!("Malformed queued packet for {}: {}", request.target_ip, e);
                    continue;
                }
            };
            if let Err(e) = self.send_unreachable_routed(cache, &ip, &packet, now) {
                warn!(
                    "Could not return host-unreachable for a packet to {}: {}",
                    request.target_ip, e
                );
            }
        }
    }

    /// Routes a host-unreachable back to `ip.src` via the RIB. If the next
    /// hop toward the source is itself unresolved, the error is dropped
    /// rather than queued recursively.
    fn send_unreachable_routed(
        &self,
        cache: &mut ArpCache,
        ip: &Ipv4Header,
        packet: &Bytes,
        now: Instant,
    ) -> Result<()> {
        let route = self.rib.lookup(ip.src).ok_or_else(|| {
            RouterError::MalformedFrame(format!("no route back to {}", ip.src))
        })?;
        let out_iface = self
            .iface(&route.iface)
            .ok_or_else(|| RouterError::UnknownInterface(route.iface.clone()))?;
        let next_hop = route.next_hop(ip.src);
        let mac = cache.lookup(next_hop, now).ok_or_else(|| {
            RouterError::MalformedFrame(format!("next hop {} toward {} unresolved", next_hop, ip.src))
        })?;

        let message = IcmpError::quoting(
            ICMP_DEST_UNREACHABLE,
            ICMP_CODE_HOST_UNREACHABLE,
            ICMP_UNUSED_MTU,
            packet,
        );
        let mut error_ip = Ipv4Header {
            tos: ip.tos,
            total_len: (Ipv4Header::LEN + IcmpError::LEN) as u16,
            id: ip.id,
            flags_frag: IP_FLAG_DF,
            ttl: ICMP_TTL,
            protocol: IP_PROTO_ICMP,
            checksum: 0,
            src: out_iface.ip,
            dst: ip.src,
        };
        error_ip.fill_checksum();

        let out_eth = EthernetHeader {
            dst: mac,
            src: out_iface.mac,
            ethertype: ETHERTYPE_IPV4,
        };
        let mut message_bytes = BytesMut::new();
        message.encode(&mut message_bytes)?;
        let frame = assemble_frame(&out_eth, &error_ip, &message_bytes)?;
        self.sink.send_frame(&frame, &out_iface.name)?;
        Ok(())
    }
}

impl<S: FrameSink + Send + Sync + 'static> Router<S> {
    /// Spawns the dedicated ARP timeout thread, ticking once per second
    /// until the returned handle is stopped or dropped.
    pub fn start_ticker(self: &Arc<Self>) -> ArpTicker {
        let shutdown = Arc::new(AtomicBool::new(false));
        let router = Arc::clone(self);
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("arp-ticker".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    router.tick(Instant::now());
                    std::thread::sleep(Duration::from_secs(1));
                }
            })
            .expect("failed to spawn arp ticker thread");
        ArpTicker {
            shutdown,
            handle: Some(handle),
        }
    }
}

/// Handle for the ARP timeout thread. Dropping it signals the thread and
/// joins it.
pub struct ArpTicker {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ArpTicker {
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ArpTicker {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn encode_packet(ip: &Ipv4Header, rest: &[u8]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(Ipv4Header::LEN + rest.len());
    ip.encode(&mut buf)?;
    buf.extend_from_slice(rest);
    Ok(buf.to_vec())
}

fn assemble_frame(eth: &EthernetHeader, ip: &Ipv4Header, rest: &[u8]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(EthernetHeader::LEN + Ipv4Header::LEN + rest.len());
    eth.encode(&mut buf)?;
    ip.encode(&mut buf)?;
    buf.extend_from_slice(rest);
    Ok(buf.to_vec())
}

fn assemble_arp_frame(eth: &EthernetHeader, arp: &ArpPacket) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(EthernetHeader::LEN + ArpPacket::LEN);
    eth.encode(&mut buf)?;
    arp.encode(&mut buf)?;
    Ok(buf.to_vec())
}
