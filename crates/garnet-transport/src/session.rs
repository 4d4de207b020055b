use crate::bbr::{AckSample, Bbr};
use crate::channel::{Channel, Input};
use crate::segment::Segment;
use crate::MAX_SEG_DATA;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::time::{Duration, Instant};

/// Per-connection configuration supplied by the substrate.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bytes we advertise to the peer.
    pub recv_window: u16,
    /// Cap on our own bytes in flight.
    pub send_window: u16,
    /// Retransmission timeout.
    pub rt_timeout: Duration,
    /// Cadence the registry tick runs at.
    pub timer: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recv_window: MAX_SEG_DATA as u16,
            send_window: MAX_SEG_DATA as u16,
            rt_timeout: Duration::from_millis(200),
            timer: Duration::from_millis(40),
        }
    }
}

/// What the periodic tick decided about a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Alive,
    /// Teardown finished or the peer stopped responding; the owner should
    /// drop the session.
    Destroy,
}

/// A transmitted segment awaiting cumulative acknowledgement. The wire
/// image is kept so retransmissions are verbatim — in particular a FIN
/// keeps its sequence number.
#[derive(Debug)]
struct SentSegment {
    bytes: Vec<u8>,
    seqno: u32,
    data_len: usize,
    fin: bool,
    send_time: Instant,
    delivered_at_send: u64,
    delivered_time_at_send: Instant,
}

/// One peer's reliable-stream state: the sliding send window, the reorder
/// buffer, the FIN handshake flags, and the congestion controller.
pub struct Session<C: Channel> {
    channel: C,
    cfg: Config,

    /// Next sequence number to assign.
    seqno: u32,
    /// Smallest peer byte not yet delivered to the application.
    ackno: u32,

    fin_sent: bool,
    fin_seqno: Option<u32>,
    fin_acked: bool,
    fin_received: bool,

    retransmits: u32,
    last_retransmit: Instant,

    unacked: Vec<SentSegment>,
    unoutput: Vec<Segment>,

    // Delivery-rate accounting for the congestion controller.
    delivered: u64,
    delivered_time: Instant,
    next_send_time: Instant,
    app_limited: bool,
    bbr: Bbr,
}

impl<C: Channel> Session<C> {
    pub fn new(channel: C, cfg: Config, now: Instant) -> Self {
        Self {
            channel,
            cfg,
            seqno: 1,
            ackno: 1,
            fin_sent: false,
            fin_seqno: None,
            fin_acked: false,
            fin_received: false,
            retransmits: 0,
            last_retransmit: now,
            unacked: Vec::new(),
            unoutput: Vec::new(),
            delivered: 0,
            delivered_time: now,
            next_send_time: now,
            app_limited: false,
            bbr: Bbr::new(),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn congestion(&self) -> &Bbr {
        &self.bbr
    }

    /// Bytes sent but not yet cumulatively acknowledged.
    fn bytes_in_flight(&self) -> usize {
        match (self.unacked.first(), self.unacked.last()) {
            (Some(first), Some(last)) => {
                (last.seqno.wrapping_sub(first.seqno)) as usize + last.data_len
            }
            _ => 0,
        }
    }

    fn effective_window(&self) -> usize {
        (self.cfg.send_window as usize).min(self.bbr.cwnd())
    }

    /// Application read path: pulls at most one segment's worth of data and
    /// puts it on the wire. Returns true when a segment was sent, so the
    /// driver may call again while data and window remain.
    pub fn on_readable(&mut self, now: Instant) -> bool {
        if self.fin_sent {
            return false;
        }
        if self.bytes_in_flight() >= self.effective_window() {
            trace!("send window full, not reading");
            return false;
        }
        // Pacing: don't put the next segment on the wire early.
        if self.bbr.pacing_rate() > 0.0 && now < self.next_send_time {
            return false;
        }

        let mut buf = [0u8; MAX_SEG_DATA];
        match self.channel.input(&mut buf) {
            Input::Empty => {
                self.app_limited = true;
                false
            }
            Input::Eof => {
                let fin = Segment::fin(self.seqno, self.ackno, self.cfg.recv_window);
                debug!("input closed, sending FIN seqno={}", fin.seqno);
                self.transmit_new(fin, now);
                self.fin_seqno = Some(self.seqno);
                self.seqno = self.seqno.wrapping_add(1);
                self.fin_sent = true;
                true
            }
            Input::Data(n) => {
                let segment = Segment::data(
                    self.seqno,
                    self.ackno,
                    self.cfg.recv_window,
                    Bytes::copy_from_slice(&buf[..n]),
                );
                trace!("sending {} bytes at seqno={}", n, segment.seqno);
                self.transmit_new(segment, now);
                self.seqno = self.seqno.wrapping_add(n as u32);
                self.app_limited = false;
                true
            }
        }
    }

    /// Sends a fresh segment, records it for retransmission, and snapshots
    /// the delivery state for rate sampling.
    fn transmit_new(&mut self, segment: Segment, now: Instant) {
        let bytes = segment.to_bytes();
        if let Err(e) = self.channel.send(&bytes) {
            warn!("segment transmit failed: {}", e);
        }
        let wire_len = bytes.len();
        self.unacked.push(SentSegment {
            bytes,
            seqno: segment.seqno,
            data_len: segment.data_len(),
            fin: segment.has_fin(),
            send_time: now,
            delivered_at_send: self.delivered,
            delivered_time_at_send: self.delivered_time,
        });
        self.retransmits = 0;
        self.last_retransmit = now;

        let rate = self.bbr.pacing_rate();
        if rate > 0.0 {
            let spacing = Duration::from_secs_f64(wire_len as f64 / rate);
            self.next_send_time = self.next_send_time.max(now) + spacing;
        }
    }

    /// Receive pipeline: corruption, staleness and duplicate checks, then
    /// cumulative-ACK processing, FIN detection, reorder-buffer insertion
    /// and in-order delivery.
    pub fn on_segment(&mut self, raw: &[u8], now: Instant) {
        let mut reader = Bytes::copy_from_slice(raw);
        let segment = match Segment::decode(&mut reader) {
            Ok(segment) => segment,
            Err(e) => {
                debug!("dropping undecodable segment: {}", e);
                return;
            }
        };
        if !segment.checksum_ok() {
            debug!("dropping corrupted segment seqno={}", segment.seqno);
            return;
        }

        // Already-delivered territory: re-ACK real content so the peer
        // stops resending it, drop pure stale ACKs silently.
        if segment.seqno < self.ackno {
            if segment.data_len() > 0 || segment.has_fin() {
                trace!("stale segment seqno={}, re-acking", segment.seqno);
                self.send_ack();
            }
            return;
        }

        // Duplicate of something already waiting in the reorder buffer.
        if self.unoutput.iter().any(|s| s.seqno == segment.seqno) {
            trace!("duplicate segment seqno={}, re-acking", segment.seqno);
            self.send_ack();
            return;
        }

        if segment.has_ack() {
            self.process_ack(&segment, now);
        }

        if segment.has_fin() {
            debug!("peer FIN at seqno={}", segment.seqno);
            self.fin_received = true;
        }

        if segment.data_len() > 0 || segment.has_fin() {
            let pos = self
                .unoutput
                .iter()
                .position(|s| s.seqno > segment.seqno)
                .unwrap_or(self.unoutput.len());
            self.unoutput.insert(pos, segment);
        }

        self.deliver();
    }

    /// Drops every fully-acknowledged segment off the head of the unacked
    /// queue, feeding the congestion controller one sample per segment.
    fn process_ack(&mut self, segment: &Segment, now: Instant) {
        let mut acked_any = false;
        while let Some(front) = self.unacked.first() {
            if front.seqno >= segment.ackno {
                break;
            }
            let sent = self.unacked.remove(0);
            self.delivered += sent.data_len as u64 + u64::from(sent.fin);
            self.delivered_time = now;

            let rtt = now.duration_since(sent.send_time);
            let elapsed = now.duration_since(sent.delivered_time_at_send);
            if !elapsed.is_zero() {
                let bw = (self.delivered - sent.delivered_at_send) as f64 / elapsed.as_secs_f64();
                self.bbr.on_ack(
                    AckSample {
                        bw,
                        rtt,
                        delivered_at_send: sent.delivered_at_send,
                        delivered_total: self.delivered,
                        inflight: self.bytes_in_flight(),
                        app_limited: self.app_limited,
                    },
                    now,
                );
            }
            acked_any = true;
        }

        if acked_any {
            self.retransmits = 0;
            self.last_retransmit = now;
        }
        if self.fin_sent {
            if let Some(fin_seqno) = self.fin_seqno {
                if segment.ackno > fin_seqno {
                    self.fin_acked = true;
                }
            }
        }
    }

    /// Output routine: write the in-order head of the reorder buffer to the
    /// application while it has room, then acknowledge everything at once.
    fn deliver(&mut self) {
        let mut delivered_any = false;
        while let Some(front) = self.unoutput.first() {
            if front.seqno != self.ackno {
                break;
            }
            let data_len = front.data_len();
            if data_len > 0 && self.channel.bufspace() < data_len {
                trace!("output sink full, {} bytes waiting", data_len);
                break;
            }
            let segment = self.unoutput.remove(0);
            if data_len > 0 {
                let written = self.channel.output(&segment.payload);
                if written < data_len {
                    warn!("output sink accepted {written} of {data_len} bytes");
                }
                self.ackno = self.ackno.wrapping_add(data_len as u32);
            }
            delivered_any = true;
            if segment.has_fin() {
                self.ackno = self.ackno.wrapping_add(1);
                self.channel.output(&[]);
            }
        }
        if delivered_any {
            self.send_ack();
        }
    }

    /// The application drained its sink; retry delivery.
    pub fn on_writable(&mut self) {
        self.deliver();
    }

    fn send_ack(&mut self) {
        let ack = Segment::ack(self.seqno, self.ackno, self.cfg.recv_window);
        if let Err(e) = self.channel.send(&ack.to_bytes()) {
            warn!("ack transmit failed: {}", e);
        }
    }

    /// Periodic maintenance: head-of-queue retransmission with a five
    /// strike limit, and the teardown check.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.unacked.is_empty() {
            if self.retransmits >= 5 {
                warn!("peer unresponsive after {} retransmissions", self.retransmits);
                return TickOutcome::Destroy;
            }
            if now.duration_since(self.last_retransmit) >= self.cfg.rt_timeout {
                let head = &self.unacked[0];
                trace!("retransmitting seqno={}", head.seqno);
                if let Err(e) = self.channel.send(&head.bytes) {
                    warn!("retransmit failed: {}", e);
                }
                self.retransmits += 1;
                self.last_retransmit = now;
            }
        }

        if self.fin_sent && self.fin_acked && self.fin_received {
            debug!("teardown complete");
            // Best effort: whatever is deliverable in order goes out, the
            // rest is discarded with the session.
            self.deliver();
            self.unoutput.clear();
            return TickOutcome::Destroy;
        }
        TickOutcome::Alive
    }
}
