//! BBR-style congestion control: estimate the bottleneck bandwidth and the
//! round-trip propagation delay, then pace at `bw * gain` and cap the
//! window near one bandwidth-delay product.
//!
//! All gain arithmetic is `f64`; rates are bytes per second, the window is
//! bytes. Rounds are counted the BBR way: a round ends when a segment sent
//! after the previous round's end is acknowledged.

use crate::MAX_SEG_DATA;
use log::{debug, trace};
use rand::Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of phases in the PROBE_BW pacing-gain cycle.
pub const CYCLE_LEN: usize = 8;

/// Window of the bottleneck-bandwidth max filter, in rounds.
const BW_FILTER_ROUNDS: u64 = CYCLE_LEN as u64 + 2;

/// Window of the min-RTT filter, in rounds. Also the expiry horizon that
/// sends the controller into PROBE_RTT.
const RTT_FILTER_ROUNDS: u64 = 10;

/// STARTUP gain, 2/ln 2: doubles the sending rate each round-trip.
const HIGH_GAIN: f64 = 2.0 / std::f64::consts::LN_2;

/// DRAIN pacing gain, the inverse of the STARTUP gain.
const DRAIN_GAIN: f64 = std::f64::consts::LN_2 / 2.0;

/// Steady-state window gain while probing for bandwidth.
const PROBE_BW_CWND_GAIN: f64 = 2.0;

/// STARTUP is over when the bandwidth filter stops growing by this factor.
const FULL_BW_THRESH: f64 = 1.25;

/// Consecutive non-app-limited rounds without growth before "pipe full".
const FULL_BW_ROUNDS: u32 = 3;

/// How long to sit at the window floor while probing for min RTT.
const PROBE_RTT_DURATION: Duration = Duration::from_millis(200);

/// Window floor: four packets keeps the ACK clock turning.
pub const MIN_CWND: usize = 4 * MAX_SEG_DATA;

/// RTT assumed before the first sample arrives.
const DEFAULT_RTT: Duration = Duration::from_millis(40);

const PACING_GAIN_CYCLE: [f64; CYCLE_LEN] = [1.25, 0.75, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Ramp up quickly to find the pipe's capacity.
    Startup,
    /// Pace below the estimate to drain the queue STARTUP built.
    Drain,
    /// Steady state: cycle the pacing gain around the estimate.
    ProbeBw,
    /// Hold the window at the floor to re-measure propagation delay.
    ProbeRtt,
}

/// One delivery-rate measurement, taken when a cumulative ACK covers a
/// transmitted segment.
#[derive(Debug, Clone, Copy)]
pub struct AckSample {
    /// Delivery rate observed over the segment's flight, bytes per second.
    pub bw: f64,
    /// The segment's round-trip time.
    pub rtt: Duration,
    /// Total delivered bytes when the segment was sent.
    pub delivered_at_send: u64,
    /// Total delivered bytes including this segment.
    pub delivered_total: u64,
    /// Bytes still in flight after this acknowledgement.
    pub inflight: usize,
    /// The application had nothing to send while this flight was out.
    pub app_limited: bool,
}

pub struct Bbr {
    mode: Mode,
    pacing_gain: f64,
    cwnd_gain: f64,
    /// Current pacing rate, bytes per second. Zero until the first sample.
    pacing_rate: f64,
    /// Congestion window, bytes.
    cwnd: usize,

    round_count: u64,
    next_round_delivered: u64,

    /// Windowed-max bandwidth samples: (round, bytes per second).
    bw_filter: VecDeque<(u64, f64)>,
    /// Windowed-min RTT samples: (round, rtt).
    rtt_filter: VecDeque<(u64, Duration)>,
    /// Round at which the current window minimum was last established.
    min_rtt_round: u64,

    full_bw: f64,
    full_bw_count: u32,
    cycle_index: usize,
    prior_cwnd: usize,
    restore_cwnd: bool,
    probe_rtt_done_at: Option<Instant>,
}

impl Bbr {
    pub fn new() -> Self {
        Self {
            mode: Mode::Startup,
            pacing_gain: HIGH_GAIN,
            cwnd_gain: HIGH_GAIN,
            pacing_rate: 0.0,
            cwnd: MIN_CWND,
            round_count: 0,
            next_round_delivered: 0,
            bw_filter: VecDeque::new(),
            rtt_filter: VecDeque::new(),
            min_rtt_round: 0,
            full_bw: 0.0,
            full_bw_count: 0,
            cycle_index: 0,
            prior_cwnd: 0,
            restore_cwnd: false,
            probe_rtt_done_at: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Congestion window in bytes.
    pub fn cwnd(&self) -> usize {
        self.cwnd
    }

    /// Pacing rate in bytes per second. Zero means "not yet measured".
    pub fn pacing_rate(&self) -> f64 {
        self.pacing_rate
    }

    /// Current bottleneck bandwidth estimate (windowed max), bytes/second.
    pub fn bw(&self) -> f64 {
        self.bw_filter
            .iter()
            .map(|&(_, bw)| bw)
            .fold(0.0, f64::max)
    }

    /// Current propagation delay estimate (windowed min).
    pub fn min_rtt(&self) -> Duration {
        self.rtt_filter
            .iter()
            .map(|&(_, rtt)| rtt)
            .min()
            .unwrap_or(DEFAULT_RTT)
    }

    /// Feeds one acknowledgement through the model and refreshes the pacing
    /// rate and window.
    pub fn on_ack(&mut self, sample: AckSample, now: Instant) {
        let round_start = sample.delivered_at_send >= self.next_round_delivered;
        if round_start {
            self.next_round_delivered = sample.delivered_total;
            self.round_count += 1;
        }

        self.update_bw(&sample);
        if round_start {
            self.advance_cycle_phase();
            self.check_full_bw(sample.app_limited);
        }
        self.check_drain(sample.inflight);
        self.update_min_rtt(sample.rtt, now);

        let bw = self.bw();
        let rtt = self.min_rtt();
        self.set_pacing_rate(bw);
        self.set_cwnd(bw, rtt);

        trace!(
            "bbr: mode={:?} bw={:.0}B/s rtt={:?} rate={:.0}B/s cwnd={}",
            self.mode,
            bw,
            rtt,
            self.pacing_rate,
            self.cwnd
        );
    }

    fn update_bw(&mut self, sample: &AckSample) {
        // App-limited samples understate the path; only keep one when it
        // raises the estimate anyway.
        if !sample.app_limited || sample.bw >= self.bw() {
            self.bw_filter.push_back((self.round_count, sample.bw));
        }
        while let Some(&(round, _)) = self.bw_filter.front() {
            if round + BW_FILTER_ROUNDS <= self.round_count {
                self.bw_filter.pop_front();
            } else {
                break;
            }
        }
    }

    fn advance_cycle_phase(&mut self) {
        if self.mode == Mode::ProbeBw {
            self.cycle_index = (self.cycle_index + 1) % CYCLE_LEN;
            self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_index];
        }
    }

    fn full_bw_reached(&self) -> bool {
        self.full_bw_count >= FULL_BW_ROUNDS
    }

    /// Pipe-full estimation: the filter must grow 25 % per round or STARTUP
    /// is judged to have filled the path.
    fn check_full_bw(&mut self, app_limited: bool) {
        if self.full_bw_reached() || app_limited {
            return;
        }
        let bw = self.bw();
        if bw >= self.full_bw * FULL_BW_THRESH {
            self.full_bw = bw;
            self.full_bw_count = 0;
            return;
        }
        self.full_bw_count += 1;
    }

    fn check_drain(&mut self, inflight: usize) {
        if self.mode == Mode::Startup && self.full_bw_reached() {
            debug!("bbr: pipe full, startup -> drain");
            self.mode = Mode::Drain;
            self.pacing_gain = DRAIN_GAIN;
            // cwnd_gain keeps the startup value while draining.
        }
        if self.mode == Mode::Drain && inflight <= self.cwnd {
            debug!("bbr: queue drained, drain -> probe_bw");
            self.enter_probe_bw();
        }
    }

    fn update_min_rtt(&mut self, rtt: Duration, now: Instant) {
        let current_min = self.rtt_filter.iter().map(|&(_, r)| r).min();
        if current_min.is_none_or(|m| rtt <= m) {
            self.min_rtt_round = self.round_count;
        }
        self.rtt_filter.push_back((self.round_count, rtt));
        while let Some(&(round, _)) = self.rtt_filter.front() {
            if round + RTT_FILTER_ROUNDS <= self.round_count {
                self.rtt_filter.pop_front();
            } else {
                break;
            }
        }

        let expired = self.round_count.saturating_sub(self.min_rtt_round) > RTT_FILTER_ROUNDS;
        if expired && self.mode != Mode::ProbeRtt {
            debug!("bbr: min rtt stale, entering probe_rtt");
            self.mode = Mode::ProbeRtt;
            self.pacing_gain = 1.0;
            self.cwnd_gain = 1.0;
            self.prior_cwnd = self.cwnd;
            self.probe_rtt_done_at = Some(now + PROBE_RTT_DURATION);
        }

        if self.mode == Mode::ProbeRtt
            && self.probe_rtt_done_at.is_some_and(|done| now >= done)
        {
            self.probe_rtt_done_at = None;
            self.min_rtt_round = self.round_count;
            if self.full_bw_reached() {
                self.enter_probe_bw();
            } else {
                self.enter_startup();
            }
            self.restore_cwnd = true;
        }
    }

    fn enter_startup(&mut self) {
        self.mode = Mode::Startup;
        self.pacing_gain = HIGH_GAIN;
        self.cwnd_gain = HIGH_GAIN;
    }

    fn enter_probe_bw(&mut self) {
        self.mode = Mode::ProbeBw;
        self.cwnd_gain = PROBE_BW_CWND_GAIN;
        // Randomize the entry phase so concurrent flows don't synchronize,
        // skipping the 5/4 probe slot.
        self.cycle_index = CYCLE_LEN - 1 - rand::rng().random_range(0..7);
        self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_index];
    }

    fn set_pacing_rate(&mut self, bw: f64) {
        let rate = bw * self.pacing_gain;
        // During startup the rate ratchets: never slow down on a dip.
        if self.mode != Mode::Startup || rate > self.pacing_rate {
            self.pacing_rate = rate;
        }
    }

    fn set_cwnd(&mut self, bw: f64, rtt: Duration) {
        if self.mode == Mode::ProbeRtt {
            self.cwnd = MIN_CWND;
            return;
        }
        let target = bw * rtt.as_secs_f64() * self.cwnd_gain;
        self.cwnd = (target as usize).max(MIN_CWND);
        if self.restore_cwnd {
            // Coming out of PROBE_RTT: never resume below the saved window.
            self.cwnd = self.cwnd.max(self.prior_cwnd);
            self.restore_cwnd = false;
        }
    }
}

impl Default for Bbr {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Drives one acknowledgement that both ends a round and delivers one
    /// full segment.
    fn one_round(
        bbr: &mut Bbr,
        bw: f64,
        rtt: Duration,
        inflight: usize,
        app_limited: bool,
        delivered: &mut u64,
        now: Instant,
    ) {
        let at_send = *delivered;
        *delivered += MAX_SEG_DATA as u64;
        bbr.on_ack(
            AckSample {
                bw,
                rtt,
                delivered_at_send: at_send,
                delivered_total: *delivered,
                inflight,
                app_limited,
            },
            now,
        );
    }

    #[test]
    fn test_startup_gain_is_floating_point() {
        // 2/ln 2, not the integer-truncated 2.
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        one_round(&mut bbr, 1000.0, ms(40), 1_000_000, false, &mut delivered, Instant::now());
        assert!((bbr.pacing_rate() - 2885.0).abs() < 5.0);
    }

    #[test]
    fn test_startup_pacing_is_monotonic() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        let t = Instant::now();
        one_round(&mut bbr, 400_000.0, ms(40), 1_000_000, false, &mut delivered, t);
        let peak = bbr.pacing_rate();
        // Filter max keeps the estimate, but even a direct dip in the
        // estimate must not lower the startup rate.
        one_round(&mut bbr, 100_000.0, ms(40), 1_000_000, false, &mut delivered, t);
        assert!(bbr.pacing_rate() >= peak);
    }

    #[test]
    fn test_pipe_full_moves_startup_to_drain() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        let t = Instant::now();

        // Growing rounds keep the full-bw clock at zero.
        for bw in [100_000.0, 200_000.0, 400_000.0] {
            one_round(&mut bbr, bw, ms(40), 1_000_000, false, &mut delivered, t);
            assert_eq!(bbr.mode(), Mode::Startup);
        }
        // Three flat rounds: pipe full, drain begins.
        for _ in 0..2 {
            one_round(&mut bbr, 400_000.0, ms(40), 1_000_000, false, &mut delivered, t);
            assert_eq!(bbr.mode(), Mode::Startup);
        }
        one_round(&mut bbr, 400_000.0, ms(40), 1_000_000, false, &mut delivered, t);
        assert_eq!(bbr.mode(), Mode::Drain);
    }

    #[test]
    fn test_app_limited_rounds_do_not_end_startup() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        let t = Instant::now();
        for _ in 0..6 {
            one_round(&mut bbr, 400_000.0, ms(40), 1_000_000, true, &mut delivered, t);
        }
        assert_eq!(bbr.mode(), Mode::Startup);
    }

    #[test]
    fn test_drain_exits_to_probe_bw_when_inflight_fits() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        let t = Instant::now();
        for bw in [100_000.0, 200_000.0, 400_000.0, 400_000.0, 400_000.0, 400_000.0] {
            one_round(&mut bbr, bw, ms(40), 1_000_000, false, &mut delivered, t);
        }
        assert_eq!(bbr.mode(), Mode::Drain);

        one_round(&mut bbr, 400_000.0, ms(40), 0, false, &mut delivered, t);
        assert_eq!(bbr.mode(), Mode::ProbeBw);
        assert!(bbr.cycle_index < CYCLE_LEN);
        assert!(bbr.cycle_index >= 1); // entry never lands on the 5/4 probe slot
        assert_eq!(bbr.cwnd_gain, PROBE_BW_CWND_GAIN);
    }

    #[test]
    fn test_cwnd_never_below_four_packets() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        one_round(&mut bbr, 10.0, ms(1), 0, false, &mut delivered, Instant::now());
        assert_eq!(bbr.cwnd(), MIN_CWND);
    }

    #[test]
    fn test_cwnd_tracks_bdp() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        let t = Instant::now();
        one_round(&mut bbr, 1_000_000.0, ms(100), 1_000_000, false, &mut delivered, t);
        // BDP = 100_000 bytes; cwnd = BDP * high_gain.
        let expected = (100_000.0 * HIGH_GAIN) as usize;
        assert!((bbr.cwnd() as i64 - expected as i64).abs() < 1500);
    }

    #[test]
    fn test_min_rtt_expiry_enters_and_exits_probe_rtt() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        let t0 = Instant::now();

        // Round 1 sets the minimum; every later round is strictly slower,
        // so no new minimum is ever established. Bandwidth keeps growing so
        // the pipe is never judged full and the exit goes back to STARTUP.
        one_round(&mut bbr, 400_000.0, ms(40), 1_000_000, false, &mut delivered, t0);
        let mut bw = 400_000.0;
        for i in 1..=10u64 {
            bw *= 1.3;
            one_round(
                &mut bbr,
                bw,
                ms(40 + i),
                1_000_000,
                false,
                &mut delivered,
                t0,
            );
            assert_ne!(bbr.mode(), Mode::ProbeRtt);
        }
        let cwnd_before = bbr.cwnd();
        bw *= 1.3;
        one_round(&mut bbr, bw, ms(52), 1_000_000, false, &mut delivered, t0);
        assert_eq!(bbr.mode(), Mode::ProbeRtt);
        assert_eq!(bbr.cwnd(), MIN_CWND);

        // Held below 200 ms.
        one_round(
            &mut bbr,
            400_000.0,
            ms(53),
            MIN_CWND,
            false,
            &mut delivered,
            t0 + ms(100),
        );
        assert_eq!(bbr.mode(), Mode::ProbeRtt);

        // Exit restores the saved window (the pipe was never judged full,
        // so STARTUP resumes).
        one_round(
            &mut bbr,
            400_000.0,
            ms(54),
            MIN_CWND,
            false,
            &mut delivered,
            t0 + ms(250),
        );
        assert_eq!(bbr.mode(), Mode::Startup);
        assert!(bbr.cwnd() >= cwnd_before);
    }

    #[test]
    fn test_bw_filter_is_windowed_max() {
        let mut bbr = Bbr::new();
        let mut delivered = 0;
        let t = Instant::now();
        one_round(&mut bbr, 900_000.0, ms(40), 1_000_000, false, &mut delivered, t);
        for _ in 0..5 {
            one_round(&mut bbr, 300_000.0, ms(40), 1_000_000, false, &mut delivered, t);
        }
        // The early peak still dominates inside the 10-round window.
        assert_eq!(bbr.bw(), 900_000.0);
        for _ in 0..10 {
            one_round(&mut bbr, 300_000.0, ms(40), 1_000_000, false, &mut delivered, t);
        }
        // And ages out of it.
        assert_eq!(bbr.bw(), 300_000.0);
    }
}
