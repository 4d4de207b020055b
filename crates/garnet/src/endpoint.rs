//! The datagram substrate: a UDP socket on the wire side, stdin/stdout on
//! the application side. Each remote address gets its own session; the
//! first datagram from an unknown peer creates one.

use crate::config::Config;
use garnet_transport::{Channel, Input, Session, SessionRegistry};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Bytes pulled from stdin by the reader thread, waiting for the session.
#[derive(Default)]
struct StdinFeed {
    buf: Mutex<VecDeque<u8>>,
    eof: AtomicBool,
}

impl StdinFeed {
    fn push(&self, data: &[u8]) {
        self.buf.lock().expect("stdin feed lock poisoned").extend(data);
    }

    fn pop(&self, dst: &mut [u8]) -> usize {
        let mut buf = self.buf.lock().expect("stdin feed lock poisoned");
        let n = dst.len().min(buf.len());
        for (slot, byte) in dst.iter_mut().zip(buf.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn mark_eof(&self) {
        self.eof.store(true, Ordering::Release);
    }

    fn at_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }
}

/// Per-peer substrate handle: reads from the shared stdin feed, writes
/// in-order data to stdout, sends segments over the socket.
struct UdpChannel {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    feed: Arc<StdinFeed>,
}

impl Channel for UdpChannel {
    fn input(&mut self, buf: &mut [u8]) -> Input {
        let n = self.feed.pop(buf);
        if n > 0 {
            Input::Data(n)
        } else if self.feed.at_eof() {
            Input::Eof
        } else {
            Input::Empty
        }
    }

    fn output(&mut self, data: &[u8]) -> usize {
        let mut stdout = io::stdout().lock();
        if data.is_empty() {
            // End-of-stream marker from the peer.
            let _ = stdout.flush();
            return 0;
        }
        match stdout.write_all(data).and_then(|_| stdout.flush()) {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("stdout write failed: {}", e);
                0
            }
        }
    }

    fn bufspace(&self) -> usize {
        // Stdout blocks rather than fills; the sink always has room.
        usize::MAX
    }

    fn send(&mut self, segment: &[u8]) -> io::Result<()> {
        self.socket.send_to(segment, self.peer).map(|_| ())
    }
}

/// Runs the endpoint until every session has torn down.
pub async fn run(config: Config) -> io::Result<()> {
    tokio::task::spawn_blocking(move || run_loop(&config))
        .await
        .expect("endpoint task panicked")
}

fn run_loop(config: &Config) -> io::Result<()> {
    let timer = config.session_config().timer;
    let socket = Arc::new(UdpSocket::bind(&config.network.bind)?);
    socket.set_read_timeout(Some(timer))?;
    info!("listening on {}", socket.local_addr()?);

    let feed = Arc::new(StdinFeed::default());
    spawn_stdin_reader(Arc::clone(&feed));

    let registry: SessionRegistry<UdpChannel> = SessionRegistry::new();
    let session_cfg = config.session_config();

    if let Some(remote) = &config.network.remote {
        let peer: SocketAddr = remote
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        info!("connecting to {}", peer);
        let channel = UdpChannel {
            socket: Arc::clone(&socket),
            peer,
            feed: Arc::clone(&feed),
        };
        registry.insert(peer, Session::new(channel, session_cfg.clone(), Instant::now()));
    }

    let mut datagram = [0u8; 65536];
    let mut last_tick = Instant::now();
    loop {
        match socket.recv_from(&mut datagram) {
            Ok((len, peer)) => {
                let now = Instant::now();
                if !registry.contains(peer) {
                    debug!("first datagram from {}, opening session", peer);
                    let channel = UdpChannel {
                        socket: Arc::clone(&socket),
                        peer,
                        feed: Arc::clone(&feed),
                    };
                    registry.insert(peer, Session::new(channel, session_cfg.clone(), now));
                }
                if let Err(e) = registry.on_segment(peer, &datagram[..len], now) {
                    warn!("dropping datagram from {}: {}", peer, e);
                }
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        registry.on_readable(now);

        if now.duration_since(last_tick) >= timer {
            last_tick = now;
            let destroyed = registry.tick(now);
            for peer in &destroyed {
                info!("connection to {} closed", peer);
            }
            if !destroyed.is_empty() && registry.is_empty() {
                info!("all connections closed, shutting down");
                return Ok(());
            }
        }
    }
}

/// Feeds stdin into the shared buffer from a dedicated thread; the session
/// polls it through `Channel::input`.
fn spawn_stdin_reader(feed: Arc<StdinFeed>) {
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut chunk = [0u8; 4096];
            loop {
                match stdin.read(&mut chunk) {
                    Ok(0) => {
                        debug!("stdin reached EOF");
                        feed.mark_eof();
                        return;
                    }
                    Ok(n) => feed.push(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        feed.mark_eof();
                        return;
                    }
                }
            }
        })
        .expect("failed to spawn stdin reader thread");
}
