// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound dispatcher for unsolicited messages.
//!
//! A listener polls a receive-only endpoint and hands each datagram to every
//! registered callback on a bounded worker pool. Callback panics are logged
//! and never reach the poll loop.

use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;

use crate::config::{LISTENER_POLL_TIMEOUT, LISTENER_QUEUE_DEPTH, LISTENER_WORKERS};
use crate::transport::udp::{is_timeout, UdpEndpoint};

/// Callback invoked with a received datagram and its source address.
pub type PacketCallback = Arc<dyn Fn(&[u8], SocketAddr) + Send + Sync>;

/// One job for the worker pool.
struct Job {
    callback: PacketCallback,
    data: Arc<Vec<u8>>,
    source: SocketAddr,
}

/// Poll loop plus worker pool for one receive-only endpoint.
pub struct Listener {
    endpoint: Arc<UdpEndpoint>,
    callbacks: Arc<RwLock<Vec<PacketCallback>>>,
    shutdown: Arc<AtomicBool>,
    jobs: Sender<Job>,
    poll_thread: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Listener {
    /// Start a listener on `endpoint` with the default worker pool.
    #[must_use]
    pub fn start(endpoint: Arc<UdpEndpoint>) -> Self {
        Self::start_with_workers(endpoint, LISTENER_WORKERS)
    }

    /// Start a listener with `n_workers` callback workers.
    #[must_use]
    pub fn start_with_workers(endpoint: Arc<UdpEndpoint>, n_workers: usize) -> Self {
        let callbacks: Arc<RwLock<Vec<PacketCallback>>> = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (jobs, job_rx) = bounded::<Job>(LISTENER_QUEUE_DEPTH);

        let workers = (0..n_workers.max(1))
            .map(|worker| {
                let job_rx: Receiver<Job> = job_rx.clone();
                std::thread::Builder::new()
                    .name(format!("spinlink-listener-{}", worker))
                    .spawn(move || {
                        while let Ok(job) = job_rx.recv() {
                            let result = catch_unwind(AssertUnwindSafe(|| {
                                (job.callback)(&job.data, job.source);
                            }));
                            if result.is_err() {
                                log::error!("[LISTENER] callback panicked; dropped");
                            }
                        }
                    })
                    .expect("spawn listener worker")
            })
            .collect();

        let poll_thread = {
            let endpoint = Arc::clone(&endpoint);
            let callbacks = Arc::clone(&callbacks);
            let shutdown = Arc::clone(&shutdown);
            let jobs = jobs.clone();
            std::thread::Builder::new()
                .name("spinlink-listener-poll".to_string())
                .spawn(move || {
                    while !shutdown.load(Ordering::Acquire) {
                        match endpoint.receive_from(LISTENER_POLL_TIMEOUT) {
                            Ok((data, source)) => {
                                let data = Arc::new(data);
                                for callback in callbacks.read().iter() {
                                    let job = Job {
                                        callback: Arc::clone(callback),
                                        data: Arc::clone(&data),
                                        source,
                                    };
                                    if jobs.send(job).is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(err) if is_timeout(&err) => {}
                            Err(err) => {
                                log::warn!("[LISTENER] receive failed: {}", err);
                                return;
                            }
                        }
                    }
                })
                .expect("spawn listener poll thread")
        };

        Listener {
            endpoint,
            callbacks,
            shutdown,
            jobs,
            poll_thread: Some(poll_thread),
            workers,
        }
    }

    /// Endpoint this listener polls.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<UdpEndpoint> {
        &self.endpoint
    }

    /// Register a callback for every future datagram.
    pub fn add_callback(&self, callback: PacketCallback) {
        self.callbacks.write().push(callback);
    }

    /// Stop the poll loop and shut the pool down.
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.poll_thread.take() {
            let _ = handle.join();
        }
        // Dropping the last sender lets the workers drain and exit.
        let (stub, _) = bounded::<Job>(0);
        self.jobs = stub;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        log::debug!("[LISTENER] closed {}", self.endpoint.local_addr());
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("endpoint", &self.endpoint.local_addr())
            .field("n_callbacks", &self.callbacks.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn wait_for(counter: &AtomicUsize, target: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if counter.load(Ordering::SeqCst) >= target {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_callbacks_see_datagrams() {
        let endpoint = Arc::new(UdpEndpoint::bind_listener(0).expect("bind"));
        let port = endpoint.local_addr().port();
        let mut listener = Listener::start_with_workers(endpoint, 2);

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        listener.add_callback(Arc::new(move |data, _| {
            if data == b"tagged" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        for _ in 0..3 {
            sender
                .send_to(b"tagged", ("127.0.0.1", port))
                .expect("send");
        }
        assert!(wait_for(&seen, 3), "callbacks not invoked");
        listener.close();
    }

    #[test]
    fn test_panicking_callback_does_not_kill_loop() {
        let endpoint = Arc::new(UdpEndpoint::bind_listener(0).expect("bind"));
        let port = endpoint.local_addr().port();
        let mut listener = Listener::start_with_workers(endpoint, 1);

        listener.add_callback(Arc::new(|_, _| panic!("bad callback")));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        listener.add_callback(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        sender.send_to(b"one", ("127.0.0.1", port)).expect("send");
        sender.send_to(b"two", ("127.0.0.1", port)).expect("send");

        assert!(wait_for(&seen, 2), "loop died after callback panic");
        listener.close();
    }

    #[test]
    fn test_close_is_idempotent() {
        let endpoint = Arc::new(UdpEndpoint::bind_listener(0).expect("bind"));
        let mut listener = Listener::start_with_workers(endpoint, 1);
        listener.close();
        listener.close();
    }
}
