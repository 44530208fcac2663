//! Engine wrapper that records how the session loop used it.
//!
//! Wraps any [`ConnectionEngine`] so tests can check teardown and packet
//! ownership on the real engine: one session created and destroyed, the
//! engine terminated once, every received packet released, and on which
//! ticks payloads went out.

use std::sync::{Arc, Mutex, PoisonError};

use echoprobe_core::{ConnectionEngine, EngineError, EngineSession, ReceivedPacket};
use echoprobe_proto::{ClientState, ConnectToken};

/// Calls observed on a [`RecordingEngine`] and its sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Sessions created.
    pub sessions_created: u64,
    /// Sessions destroyed.
    pub sessions_destroyed: u64,
    /// Times the engine was terminated.
    pub engines_terminated: u64,
    /// Service calls, one per tick.
    pub services: u64,
    /// Tick (zero-based service call) of every payload send.
    pub send_ticks: Vec<u64>,
    /// Packets handed out by `try_receive`.
    pub packets_received: u64,
    /// Packets handed back.
    pub packets_released: u64,
}

impl EngineStats {
    /// Packets handed out and not yet released.
    pub const fn outstanding(&self) -> u64 {
        self.packets_received.saturating_sub(self.packets_released)
    }

    /// Payloads sent.
    pub fn payloads_sent(&self) -> u64 {
        self.send_ticks.len() as u64
    }
}

/// Shared view of a recording engine's [`EngineStats`].
#[derive(Debug, Clone, Default)]
pub struct StatsHandle(Arc<Mutex<EngineStats>>);

impl StatsHandle {
    /// Copy of the current counters.
    pub fn snapshot(&self) -> EngineStats {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut EngineStats)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// A [`ConnectionEngine`] that records every call before delegating.
#[derive(Debug)]
pub struct RecordingEngine<E> {
    inner: E,
    stats: StatsHandle,
}

impl<E: ConnectionEngine> RecordingEngine<E> {
    /// Record calls on `inner`.
    pub fn new(inner: E) -> Self {
        Self { inner, stats: StatsHandle::default() }
    }

    /// Counters shared with the engine's sessions.
    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }
}

impl<E: ConnectionEngine> ConnectionEngine for RecordingEngine<E> {
    type Session = RecordingSession<E::Session>;

    fn create_session(
        &mut self,
        bind_address: &str,
        time: f64,
    ) -> Result<Self::Session, EngineError> {
        let inner = self.inner.create_session(bind_address, time)?;
        self.stats.update(|s| s.sessions_created += 1);
        Ok(RecordingSession { inner, stats: self.stats.clone() })
    }

    fn terminate(&mut self) {
        self.stats.update(|s| s.engines_terminated += 1);
        self.inner.terminate();
    }
}

/// Session half of [`RecordingEngine`].
#[derive(Debug)]
pub struct RecordingSession<S> {
    inner: S,
    stats: StatsHandle,
}

impl<S: EngineSession> EngineSession for RecordingSession<S> {
    fn connect(&mut self, token: ConnectToken) {
        self.inner.connect(token);
    }

    fn service(&mut self, time: f64) {
        self.stats.update(|s| s.services += 1);
        self.inner.service(time);
    }

    fn state(&self) -> ClientState {
        self.inner.state()
    }

    fn send_packet(&mut self, payload: &[u8]) {
        self.stats.update(|s| {
            let tick = s.services.saturating_sub(1);
            s.send_ticks.push(tick);
        });
        self.inner.send_packet(payload);
    }

    fn try_receive(&mut self) -> Option<ReceivedPacket> {
        let packet = self.inner.try_receive()?;
        self.stats.update(|s| s.packets_received += 1);
        Some(packet)
    }

    fn release_packet(&mut self, packet: ReceivedPacket) {
        self.stats.update(|s| s.packets_released += 1);
        self.inner.release_packet(packet);
    }

    fn destroy(&mut self) {
        self.stats.update(|s| s.sessions_destroyed += 1);
        self.inner.destroy();
    }
}
