//! Recording signaling channel
//!
//! Every envelope the session sends is kept in order. The test plays the
//! relay server through `inject` and `close_from_server`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use meshmeet_client::error::ChannelError;
use meshmeet_client::network::{ChannelEvent, ChannelEvents, SignalingChannel, SignalingConnector};
use meshmeet_protocol::{Envelope, EnvelopeKind};
use tokio::sync::mpsc;

#[derive(Default)]
struct Wire {
    sent: Vec<Envelope>,
    close_calls: usize,
    closed: bool,
    inbound: Option<mpsc::UnboundedSender<ChannelEvent>>,
    refuse: Option<ChannelError>,
    reject_preflight: Option<ChannelError>,
    preflights: usize,
    connects: usize,
}

#[derive(Default)]
pub struct FakeSignaling {
    wire: Arc<Mutex<Wire>>,
}

impl FakeSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next connects with `error`
    pub fn refuse(&self, error: ChannelError) {
        self.wire.lock().unwrap().refuse = Some(error);
    }

    pub fn reject_preflight(&self, error: ChannelError) {
        self.wire.lock().unwrap().reject_preflight = Some(error);
    }

    /// Deliver an envelope as if relayed by the server
    pub fn inject(&self, envelope: Envelope) {
        self.deliver(ChannelEvent::Message(envelope));
    }

    pub fn close_from_server(&self, code: u16, reason: &str) {
        self.deliver(ChannelEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    fn deliver(&self, event: ChannelEvent) {
        let wire = self.wire.lock().unwrap();
        let inbound = wire.inbound.as_ref().expect("channel was never opened");
        inbound.send(event).expect("session stopped reading the channel");
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.wire.lock().unwrap().sent.clone()
    }

    pub fn sent_of(&self, kind: EnvelopeKind) -> Vec<Envelope> {
        self.sent().into_iter().filter(|e| e.kind == kind).collect()
    }

    pub fn close_calls(&self) -> usize {
        self.wire.lock().unwrap().close_calls
    }

    pub fn preflights(&self) -> usize {
        self.wire.lock().unwrap().preflights
    }

    pub fn connects(&self) -> usize {
        self.wire.lock().unwrap().connects
    }
}

struct FakeChannel {
    wire: Arc<Mutex<Wire>>,
}

impl SignalingChannel for FakeChannel {
    fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let mut wire = self.wire.lock().unwrap();
        if wire.closed {
            return Err(ChannelError::NotOpen);
        }
        wire.sent.push(envelope);
        Ok(())
    }

    fn close(&self) {
        let mut wire = self.wire.lock().unwrap();
        wire.close_calls += 1;
        wire.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.wire.lock().unwrap().closed
    }
}

#[async_trait]
impl SignalingConnector for FakeSignaling {
    async fn preflight(&self, _code: &str) -> Result<(), ChannelError> {
        let mut wire = self.wire.lock().unwrap();
        wire.preflights += 1;
        match wire.reject_preflight.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn connect(
        &self,
        _code: &str,
    ) -> Result<(Box<dyn SignalingChannel>, ChannelEvents), ChannelError> {
        let mut wire = self.wire.lock().unwrap();
        wire.connects += 1;
        if let Some(e) = wire.refuse.clone() {
            return Err(e);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        wire.inbound = Some(tx);
        wire.closed = false;
        let channel = FakeChannel {
            wire: self.wire.clone(),
        };
        Ok((Box::new(channel), rx))
    }
}
