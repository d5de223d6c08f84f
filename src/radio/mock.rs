//! Mock radio for testing and simulation.
//!
//! Clones share state, so a test can keep one handle while the link owns
//! another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::radio::Radio;
use crate::radio::irq::{IrqHandle, RadioEvent};

/// A transmission recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Destination address.
    pub destination: u8,
    /// Transmitted bytes.
    pub data: Bytes,
    /// Whether a hardware acknowledgement was requested.
    pub require_ack: bool,
    /// Outcome reported to the caller.
    pub delivered: bool,
}

type ReplyHook = Box<dyn FnMut(&SentFrame) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct MockState {
    init_ok: bool,
    init_calls: Vec<(u8, u8)>,
    send_script: VecDeque<bool>,
    sent: Vec<SentFrame>,
    inbox: VecDeque<Vec<u8>>,
    reply: Option<ReplyHook>,
    irq: Option<IrqHandle>,
}

/// Scriptable in-memory transceiver.
///
/// Sends succeed unless a scripted outcome says otherwise. A reply hook can
/// play the other end of the link by queueing frames in answer to a delivered
/// transmission.
#[derive(Clone)]
pub struct MockRadio {
    state: Arc<Mutex<MockState>>,
}

impl MockRadio {
    /// Creates a mock that initializes and delivers successfully.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                init_ok: true,
                ..MockState::default()
            })),
        }
    }

    /// Attaches an interrupt handle; the mock then reports its activity as
    /// events and accepts [`Radio::start_send`].
    #[must_use]
    pub fn with_irq(self, handle: IrqHandle) -> Self {
        self.lock().irq = Some(handle);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets whether `init` succeeds.
    pub fn set_init_ok(&self, ok: bool) {
        self.lock().init_ok = ok;
    }

    /// Queues outcomes for the next sends. Unscripted sends succeed.
    pub fn script_sends(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.lock().send_script.extend(outcomes);
    }

    /// Queues a frame for reception.
    pub fn push_inbound(&self, frame: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.inbox.push_back(frame.into());
        if let Some(irq) = &state.irq {
            irq.notify(RadioEvent::DataReady);
        }
    }

    /// Installs a hook answering delivered transmissions.
    pub fn on_send<F>(&self, hook: F)
    where
        F: FnMut(&SentFrame) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.lock().reply = Some(Box::new(hook));
    }

    /// Returns every recorded transmission.
    #[must_use]
    pub fn sent(&self) -> Vec<SentFrame> {
        self.lock().sent.clone()
    }

    /// Returns the number of transmission attempts.
    #[must_use]
    pub fn send_attempts(&self) -> usize {
        self.lock().sent.len()
    }

    /// Forgets recorded transmissions.
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Returns the `(address, channel)` of every `init` call.
    #[must_use]
    pub fn init_calls(&self) -> Vec<(u8, u8)> {
        self.lock().init_calls.clone()
    }

    /// Returns the number of frames waiting for reception.
    #[must_use]
    pub fn inbound_len(&self) -> usize {
        self.lock().inbox.len()
    }

    fn transmit(&self, destination: u8, data: &[u8], require_ack: bool) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        let delivered = state.send_script.pop_front().unwrap_or(true);
        let frame = SentFrame {
            destination,
            data: Bytes::copy_from_slice(data),
            require_ack,
            delivered,
        };

        if delivered {
            if let Some(hook) = state.reply.as_mut() {
                let replies = hook(&frame);
                state.inbox.extend(replies);
            }
        }
        state.sent.push(frame);
        delivered
    }
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockRadio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockRadio")
            .field("init_ok", &state.init_ok)
            .field("sent", &state.sent.len())
            .field("inbox", &state.inbox.len())
            .finish_non_exhaustive()
    }
}

impl Radio for MockRadio {
    fn init(&mut self, address: u8, channel: u8) -> bool {
        let mut state = self.lock();
        state.init_calls.push((address, channel));
        state.init_ok
    }

    fn send(&mut self, destination: u8, data: &[u8], require_ack: bool) -> bool {
        let before = self.inbound_len();
        let delivered = self.transmit(destination, data, require_ack);
        self.notify_replies(before);
        delivered
    }

    fn has_data(&mut self) -> usize {
        self.lock().inbox.front().map_or(0, Vec::len)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let Some(frame) = self.lock().inbox.pop_front() else {
            return 0;
        };
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        n
    }

    fn start_send(&mut self, destination: u8, data: &[u8], require_ack: bool) -> bool {
        let Some(irq) = self.lock().irq.clone() else {
            return false;
        };
        let before = self.inbound_len();
        let delivered = self.transmit(destination, data, require_ack);
        irq.notify(if delivered {
            RadioEvent::SendOk
        } else {
            RadioEvent::SendFailed
        });
        self.notify_replies(before);
        true
    }
}

impl MockRadio {
    fn notify_replies(&self, before: usize) {
        let state = self.lock();
        if let Some(irq) = &state.irq {
            for _ in before..state.inbox.len() {
                irq.notify(RadioEvent::DataReady);
            }
        }
    }
}
