//! Request/response exchange over a notifying characteristic.
//!
//! Each request arms a single reply slot before writing. The notification
//! handler decodes incoming frames and resolves the slot once a terminal frame
//! (or an error) arrives. Frames arriving while nothing is armed are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{self, Command, NONCE_SIZE, SharedKey};
use crate::transport::Characteristic;

/// Default time to wait for a complete reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How frames on this channel are wrapped.
#[derive(Debug, Clone)]
pub enum Framing {
    Unencrypted,
    Encrypted { auth_id: [u8; 4], key: SharedKey },
}

impl Framing {
    fn encode(&self, command: &Command) -> Result<Vec<u8>> {
        match self {
            Self::Unencrypted => Ok(protocol::build_unencrypted(command)),
            Self::Encrypted { auth_id, key } => {
                let nonce = protocol::random_bytes::<NONCE_SIZE>();
                protocol::build_encrypted(command, auth_id, key, &nonce)
            }
        }
    }

    fn decode(&self, frame: &[u8]) -> Result<Command> {
        match self {
            Self::Unencrypted => protocol::parse_unencrypted(frame),
            Self::Encrypted { auth_id, key } => protocol::parse_encrypted(frame, auth_id, key),
        }
    }
}

/// A multi-frame exchange that ended in an error.
#[derive(Debug)]
pub struct Interrupted {
    /// Frames decoded before the error, in receipt order.
    pub received: Vec<Command>,
    pub error: Error,
}

type Outcome = std::result::Result<Vec<Command>, Interrupted>;
type TerminalCheck = Box<dyn Fn(&Command) -> bool + Send>;

struct PendingReply {
    framing: Framing,
    received: Vec<Command>,
    is_terminal: TerminalCheck,
    reply: oneshot::Sender<Outcome>,
    /// Signalled on every non-terminal frame so the waiter can restart its deadline.
    progress: Arc<Notify>,
}

#[derive(Default)]
struct Slot {
    pending: Option<PendingReply>,
    closed: bool,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Called on the transport's notification context.
fn on_notification(slot: &Mutex<Slot>, event: Result<Vec<u8>>) {
    let mut slot = lock(slot);
    let closing = matches!(event, Err(Error::Disconnected));
    if closing {
        slot.closed = true;
    }

    let Some(pending) = slot.pending.as_mut() else {
        match event {
            Ok(frame) => warn!("Dropping unsolicited notification ({} bytes)", frame.len()),
            Err(e) => debug!("Notification error with no request pending: {}", e),
        }
        return;
    };

    match event.and_then(|frame| pending.framing.decode(&frame)) {
        Ok(command) => {
            debug!("Received {}", command.name());
            let done = (pending.is_terminal)(&command);
            pending.received.push(command);
            if done {
                if let Some(pending) = slot.pending.take() {
                    let _ = pending.reply.send(Ok(pending.received));
                }
            } else {
                pending.progress.notify_one();
            }
        }
        Err(error) => {
            if let Some(pending) = slot.pending.take() {
                let _ = pending.reply.send(Err(Interrupted {
                    received: pending.received,
                    error,
                }));
            }
        }
    }
}

/// One logical conversation with the lock over a single characteristic.
pub struct Session<C: Characteristic> {
    characteristic: C,
    framing: Framing,
    slot: Arc<Mutex<Slot>>,
    timeout: Duration,
}

impl<C: Characteristic> Session<C> {
    /// Enable notifications on `characteristic` and start an unencrypted session.
    pub async fn open(characteristic: C) -> Result<Self> {
        let slot = Arc::new(Mutex::new(Slot::default()));
        let handler_slot = Arc::clone(&slot);
        characteristic
            .enable_notifications(Arc::new(move |event| on_notification(&handler_slot, event)))
            .await?;

        Ok(Self {
            characteristic,
            framing: Framing::Unencrypted,
            slot,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Open a session that encrypts every frame for `auth_id`.
    pub async fn open_encrypted(characteristic: C, auth_id: [u8; 4], key: SharedKey) -> Result<Self> {
        let mut session = Self::open(characteristic).await?;
        session.set_encryption(auth_id, key);
        Ok(session)
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Switch subsequent requests to encrypted framing.
    pub fn set_encryption(&mut self, auth_id: [u8; 4], key: SharedKey) {
        self.framing = Framing::Encrypted { auth_id, key };
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    pub fn characteristic(&self) -> &C {
        &self.characteristic
    }

    /// Send `command` and wait for exactly one reply frame.
    pub async fn request(&self, command: &Command) -> Result<Command> {
        let mut frames = self
            .request_stream(command, |_| true)
            .await
            .map_err(|interrupted| interrupted.error)?;
        frames.pop().ok_or(Error::Disconnected)
    }

    /// Send `command` and collect reply frames until `is_terminal` accepts one.
    /// The terminal frame is the last element. The timeout applies to the gap
    /// between frames, not to the whole stream.
    pub async fn request_stream<F>(&self, command: &Command, is_terminal: F) -> std::result::Result<Vec<Command>, Interrupted>
    where
        F: Fn(&Command) -> bool + Send + 'static,
    {
        let interrupted = |error| Interrupted {
            received: Vec::new(),
            error,
        };

        let frame = self.framing.encode(command).map_err(interrupted)?;
        let (mut receiver, progress) = self.arm(Box::new(is_terminal)).map_err(interrupted)?;

        debug!("Sending {}", command.name());
        if let Err(error) = self.characteristic.write(&frame).await {
            lock(&self.slot).pending = None;
            return Err(interrupted(error));
        }

        loop {
            tokio::select! {
                outcome = &mut receiver => {
                    return match outcome {
                        Ok(outcome) => outcome,
                        Err(_) => Err(interrupted(Error::Disconnected)),
                    };
                }
                _ = progress.notified() => continue,
                _ = tokio::time::sleep(self.timeout) => {
                    let received = lock(&self.slot)
                        .pending
                        .take()
                        .map(|pending| pending.received)
                        .unwrap_or_default();
                    warn!("Timed out waiting for reply to {}", command.name());
                    return Err(Interrupted {
                        received,
                        error: Error::Timeout,
                    });
                }
            }
        }
    }

    fn arm(&self, is_terminal: TerminalCheck) -> Result<(oneshot::Receiver<Outcome>, Arc<Notify>)> {
        let mut slot = lock(&self.slot);
        if slot.closed {
            return Err(Error::Disconnected);
        }
        if slot.pending.is_some() {
            return Err(Error::RequestInFlight);
        }
        let (reply, receiver) = oneshot::channel();
        let progress = Arc::new(Notify::new());
        slot.pending = Some(PendingReply {
            framing: self.framing.clone(),
            received: Vec::new(),
            is_terminal,
            reply,
            progress: Arc::clone(&progress),
        });
        Ok((receiver, progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::Generation;
    use crate::protocol::{CommandCode, StatusCode};
    use crate::testing::FakeLock;

    #[tokio::test]
    async fn test_request_single_reply() {
        let lock = FakeLock::new(Generation::Legacy);
        let session = Session::open(lock.characteristic(false)).await.unwrap();

        let reply = session.request(&Command::RequestData(CommandCode::PublicKey)).await.unwrap();
        assert_eq!(reply, Command::PublicKey(lock.sim().keypair.public_bytes()));
    }

    #[tokio::test]
    async fn test_unsolicited_frame_is_dropped() {
        let lock = FakeLock::new(Generation::Legacy);
        let session = Session::open(lock.characteristic(false)).await.unwrap();

        lock.notify(Ok(protocol::build_unencrypted(&Command::Status(StatusCode::Complete))));
        lock.notify(Ok(vec![0xDE, 0xAD]));

        let reply = session.request(&Command::RequestData(CommandCode::PublicKey)).await.unwrap();
        assert!(matches!(reply, Command::PublicKey(_)));
    }

    #[tokio::test]
    async fn test_error_report_fails_request() {
        let lock = FakeLock::new(Generation::Legacy);
        let session = Session::open(lock.characteristic(false)).await.unwrap();

        match session.request(&Command::RequestData(CommandCode::Challenge)).await {
            Err(Error::DeviceReport(report)) => {
                assert_eq!(report.code, 0x10);
                assert_eq!(report.command(), Some(CommandCode::RequestData));
            }
            other => panic!("expected device report, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_frees_slot() {
        let lock = FakeLock::new(Generation::Legacy);
        lock.sim().silent = true;
        let session = Session::open(lock.characteristic(false))
            .await
            .unwrap()
            .with_timeout(Duration::from_millis(50));

        let result = session.request(&Command::RequestData(CommandCode::PublicKey)).await;
        assert!(matches!(result, Err(Error::Timeout)));

        lock.sim().silent = false;
        let reply = session.request(&Command::RequestData(CommandCode::PublicKey)).await.unwrap();
        assert!(matches!(reply, Command::PublicKey(_)));
    }

    #[tokio::test]
    async fn test_stream_deadline_restarts_on_each_frame() {
        let lock = FakeLock::new(Generation::Legacy);
        lock.sim().silent = true;
        let session = Session::open(lock.characteristic(false))
            .await
            .unwrap()
            .with_timeout(Duration::from_millis(100));

        let feeder = async {
            let mut statuses = vec![StatusCode::Accepted; 5];
            statuses.push(StatusCode::Complete);
            for status in statuses {
                tokio::time::sleep(Duration::from_millis(40)).await;
                lock.notify(Ok(protocol::build_unencrypted(&Command::Status(status))));
            }
        };
        let command = Command::RequestData(CommandCode::KeyturnerStates);
        let (frames, ()) = tokio::join!(
            session.request_stream(&command, |c| matches!(c, Command::Status(StatusCode::Complete))),
            feeder
        );

        let frames = frames.unwrap();
        assert_eq!(frames.len(), 6);
        assert_eq!(frames.last(), Some(&Command::Status(StatusCode::Complete)));
    }

    #[tokio::test]
    async fn test_second_request_while_pending() {
        let lock = FakeLock::new(Generation::Legacy);
        lock.sim().silent = true;
        let session = Session::open(lock.characteristic(false))
            .await
            .unwrap()
            .with_timeout(Duration::from_millis(50));

        let command = Command::RequestData(CommandCode::PublicKey);
        let (first, second) = tokio::join!(session.request(&command), session.request(&command));
        assert!(matches!(first, Err(Error::Timeout)));
        assert!(matches!(second, Err(Error::RequestInFlight)));
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_and_later_requests() {
        let lock = FakeLock::new(Generation::Legacy);
        lock.sim().disconnect_on_write = true;
        let session = Session::open(lock.characteristic(false)).await.unwrap();

        let command = Command::RequestData(CommandCode::PublicKey);
        assert!(matches!(session.request(&command).await, Err(Error::Disconnected)));
        assert!(matches!(session.request(&command).await, Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_encrypted_session() {
        let lock = FakeLock::new(Generation::Gen5);
        let context = lock.pair_client();
        let session = Session::open_encrypted(lock.characteristic(true), context.auth_id, context.shared_key.clone())
            .await
            .unwrap();
        assert!(matches!(session.framing(), Framing::Encrypted { .. }));

        let reply = session.request(&Command::RequestData(CommandCode::Challenge)).await.unwrap();
        assert!(matches!(reply, Command::Challenge(_)));
    }

    #[tokio::test]
    async fn test_stream_keeps_partial_frames_on_error() {
        let lock = FakeLock::new(Generation::Legacy);
        let context = lock.pair_client();
        lock.sim().log_error_after = Some(2);
        let session = Session::open_encrypted(lock.characteristic(true), context.auth_id, context.shared_key.clone())
            .await
            .unwrap();

        let Command::Challenge(nonce) = session.request(&Command::RequestData(CommandCode::Challenge)).await.unwrap()
        else {
            panic!("expected challenge");
        };
        let command = Command::RequestLogEntries(protocol::RequestLogEntries {
            start_index: 0,
            count: 3,
            sort_order: protocol::LogSortOrder::Descending,
            total_count: false,
            nonce,
            pin: None,
        });
        let interrupted = session
            .request_stream(&command, |c| matches!(c, Command::Status(StatusCode::Complete)))
            .await
            .unwrap_err();
        assert_eq!(interrupted.received.len(), 2);
        assert!(matches!(interrupted.error, Error::DeviceReport(_)));
    }
}
