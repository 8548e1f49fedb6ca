//! Broker transport
//!
//! Subscribes to the fax topic and hands every received payload to the
//! spool. A message is acknowledged to the broker only after the spool has
//! committed it to disk, so a crash between receipt and print never loses
//! a fax; at worst the broker redelivers and it prints twice.
//!
//! Connection failures are never fatal: the client retries forever with
//! [`Backoff`], while the scheduler keeps serving buttons.

mod acks;
mod backoff;
mod broker_url;

pub use acks::PendingAcks;
pub use backoff::{Backoff, INITIAL_RETRY_DELAY, MAX_RETRY_DELAY};
pub use broker_url::{BrokerUrl, DEFAULT_PORT};

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
};
use shared::FAX_TOPIC;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::spool::{EntryId, Spool, SpoolResult};

/// Bound on the CONNECT/CONNACK handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Timeout after {0:?} while connecting to broker")]
    ConnectTimeout(Duration),

    #[error("Broker rejected credentials: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    #[error("Client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Live broker session
pub struct Connection {
    client: AsyncClient,
    eventloop: EventLoop,
}

enum SessionEnd {
    Shutdown,
    Disconnected(String),
}

/// Durably spool a payload, then wake the scheduler
///
/// The wake-up is best effort: a full channel already has a drain pending,
/// and the drain empties the whole spool.
pub async fn spool_and_signal(
    spool: &Spool,
    payload: &[u8],
    spool_ready: &mpsc::Sender<()>,
) -> SpoolResult<EntryId> {
    let id = spool.enqueue(payload).await?;
    match spool_ready.try_send(()) {
        Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
        Err(mpsc::error::TrySendError::Closed(())) => {
            warn!(entry = %id, "Scheduler is gone, entry stays spooled");
        }
    }
    Ok(id)
}

/// MQTT client feeding the spool
pub struct TransportClient {
    url: BrokerUrl,
    client_id: String,
    qos: QoS,
    connect_timeout: Duration,
    spool: Arc<Spool>,
    spool_ready: mpsc::Sender<()>,
}

impl TransportClient {
    pub fn new(
        url: BrokerUrl,
        client_id: impl Into<String>,
        qos: QoS,
        spool: Arc<Spool>,
        spool_ready: mpsc::Sender<()>,
    ) -> Self {
        Self {
            url,
            client_id: client_id.into(),
            qos,
            connect_timeout: CONNECT_TIMEOUT,
            spool,
            spool_ready,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.url.host, self.url.port);
        options.set_keep_alive(KEEP_ALIVE);
        // Persistent session: unacknowledged messages survive our restarts
        options.set_clean_session(false);
        options.set_manual_acks(true);
        if let Some(username) = &self.url.username {
            options.set_credentials(username, self.url.password.as_deref().unwrap_or(""));
        }
        options
    }

    /// Open a session and wait for the broker's CONNACK
    pub async fn connect(&self) -> TransportResult<Connection> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CHANNEL_CAPACITY);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        };
        let result = tokio::time::timeout(self.connect_timeout, handshake).await;

        match result {
            Err(_) => Err(TransportError::ConnectTimeout(self.connect_timeout)),
            Ok(Err(e)) => Err(classify(e)),
            Ok(Ok(ack)) => {
                info!(
                    broker = %self.url,
                    session_present = ack.session_present,
                    "Connected to broker"
                );
                Ok(Connection { client, eventloop })
            }
        }
    }

    /// Connect, receive, reconnect; returns only on shutdown
    pub async fn run(self, shutdown: CancellationToken) {
        info!(broker = %self.url, client_id = %self.client_id, "Transport client started");
        let mut backoff = Backoff::default();

        loop {
            let attempt = tokio::select! {
                _ = shutdown.cancelled() => break,
                attempt = self.connect() => attempt,
            };

            match attempt {
                Ok(connection) => {
                    backoff.reset();
                    match self.serve(connection, &shutdown).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Disconnected(reason) => {
                            warn!(reason = %reason, "Disconnected from broker");
                        }
                    }
                }
                Err(e) => {
                    info!(error = %e, "Cannot connect to broker");
                }
            }

            let delay = backoff.next_delay();
            info!(delay_secs = delay.as_secs_f32(), "Retrying broker connection");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Transport client stopped");
    }

    async fn serve(&self, mut connection: Connection, shutdown: &CancellationToken) -> SessionEnd {
        if let Err(e) = connection.client.subscribe(FAX_TOPIC, self.qos).await {
            return SessionEnd::Disconnected(e.to_string());
        }
        info!(topic = FAX_TOPIC, qos = ?self.qos, "Subscribed, waiting for faxes");

        let mut acks = PendingAcks::new();
        loop {
            acks.flush(&connection.client);

            let event = tokio::select! {
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                event = connection.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match spool_and_signal(&self.spool, &publish.payload, &self.spool_ready).await
                    {
                        Ok(id) => {
                            info!(entry = %id, bytes = publish.payload.len(), "Fax spooled");
                            acks.push(publish);
                        }
                        Err(e) => {
                            // Unacked: dropping the session makes the broker redeliver
                            error!(error = %e, "Cannot spool fax, dropping session");
                            return SessionEnd::Disconnected(e.to_string());
                        }
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!(return_codes = ?ack.return_codes, "Subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => return SessionEnd::Disconnected(e.to_string()),
            }
        }
    }
}

fn classify(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::ConnectionRefused(
            code @ (ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized),
        ) => TransportError::Auth(format!("{:?}", code)),
        other => TransportError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spool_and_signal() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(dir.path()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(1);

        let first = spool_and_signal(&spool, b"a", &tx).await.unwrap();
        // Channel full: still spooled, no error
        let second = spool_and_signal(&spool, b"b", &tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(()));
        assert!(rx.try_recv().is_err());
        assert_eq!(spool.list_pending().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_spool_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(dir.path()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        drop(dir);

        assert!(spool_and_signal(&spool, b"a", &tx).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_classify_auth() {
        let err = classify(ConnectionError::ConnectionRefused(
            ConnectReturnCode::BadUserNamePassword,
        ));
        assert!(matches!(err, TransportError::Auth(_)));

        let err = classify(ConnectionError::ConnectionRefused(
            ConnectReturnCode::ServiceUnavailable,
        ));
        assert!(matches!(err, TransportError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_unreachable_broker_fails() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Arc::new(Spool::open(dir.path()).await.unwrap());
        let (tx, _rx) = mpsc::channel(1);
        let url = BrokerUrl::parse("mqtt://127.0.0.1:1").unwrap();

        let client = TransportClient::new(url, "test", QoS::AtLeastOnce, spool, tx)
            .with_connect_timeout(Duration::from_millis(500));
        let err = client.connect().await.err().expect("connect must fail");
        assert!(matches!(
            err,
            TransportError::Connection(_) | TransportError::ConnectTimeout(_)
        ));
    }
}
