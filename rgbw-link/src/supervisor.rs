//! WebSocket link to the device with liveness supervision.
//!
//! One task owns the socket. It dispatches every inbound binary frame,
//! writes queued sends, and on each watchdog tick closes a socket that has
//! gone quiet. Whenever a socket ends it dials again, so at most one socket
//! is ever live.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rgbw_proto::{DecodeError, DeviceState, Dispatcher, Message, Request};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::watchdog::{Verdict, Watchdog};
use crate::LinkError;

pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEFAULT_REDIAL_DELAY: Duration = Duration::from_millis(500);

/// When to dial again after a socket closes or a dial fails. A socket closed
/// by the watchdog is always redialled at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Redial {
    /// On the next watchdog tick.
    #[default]
    NextTick,
    #[serde(rename = "fixed-delay-ms")]
    FixedDelay(#[serde(with = "millis")] Duration),
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub url: String,
    pub liveness_timeout: Duration,
    pub redial: Redial,
}

impl LinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            redial: Redial::default(),
        }
    }

    /// `ws://<host><path>`, the device's own web server.
    pub fn for_host(host: &str, path: &str) -> Self {
        Self::new(format!("ws://{host}{path}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Stopped,
    Connecting,
    Open,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The device closed the socket or the stream ended.
    Remote,
    Error,
    LivenessTimeout,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    /// Sent once per opened socket.
    Closed(CloseReason),
}

type Ack = oneshot::Sender<Result<(), LinkError>>;

struct Shared {
    config: LinkConfig,
    dispatcher: Mutex<Dispatcher>,
    outbound: Mutex<Option<mpsc::UnboundedSender<(Vec<u8>, Ack)>>>,
    status: watch::Sender<LinkStatus>,
    device: watch::Sender<DeviceState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn set_status(&self, status: LinkStatus) {
        self.status.send_replace(status);
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<(Vec<u8>, Ack)>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = tx;
    }

    fn notify(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Fold the frame into the live state if it decodes, then hand it raw to
    /// whatever is registered for its tag. Handlers run with the dispatcher
    /// unlocked and see every frame, including tags the catalog lacks.
    fn handle_frame(&self, frame: &[u8]) {
        let (limits, route) = {
            let dispatcher = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
            (dispatcher.limits(), dispatcher.route(frame))
        };
        match Message::from_frame(frame, limits) {
            Ok(message) => {
                log::trace!("ws frame: {message:?}");
                self.device.send_modify(|state| state.apply(message));
            }
            // The dispatcher already logged these.
            Err(DecodeError::EmptyFrame | DecodeError::UnknownTag(_)) => {}
            Err(e) => log::warn!("websocket frame left out of device state: {e}"),
        }
        if let Ok(route) = route {
            route.call(frame);
        }
    }
}

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// WebSocket transport for one device.
pub struct WsLink {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl WsLink {
    pub fn new(config: LinkConfig, dispatcher: Dispatcher) -> Self {
        let (status, _) = watch::channel(LinkStatus::Stopped);
        let (device, _) = watch::channel(DeviceState::default());
        let (events, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(Shared {
                config,
                dispatcher: Mutex::new(dispatcher),
                outbound: Mutex::new(None),
                status,
                device,
                events,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Register handlers on the injected dispatcher. Safe while running.
    pub fn with_dispatcher<R>(&self, f: impl FnOnce(&mut Dispatcher) -> R) -> R {
        let mut dispatcher = self
            .shared
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut dispatcher)
    }

    pub fn status(&self) -> LinkStatus {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.shared.status.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn device(&self) -> DeviceState {
        self.shared.device.borrow().clone()
    }

    pub fn watch_device(&self) -> watch::Receiver<DeviceState> {
        self.shared.device.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Start dialling. Does nothing if already running.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            log::debug!("websocket supervisor already running");
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(supervise(self.shared.clone(), stop_rx));
        *running = Some(Running { stop, task });
    }

    /// Close the socket and stop redialling.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            let _ = running.stop.send(true);
            if let Err(e) = running.task.await {
                log::error!("websocket supervisor panicked: {e}");
            }
        }
        self.shared.set_status(LinkStatus::Stopped);
    }

    pub async fn send(&self, request: &Request) -> Result<(), LinkError> {
        let frame = request.to_frame()?;
        log::debug!("ws send {}: {} bytes", request.message_type(), frame.len());
        self.send_frame(frame).await
    }

    /// Send a raw frame. Fails at once if no socket is open; nothing is
    /// queued for a later socket.
    pub async fn send_frame(&self, frame: Vec<u8>) -> Result<(), LinkError> {
        let outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(outbound) = outbound else {
            log::warn!("websocket is not open, frame not sent");
            return Err(LinkError::NotOpen);
        };
        let (ack, done) = oneshot::channel();
        outbound
            .send((frame, ack))
            .map_err(|_| LinkError::NotOpen)?;
        done.await.unwrap_or(Err(LinkError::NotOpen))
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        let running = self.running.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = running.take() {
            running.task.abort();
        }
    }
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        let stopped = *stop.borrow_and_update();
        if stopped || stop.changed().await.is_err() {
            return;
        }
    }
}

async fn supervise(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    let timeout = shared.config.liveness_timeout;
    // First tick one period out, so a NextTick redial after the first
    // failed dial still waits.
    let mut ticker = tokio::time::interval_at(Instant::now() + timeout, timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut watchdog = Watchdog::new(timeout);

    loop {
        shared.set_status(LinkStatus::Connecting);
        log::info!("connecting to {}", shared.config.url);
        let dialled = tokio::select! {
            _ = stop_requested(&mut stop) => break,
            dialled = tokio_tungstenite::connect_async(shared.config.url.as_str()) => dialled,
        };

        let reason = match dialled {
            Ok((socket, _)) => {
                let reason = session(&shared, socket, &mut watchdog, &mut ticker, &mut stop).await;
                shared.device.send_modify(DeviceState::reset);
                shared.set_status(LinkStatus::Disconnected);
                shared.notify(SessionEvent::Closed(reason));
                log::warn!("websocket closed: {reason:?}");
                reason
            }
            Err(e) => {
                log::warn!("websocket connect failed: {e}");
                shared.set_status(LinkStatus::Disconnected);
                CloseReason::Error
            }
        };

        match reason {
            CloseReason::Stopped => break,
            CloseReason::LivenessTimeout => continue,
            CloseReason::Remote | CloseReason::Error => {}
        }

        let wait = async {
            match shared.config.redial {
                Redial::NextTick => {
                    ticker.tick().await;
                }
                Redial::FixedDelay(delay) => tokio::time::sleep(delay).await,
            }
        };
        tokio::select! {
            _ = stop_requested(&mut stop) => break,
            _ = wait => {}
        }
    }

    shared.set_status(LinkStatus::Stopped);
    log::info!("websocket supervisor stopped");
}

async fn session(
    shared: &Shared,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    watchdog: &mut Watchdog,
    ticker: &mut Interval,
    stop: &mut watch::Receiver<bool>,
) -> CloseReason {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<(Vec<u8>, Ack)>();
    shared.set_outbound(Some(tx));
    watchdog.on_open(Instant::now());
    ticker.reset();
    shared.set_status(LinkStatus::Open);
    shared.notify(SessionEvent::Opened);
    log::info!("websocket open: {}", shared.config.url);

    let reason = loop {
        tokio::select! {
            _ = stop_requested(stop) => break CloseReason::Stopped,
            _ = ticker.tick() => {
                if watchdog.on_tick(Instant::now()) == Verdict::Expired {
                    log::warn!(
                        "no traffic for {:?}, closing websocket",
                        watchdog.timeout()
                    );
                    break CloseReason::LivenessTimeout;
                }
            }
            Some((frame, ack)) = rx.recv() => {
                let result = sink.send(WsMessage::binary(frame)).await.map_err(LinkError::from);
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    break CloseReason::Error;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Binary(data))) => {
                    watchdog.on_frame(Instant::now());
                    shared.handle_frame(&data);
                }
                Some(Ok(WsMessage::Text(text))) => {
                    watchdog.on_frame(Instant::now());
                    log::debug!("ignoring text frame: {text}");
                }
                Some(Ok(WsMessage::Close(_))) | None => break CloseReason::Remote,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("websocket error: {e}");
                    break CloseReason::Error;
                }
            },
        }
    };

    // Pending sends see their ack dropped and fail with NotOpen.
    shared.set_outbound(None);
    drop(rx);
    watchdog.on_close();
    if reason != CloseReason::Remote {
        let _ = sink.close().await;
    }
    reason
}
