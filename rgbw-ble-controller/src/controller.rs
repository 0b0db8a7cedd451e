//! Connection state machine and live device state for one BLE link.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use rgbw_proto::ble::{Command, Field, GattLayout};
use rgbw_proto::{DeviceState, Message, ProtocolLimits};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::link::{GattLink, LinkEvent, LinkEvents};
use crate::BleError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    DiscoveringServices,
    Subscribing,
    Ready,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::DiscoveringServices => "discovering services",
            LinkState::Subscribing => "subscribing",
            LinkState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Handle to the notification pump. Dropping it or calling
/// [`Subscription::cancel`] stops delivery.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// State shared with the notification pump.
struct Shared {
    layout: GattLayout,
    limits: ProtocolLimits,
    link_state: watch::Sender<LinkState>,
    device: watch::Sender<DeviceState>,
    updates: broadcast::Sender<Message>,
    capabilities: Mutex<BTreeSet<Field>>,
    /// Bumped whenever a connect attempt starts or the link is forgotten.
    /// Only changed with `link_state` held.
    epoch: AtomicU64,
}

impl Shared {
    /// Claim a disconnected link for one connect attempt.
    fn begin(&self) -> Option<u64> {
        let mut ticket = None;
        self.link_state.send_if_modified(|state| {
            if *state != LinkState::Disconnected {
                return false;
            }
            *state = LinkState::Connecting;
            ticket = Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });
        if ticket.is_some() {
            log::info!("ble link: {} -> {}", LinkState::Disconnected, LinkState::Connecting);
        }
        ticket
    }

    /// Step attempt `ticket` from `from` to `to`. Fails if the link was
    /// forgotten or moved on since.
    fn advance(&self, ticket: u64, from: LinkState, to: LinkState) -> Result<(), BleError> {
        let moved = self.link_state.send_if_modified(|state| {
            if *state != from || self.epoch.load(Ordering::SeqCst) != ticket {
                return false;
            }
            *state = to;
            true
        });
        if !moved {
            log::debug!("connect attempt {ticket} superseded before {to}");
            return Err(BleError::NotConnected);
        }
        log::info!("ble link: {from} -> {to}");
        Ok(())
    }

    fn set_capabilities(&self, ticket: u64, supported: BTreeSet<Field>) -> Result<(), BleError> {
        let mut current = false;
        self.link_state.send_if_modified(|_| {
            current = self.epoch.load(Ordering::SeqCst) == ticket;
            if current {
                if let Ok(mut capabilities) = self.capabilities.lock() {
                    *capabilities = supported;
                }
            }
            false
        });
        if current {
            Ok(())
        } else {
            Err(BleError::NotConnected)
        }
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == ticket
    }

    fn apply(&self, message: Message) {
        log::debug!("ble update: {message:?}");
        self.device.send_modify(|state| state.apply(message.clone()));
        // No receivers is fine.
        let _ = self.updates.send(message);
    }

    fn decode_and_apply(&self, field: Field, value: &[u8]) {
        match field.decode(value, self.limits) {
            Ok(message) => self.apply(message),
            Err(e) => log::warn!("dropping {field} value: {e}"),
        }
    }

    /// Forget the link: defaults everywhere, no capabilities.
    fn collapse(&self) {
        self.collapse_when(|_| true);
    }

    /// [`Shared::collapse`], but only while `ticket` still owns the link.
    fn collapse_if_current(&self, ticket: u64) -> bool {
        self.collapse_when(|epoch| epoch == ticket)
    }

    fn collapse_when(&self, owns: impl FnOnce(u64) -> bool) -> bool {
        let mut prev = None;
        self.link_state.send_if_modified(|state| {
            if !owns(self.epoch.load(Ordering::SeqCst)) {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut capabilities) = self.capabilities.lock() {
                capabilities.clear();
            }
            self.device.send_modify(DeviceState::reset);
            prev = Some(std::mem::replace(state, LinkState::Disconnected));
            true
        });
        match prev {
            Some(prev) => {
                if prev != LinkState::Disconnected {
                    log::info!("ble link: {prev} -> {}", LinkState::Disconnected);
                }
                true
            }
            None => false,
        }
    }
}

/// Owns one [`GattLink`] and keeps a [`DeviceState`] in sync with it.
pub struct BleController<L: GattLink> {
    link: Arc<L>,
    shared: Arc<Shared>,
    pump: Mutex<Option<Subscription>>,
}

impl<L: GattLink> BleController<L> {
    pub fn new(link: L, layout: GattLayout, limits: ProtocolLimits) -> Self {
        let (link_state, _) = watch::channel(LinkState::Disconnected);
        let (device, _) = watch::channel(DeviceState::default());
        let (updates, _) = broadcast::channel(64);
        Self {
            link: Arc::new(link),
            shared: Arc::new(Shared {
                layout,
                limits,
                link_state,
                device,
                updates,
                capabilities: Mutex::new(BTreeSet::new()),
                epoch: AtomicU64::new(0),
            }),
            pump: Mutex::new(None),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn state(&self) -> LinkState {
        *self.shared.link_state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.shared.link_state.subscribe()
    }

    /// Current device view.
    pub fn device(&self) -> DeviceState {
        self.shared.device.borrow().clone()
    }

    pub fn watch_device(&self) -> watch::Receiver<DeviceState> {
        self.shared.device.subscribe()
    }

    /// Every decoded read or notification, in arrival order.
    pub fn updates(&self) -> broadcast::Receiver<Message> {
        self.shared.updates.subscribe()
    }

    /// Whether the connected device exposes `field`. Always false while
    /// disconnected.
    pub fn supports(&self, field: Field) -> bool {
        self.shared
            .capabilities
            .lock()
            .map(|capabilities| capabilities.contains(&field))
            .unwrap_or(false)
    }

    pub fn capabilities(&self) -> Vec<Field> {
        self.shared
            .capabilities
            .lock()
            .map(|capabilities| capabilities.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Connect, discover, subscribe and read everything once. Any failure
    /// leaves the controller `Disconnected`. Calling this while already
    /// connected does nothing; calling it while another call is connecting
    /// waits for that attempt and reports whether it reached `Ready`.
    /// A [`BleController::disconnect`] during the attempt wins and the
    /// attempt fails with [`BleError::NotConnected`].
    pub async fn connect(&self) -> Result<(), BleError> {
        let Some(ticket) = self.shared.begin() else {
            return self.join_attempt().await;
        };
        match self.establish(ticket).await {
            Ok(()) => Ok(()),
            Err(e) if !self.shared.is_current(ticket) => {
                log::info!("ble connect abandoned: {e}");
                // Whoever forgot the link cleared it before our pump or
                // reads could land.
                if self.state() == LinkState::Disconnected {
                    self.stop_pump();
                    self.shared.device.send_modify(DeviceState::reset);
                }
                Err(e)
            }
            Err(e) => {
                log::warn!("ble connect failed: {e}");
                self.stop_pump();
                let _ = self.link.disconnect().await;
                self.shared.collapse_if_current(ticket);
                Err(e)
            }
        }
    }

    async fn join_attempt(&self) -> Result<(), BleError> {
        let mut state = self.watch_state();
        let settled = state
            .wait_for(|s| matches!(s, LinkState::Ready | LinkState::Disconnected))
            .await
            .map(|s| *s);
        match settled {
            Ok(LinkState::Ready) => Ok(()),
            _ => Err(BleError::NotConnected),
        }
    }

    async fn establish(&self, ticket: u64) -> Result<(), BleError> {
        self.link.connect().await?;

        self.shared
            .advance(ticket, LinkState::Connecting, LinkState::DiscoveringServices)?;
        let discovered = self.link.discover().await?;
        let mut supported = BTreeSet::new();
        let mut notifying = Vec::new();
        for (field, path) in self.shared.layout.fields() {
            if let Some(found) = discovered.iter().find(|d| d.path == path) {
                supported.insert(field);
                if field.notifiable() && found.notify {
                    notifying.push(path);
                }
            } else if field.optional() {
                log::info!("device has no {field} characteristic");
            } else {
                log::warn!("device is missing {field} characteristic {}", path.characteristic);
            }
        }
        self.shared.set_capabilities(ticket, supported.clone())?;

        self.shared
            .advance(ticket, LinkState::DiscoveringServices, LinkState::Subscribing)?;
        let events = self.link.events().await?;
        for path in notifying {
            self.link.subscribe(path).await?;
        }
        self.start_pump(ticket, events);

        for field in supported.iter().filter(|f| f.readable()) {
            self.refresh_field(*field).await?;
        }

        // Fails if the pump saw the link drop during the initial reads.
        self.shared
            .advance(ticket, LinkState::Subscribing, LinkState::Ready)
    }

    async fn refresh_field(&self, field: Field) -> Result<(), BleError> {
        let path = self
            .shared
            .layout
            .path(field)
            .ok_or(BleError::Unsupported(field))?;
        let value = self.link.read(path).await?;
        self.shared.decode_and_apply(field, &value);
        Ok(())
    }

    /// Read one field again and return its decoded value.
    pub async fn read(&self, field: Field) -> Result<Message, BleError> {
        let path = self.check(field)?;
        if !field.readable() {
            return Err(BleError::Unsupported(field));
        }
        let value = self.link.read(path).await?;
        let message = field.decode(&value, self.shared.limits)?;
        self.shared.apply(message.clone());
        Ok(message)
    }

    /// Encode and write `command`. Failures are returned and leave the
    /// connection as it was.
    pub async fn write(&self, command: &Command) -> Result<(), BleError> {
        let field = command.field();
        let path = self.check(field)?;
        let value = command.to_bytes(self.shared.limits)?;
        log::debug!("ble write {field}: {} bytes", value.len());
        self.link.write(path, &value).await
    }

    fn check(&self, field: Field) -> Result<rgbw_proto::ble::GattPath, BleError> {
        if self.state() != LinkState::Ready {
            return Err(BleError::NotConnected);
        }
        if !self.supports(field) {
            return Err(BleError::Unsupported(field));
        }
        self.shared
            .layout
            .path(field)
            .ok_or(BleError::Unsupported(field))
    }

    /// Drop the link and reset every field to its default.
    pub async fn disconnect(&self) -> Result<(), BleError> {
        self.stop_pump();
        let result = self.link.disconnect().await;
        self.shared.collapse();
        result
    }

    fn start_pump(&self, ticket: u64, mut events: LinkEvents) {
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    LinkEvent::Notification {
                        characteristic,
                        value,
                    } => match shared.layout.field_for(characteristic) {
                        Some(field) => shared.decode_and_apply(field, &value),
                        None => log::debug!("notification from unmapped {characteristic}"),
                    },
                    LinkEvent::Disconnected => break,
                }
            }
            if shared.collapse_if_current(ticket) {
                log::warn!("ble link lost");
            }
        });
        if let Ok(mut pump) = self.pump.lock() {
            *pump = Some(Subscription { task });
        }
    }

    fn stop_pump(&self) {
        let pump = self.pump.lock().ok().and_then(|mut pump| pump.take());
        if let Some(subscription) = pump {
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use futures::channel::mpsc;
    use rgbw_proto::ble::GattPath;
    use rgbw_proto::{LightState, OutputState, WiFiStatus};
    use uuid::Uuid;

    use super::*;
    use crate::link::Discovered;

    /// In-memory peripheral.
    #[derive(Default)]
    struct FakeLink {
        present: Vec<GattPath>,
        values: Mutex<HashMap<Uuid, Vec<u8>>>,
        writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
        subscribed: Mutex<Vec<Uuid>>,
        events: Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>,
        fail_writes: bool,
        fail_discovery: bool,
        connect_delay: Option<Duration>,
    }

    impl FakeLink {
        fn with_layout(layout: &GattLayout, skip: &[Field]) -> Self {
            Self {
                present: layout
                    .fields()
                    .filter(|(field, _)| !skip.contains(field))
                    .map(|(_, path)| path)
                    .collect(),
                ..Self::default()
            }
        }

        fn set_value(&self, layout: &GattLayout, field: Field, value: Vec<u8>) {
            let path = layout.path(field).unwrap();
            self.values.lock().unwrap().insert(path.characteristic, value);
        }

        fn emit(&self, event: LinkEvent) {
            let events = self.events.lock().unwrap();
            events.as_ref().unwrap().unbounded_send(event).unwrap();
        }
    }

    impl GattLink for FakeLink {
        async fn connect(&self) -> Result<(), BleError> {
            if let Some(delay) = self.connect_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        }

        async fn discover(&self) -> Result<Vec<Discovered>, BleError> {
            if self.fail_discovery {
                return Err(BleError::Gatt("discovery failed".into()));
            }
            Ok(self
                .present
                .iter()
                .map(|path| Discovered {
                    path: *path,
                    notify: true,
                })
                .collect())
        }

        async fn read(&self, path: GattPath) -> Result<Vec<u8>, BleError> {
            Ok(self
                .values
                .lock()
                .unwrap()
                .get(&path.characteristic)
                .cloned()
                .unwrap_or_default())
        }

        async fn write(&self, path: GattPath, value: &[u8]) -> Result<(), BleError> {
            if self.fail_writes {
                return Err(BleError::Gatt("write rejected".into()));
            }
            self.writes
                .lock()
                .unwrap()
                .push((path.characteristic, value.to_vec()));
            Ok(())
        }

        async fn subscribe(&self, path: GattPath) -> Result<(), BleError> {
            self.subscribed.lock().unwrap().push(path.characteristic);
            Ok(())
        }

        async fn events(&self) -> Result<LinkEvents, BleError> {
            let (tx, rx) = mpsc::unbounded();
            *self.events.lock().unwrap() = Some(tx);
            Ok(Box::pin(rx))
        }

        async fn disconnect(&self) -> Result<(), BleError> {
            self.events.lock().unwrap().take();
            Ok(())
        }
    }

    fn controller(link: FakeLink) -> BleController<FakeLink> {
        BleController::new(link, GattLayout::default(), ProtocolLimits::default())
    }

    fn red() -> OutputState {
        OutputState::new([
            LightState::new(true, 200),
            LightState::default(),
            LightState::default(),
            LightState::default(),
        ])
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn connect_reads_everything_once() {
        let layout = GattLayout::default();
        let link = FakeLink::with_layout(&layout, &[]);
        link.set_value(&layout, Field::DeviceName, b"porch".to_vec());
        link.set_value(&layout, Field::Heap, 50_000u32.to_le_bytes().to_vec());
        link.set_value(&layout, Field::OutputColor, red().to_bytes());
        link.set_value(&layout, Field::WiFiStatus, vec![1]);

        let ble = controller(link);
        ble.connect().await.unwrap();

        assert_eq!(ble.state(), LinkState::Ready);
        let device = ble.device();
        assert_eq!(device.device_name.as_deref(), Some("porch"));
        assert_eq!(device.free_heap, Some(50_000));
        assert_eq!(device.output, Some(red()));
        assert_eq!(device.wifi_status, WiFiStatus::Connected);

        let subscribed = ble.link().subscribed.lock().unwrap().clone();
        assert_eq!(subscribed.len(), 7);
        assert!(!subscribed.contains(&layout.path(Field::AlexaSettings).unwrap().characteristic));
    }

    #[tokio::test]
    async fn missing_service_is_an_absent_capability() {
        let layout = GattLayout::default();
        let ble = controller(FakeLink::with_layout(
            &layout,
            &[Field::AlexaSettings, Field::EspNowController],
        ));
        ble.connect().await.unwrap();

        assert!(ble.supports(Field::OutputColor));
        assert!(!ble.supports(Field::AlexaSettings));
        assert!(ble.device().alexa.is_none());
        assert!(matches!(
            ble.write(&Command::SetAlexaSettings(Default::default())).await,
            Err(BleError::Unsupported(Field::AlexaSettings))
        ));
        assert_eq!(ble.state(), LinkState::Ready);
    }

    #[tokio::test]
    async fn notifications_replace_fields() {
        let layout = GattLayout::default();
        let ble = controller(FakeLink::with_layout(&layout, &[]));
        ble.connect().await.unwrap();
        let mut updates = ble.updates();

        let color = layout.path(Field::OutputColor).unwrap().characteristic;
        ble.link().emit(LinkEvent::Notification {
            characteristic: color,
            value: red().to_bytes(),
        });
        // Garbled value: dropped, state untouched.
        ble.link().emit(LinkEvent::Notification {
            characteristic: color,
            value: vec![1, 2, 3],
        });
        settle().await;

        assert_eq!(ble.device().output, Some(red()));
        assert_eq!(updates.recv().await.unwrap(), Message::Color(red()));
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn writes_encode_commands() {
        let layout = GattLayout::default();
        let ble = controller(FakeLink::with_layout(&layout, &[]));
        ble.connect().await.unwrap();

        ble.write(&Command::SetColor(red())).await.unwrap();
        ble.write(&Command::Restart).await.unwrap();
        ble.write(&Command::StartWiFiScan).await.unwrap();

        let writes = ble.link().writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![
                (layout.path(Field::OutputColor).unwrap().characteristic, red().to_bytes()),
                (
                    layout.path(Field::DeviceRestart).unwrap().characteristic,
                    b"RESTART_NOW".to_vec()
                ),
                (layout.path(Field::WiFiScanStatus).unwrap().characteristic, vec![0]),
            ]
        );
    }

    #[tokio::test]
    async fn write_failure_keeps_connection() {
        let layout = GattLayout::default();
        let mut link = FakeLink::with_layout(&layout, &[]);
        link.fail_writes = true;
        let ble = controller(link);
        ble.connect().await.unwrap();

        assert!(matches!(
            ble.write(&Command::SetColor(red())).await,
            Err(BleError::Gatt(_))
        ));
        assert_eq!(ble.state(), LinkState::Ready);
    }

    #[tokio::test]
    async fn write_before_connect_is_rejected() {
        let ble = controller(FakeLink::with_layout(&GattLayout::default(), &[]));
        assert!(matches!(
            ble.write(&Command::Restart).await,
            Err(BleError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn link_loss_resets_state() {
        let layout = GattLayout::default();
        let link = FakeLink::with_layout(&layout, &[]);
        link.set_value(&layout, Field::DeviceName, b"porch".to_vec());
        let ble = controller(link);
        ble.connect().await.unwrap();
        assert!(ble.device().device_name.is_some());

        ble.link().emit(LinkEvent::Disconnected);
        settle().await;

        assert_eq!(ble.state(), LinkState::Disconnected);
        assert_eq!(ble.device(), DeviceState::default());
        assert!(!ble.supports(Field::DeviceName));

        // And it can come back.
        ble.connect().await.unwrap();
        assert_eq!(ble.state(), LinkState::Ready);
        assert_eq!(ble.device().device_name.as_deref(), Some("porch"));
    }

    #[tokio::test]
    async fn failed_discovery_collapses() {
        let mut link = FakeLink::with_layout(&GattLayout::default(), &[]);
        link.fail_discovery = true;
        let ble = controller(link);
        let mut states = ble.watch_state();

        assert!(ble.connect().await.is_err());
        assert_eq!(ble.state(), LinkState::Disconnected);
        assert!(states.has_changed().unwrap());
    }

    #[tokio::test]
    async fn disconnect_resets_and_stops_pump() {
        let layout = GattLayout::default();
        let link = FakeLink::with_layout(&layout, &[]);
        link.set_value(&layout, Field::Heap, 1u32.to_le_bytes().to_vec());
        let ble = controller(link);
        ble.connect().await.unwrap();

        ble.disconnect().await.unwrap();
        assert_eq!(ble.state(), LinkState::Disconnected);
        assert_eq!(ble.device().free_heap, None);
        assert!(ble.read(Field::Heap).await.is_err());
    }

    fn slow_link(layout: &GattLayout) -> FakeLink {
        let mut link = FakeLink::with_layout(layout, &[]);
        link.connect_delay = Some(Duration::from_millis(100));
        link
    }

    #[tokio::test]
    async fn concurrent_connect_joins_the_attempt() {
        let layout = GattLayout::default();
        let link = slow_link(&layout);
        link.set_value(&layout, Field::DeviceName, b"porch".to_vec());
        let ble = controller(link);

        let (first, second) = tokio::join!(ble.connect(), async {
            settle().await;
            assert_eq!(ble.state(), LinkState::Connecting);
            ble.connect().await
        });
        first.unwrap();
        second.unwrap();

        assert_eq!(ble.state(), LinkState::Ready);
        // One discovery's worth of subscriptions, not two.
        assert_eq!(ble.link().subscribed.lock().unwrap().len(), 7);
        // Connected already: nothing to do.
        ble.connect().await.unwrap();
        assert_eq!(ble.link().subscribed.lock().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn disconnect_during_connect_wins() {
        let layout = GattLayout::default();
        let link = slow_link(&layout);
        link.set_value(&layout, Field::DeviceName, b"porch".to_vec());
        let ble = controller(link);

        let (connected, disconnected) = tokio::join!(ble.connect(), async {
            settle().await;
            ble.disconnect().await
        });
        disconnected.unwrap();
        assert!(matches!(connected, Err(BleError::NotConnected)));

        settle().await;
        assert_eq!(ble.state(), LinkState::Disconnected);
        assert_eq!(ble.device(), DeviceState::default());
        assert!(ble.capabilities().is_empty());
        assert!(ble.link().subscribed.lock().unwrap().is_empty());

        // The abandoned attempt does not block the next one.
        ble.connect().await.unwrap();
        assert_eq!(ble.state(), LinkState::Ready);
        assert_eq!(ble.device().device_name.as_deref(), Some("porch"));
    }

    #[tokio::test]
    async fn joined_connect_reports_a_failed_attempt() {
        let mut link = slow_link(&GattLayout::default());
        link.fail_discovery = true;
        let ble = controller(link);

        let (first, second) = tokio::join!(ble.connect(), async {
            settle().await;
            ble.connect().await
        });
        assert!(matches!(first, Err(BleError::Gatt(_))));
        assert!(matches!(second, Err(BleError::NotConnected)));
        assert_eq!(ble.state(), LinkState::Disconnected);
    }
}
