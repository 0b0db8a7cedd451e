//! Route inbound frames to handlers by tag.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::catalog::MessageType;
use crate::message::Message;
use crate::model::ProtocolLimits;

/// Raw frame handler. Receives the whole frame, tag included.
pub type FrameHandler = Box<dyn FnMut(&[u8]) + Send>;

type SharedHandler = Arc<Mutex<FrameHandler>>;

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Handled(u8),
    Unhandled(u8),
    Empty,
}

/// The handler a frame resolved to, detached from the table. Calling it
/// does not borrow the [`Dispatcher`], so a handler may re-register or
/// unregister itself through whatever lock guards the table.
pub struct Route {
    tag: u8,
    handler: SharedHandler,
}

impl Route {
    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn call(&self, frame: &[u8]) -> Dispatched {
        log::trace!("dispatching {} byte frame with tag {}", frame.len(), self.tag);
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        handler(frame);
        Dispatched::Handled(self.tag)
    }
}

pub struct Dispatcher {
    handlers: HashMap<u8, SharedHandler>,
    limits: ProtocolLimits,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(ProtocolLimits::default())
    }
}

impl Dispatcher {
    pub fn new(limits: ProtocolLimits) -> Self {
        Self {
            handlers: HashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> ProtocolLimits {
        self.limits
    }

    /// Register a raw handler for `tag`, replacing any previous one.
    pub fn register<F>(&mut self, tag: u8, handler: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let handler: FrameHandler = Box::new(handler);
        if self
            .handlers
            .insert(tag, Arc::new(Mutex::new(handler)))
            .is_some()
        {
            log::debug!("replaced handler for tag {tag}");
        }
    }

    /// Register a handler that receives decoded messages of `message_type`.
    /// Frames that fail to decode are logged and never reach it.
    pub fn on<F>(&mut self, message_type: MessageType, mut handler: F)
    where
        F: FnMut(Message) + Send + 'static,
    {
        let limits = self.limits;
        self.register(message_type.as_u8(), move |frame| {
            match Message::from_frame(frame, limits) {
                Ok(message) => handler(message),
                Err(e) => log::warn!("dropping {message_type} frame: {e}"),
            }
        });
    }

    /// Register one decoded-message handler for every catalog tag.
    pub fn on_any<F>(&mut self, handler: F)
    where
        F: FnMut(Message) + Send + 'static,
    {
        let limits = self.limits;
        let shared = Arc::new(Mutex::new(handler));
        for entry in crate::catalog::CATALOG.iter() {
            let shared = shared.clone();
            let message_type = entry.message_type;
            self.register(message_type.as_u8(), move |frame| {
                match Message::from_frame(frame, limits) {
                    Ok(message) => match shared.lock() {
                        Ok(mut handler) => handler(message),
                        Err(_) => log::error!("message handler poisoned"),
                    },
                    Err(e) => log::warn!("dropping {message_type} frame: {e}"),
                }
            });
        }
    }

    pub fn unregister(&mut self, tag: u8) -> bool {
        self.handlers.remove(&tag).is_some()
    }

    pub fn is_registered(&self, tag: u8) -> bool {
        self.handlers.contains_key(&tag)
    }

    /// Find the handler for `frame[0]`. Empty frames and unhandled tags are
    /// logged and come back as the [`Dispatched`] outcome.
    pub fn route(&self, frame: &[u8]) -> Result<Route, Dispatched> {
        let Some(&tag) = frame.first() else {
            log::warn!("dropping empty frame");
            return Err(Dispatched::Empty);
        };
        match self.handlers.get(&tag) {
            Some(handler) => Ok(Route {
                tag,
                handler: handler.clone(),
            }),
            None => {
                match MessageType::from_u8(tag) {
                    Some(message_type) => log::debug!("no handler for {message_type} frame"),
                    None => log::warn!("dropping frame with unknown tag {tag}"),
                }
                Err(Dispatched::Unhandled(tag))
            }
        }
    }

    /// Hand `frame` to the handler registered for `frame[0]`. Empty frames
    /// and unhandled tags are logged and dropped.
    pub fn dispatch(&self, frame: &[u8]) -> Dispatched {
        match self.route(frame) {
            Ok(route) => route.call(frame),
            Err(dropped) => dropped,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.handlers.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("tags", &tags)
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Request;
    use crate::model::{LightState, OutputState};

    #[test]
    fn routes_by_first_byte() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::default();
        let sink = seen.clone();
        dispatcher.register(3, move |frame| sink.lock().unwrap().push(frame.to_vec()));

        assert_eq!(dispatcher.dispatch(&[3, 1, 2]), Dispatched::Handled(3));
        assert_eq!(*seen.lock().unwrap(), vec![vec![3, 1, 2]]);
    }

    #[test]
    fn unknown_and_empty_frames_are_dropped() {
        let calls = Arc::new(Mutex::new(0));
        let mut dispatcher = Dispatcher::default();
        let counter = calls.clone();
        dispatcher.register(0, move |_| *counter.lock().unwrap() += 1);

        assert_eq!(dispatcher.dispatch(&[]), Dispatched::Empty);
        assert_eq!(dispatcher.dispatch(&[99, 1]), Dispatched::Unhandled(99));
        assert_eq!(dispatcher.dispatch(&[4]), Dispatched::Unhandled(4));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn last_registration_wins() {
        let which = Arc::new(Mutex::new(""));
        let mut dispatcher = Dispatcher::default();
        let first = which.clone();
        dispatcher.register(7, move |_| *first.lock().unwrap() = "first");
        let second = which.clone();
        dispatcher.register(7, move |_| *second.lock().unwrap() = "second");

        dispatcher.dispatch(&[7, 1]);
        assert_eq!(*which.lock().unwrap(), "second");

        assert!(dispatcher.unregister(7));
        assert!(!dispatcher.is_registered(7));
        assert_eq!(dispatcher.dispatch(&[7, 1]), Dispatched::Unhandled(7));
    }

    #[test]
    fn typed_handler_skips_malformed_frames() {
        let colors = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::default();
        let sink = colors.clone();
        dispatcher.on(MessageType::Color, move |message| {
            sink.lock().unwrap().push(message)
        });

        let state = OutputState::new([LightState::new(true, 10); 4]);
        let frame = Request::SetColor(state).to_frame().unwrap();
        dispatcher.dispatch(&frame);
        // Right tag, wrong length.
        dispatcher.dispatch(&frame[..5]);

        assert_eq!(*colors.lock().unwrap(), vec![Message::Color(state)]);
    }

    #[test]
    fn routed_handler_runs_after_the_table_is_released() {
        let table = Arc::new(Mutex::new(Dispatcher::default()));
        let calls = Arc::new(Mutex::new(0));
        let inner = table.clone();
        let counter = calls.clone();
        table.lock().unwrap().register(0x20, move |_| {
            *counter.lock().unwrap() += 1;
            // One-shot: drop ourselves from the table we were found in.
            inner.lock().unwrap().unregister(0x20);
        });

        let route = table.lock().unwrap().route(&[0x20, 1]).ok().unwrap();
        assert_eq!(route.tag(), 0x20);
        assert_eq!(route.call(&[0x20, 1]), Dispatched::Handled(0x20));

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(!table.lock().unwrap().is_registered(0x20));
        assert!(matches!(
            table.lock().unwrap().route(&[0x20, 1]),
            Err(Dispatched::Unhandled(0x20))
        ));
    }

    #[test]
    fn on_any_covers_catalog() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::default();
        let sink = seen.clone();
        dispatcher.on_any(move |message| sink.lock().unwrap().push(message));

        assert!(dispatcher.is_registered(0));
        assert!(dispatcher.is_registered(13));
        dispatcher.dispatch(&Message::Heap(42).to_frame(ProtocolLimits::default()).unwrap());
        assert_eq!(*seen.lock().unwrap(), vec![Message::Heap(42)]);
    }
}
