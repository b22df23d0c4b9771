//! 网变更通知：每个修改操作发出一条事件，交给已注册的监听者.
use std::fmt;

use crate::net::structure::{NetObject, Tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    Added(NetObject),
    Removed(NetObject),
    MarkingChanged { place: String, marking: Tokens },
    TokensChanged { place: String, count: usize },
    EnabledChanged { transition: String, enabled: bool },
    Fired { transition: String, direction: Direction },
    ParameterChanged { name: String },
}

pub trait NetListener: Send {
    fn on_event(&mut self, event: &NetEvent);
}

impl<F> NetListener for F
where
    F: FnMut(&NetEvent) + Send,
{
    fn on_event(&mut self, event: &NetEvent) {
        self(event)
    }
}

/// Registered listeners. Cloning a net never clones its subscribers.
#[derive(Default)]
pub(crate) struct Listeners(Vec<Box<dyn NetListener>>);

impl Listeners {
    pub(crate) fn push(&mut self, listener: Box<dyn NetListener>) {
        self.0.push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    /// Builds the event only when somebody is listening.
    pub(crate) fn emit_with(&mut self, event: impl FnOnce() -> NetEvent) {
        if self.0.is_empty() {
            return;
        }
        let event = event();
        for listener in &mut self.0 {
            listener.on_event(&event);
        }
    }
}

impl Clone for Listeners {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listeners({})", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn closures_receive_events_and_clones_start_empty() {
        let (tx, rx) = mpsc::channel();
        let mut listeners = Listeners::default();
        listeners.push(Box::new(move |event: &NetEvent| {
            let _ = tx.send(event.clone());
        }));

        listeners.emit_with(|| NetEvent::ParameterChanged { name: "k".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            NetEvent::ParameterChanged { name: "k".into() }
        );
        assert_eq!(listeners.clone().len(), 0);
    }

    #[test]
    fn silent_when_nobody_listens() {
        let mut listeners = Listeners::default();
        listeners.emit_with(|| unreachable!("event built without listeners"));
    }
}
