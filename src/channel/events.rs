//! Channel events.
//!
//! Events are broadcast to every subscriber. A subscriber that falls behind
//! skips the events it missed.

use super::state::ChannelState;
use std::fmt;
use tokio::sync::broadcast;

/// Events emitted by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel moved to a new state.
    StateChanged {
        /// Previous state.
        from: ChannelState,
        /// New state.
        to: ChannelState,
    },

    /// Scheduling started.
    Started,

    /// Scheduling stopped.
    Stopped,

    /// A failure closed the channel.
    Error {
        /// Role of the failing cell, if known.
        cell: Option<String>,
        /// The error message.
        message: String,
    },

    /// A cell was shut down.
    CellShutdown {
        /// Pipeline of the cell.
        pipeline: String,
        /// Role of the cell.
        cell: String,
    },

    /// A lockstep tick finished.
    TickCompleted {
        /// Tick number, starting at 1.
        tick: u64,
    },
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEvent::StateChanged { from, to } => write!(f, "StateChanged: {from} -> {to}"),
            ChannelEvent::Started => write!(f, "Started"),
            ChannelEvent::Stopped => write!(f, "Stopped"),
            ChannelEvent::Error {
                cell: Some(cell),
                message,
            } => write!(f, "Error in {cell}: {message}"),
            ChannelEvent::Error { cell: None, message } => write!(f, "Error: {message}"),
            ChannelEvent::CellShutdown { pipeline, cell } => {
                write!(f, "Cell {pipeline}/{cell} shut down")
            }
            ChannelEvent::TickCompleted { tick } => write!(f, "Tick {tick} completed"),
        }
    }
}

/// Sending side, held by the channel.
#[derive(Clone)]
pub(crate) struct EventSender {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventSender {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers reached (0 is fine).
    pub(crate) fn send(&self, event: ChannelEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub(crate) fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side of a channel's events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<ChannelEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next event, blocking the current thread.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an event if one is pending.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Wait until the channel reaches `state`.
    ///
    /// Returns `false` if the channel went away first.
    pub async fn wait_for_state(&mut self, state: ChannelState) -> bool {
        while let Some(event) = self.recv().await {
            if matches!(event, ChannelEvent::StateChanged { to, .. } if to == state) {
                return true;
            }
        }
        false
    }
}
