//! Script channels.

use std::fmt;
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use super::Value;
use crate::types::Type;

struct ChannelInner {
    /// `None` once closed.
    tx: Mutex<Option<Sender<Value>>>,
    rx: Receiver<Value>,
    elem: Type,
    cap: usize,
}

/// Typed channel, buffered when `cap > 0`, rendezvous otherwise.
///
/// Closing drops the only long-lived sender: receivers drain what is buffered
/// and then observe disconnection.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub fn new(elem: Type, cap: usize) -> Self {
        let (tx, rx) = bounded(cap);
        Channel {
            inner: Arc::new(ChannelInner {
                tx: Mutex::new(Some(tx)),
                rx,
                elem,
                cap,
            }),
        }
    }

    pub fn elem(&self) -> &Type {
        &self.inner.elem
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap
    }

    pub fn ty(&self) -> Type {
        Type::chan(self.inner.elem.clone())
    }

    /// Sending half; `None` when closed.
    pub fn sender(&self) -> Option<Sender<Value>> {
        self.inner.tx.lock().clone()
    }

    pub fn receiver(&self) -> &Receiver<Value> {
        &self.inner.rx
    }

    /// Buffered element count.
    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.inner.tx.lock().take().is_some()
    }

    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan {} (cap {})", self.inner.elem, self.inner.cap)
    }
}
