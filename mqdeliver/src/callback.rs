use std::num::NonZeroU16;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mqdeliver_codec::{Properties, Publish};
use parking_lot::RwLock;

use crate::types::ClientId;

/// Called when an outgoing QoS 1 or QoS 2 message has been settled, with the
/// peer's reason code and properties.
pub trait OnPublishFn: 'static + Sync + Send + Fn(&ClientId, NonZeroU16, u8, &Properties) {}

impl<T> OnPublishFn for T where T: 'static + Sync + Send + Fn(&ClientId, NonZeroU16, u8, &Properties) {}

/// Called with each application message received from the peer.
pub trait OnMessageFn: 'static + Sync + Send + Fn(&ClientId, &Publish) {}

impl<T> OnMessageFn for T where T: 'static + Sync + Send + Fn(&ClientId, &Publish) {}

/// Application callbacks of a client connection.
///
/// Callbacks are snapshotted under a short read lock and invoked after it is
/// released, so they may re-register callbacks or publish from inside.
#[derive(Default)]
pub struct CallbackRegistry {
    on_publish: RwLock<Option<Arc<dyn OnPublishFn>>>,
    on_message: RwLock<Option<Arc<dyn OnMessageFn>>>,
    in_callback: AtomicBool,
}

impl CallbackRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set_on_publish<F>(&self, f: F)
    where
        F: OnPublishFn,
    {
        *self.on_publish.write() = Some(Arc::new(f));
    }

    #[inline]
    pub fn clear_on_publish(&self) {
        self.on_publish.write().take();
    }

    #[inline]
    pub fn set_on_message<F>(&self, f: F)
    where
        F: OnMessageFn,
    {
        *self.on_message.write() = Some(Arc::new(f));
    }

    #[inline]
    pub fn clear_on_message(&self) {
        self.on_message.write().take();
    }

    /// Whether an application callback is running right now.
    #[inline]
    pub fn in_callback(&self) -> bool {
        self.in_callback.load(Ordering::SeqCst)
    }

    /// Returns `true` if a callback was registered and ran.
    pub fn invoke_on_publish(&self, id: &ClientId, packet_id: NonZeroU16, reason_code: u8, props: &Properties) -> bool {
        let f = self.on_publish.read().clone();
        match f {
            Some(f) => {
                self.enter(|| f(id, packet_id, reason_code, props));
                true
            }
            None => false,
        }
    }

    pub fn invoke_on_message(&self, id: &ClientId, publish: &Publish) -> bool {
        let f = self.on_message.read().clone();
        match f {
            Some(f) => {
                self.enter(|| f(id, publish));
                true
            }
            None => false,
        }
    }

    #[inline]
    fn enter<F: FnOnce()>(&self, f: F) {
        let prev = self.in_callback.swap(true, Ordering::SeqCst);
        let _guard = scopeguard::guard(prev, |prev| self.in_callback.store(prev, Ordering::SeqCst));
        f()
    }
}
