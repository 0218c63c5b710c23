//! Named queue identities.
//!
//! A [`Namespace`] maps names like `/collatz` to live queues, with the same
//! rules as POSIX message queue names. Creation is exclusive; a name stays
//! taken until it is unlinked. [`QueueGuard`] ties the identity to a scope
//! so it is always released, whether the pipeline finished or failed.

use std::any::Any;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{MessageQueue, QueueAttributes, validate_attributes};
use crate::error::{Error, Result};

type AnyQueue = Arc<dyn Any + Send + Sync>;

/// Registry of named queues.
#[derive(Default)]
pub struct Namespace {
    queues: Mutex<HashMap<String, AnyQueue>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue under `name`, failing if the name is already taken.
    pub fn create<T: Send + 'static>(
        &self,
        name: &str,
        attrs: QueueAttributes,
    ) -> Result<QueueGuard<'_, T>> {
        validate_name(name)?;
        validate_attributes::<T>(&attrs)?;

        let mut queues = self.queues.lock();
        if queues.contains_key(name) {
            return Err(Error::QueueExists(name.to_string()));
        }
        let queue = Arc::new(MessageQueue::<T>::new(name, attrs)?);
        queues.insert(name.to_string(), queue.clone() as AnyQueue);
        debug!(
            queue = name,
            max_messages = attrs.max_messages,
            message_size = attrs.message_size,
            "queue created"
        );

        Ok(QueueGuard {
            namespace: self,
            queue,
        })
    }

    /// Attach to an existing queue.
    pub fn open<T: Send + 'static>(&self, name: &str) -> Result<Arc<MessageQueue<T>>> {
        validate_name(name)?;
        let queue = self
            .queues
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::QueueNotFound(name.to_string()))?;
        queue
            .downcast::<MessageQueue<T>>()
            .map_err(|_| Error::QueueTypeMismatch(name.to_string()))
    }

    /// Release `name`. Open handles keep working; the name becomes free.
    ///
    /// Returns `false` if nothing was registered under `name`.
    pub fn unlink(&self, name: &str) -> bool {
        let removed = self.queues.lock().remove(name).is_some();
        if removed {
            debug!(queue = name, "queue unlinked");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.lock().contains_key(name)
    }

    /// Unlink `name` only while it still refers to `queue`.
    fn release<T>(&self, queue: &Arc<MessageQueue<T>>) -> bool {
        let mut queues = self.queues.lock();
        let same = queues
            .get(queue.name())
            .is_some_and(|registered| {
                std::ptr::eq(
                    Arc::as_ptr(registered) as *const (),
                    Arc::as_ptr(queue) as *const (),
                )
            });
        if same {
            queues.remove(queue.name());
            debug!(queue = queue.name(), "queue unlinked");
        }
        same
    }
}

/// Owner of a freshly created queue.
///
/// Dropping the guard closes the queue and unlinks its name.
pub struct QueueGuard<'ns, T> {
    namespace: &'ns Namespace,
    queue: Arc<MessageQueue<T>>,
}

impl<T> QueueGuard<'_, T> {
    /// A shared handle that outlives the guard (but not the name).
    pub fn handle(&self) -> Arc<MessageQueue<T>> {
        Arc::clone(&self.queue)
    }
}

impl<T> Deref for QueueGuard<'_, T> {
    type Target = MessageQueue<T>;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

impl<T> Drop for QueueGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.close();
        if !self.namespace.release(&self.queue) {
            warn!(queue = self.queue.name(), "queue was already unlinked");
        }
    }
}

/// Names are `/` followed by a non-empty component with no further `/`.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    match name.strip_prefix('/') {
        Some(rest) if !rest.is_empty() && !rest.contains('/') => Ok(()),
        _ => Err(Error::InvalidQueueName(name.to_string())),
    }
}
