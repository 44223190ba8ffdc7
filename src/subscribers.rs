use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// Anything that can be registered to observe a controller.
pub trait Subscriber: Send + Sync {
    /// Registering twice under the same id replaces the first registration.
    fn get_id(&self) -> String;
}

/// Registry of observers shared between a controller and its session task.
pub struct Subscribers<S: ?Sized> {
    inner: Arc<RwLock<HashMap<String, Arc<S>>>>,
}

impl<S: ?Sized> Clone for Subscribers<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ?Sized> Default for Subscribers<S> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<S: ?Sized + Subscriber> Subscribers<S> {
    pub fn subscribe(&self, subscriber: Arc<S>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscriber.get_id(), subscriber);
    }

    pub fn unsubscribe(&self, subscriber: &Arc<S>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&subscriber.get_id());
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: impl Fn(&S)) {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .for_each(|s| event(&**s));
    }
}
