use std::{convert::Infallible, hash::Hash, sync::Arc};

use super::{
    key_lock::{ErrorObject, LockRegistry, Slot, SlotValue},
    OptionallyNone,
};
use crate::common::concurrent::constants::MAX_INIT_RETRIES;

pub(crate) enum InitResult<V, E> {
    Initialized(V),
    ReadExisting(V),
    InitErr(Arc<E>),
}

pub(crate) struct ValueInitializer<K, V> {
    registry: Arc<dyn LockRegistry<K, V>>,
    #[cfg(feature = "logging")]
    cache_name: Option<String>,
}

impl<K, V> ValueInitializer<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub(crate) fn new(registry: Arc<dyn LockRegistry<K, V>>, _cache_name: Option<String>) -> Self {
        Self {
            registry,
            #[cfg(feature = "logging")]
            cache_name: _cache_name,
        }
    }

    pub(crate) fn registry(&self) -> &dyn LockRegistry<K, V> {
        &*self.registry
    }

    /// # Panics
    /// Panics if the `init` closure has been panicked.
    pub(crate) fn init_or_read(
        &self,
        key: &Arc<K>,
        // Closure to get an existing value from the store.
        get: impl FnMut() -> Option<V>,
        init: impl FnOnce() -> V,
        // Closure to put a new value into the store.
        mut insert: impl FnMut(V),
    ) -> InitResult<V, Infallible> {
        // This closure will be called before the init closure is called, in order to
        // check if the value has already been stored by other thread.
        let pre_init = make_pre_init(get);

        // This closure will be called after the init closure has returned a value.
        // It will put the returned value (from init) into the store, and convert
        // the value into a pair of a SlotValue and an InitResult.
        let post_init = |value: V| {
            insert(value.clone());
            (Some(Ok(value.clone())), InitResult::Initialized(value))
        };

        self.do_try_init(key, pre_init, init, post_init)
    }

    /// # Panics
    /// Panics if the `init` closure has been panicked.
    pub(crate) fn try_init_or_read<E>(
        &self,
        key: &Arc<K>,
        get: impl FnMut() -> Option<V>,
        init: impl FnOnce() -> Result<V, E>,
        mut insert: impl FnMut(V),
    ) -> InitResult<V, E>
    where
        E: Send + Sync + 'static,
    {
        let pre_init = make_pre_init(get);

        // A failed init stores nothing. The error is shared, as the same `Arc`,
        // with every follower waiting on the slot.
        let post_init = |value: Result<V, E>| match value {
            Ok(value) => {
                insert(value.clone());
                (Some(Ok(value.clone())), InitResult::Initialized(value))
            }
            Err(e) => {
                let err = Arc::new(e);
                let err_obj: ErrorObject = Arc::clone(&err) as ErrorObject;
                (Some(Err(err_obj)), InitResult::InitErr(err))
            }
        };

        self.do_try_init(key, pre_init, init, post_init)
    }

    /// # Panics
    /// Panics if the `init` closure has been panicked.
    pub(crate) fn optionally_init_or_read(
        &self,
        key: &Arc<K>,
        get: impl FnMut() -> Option<V>,
        init: impl FnOnce() -> Option<V>,
        mut insert: impl FnMut(V),
    ) -> InitResult<V, OptionallyNone> {
        let pre_init = make_pre_init(get);

        // `None` is handed to the followers as an error so that they do not
        // mistake it for a slot left unfinished by a panicked leader.
        let post_init = |value: Option<V>| match value {
            Some(value) => {
                insert(value.clone());
                (Some(Ok(value.clone())), InitResult::Initialized(value))
            }
            None => {
                let err = Arc::new(OptionallyNone);
                let err_obj: ErrorObject = Arc::clone(&err) as ErrorObject;
                (Some(Err(err_obj)), InitResult::InitErr(err))
            }
        };

        self.do_try_init(key, pre_init, init, post_init)
    }

    /// # Panics
    /// Panics if the `init` closure has been panicked.
    fn do_try_init<O, E>(
        &self,
        key: &Arc<K>,
        mut pre_init: impl FnMut() -> Option<(SlotValue<V>, InitResult<V, E>)>,
        init: impl FnOnce() -> O,
        mut post_init: impl FnMut(O) -> (SlotValue<V>, InitResult<V, E>),
    ) -> InitResult<V, E>
    where
        E: Send + Sync + 'static,
    {
        use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
        use InitResult::*;

        let mut retries = 0;

        loop {
            // Take the exclusive access of our slot _before_ registering it, so
            // that nobody can read it until it is done.
            let slot = Slot::new();
            let mut lock = slot.write();

            let registered = self.registry.get_or_create(key, slot.clone());

            if registered.ptr_eq(&slot) {
                // Our slot was registered; we are the leader.
                //
                // Check if the value has already been stored by other thread. It
                // can happen when the previous leader of this key removed its slot
                // between our store lookup and our registration.
                if let Some((slot_val, init_res)) = pre_init() {
                    *lock = slot_val;
                    self.registry.remove(&**key);
                    return init_res;
                }

                #[cfg(feature = "logging")]
                log::trace!("{}Populating a missing key", self.log_prefix());

                // Catching panic is safe here as we do not try to evaluate the
                // closure again.
                match catch_unwind(AssertUnwindSafe(init)) {
                    // Evaluated.
                    Ok(value) => {
                        let (slot_val, init_res) = post_init(value);
                        *lock = slot_val;
                        // Remove the slot while we still hold it, so that a caller
                        // arriving after the removal will find the stored value
                        // (or become a new leader) instead of a finished slot.
                        self.registry.remove(&**key);
                        return init_res;
                    }
                    // Panicked.
                    Err(payload) => {
                        *lock = None;
                        // Remove the slot so that the followers can retry.
                        self.registry.remove(&**key);
                        #[cfg(feature = "logging")]
                        log_panic(&*payload, self.log_prefix());
                        resume_unwind(payload);
                    }
                } // The write lock will be unlocked here.
            }

            // Somebody else's slot is registered; we are a follower. Drop our write
            // lock and wait for the read lock of the leader's slot to become
            // available. The leader has already removed its slot from the registry
            // by the time it releases the lock.
            std::mem::drop(lock);
            match &*registered.read() {
                Some(Ok(value)) => {
                    #[cfg(feature = "logging")]
                    log::trace!("{}Reusing the value of a coalesced call", self.log_prefix());
                    return ReadExisting(value.clone());
                }
                Some(Err(e)) => {
                    if let Ok(e) = Arc::clone(e).downcast::<E>() {
                        return InitErr(e);
                    }
                    // The leader was called with a different error type, so its
                    // error cannot be handed to us. Retry from the beginning.
                }
                // None means the leader's init closure has been panicked.
                None => (),
            }

            retries += 1;
            if retries >= MAX_INIT_RETRIES {
                panic!(
                    "Too many retries. Tried to read the return value from the `init` \
                    closure but failed {retries} times. Maybe the `init` kept panicking?"
                );
            }
        }
    }

    #[cfg(feature = "logging")]
    fn log_prefix(&self) -> String {
        self.cache_name
            .as_ref()
            .map(|name| format!("[{name}] "))
            .unwrap_or_default()
    }
}

#[inline]
fn make_pre_init<V, E>(
    mut get: impl FnMut() -> Option<V>,
) -> impl FnMut() -> Option<(SlotValue<V>, InitResult<V, E>)>
where
    V: Clone,
{
    move || get().map(|value| (Some(Ok(value.clone())), InitResult::ReadExisting(value)))
}

#[cfg(feature = "logging")]
fn log_panic(payload: &(dyn std::any::Any + Send + 'static), prefix: String) {
    // Try to downcast the payload into &str or String.
    //
    // NOTE: Clippy will complain if we use `if let Some(_)` here.
    // https://rust-lang.github.io/rust-clippy/master/index.html#manual_map
    let message: Option<std::borrow::Cow<'_, str>> =
        (payload.downcast_ref::<&str>().map(|s| (*s).into()))
            .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    if let Some(m) = message {
        log::error!("{prefix}The `init` closure panicked at '{m}'");
    } else {
        log::error!("{prefix}The `init` closure panicked");
    }
}
