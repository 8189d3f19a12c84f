use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    init_called: AtomicU32,
    init_finished: AtomicU32,
}

impl Counters {
    pub(crate) fn init_called(&self) -> u32 {
        self.init_called.load(Ordering::Acquire)
    }

    pub(crate) fn init_finished(&self) -> u32 {
        self.init_finished.load(Ordering::Acquire)
    }

    pub(crate) fn incl_init_called(&self) {
        self.init_called.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn incl_init_finished(&self) {
        self.init_finished.fetch_add(1, Ordering::AcqRel);
    }
}
