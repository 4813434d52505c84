//! Drives discovery passes from DOM mutations and commits on submit.

use std::cell::Cell;
use std::rc::Rc;
use tracing::{error, info};

use crate::dom::{MutationSource, SubmitSource};
use crate::error::Result;

/// Watches the page body for structural changes and page-level submits.
pub struct FormObserver<M: MutationSource, S: SubmitSource> {
    mutations: Rc<M>,
    submits: S,
    observing: Rc<Cell<bool>>,
}

impl<M: MutationSource + 'static, S: SubmitSource> FormObserver<M, S> {
    pub fn new(mutations: M, submits: S) -> Self {
        Self {
            mutations: Rc::new(mutations),
            submits,
            observing: Rc::new(Cell::new(false)),
        }
    }

    pub fn is_observing(&self) -> bool {
        self.observing.get()
    }

    /// Start observing, then run one pass for forms already on the page.
    ///
    /// An observer that cannot start is logged; the initial pass still runs
    /// so forms present at load time keep working. The submit hook stops
    /// observation before `on_submit` runs.
    pub fn start(
        &self,
        on_change: impl Fn() + 'static,
        on_submit: impl Fn() + 'static,
    ) -> Result<()> {
        let on_change = Rc::new(on_change);

        let observed = {
            let on_change = Rc::clone(&on_change);
            let observing = Rc::clone(&self.observing);
            self.mutations.observe(Box::new(move || {
                if observing.get() {
                    on_change();
                }
            }))
        };
        match observed {
            Ok(()) => {
                self.observing.set(true);
                info!("Started form observer");
            }
            Err(err) => error!(error = %err, "Failed to start form observer"),
        }

        let mutations = Rc::clone(&self.mutations);
        let observing = Rc::clone(&self.observing);
        let hooked = self.submits.on_submit(Box::new(move || {
            if observing.replace(false) {
                mutations.disconnect();
                info!("Stopped form observer on submit");
            }
            on_submit();
        }));
        if let Err(err) = &hooked {
            error!(error = %err, "Failed to bind submit hook; staged credentials will not be committed");
        }

        on_change();
        hooked
    }

    /// Stop delivering mutations. Idempotent.
    pub fn stop(&self) {
        if self.observing.replace(false) {
            self.mutations.disconnect();
        }
    }
}
