//! counter extension - hit counter shared across requests
//!
//! Each request works on its own snapshot of the application state, so the
//! counter lives in a [`SharedCell`] created once during initialization.
//! `local` is an ordinary field kept for contrast: increments to it are
//! discarded with the snapshot.

use serde::Deserialize;
use tracing::{debug, info};
use trellis_core::{ExtensionDescriptor, InitContext, Response, SharedCell};

// ============================================================================
// State Types
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Counter {
    /// Hits across every request served so far
    pub hits: SharedCell<u64>,
    /// Hits within the current request only
    pub local: u64,
}

impl Counter {
    pub fn hits(&self) -> u64 {
        self.hits.get()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CounterSettings {
    #[serde(default)]
    start: u64,
}

// ============================================================================
// Extension Registration
// ============================================================================

pub fn counter_extension<B: 'static>() -> ExtensionDescriptor<B, Counter> {
    ExtensionDescriptor::new(
        "counter",
        "Counts hits across requests",
        |ctx: &mut InitContext<B, Counter>| {
            let settings: CounterSettings = ctx.config_as()?.unwrap_or_default();
            let hits = ctx.lift_external(|| Ok(SharedCell::new(settings.start)))?;
            debug!(extension = %ctx.extension_path(), start = settings.start, "counter.init");

            ctx.add_route("/increment", |req| {
                let (hits, local) = req.modify(|counter| {
                    counter.local += 1;
                    let hits = counter.hits.modify(|n| {
                        *n += 1;
                        *n
                    });
                    (hits, counter.local)
                })?;
                Ok(Response::ok(format!("hits={hits} local={local}")))
            });
            ctx.add_route("/count", |req| {
                Ok(Response::ok(req.get()?.hits().to_string()))
            });

            let extension = ctx.extension_path();
            let total = hits.clone();
            ctx.on_unload(move || {
                info!("{} served {} hits", extension, total.get());
                Ok(())
            });

            Ok(Counter { hits, local: 0 })
        },
    )
}
