//! greeting extension - an extension that knows the name it was mounted as
//!
//! Mount it twice under different effective names (see
//! [`trellis_core::name_extension`]) and each instance answers `/name` with
//! its own name. The greeting text comes from, in order:
//! 1. the extension's table in the host configuration (`greeting = "..."`)
//! 2. `greeting.toml` in the extension's directory of the application tree
//! 3. [`DEFAULT_GREETING`]

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use trellis_core::{make_extension, ExtensionDescriptor, Handle, InitContext, Response};

pub const DEFAULT_GREETING: &str = "Hello";

/// File in the extension's data directory holding its default settings
pub const SETTINGS_FILE: &str = "greeting.toml";

// ============================================================================
// State Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Effective name this instance was mounted as
    pub name: String,
    pub greeting: String,
    /// Greetings served within the current request
    pub visits: u64,
}

#[derive(Debug, Default, Deserialize)]
struct GreetingSettings {
    #[serde(default)]
    greeting: Option<String>,
}

// ============================================================================
// Extension Registration
// ============================================================================

/// Directory of default assets shipped with this crate
pub fn resources_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/resources"))
}

/// Create the greeting extension.
///
/// `peer` is a root-relative handle to another greeting instance; when given,
/// the extension also serves `/peer`.
pub fn greeting_extension<B: 'static>(
    peer: Option<Handle<B, Greeting>>,
) -> ExtensionDescriptor<B, Greeting> {
    make_extension(
        "greeting",
        "Greets visitors by name",
        Some(resources_dir()),
        move |ctx: &mut InitContext<B, Greeting>| {
            let greeting = resolve_greeting(ctx)?;
            debug!(extension = %ctx.extension_path(), greeting = %greeting, "greeting.init");

            ctx.add_route("/name", |req| Ok(Response::ok(req.get()?.name.clone())));
            ctx.add_route("/greet", |req| {
                let who = req.request().param("who").unwrap_or("stranger").to_string();
                let state = req.get_mut()?;
                state.visits += 1;
                Ok(Response::ok(format!(
                    "{}, {}! ({} greeting #{})",
                    state.greeting, who, state.name, state.visits
                )))
            });

            if let Some(peer) = peer {
                ctx.add_route("/peer", move |req| {
                    let other = req.with_top(&peer, |other| other.get().map(|g| g.name.clone()))?;
                    Ok(Response::ok(format!("{} knows {}", req.get()?.name, other)))
                });
            }

            Ok(Greeting {
                name: ctx.extension_name().to_string(),
                greeting,
                visits: 0,
            })
        },
    )
}

fn resolve_greeting<B: 'static>(ctx: &InitContext<B, Greeting>) -> anyhow::Result<String> {
    if let Some(GreetingSettings {
        greeting: Some(greeting),
    }) = ctx.config_as::<GreetingSettings>()?
    {
        return Ok(greeting);
    }

    let settings = read_settings(&ctx.file_path().join(SETTINGS_FILE))?;
    Ok(settings
        .greeting
        .unwrap_or_else(|| DEFAULT_GREETING.to_string()))
}

fn read_settings(path: &Path) -> anyhow::Result<GreetingSettings> {
    if !path.exists() {
        return Ok(GreetingSettings::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
