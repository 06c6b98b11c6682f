//! Trellis host - assembles the demo application and serves requests
//!
//! # Startup Flow
//!
//! 1. **Parse trellis.app.toml** - app metadata and per-extension tables
//! 2. **Build the extension tree** - every initializer runs once
//! 3. **Provision data directories** - copy-if-absent into `<app-dir>/extensions`
//! 4. **Register routes** - duplicate paths abort startup
//! 5. **Dispatch** - each `--request` runs against its own state snapshot
//! 6. **Unload** - cleanup actions run in reverse registration order
//!
//! # Usage
//!
//! ```text
//! trellis --app-dir <path> [--routes] [--request </path?k=v>]...
//! ```
//!
//! Log levels come from `TRELLIS_LOG` (default `info`).

mod manifest;
mod provision;
mod site;

use anyhow::{Context, Result};
use manifest::Manifest;
use provision::CopyProvisioner;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use trellis_core::{build_application, CompositionOptions, Request};

const USAGE: &str = "Usage: trellis --app-dir <path> [--routes] [--request <path>]...";

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    app_dir: Option<PathBuf>,
    list_routes: bool,
    requests: Vec<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(a) = args.next() {
            match a.as_str() {
                "--app-dir" => {
                    let dir = args.next().context("--app-dir requires a path")?;
                    parsed.app_dir = Some(PathBuf::from(dir));
                }
                "--routes" => parsed.list_routes = true,
                "--request" => {
                    let target = args.next().context("--request requires a path")?;
                    parsed.requests.push(target);
                }
                "--help" | "-h" => anyhow::bail!(USAGE),
                other => tracing::warn!("Ignoring unknown argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    sync_main(rt)
}

fn sync_main(rt: tokio::runtime::Runtime) -> Result<()> {
    // TRELLIS_LOG picks the level, default "info"
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_env("TRELLIS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse(env::args().skip(1))?;
    let app_dir = match args.app_dir {
        Some(dir) => dir,
        None => anyhow::bail!(USAGE),
    };

    let manifest = rt.block_on(Manifest::load(&app_dir))?;
    tracing::info!(
        "Starting app: {} v{}",
        manifest.app.name,
        manifest.app.version
    );

    let mut options = CompositionOptions::new(&app_dir);
    options.config = manifest.extensions.clone();
    if manifest.provision() {
        options = options.with_provisioner(Arc::new(CopyProvisioner));
    }

    let app = build_application(options, site::site_extension(&manifest.app.name))
        .context("assembling application")?;

    for dir in app.data_dirs() {
        tracing::debug!(
            "{}: {} -> {}",
            dir.extension,
            dir.declared.display(),
            dir.target.display()
        );
    }

    if args.list_routes {
        for route in app.routes().routes() {
            println!("{:<24} {}", route.path(), route.owner());
        }
    }

    let (dispatcher, unloader) = app.into_dispatcher().context("registering routes")?;
    let dispatcher = Arc::new(dispatcher);

    let responses = rt.block_on(async {
        let handles: Vec<_> = args
            .requests
            .iter()
            .map(|target| {
                let dispatcher = dispatcher.clone();
                let request = Request::parse(target);
                tokio::task::spawn_blocking(move || dispatcher.dispatch(&request))
            })
            .collect();

        let mut responses = Vec::with_capacity(handles.len());
        for handle in handles {
            responses.push(handle.await.context("request task panicked")?);
        }
        anyhow::Ok(responses)
    })?;

    for (target, response) in args.requests.iter().zip(&responses) {
        println!("{} {} {}", response.status(), target, response.body());
    }

    let failed = unloader.run();
    if failed > 0 {
        tracing::warn!("{} unload actions failed", failed);
    }
    tracing::info!("Shut down {}", manifest.app.name);
    Ok(())
}
