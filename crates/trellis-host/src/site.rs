//! The demo application tree served by the host
//!
//! ```text
//! app                      /hello, /about
//! ├── templates   ""       (renderer)
//! ├── foo         "foo"    /foo/name, /foo/greet
//! ├── bar         ""       /name, /greet, /peer -> foo
//! └── counter     "stats"  /stats/increment, /stats/count
//! ```

use ext_counter::{counter_extension, Counter};
use ext_greeting::{greeting_extension, Greeting};
use ext_templates::{templates_extension, Templates};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use trellis_core::{
    handle, name_extension, ExtensionDescriptor, Handle, Handler, HandlerError, HasRenderer,
    InitContext, Request, Response,
};

pub const ROOT_NAME: &str = "app";

#[derive(Debug, Clone)]
pub struct Site {
    pub templates: Templates,
    pub foo: Greeting,
    pub bar: Greeting,
    pub counter: Counter,
    pub company_name: String,
}

impl HasRenderer for Site {
    type Renderer = Templates;

    fn renderer() -> Handle<Self, Templates> {
        handle!(Site, templates)
    }
}

#[derive(Debug, Deserialize)]
struct SiteSettings {
    #[serde(default = "default_company")]
    company: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            company: default_company(),
        }
    }
}

fn default_company() -> String {
    "Trellis".to_string()
}

pub fn site_extension(description: &str) -> ExtensionDescriptor<Site, Site> {
    ExtensionDescriptor::new(ROOT_NAME, description, |ctx: &mut InitContext<Site, Site>| {
        let settings: SiteSettings = ctx.config_as()?.unwrap_or_default();

        let templates = ctx.mount("", handle!(Site, templates), templates_extension())?;
        let foo = ctx.mount(
            "foo",
            handle!(Site, foo),
            name_extension(greeting_extension(None), "foo"),
        )?;
        let bar = ctx.mount(
            "",
            handle!(Site, bar),
            name_extension(greeting_extension(Some(handle!(Site, foo))), "bar"),
        )?;
        let counter = ctx.mount("stats", handle!(Site, counter), counter_extension())?;

        ctx.add_route("/hello", |req| {
            let site = req.get()?;
            let vars = json!({
                "company": site.company_name,
                "names": [site.foo.name, site.bar.name],
            });
            req.render("hello", &vars)
        });
        ctx.add_route("/about", |req| {
            let site = req.get()?;
            Ok(Response::ok(format!(
                "{} ({} hits so far)",
                site.company_name,
                site.counter.hits()
            )))
        });
        ctx.wrap_handlers(access_log);

        ctx.add_post_init_hook(|site: &mut Site| {
            anyhow::ensure!(
                site.templates.names().contains(&"hello"),
                "the 'hello' template is missing"
            );
            tracing::info!("Templates loaded: {:?}", site.templates.names());
            Ok(())
        });

        Ok(Site {
            templates,
            foo,
            bar,
            counter,
            company_name: settings.company,
        })
    })
}

/// Site-wide wrapper: logs every request and answers unknown paths
fn access_log(inner: Handler<Site>) -> Handler<Site> {
    Handler::new(move |state: &mut Site, request: &Request| {
        let started = Instant::now();
        let result = match inner.call(state, request) {
            Err(HandlerError::NotFound { path }) => Ok(Response::with_status(
                404,
                format!("{} has nothing at {}", state.company_name, path),
            )),
            other => other,
        };
        let status = match &result {
            Ok(response) => response.status(),
            Err(e) => e.status(),
        };
        tracing::info!(
            path = %request.path(),
            status,
            elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            "request"
        );
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{build_application, CompositionOptions};

    fn options() -> CompositionOptions {
        CompositionOptions::new("/nonexistent/app")
    }

    #[test]
    fn test_site_routes() {
        let app = match build_application(options(), site_extension("demo")) {
            Ok(app) => app,
            Err(e) => panic!("composition failed: {e}"),
        };
        assert_eq!(
            app.routes().paths(),
            vec![
                "/foo/name",
                "/foo/greet",
                "/name",
                "/greet",
                "/peer",
                "/stats/increment",
                "/stats/count",
                "/hello",
                "/about",
            ]
        );
        let paths: Vec<&str> = app.extensions().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["app", "app/templates", "app/foo", "app/bar", "app/counter"]
        );
    }

    #[test]
    fn test_site_dispatch() {
        let mut table = toml::Table::new();
        table.insert("company".to_string(), toml::Value::String("Acme".into()));
        let app = match build_application(
            options().with_config("app", table),
            site_extension("demo"),
        ) {
            Ok(app) => app,
            Err(e) => panic!("composition failed: {e}"),
        };
        let (dispatcher, _unloader) = app.into_dispatcher().unwrap();

        let hello = dispatcher.dispatch(&Request::new("/hello"));
        assert_eq!(hello.status(), 200);
        assert!(hello.body().contains("Hello from Acme"));
        assert!(hello.body().contains("<li>foo</li>"));

        assert_eq!(dispatcher.dispatch(&Request::new("/peer")).body(), "bar knows foo");
        assert_eq!(
            dispatcher.dispatch(&Request::parse("/greet?who=ada%20l")).body(),
            "Hello, ada l! (bar greeting #1)"
        );
        dispatcher.dispatch(&Request::new("/stats/increment"));
        assert_eq!(
            dispatcher.dispatch(&Request::new("/about")).body(),
            "Acme (1 hits so far)"
        );

        let missing = dispatcher.dispatch(&Request::new("/nope"));
        assert_eq!(missing.status(), 404);
        assert_eq!(missing.body(), "Acme has nothing at /nope");
    }
}
