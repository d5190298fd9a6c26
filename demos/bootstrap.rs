//! Boots a small service graph and shuts it down on Ctrl+C, SIGTERM or after
//! a few seconds.
//!
//! ```text
//! cargo run --example bootstrap
//! cargo run --example bootstrap -- --fail   # cache warmer fails, rollback runs
//! IGNITION_CONFLICT_POLICY=reject cargo run --example bootstrap
//! ```

use ignition::lifecycle::shutdown_signal;
use ignition::prelude::*;
use std::time::Duration;

struct Database {
    url: String,
}

#[async_trait]
impl ManagedComponent for Database {
    fn name(&self) -> &str {
        "Database"
    }

    async fn start(&self) -> anyhow::Result<()> {
        tracing::info!("Opening connection pool to {}", self.url);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("Closing connection pool");
        Ok(())
    }
}

struct HttpListener {
    port: u16,
    database: Arc<Database>,
}

#[async_trait]
impl ManagedComponent for HttpListener {
    fn name(&self) -> &str {
        "HttpListener"
    }

    async fn start(&self) -> anyhow::Result<()> {
        tracing::info!(
            "✅ Listening on http://127.0.0.1:{} (database: {})",
            self.port,
            self.database.url
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("Draining connections on port {}", self.port);
        Ok(())
    }
}

struct CacheWarmer {
    fail: bool,
}

#[async_trait]
impl ManagedComponent for CacheWarmer {
    async fn start(&self) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("cache backend unreachable");
        }
        tracing::info!("Cache warmed");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct SettingsModule;

impl Module for SettingsModule {
    fn name(&self) -> &str {
        "SettingsModule"
    }

    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()> {
        binder.bind::<u16>().named("http.port").to_instance(3000);
        binder
            .bind::<String>()
            .named("database.url")
            .to_instance("postgres://localhost/app".to_string());
        Ok(())
    }
}

struct ServiceModule;

impl Module for ServiceModule {
    fn name(&self) -> &str {
        "ServiceModule"
    }

    fn configure(&self, binder: &mut Binder) -> anyhow::Result<()> {
        binder.bind::<Database>().to_provider(|r| {
            let url = r.get_named::<String>("database.url")?;
            Ok(Arc::new(Database {
                url: url.to_string(),
            }))
        });
        binder.bind::<HttpListener>().to_provider(|r| {
            Ok(Arc::new(HttpListener {
                port: *r.get_named::<u16>("http.port")?,
                database: r.get::<Database>()?,
            }))
        });
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    tracing::info!("🚀 Starting bootstrap demo...");

    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{}", err);
            std::process::exit(err.exit_code());
        }
    };
    let fail = std::env::args().any(|arg| arg == "--fail");

    let mut runtime = Runtime::builder()
        .config(config)
        .module(SettingsModule)
        .module(ServiceModule)
        .transformer(BindingAudit)
        .managed("database", 10, |env| {
            let database: Arc<dyn ManagedComponent> = env.lookup::<Database>()?;
            Ok(database)
        })
        .component(20, Arc::new(CacheWarmer { fail }))
        .managed("http", 30, |env| {
            let listener: Arc<dyn ManagedComponent> = env.lookup::<HttpListener>()?;
            Ok(listener)
        })
        .build();

    runtime
        .dispatcher()
        .subscribe_named("demo", |event: &RuntimeEvent| {
            let json = serde_json::to_string(event)?;
            tracing::info!("📣 {}", json);
            Ok(())
        });

    let stop = async {
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = tokio::time::sleep(Duration::from_secs(3)) => {
                tracing::info!("Demo time elapsed");
            }
        }
    };

    match runtime.run_until(stop).await {
        Ok(report) if report.is_clean() => tracing::info!("👋 Bye"),
        Ok(report) => {
            tracing::warn!("{} component(s) failed to stop", report.failed.len());
            std::process::exit(1);
        }
        Err(err) => {
            tracing::error!("{}", err);
            std::process::exit(err.exit_code());
        }
    }
}
