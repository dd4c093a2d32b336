//! Application configuration options

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::reporter;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Settings the components are built from
    pub settings: Settings,

    /// Enable the status API
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Enable the metrics reporter
    pub enable_reporter: bool,

    /// Reporter worker options
    pub reporter: reporter::Options,
}

impl AppOptions {
    pub fn from_settings(layout: StorageLayout, settings: Settings) -> Self {
        let window = NonZeroUsize::new(settings.reporter.window).unwrap_or(NonZeroUsize::MIN);
        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            enable_server: settings.enable_server,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
                default_window: window.get(),
            },
            enable_reporter: settings.reporter.enabled,
            reporter: reporter::Options {
                interval: Duration::from_secs(settings.reporter.interval_secs.max(1)),
                window,
                ..Default::default()
            },
            settings,
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Builds listed by `/builds/recent` without `n`
    pub default_window: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8088,
            default_window: 10,
        }
    }
}
