//! Feature-specific logging macros and utilities
//!
//! Each staging component logs under its own target so levels can be tuned
//! per component.

/// Feature categories for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFeature {
    Registry,
    Staging,
    Gateway,
    Observer,
    Packages,
    Bus,
    HttpServer,
}

impl LogFeature {
    pub fn all() -> &'static [LogFeature] {
        &[
            LogFeature::Registry,
            LogFeature::Staging,
            LogFeature::Gateway,
            LogFeature::Observer,
            LogFeature::Packages,
            LogFeature::Bus,
            LogFeature::HttpServer,
        ]
    }

    /// Name used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            LogFeature::Registry => "registry",
            LogFeature::Staging => "staging",
            LogFeature::Gateway => "gateway",
            LogFeature::Observer => "observer",
            LogFeature::Packages => "packages",
            LogFeature::Bus => "bus",
            LogFeature::HttpServer => "http_server",
        }
    }

    /// Get the target string for this feature
    pub fn target(&self) -> &'static str {
        match self {
            LogFeature::Registry => "droplet_stager::registry",
            LogFeature::Staging => "droplet_stager::staging",
            LogFeature::Gateway => "droplet_stager::gateway",
            LogFeature::Observer => "droplet_stager::observer",
            LogFeature::Packages => "droplet_stager::packages",
            LogFeature::Bus => "droplet_stager::bus",
            LogFeature::HttpServer => "droplet_stager::http_server",
        }
    }

    pub fn from_name(name: &str) -> Option<LogFeature> {
        LogFeature::all().iter().copied().find(|f| f.name() == name)
    }
}

// Registry-specific logging macros
#[macro_export]
macro_rules! log_registry_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "droplet_stager::registry", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_registry_info {
    ($($arg:tt)*) => {
        log::info!(target: "droplet_stager::registry", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_registry_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "droplet_stager::registry", $($arg)*)
    };
}

// Staging-specific logging macros
#[macro_export]
macro_rules! log_staging_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "droplet_stager::staging", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_staging_info {
    ($($arg:tt)*) => {
        log::info!(target: "droplet_stager::staging", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_staging_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "droplet_stager::staging", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_staging_error {
    ($($arg:tt)*) => {
        log::error!(target: "droplet_stager::staging", $($arg)*)
    };
}

// Gateway-specific logging macros
#[macro_export]
macro_rules! log_gateway_info {
    ($($arg:tt)*) => {
        log::info!(target: "droplet_stager::gateway", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_gateway_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "droplet_stager::gateway", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_gateway_error {
    ($($arg:tt)*) => {
        log::error!(target: "droplet_stager::gateway", $($arg)*)
    };
}

// Observer-specific logging macros
#[macro_export]
macro_rules! log_observer_info {
    ($($arg:tt)*) => {
        log::info!(target: "droplet_stager::observer", $($arg)*)
    };
}

// Packages-specific logging macros
#[macro_export]
macro_rules! log_packages_info {
    ($($arg:tt)*) => {
        log::info!(target: "droplet_stager::packages", $($arg)*)
    };
}

// Bus-specific logging macros
#[macro_export]
macro_rules! log_bus_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "droplet_stager::bus", $($arg)*)
    };
}
