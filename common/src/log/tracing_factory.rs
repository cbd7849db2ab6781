use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Whether the global subscriber has already been installed. `tracing`
/// only accepts one global default per process, and the env/config
/// refresh paths may call into this more than once.
static IS_INIT: AtomicBool = AtomicBool::new(false);

/// Output shape, selected by the running profile (spec §6 `PROFILE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// Pretty, human-oriented console output. Used for `local`.
    Console,
    /// Structured JSON lines, suitable for log aggregation. Used for
    /// anything other than `local`/`test`.
    Json,
    /// No output at all. Used for `test`, mirroring the Go source's
    /// `zap.NewNop()` branch.
    Silent,
}

impl OutputType {
    pub fn for_profile(profile: &str) -> Self {
        match profile {
            "local" => OutputType::Console,
            "test" => OutputType::Silent,
            _ => OutputType::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingFactoryOptions {
    pub level: Level,
    pub output_type: OutputType,
    pub service_name: String,
}

impl Default for TracingFactoryOptions {
    fn default() -> Self {
        TracingFactoryOptions {
            level: Level::INFO,
            output_type: OutputType::Console,
            service_name: String::from("datahub-mssql-datalayer"),
        }
    }
}

pub struct TracingFactory;

impl TracingFactory {
    /// Initializes the process-global subscriber. Safe to call more than
    /// once; only the first call takes effect.
    pub fn init(opts: TracingFactoryOptions) {
        if IS_INIT.swap(true, Ordering::SeqCst) {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(opts.level.to_string()));

        match opts.output_type {
            OutputType::Silent => {
                // still install a subscriber so `tracing` macros don't panic,
                // just drop everything on the floor.
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::new("off"))
                    .try_init();
            }
            OutputType::Console => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(false)
                    .with_thread_ids(true)
                    .pretty()
                    .try_init();
            }
            OutputType::Json => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .json()
                    .with_current_span(false)
                    .try_init();
            }
        }
    }

    /// Convenience entry point driven directly by the `PROFILE` env value.
    pub fn init_for_profile(profile: &str, service_name: &str) {
        TracingFactory::init(TracingFactoryOptions {
            level: Level::INFO,
            output_type: OutputType::for_profile(profile),
            service_name: service_name.to_string(),
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn second_init_is_a_noop() {
        TracingFactory::init_for_profile("test", "test-svc");
        // should not panic even though a subscriber is already installed
        TracingFactory::init_for_profile("local", "test-svc");
    }

    #[test]
    fn output_type_follows_profile() {
        assert_eq!(OutputType::for_profile("local"), OutputType::Console);
        assert_eq!(OutputType::for_profile("test"), OutputType::Silent);
        assert_eq!(OutputType::for_profile("production"), OutputType::Json);
    }
}
