mod settings;

pub use settings::{
    ConfigError, TomlConfig, TomlTraceConfig, TraceConfig, ENV_TRACE_DIR, ENV_TRACE_LEVEL,
    EXAMPLE_CONFIG,
};
