#[macro_export]
macro_rules! log_or_err {
    ($params:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $params.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("discarded-resolution list must have {expected} entries for {trls} temporal levels, got {got}")]
    DiscardListLength {
        expected: usize,
        got: usize,
        trls: usize,
    },

    #[error("resolution {x}x{y} is not divisible by the derived block size {block}")]
    BlockDivisibility { x: usize, y: usize, block: usize },

    #[error("gain table row {row} has {got} entries, expected {expected}")]
    GainTableWidth {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("no built-in gain table for {0} temporal levels; provide one via --gain-table")]
    GainTableMissing(usize),

    #[error("combination must have {expected} entries, got {got}")]
    CombinationLength { expected: usize, got: usize },

    #[error("per-GOP schedule has {got} rows, expected one per GOP ({expected})")]
    ScheduleLength { expected: usize, got: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("truncation of {file} rejected by the codec: {stderr}")]
    Truncate { file: String, stderr: String },

    #[error("expansion failed in {dir}: {stderr}")]
    Expand { dir: String, stderr: String },

    #[error("distortion measurement of {a} vs {b} produced no output")]
    MeasureEmpty { a: String, b: String },

    #[error("distortion measurement of {a} vs {b} returned unparseable output: {line}")]
    MeasureParse { a: String, b: String, line: String },

    #[error("header probe of {file} produced no usable size")]
    Header { file: String },

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}
