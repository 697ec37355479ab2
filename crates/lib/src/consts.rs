/// Name of the application, used for binary and log targets.
pub const APP_NAME: &str = "fftt";

/// Build file looked up in the working directory when none is given.
pub const GRAPH_FILE: &str = "fftt.yaml";

/// Link under the build root pointing at the most recent build tag.
pub const LATEST_LINK: &str = "latest";

/// Environment variable overriding the number of concurrent task executions.
pub const PARALLELISM_ENV: &str = "FFTT_PARALLELISM";

/// Environment variable setting a per-task execution deadline in seconds.
pub const TIMEOUT_ENV: &str = "FFTT_TIMEOUT_SECS";

/// Environment variable disabling memo lookups when set to a truthy value.
pub const NO_CACHE_ENV: &str = "FFTT_NO_CACHE";
