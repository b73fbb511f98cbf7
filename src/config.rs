//! Bridge configuration.

/// Memory pressure (bytes) above which `Bridge::collect_if_needed` runs a pass.
pub const DEFAULT_COLLECT_THRESHOLD_BYTES: usize = 64 * 1024 * 1024;

/// Maximum array nesting converted when handing script values to the host.
pub const DEFAULT_MAX_MARSHAL_DEPTH: usize = 32;

/// Maximum object nesting `JSON.stringify` walks before throwing a RangeError.
pub const DEFAULT_MAX_JSON_DEPTH: usize = 512;

/// Jobs that may wait for the engine thread before senders are held back.
pub const DEFAULT_DISPATCH_QUEUE_SIZE: usize = 64;

const ENV_COLLECT_THRESHOLD: &str = "OBJECT_BRIDGE_COLLECT_THRESHOLD";
const ENV_MAX_MARSHAL_DEPTH: &str = "OBJECT_BRIDGE_MAX_MARSHAL_DEPTH";
const ENV_MAX_JSON_DEPTH: &str = "OBJECT_BRIDGE_MAX_JSON_DEPTH";
const ENV_DISPATCH_QUEUE: &str = "OBJECT_BRIDGE_DISPATCH_QUEUE";

/// Tunables shared by the bridge, the heap engine and the engine thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub collect_threshold_bytes: usize,
    pub max_marshal_depth: usize,
    pub max_json_depth: usize,
    /// Capacity of the engine thread's job channel (backpressure)
    pub dispatch_queue_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            collect_threshold_bytes: DEFAULT_COLLECT_THRESHOLD_BYTES,
            max_marshal_depth: DEFAULT_MAX_MARSHAL_DEPTH,
            max_json_depth: DEFAULT_MAX_JSON_DEPTH,
            dispatch_queue_size: DEFAULT_DISPATCH_QUEUE_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `OBJECT_BRIDGE_*` environment variables.
    ///
    /// Values that do not parse as a positive integer are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let read = |key: &str, target: &mut usize| {
            let Some(raw) = lookup(key) else {
                return;
            };

            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => *target = value,
                _ => log::warn!("Ignoring invalid value for {}: {:?}", key, raw),
            }
        };

        read(ENV_COLLECT_THRESHOLD, &mut config.collect_threshold_bytes);
        read(ENV_MAX_MARSHAL_DEPTH, &mut config.max_marshal_depth);
        read(ENV_MAX_JSON_DEPTH, &mut config.max_json_depth);
        read(ENV_DISPATCH_QUEUE, &mut config.dispatch_queue_size);

        config
    }

    pub fn with_collect_threshold(mut self, bytes: usize) -> Self {
        self.collect_threshold_bytes = bytes;
        self
    }

    pub fn with_max_marshal_depth(mut self, depth: usize) -> Self {
        self.max_marshal_depth = depth;
        self
    }

    pub fn with_max_json_depth(mut self, depth: usize) -> Self {
        self.max_json_depth = depth;
        self
    }

    pub fn with_dispatch_queue_size(mut self, size: usize) -> Self {
        self.dispatch_queue_size = size.max(1);
        self
    }
}
