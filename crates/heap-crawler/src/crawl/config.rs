//! Crawler tuning.

/// Default name of the engine object field caching the native pointer.
pub const DEFAULT_CACHED_POINTER_FIELD: &str = "m_CachedPtr";
/// Default bound on base-type steps taken for one object.
pub const DEFAULT_MAX_INHERITANCE_DEPTH: usize = 64;
/// Default bound on value types nested inside one another.
pub const DEFAULT_MAX_VALUE_TYPE_NESTING: usize = 64;
/// Default largest array length accepted as sane.
pub const DEFAULT_MAX_ARRAY_LENGTH: u64 = i32::MAX as u64;
/// Default number of processed items between progress publications.
pub const DEFAULT_ABORT_CHECK_INTERVAL: usize = 1024;

/// Configuration for one crawl.
#[derive(Clone, Debug)]
pub struct CrawlerConfig {
    /// Instance field on the engine object type holding the native pointer.
    pub cached_pointer_field: String,
    /// Skip value-type fields whose type is the type being walked.
    /// Such fields cannot exist in valid metadata.
    pub ignore_nested_structs: bool,
    /// Base-type steps taken before an inheritance chain is declared looping.
    pub max_inheritance_depth: usize,
    /// Value-type fields followed inside one another before giving up.
    pub max_value_type_nesting: usize,
    /// Array lengths above this are treated as corrupt.
    pub max_array_length: u64,
    /// Items processed between progress publications and abort checks.
    pub abort_check_interval: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            cached_pointer_field: DEFAULT_CACHED_POINTER_FIELD.to_owned(),
            ignore_nested_structs: true,
            max_inheritance_depth: DEFAULT_MAX_INHERITANCE_DEPTH,
            max_value_type_nesting: DEFAULT_MAX_VALUE_TYPE_NESTING,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            abort_check_interval: DEFAULT_ABORT_CHECK_INTERVAL,
        }
    }
}

impl CrawlerConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cached native pointer field name.
    pub fn set_cached_pointer_field(&mut self, name: impl Into<String>) {
        self.cached_pointer_field = name.into();
    }

    /// Enable or disable skipping of self-nested value-type fields.
    pub const fn set_ignore_nested_structs(&mut self, enabled: bool) {
        self.ignore_nested_structs = enabled;
    }

    /// Set the inheritance depth bound. At least one step is always allowed.
    pub const fn set_max_inheritance_depth(&mut self, depth: usize) {
        self.max_inheritance_depth = if depth < 1 { 1 } else { depth };
    }

    /// Set the value-type nesting bound.
    pub const fn set_max_value_type_nesting(&mut self, depth: usize) {
        self.max_value_type_nesting = depth;
    }

    /// Set the largest accepted array length.
    pub const fn set_max_array_length(&mut self, length: u64) {
        self.max_array_length = length;
    }

    /// Set the progress interval. Zero is treated as one.
    pub const fn set_abort_check_interval(&mut self, interval: usize) {
        self.abort_check_interval = if interval < 1 { 1 } else { interval };
    }

    /// Progress interval actually used.
    #[must_use]
    pub fn effective_check_interval(&self) -> usize {
        self.abort_check_interval.max(1)
    }
}
