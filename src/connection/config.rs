use std::time::Duration;

/// Connection pool configuration
///
/// Defaults mirror the production deployment of the dump updater.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long `get_connection` waits for a free slot
    pub checkout_timeout: Duration,

    /// Maximum number of connections in pool
    pub max_connections: usize,

    /// Minimum number of connections in pool
    pub min_connections: usize,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,

    /// Run the manager's validity check on every checkout
    pub test_on_checkout: bool,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self {
            checkout_timeout: Duration::from_secs(30),
            max_connections: 75,
            min_connections: 1,
            idle_timeout: Some(Duration::from_secs(180)),
            max_lifetime: Some(Duration::from_secs(60 * 60)),
            test_on_checkout: true,
        }
    }

    /// Set checkout timeout
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set minimum connections
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set maximum lifetime
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        if self.checkout_timeout.is_zero() {
            return Err("checkout_timeout must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}
