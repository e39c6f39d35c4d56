//! Connection-level configuration.
//!
//! Table-level knobs (bucket sizes, lookup parameters, bootstrap records)
//! live in [`lodestone_discovery::TableOptions`]; this covers the request
//! lifecycle.

/// Request lifecycle configuration.
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    /// How long a pending or cached request may wait for a reply, in ms.
    pub request_timeout_ms: u64,
    /// Interval between sweep ticks, in ms. Timeout expiry latency is
    /// bounded by this, not exact.
    pub sweep_interval_ms: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2_000,
            sweep_interval_ms: 500,
        }
    }
}

impl ConnectionOptions {
    /// Start from defaults.
    #[must_use]
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder {
            options: Self::default(),
        }
    }
}

/// Builder for [`ConnectionOptions`].
pub struct ConnectionOptionsBuilder {
    options: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    /// Set the request timeout.
    #[must_use]
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.options.request_timeout_ms = ms;
        self
    }

    /// Set the sweep tick interval.
    #[must_use]
    pub fn sweep_interval_ms(mut self, ms: u64) -> Self {
        self.options.sweep_interval_ms = ms;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ConnectionOptions {
        self.options
    }
}
