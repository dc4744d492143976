//! Instrumentation settings read from the gateway's `extra_config`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ExtraConfig;
use crate::instrumentation::InstrumentationError;

/// Namespace of the instrumentation block inside `extra_config`.
pub const NAMESPACE: &str = "gateway_instrumentation";

/// Instrumentation block, e.g. `{ "rate": 25, "sample_buffer": 1000 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InstrumentationConfig {
    /// Percentage of requests to trace.
    #[serde(rename = "rate", default)]
    pub instrumentation_rate: i64,

    /// Capacity of the pre-drawn sample buffer. Zero draws per request.
    #[serde(default)]
    pub sample_buffer: usize,
}

impl InstrumentationConfig {
    pub fn sampling_rate(&self) -> SamplingRate {
        SamplingRate::saturating(self.instrumentation_rate)
    }
}

/// Share of requests to trace, as a percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SamplingRate(u8);

impl SamplingRate {
    pub const NEVER: SamplingRate = SamplingRate(0);
    pub const ALWAYS: SamplingRate = SamplingRate(100);

    /// Clamp any configured value into `0..=100`, warning when it was out of
    /// range.
    pub fn clamped(rate: i64) -> Self {
        let clamped = Self::saturating(rate);
        if i64::from(clamped.0) != rate {
            tracing::warn!(
                configured = rate,
                effective = clamped.0,
                "Instrumentation rate out of range, clamping"
            );
        }
        clamped
    }

    /// Clamp into `0..=100` silently.
    pub fn saturating(rate: i64) -> Self {
        // within 0..=100 after the clamp
        SamplingRate(rate.clamp(0, 100) as u8)
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    /// Probability in `[0, 1]`.
    pub fn probability(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

/// Read the instrumentation block from the extension config.
pub fn config_getter(extra: &ExtraConfig) -> Result<InstrumentationConfig, InstrumentationError> {
    let value = extra.get(NAMESPACE).ok_or_else(|| {
        InstrumentationError::Config(format!(
            "namespace {} is not defined in extra_config",
            NAMESPACE
        ))
    })?;

    if !matches!(value, Value::Object(_)) {
        return Err(InstrumentationError::Config(format!(
            "namespace {} is not an object",
            NAMESPACE
        )));
    }

    let mut config: InstrumentationConfig = serde_json::from_value(value.clone())?;
    let rate = SamplingRate::clamped(config.instrumentation_rate);
    config.instrumentation_rate = i64::from(rate.percent());
    Ok(config)
}
