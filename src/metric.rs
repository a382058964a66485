use std::{fmt::Write as _, marker::PhantomData};

use derive_more::{Display, From};

#[allow(non_snake_case)]
pub mod MetricType {
    /// Implemented exclusively by members of this phantom type enum
    /// This is for use as a trait bound
    pub trait Impl {
        fn name() -> &'static str;
        /// The type marker statsd expects after the value, e.g. `c` in `foo:1|c`.
        fn suffix() -> &'static str;
    }
    /// Count
    #[derive(Copy, Clone, Debug)]
    pub enum Count {}
    impl Impl for Count {
        fn name() -> &'static str {
            "count"
        }
        fn suffix() -> &'static str {
            "c"
        }
    }

    /// Gauge
    #[derive(Copy, Clone, Debug)]
    pub enum Gauge {}
    impl Impl for Gauge {
        fn name() -> &'static str {
            "gauge"
        }
        fn suffix() -> &'static str {
            "g"
        }
    }

    /// Timing, always in milliseconds
    #[derive(Copy, Clone, Debug)]
    pub enum Timing {}
    impl Impl for Timing {
        fn name() -> &'static str {
            "timing"
        }
        fn suffix() -> &'static str {
            "ms"
        }
    }
}

/// A stat name that remembers which kind of metric it was declared as.
#[derive(Debug)]
pub struct MetricName<'a, T: MetricType::Impl>(&'a str, PhantomData<T>);

// Manual impls, derive would put a bound on the phantom type.
impl<'a, T: MetricType::Impl> Clone for MetricName<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T: MetricType::Impl> Copy for MetricName<'a, T> {}

impl<'a, T: MetricType::Impl> MetricName<'a, T> {
    pub const fn new(name: &'a str) -> Self {
        Self(name, PhantomData)
    }
    pub fn get_name(&self) -> &'a str {
        self.0
    }
}

impl<'a> MetricName<'a, MetricType::Count> {
    pub const fn count(name: &'a str) -> Self {
        Self(name, PhantomData)
    }
}
impl<'a> MetricName<'a, MetricType::Gauge> {
    pub const fn gauge(name: &'a str) -> Self {
        Self(name, PhantomData)
    }
}
impl<'a> MetricName<'a, MetricType::Timing> {
    pub const fn timing(name: &'a str) -> Self {
        Self(name, PhantomData)
    }
}

impl<'a, T: MetricType::Impl> From<MetricName<'a, T>> for &'a str {
    fn from(m: MetricName<'a, T>) -> Self {
        m.0
    }
}

/// Probability that an observation is actually sent, clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SampleRate(f64);

impl SampleRate {
    pub const ALWAYS: SampleRate = SampleRate(1.0);
    pub const NEVER: SampleRate = SampleRate(0.0);

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            return Self::NEVER;
        }
        Self(value.clamp(0.0, 1.0))
    }
}

impl From<f32> for SampleRate {
    fn from(value: f32) -> Self {
        f64::from(value).into()
    }
}

impl From<SampleRate> for f64 {
    fn from(rate: SampleRate) -> f64 {
        rate.0
    }
}

/// A fully encoded wire line, ready to be handed to the transport as-is.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display, From)]
pub struct Line(String);

impl Line {
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// `"<value>|<suffix>"`, plus `"|@<rate>"` when the observation was sampled.
pub fn encode_value<T: MetricType::Impl>(value: i64, sampled: Option<SampleRate>) -> String {
    let mut encoded = format!("{}|{}", value, T::suffix());
    if let Some(rate) = sampled {
        // Six fractional digits is what every statsd client in the wild writes.
        let _ = write!(encoded, "|@{:.6}", rate.get());
    }
    encoded
}

/// Stat name with the client prefix applied, if there is one.
pub fn qualify(prefix: &str, stat: &str) -> String {
    if prefix.is_empty() {
        stat.to_string()
    } else {
        format!("{}.{}", prefix, stat)
    }
}

pub fn format_line(prefix: &str, stat: &str, encoded: &str) -> Line {
    Line(format!("{}:{}", qualify(prefix, stat), encoded))
}

pub fn encode<T: MetricType::Impl>(
    prefix: &str,
    stat: &str,
    value: i64,
    sampled: Option<SampleRate>,
) -> Line {
    format_line(prefix, stat, &encode_value::<T>(value, sampled))
}
