use std::{
    env,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use rand::RngCore;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    metric::{self, MetricName, MetricType, SampleRate},
    sampler::Sampler,
    sender::{default_error_handler, ErrorHandler, SubmissionQueue},
    transport::{Transport, UdpTransport},
};

pub const STATSD_HOST_ENV: &str = "STATSD_HOST";
pub const STATSD_PORT_ENV: &str = "STATSD_PORT";
const QUEUE_CAPACITY_ENV_VAR: &str = "PIGEON_QUEUE_CAPACITY";
// Port 8125(UDP) is the statsd default
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8125";
const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Clone, Default)]
pub struct ClientConfig {
    /// `host:port` of the collector. Falls back to `STATSD_HOST`/`STATSD_PORT`.
    pub addr: Option<String>,
    pub prefix: String,
    /// Upper bound on address resolution. There is no per-send timeout.
    pub timeout: Option<Duration>,
    pub queue_capacity: Option<usize>,
    sampler: Option<Arc<Sampler>>,
    error_handler: Option<ErrorHandler>,
}

impl ClientConfig {
    pub fn with_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.addr = Some(addr.into());
        self
    }
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = Some(queue_capacity);
        self
    }
    /// Random source for sampling decisions. Seed one to make sampling reproducible.
    pub fn with_rng<R: RngCore + Send + 'static>(mut self, rng: R) -> Self {
        self.sampler = Some(Arc::new(Sampler::new(rng)));
        self
    }
    /// Called from the sender thread for every line that fails to send.
    /// Defaults to a `tracing::debug!` event.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    fn get_addr(&self) -> String {
        self.addr.clone().unwrap_or_else(|| {
            let host = env::var(STATSD_HOST_ENV).unwrap_or(DEFAULT_HOST.to_string());
            let port = env::var(STATSD_PORT_ENV).unwrap_or(DEFAULT_PORT.to_string());
            format!("{}:{}", host, port)
        })
    }
    fn get_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or_else(|| {
            get_env_or_fallback(QUEUE_CAPACITY_ENV_VAR, DEFAULT_QUEUE_CAPACITY)
        })
    }
}

fn get_env_or_fallback(env_var: &str, fallback: usize) -> usize {
    match env::var(env_var) {
        Err(_) => fallback,
        Ok(value) => value.parse::<usize>().unwrap_or_else(|_| {
            debug!("Couldn't parse {env_var} as a usize, falling back to default.");
            fallback
        }),
    }
}

/// Statsd client. Emission only samples, encodes and enqueues; a background sender thread does
/// the actual I/O, so callers block only when the queue is full.
///
/// `Client` is `Send + Sync`, share it by reference or in an `Arc`.
pub struct Client {
    prefix: ArcSwap<String>,
    sampler: Arc<Sampler>,
    queue: SubmissionQueue,
    closed: AtomicBool,
}

impl Client {
    /// `addr` is `"host:port"`. `prefix` may be empty.
    pub fn dial(addr: &str, prefix: &str) -> Result<Self> {
        Self::from_config(ClientConfig::default().with_addr(addr).with_prefix(prefix))
    }

    /// Like [dial](Client::dial), but gives up on name resolution after `timeout`. Statsd is
    /// UDP, so there is no connection handshake to time out.
    pub fn dial_timeout(addr: &str, timeout: Duration, prefix: &str) -> Result<Self> {
        Self::from_config(
            ClientConfig::default()
                .with_addr(addr)
                .with_timeout(timeout)
                .with_prefix(prefix),
        )
    }

    /// Dials `STATSD_HOST:STATSD_PORT`, defaulting to `127.0.0.1:8125`.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_config(ClientConfig::default().with_prefix(prefix))
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let transport = UdpTransport::dial(&config.get_addr(), config.timeout)?;
        Self::from_transport(transport, config)
    }

    /// Starts the sender over any transport. `addr` and `timeout` in `config` are ignored.
    pub fn from_transport<T: Transport>(transport: T, config: ClientConfig) -> Result<Self> {
        let capacity = config.get_queue_capacity();
        let on_error = config.error_handler.unwrap_or_else(default_error_handler);
        let queue = SubmissionQueue::start(transport, capacity, on_error)?;
        Ok(Self {
            prefix: ArcSwap::from_pointee(config.prefix),
            sampler: config.sampler.unwrap_or_default(),
            queue,
            closed: AtomicBool::new(false),
        })
    }

    /// Counter delta, may be negative.
    pub fn increment<R: Into<SampleRate>>(&self, stat: &str, value: i64, rate: R) -> Result<()> {
        self.submit::<MetricType::Count, _>(stat, value, rate)
    }

    pub fn decrement<R: Into<SampleRate>>(&self, stat: &str, value: i64, rate: R) -> Result<()> {
        self.increment(stat, value.saturating_neg(), rate)
    }

    pub fn gauge<R: Into<SampleRate>>(&self, stat: &str, value: i64, rate: R) -> Result<()> {
        self.submit::<MetricType::Gauge, _>(stat, value, rate)
    }

    /// `delta` is in milliseconds.
    pub fn timing<R: Into<SampleRate>>(&self, stat: &str, delta: i64, rate: R) -> Result<()> {
        self.submit::<MetricType::Timing, _>(stat, delta, rate)
    }

    /// Emit through a typed name, see [metric!](crate::metric!).
    pub fn emit<T: MetricType::Impl, R: Into<SampleRate>>(
        &self,
        name: MetricName<'_, T>,
        value: i64,
        rate: R,
    ) -> Result<()> {
        self.submit::<T, _>(name.get_name(), value, rate)
    }

    /// Runs `f` and reports how long it took as a timing.
    pub fn time_fn<T, F: FnOnce() -> T, R: Into<SampleRate>>(
        &self,
        stat: &str,
        rate: R,
        f: F,
    ) -> T {
        let start_time = Instant::now();
        let result = f();
        self.report_elapsed(stat, start_time.elapsed(), rate.into());
        result
    }

    /// Awaits `f` and reports how long it took as a timing.
    pub async fn time_future<T, F: Future<Output = T>, R: Into<SampleRate>>(
        &self,
        stat: &str,
        rate: R,
        f: F,
    ) -> T {
        let start_time = Instant::now();
        let result = f.await;
        self.report_elapsed(stat, start_time.elapsed(), rate.into());
        result
    }

    fn report_elapsed(&self, stat: &str, elapsed: Duration, rate: SampleRate) {
        let millis = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let _ = self
            .timing(stat, millis, rate)
            .map_err(|err| debug!("Got error emitting timing for {stat}, was: {err}"));
    }

    /// Applies to everything emitted after this returns. Lines already queued keep the prefix
    /// they were encoded with.
    pub fn set_prefix(&self, prefix: &str) {
        self.prefix.store(Arc::new(prefix.to_string()));
    }

    pub fn prefix(&self) -> Arc<String> {
        self.prefix.load_full()
    }

    fn submit<T: MetricType::Impl, R: Into<SampleRate>>(
        &self,
        stat: &str,
        value: i64,
        rate: R,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        let sampling = self.sampler.decide(rate);
        if !sampling.should_emit() {
            return Ok(());
        }
        let prefix = self.prefix.load();
        let line = metric::encode::<T>(prefix.as_str(), stat, value, sampling.annotation());
        self.queue.push(line)
    }

    /// Stops the sender after it has sent everything already queued, then flushes and closes the
    /// transport. Calling it again, even from another thread at the same time, waits for the
    /// sender to stop and then returns `Ok(())`.
    ///
    /// Emitting concurrently with `close` is not supported: a caller that was blocked on a full
    /// queue may get `Ok(())` for a line that the sender never writes.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.queue.shutdown()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Error closing statsd client, was: {err}");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("prefix", &self.prefix())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
