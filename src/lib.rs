//! pigeon sends statsd metrics without ever blocking your threads on the network.
//!
//! Every emission call samples, encodes and enqueues a single wire line. A background sender
//! thread owned by the [Client] drains the queue in order and writes each line to the collector
//! as its own UDP datagram. The queue is bounded (100 lines unless configured otherwise), so a
//! collector that can't keep up makes callers wait instead of growing memory or dropping lines.
//!
//! ### Example: dialing a collector and emitting metrics
//!
//! ```no_run
//! use pigeon::Client;
//!
//! let client = Client::dial("127.0.0.1:8125", "myapp").expect("Failed to dial statsd!");
//! client.increment("requests", 1, 1.0).expect("Failed to emit metric!");
//! client.gauge("pool.size", 12, 1.0).expect("Failed to emit metric!");
//! // Sent roughly one time in ten, annotated with `|@0.100000`
//! client.timing("db.query", 34, 0.1).expect("Failed to emit metric!");
//! client.close().expect("Failed to close client!");
//! ```
//!
//! # Usage
//!
//! ## Wire format
//!
//! Lines look like `<prefix>.<stat>:<value>|<type>[|@<rate>]`, where `<type>` is `c` for
//! counters, `g` for gauges and `ms` for timings. With an empty prefix the stat name is used
//! bare. The rate suffix only shows up for observations sampled below 1.0.
//!
//! ## Sampling
//!
//! Every call takes a sample rate in `[0, 1]`. Observations that lose the draw are dropped and
//! the call still returns `Ok(())`, there is nothing for the caller to handle. Pass a seeded
//! generator through [ClientConfig::with_rng] to make sampling reproducible.
//!
//! ## Typed metric names
//!
//! ```no_run
//! use pigeon::{metric, Client};
//!
//! metric!(REQUESTS, "http.requests", Count);
//! metric!(LATENCY, "http.latency", Timing);
//!
//! let client = Client::from_env("myapp").expect("Failed to dial statsd!");
//! client.emit(REQUESTS, 1, 1.0).expect("Failed to emit metric!");
//! let body = client.time_fn(LATENCY.get_name(), 1.0, || "response body");
//! ```
//!
//! ## Configuration
//!
//! [ClientConfig] covers everything [Client::dial] doesn't: queue capacity, a resolution
//! timeout, the random source and the error handler. Without an explicit address the client
//! reads `STATSD_HOST` and `STATSD_PORT`, and `PIGEON_QUEUE_CAPACITY` overrides the default
//! queue size.
//!
//! ## Errors
//!
//! Dialing and [Client::close] report their failures directly. Failures to send a line happen on
//! the sender thread after the caller has moved on, so they go to the error handler instead. The
//! default handler logs them with `tracing` at debug level.
//!
//! ## Shutdown
//!
//! [Client::close] stops accepting lines, lets the sender finish everything already queued, then
//! flushes and closes the socket. Closing twice is harmless, and dropping the client closes it.

/// [Client] is the statsd client and the [ClientConfig] used to build one.
pub mod client;
pub mod error;
pub mod macros;
/// Wire format encoding plus the typed names used with [metric!].
pub mod metric;
/// [Sampler](sampler::Sampler) decides which observations get sent.
pub mod sampler;
mod sender;
/// [Transport](transport::Transport) is where encoded lines end up.
pub mod transport;

pub use client::{Client, ClientConfig};
pub use error::{Error, Result};
pub use metric::{Line, MetricName, MetricType, SampleRate};
pub use sender::ErrorHandler;
pub use transport::{SpyTransport, Transport, UdpTransport};

use once_cell::sync::OnceCell;

static GLOBAL_CLIENT: OnceCell<Client> = OnceCell::new();

/// Installs the process-wide client. Hands the client back if one was already installed.
pub fn set_global_client(client: Client) -> Result<(), Client> {
    GLOBAL_CLIENT.set(client)
}

/// The process-wide client, if [set_global_client] has been called.
pub fn global_client() -> Option<&'static Client> {
    GLOBAL_CLIENT.get()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_global_client() {
        let (rx, spy) = SpyTransport::new();
        let client = Client::from_transport(spy, ClientConfig::default().with_prefix("global"))
            .expect("Failed to build client!");
        assert!(set_global_client(client).is_ok());

        let (_rx, spy) = SpyTransport::new();
        let second = Client::from_transport(spy, ClientConfig::default()).unwrap();
        assert!(set_global_client(second).is_err());

        let client = global_client().expect("Global client should be set");
        client.increment("hits", 1, 1.0).unwrap();
        client.close().unwrap();
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![b"global.hits:1|c".to_vec()]
        );
    }
}
