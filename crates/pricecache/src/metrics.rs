//! Statsd reporting for the price cache.
//!
//! Nothing is reported until [`configure_statsd`] was called, until then every [`metric!`](crate::metric) is a
//! no-op.
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use cadence::{Metric, MetricBuilder, StatsdClient, UdpMetricSink};

static REPORTER: OnceLock<Reporter> = OnceLock::new();

/// Traits needed by the [`metric!`](crate::metric) macro.
pub mod prelude {
    pub use cadence::prelude::*;
}

/// A statsd client that attaches the configured default tags to every metric.
#[derive(Debug)]
pub struct Reporter {
    statsd: StatsdClient,
    default_tags: BTreeMap<String, String>,
}

impl Reporter {
    pub fn statsd(&self) -> &StatsdClient {
        &self.statsd
    }

    pub fn send<'a, T>(&'a self, metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        self.default_tags
            .iter()
            .fold(metric, |metric, (key, value)| metric.with_tag(key, value))
            .send()
    }
}

/// Starts reporting metrics to the statsd server at `host`, prefixing every metric name with
/// `prefix`.
///
/// Fails if `host` cannot be resolved, or if reporting was configured before.
pub fn configure_statsd<A: ToSocketAddrs>(
    prefix: &str,
    host: A,
    default_tags: BTreeMap<String, String>,
) -> Result<()> {
    let addrs: Vec<_> = host
        .to_socket_addrs()
        .context("failed to resolve statsd host")?
        .collect();
    let Some(addr) = addrs.first() else {
        return Err(anyhow!("statsd host resolved to no addresses"));
    };
    tracing::info!(%addr, prefix, "Reporting price cache metrics to statsd");

    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind statsd socket")?;
    socket.set_nonblocking(true)?;
    let sink = UdpMetricSink::from(&addrs[..], socket).context("failed to create statsd sink")?;

    REPORTER
        .set(Reporter {
            statsd: StatsdClient::from_sink(prefix, sink),
            default_tags,
        })
        .map_err(|_| anyhow!("statsd is already configured"))
}

/// Runs `f` with the configured [`Reporter`], if any.
#[inline(always)]
pub fn with_reporter<F: FnOnce(&Reporter)>(f: F) {
    if let Some(reporter) = REPORTER.get() {
        f(reporter);
    }
}

/// Emits a metric.
///
/// ```ignore
/// metric!(counter("prices.fetch") += 1, "status" => "ok");
/// metric!(timer("prices.fetch.duration") = elapsed);
/// metric!(histogram("prices.batch.size") = 12);
/// ```
#[macro_export]
macro_rules! metric {
    (counter($id:expr) += $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send count_with_tags($id, $value) $(, $k => $v)*)
    };
    (timer($id:expr) = $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send time_with_tags($id, $value) $(, $k => $v)*)
    };
    (histogram($id:expr) = $value:expr $(, $k:expr => $v:expr)* $(,)?) => {
        $crate::metric!(@send histogram_with_tags($id, $value) $(, $k => $v)*)
    };
    (@send $method:ident($id:expr, $value:expr) $(, $k:expr => $v:expr)*) => {{
        use $crate::metrics::prelude::*;
        $crate::metrics::with_reporter(|reporter| {
            reporter.send(reporter.statsd().$method($id, $value)$(.with_tag($k, $v))*);
        })
    }};
}
