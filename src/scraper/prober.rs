use crate::checks::model::{Check, CheckType};
use crate::checks::settings::{CheckSettings, HttpMethod, HttpSettings};
use crate::event::cancellation::CancellationMessage;
use crate::event::channel::EventConsumer;
use prometheus::{register_gauge_with_registry, Registry};
use std::collections::HashMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Per-run execution context handed to a prober: the run's deadline plus the
/// scraper's cancellation signal. Probers are expected to bound all blocking
/// work by [`ProbeContext::remaining`].
pub struct ProbeContext<'a> {
    deadline: Instant,
    cancellation: &'a EventConsumer<CancellationMessage>,
}

impl<'a> ProbeContext<'a> {
    pub fn new(deadline: Instant, cancellation: &'a EventConsumer<CancellationMessage>) -> Self {
        Self {
            deadline,
            cancellation,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left until the deadline; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Non-blocking poll of the scraper's cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled(Duration::ZERO)
    }
}

/// A check-type implementation. Probers are capability objects: the scraper
/// invokes them with the run context and a per-run metrics registry and only
/// cares about the boolean outcome. A probe reporting failure is a normal,
/// publishable result, not an engine error.
pub trait Prober: Send + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn probe(&self, ctx: &ProbeContext<'_>, target: &str, registry: &Registry) -> bool;
}

#[derive(Debug, Error)]
pub enum ProberError {
    #[error("no prober registered for {0} checks")]
    Unsupported(CheckType),
    #[error("failed to set up {check_type} prober: {reason}")]
    Setup {
        check_type: CheckType,
        reason: String,
    },
}

pub type ProberFactory = Box<dyn Fn(&Check) -> Result<Box<dyn Prober>, ProberError> + Send + Sync>;

/// Maps check types to prober factories. The concrete prober set is supplied
/// by the embedding binary; checks of unregistered types are dropped by the
/// manager with a counted reason.
#[derive(Default)]
pub struct ProberRegistry {
    factories: HashMap<CheckType, ProberFactory>,
}

impl ProberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in stand-ins: plain TCP connect and HTTP request probers.
    /// Richer implementations register over them.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            CheckType::Tcp,
            Box::new(|_| Ok(Box::new(TcpProber) as Box<dyn Prober>)),
        );
        registry.register(
            CheckType::Http,
            Box::new(|check| HttpProber::from_check(check).map(|p| Box::new(p) as Box<dyn Prober>)),
        );
        registry
    }

    pub fn register(&mut self, check_type: CheckType, factory: ProberFactory) {
        self.factories.insert(check_type, factory);
    }

    pub fn supports(&self, check_type: CheckType) -> bool {
        self.factories.contains_key(&check_type)
    }

    pub fn build(&self, check: &Check) -> Result<Box<dyn Prober>, ProberError> {
        let check_type = check.check_type();
        let factory = self
            .factories
            .get(&check_type)
            .ok_or(ProberError::Unsupported(check_type))?;
        factory(check)
    }
}

/// TCP connect prober: success is an established connection to `host:port`
/// within the deadline.
#[derive(Debug)]
pub struct TcpProber;

impl Prober for TcpProber {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn probe(&self, ctx: &ProbeContext<'_>, target: &str, registry: &Registry) -> bool {
        let connect_duration = register_gauge_with_registry!(
            "probe_connect_duration_seconds",
            "Time taken to establish the TCP connection.",
            registry
        )
        .expect("metric registration should not fail");

        let start = Instant::now();
        let addrs = match target.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                debug!(target, error = %err, "tcp target resolution failed");
                return false;
            }
        };
        for addr in addrs {
            let remaining = ctx.remaining();
            if remaining.is_zero() || ctx.is_cancelled() {
                return false;
            }
            if TcpStream::connect_timeout(&addr, remaining).is_ok() {
                connect_duration.set(start.elapsed().as_secs_f64());
                return true;
            }
        }
        false
    }
}

/// HTTP prober: issues the configured request and checks the response status
/// against the accepted set (2xx when none is configured).
#[derive(Debug)]
pub struct HttpProber {
    settings: HttpSettings,
}

impl HttpProber {
    pub fn from_check(check: &Check) -> Result<Self, ProberError> {
        match &check.settings {
            CheckSettings::Http(settings) => Ok(Self {
                settings: settings.clone(),
            }),
            _ => Err(ProberError::Setup {
                check_type: check.check_type(),
                reason: "not an http check".to_string(),
            }),
        }
    }

    fn method(&self) -> reqwest::Method {
        match self.settings.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }

    fn status_accepted(&self, status: u16) -> bool {
        if self.settings.valid_status_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.settings.valid_status_codes.contains(&status)
        }
    }
}

impl Prober for HttpProber {
    fn name(&self) -> &'static str {
        "http"
    }

    fn probe(&self, ctx: &ProbeContext<'_>, target: &str, registry: &Registry) -> bool {
        let status_code = register_gauge_with_registry!(
            "probe_http_status_code",
            "Response HTTP status code.",
            registry
        )
        .expect("metric registration should not fail");
        let request_duration = register_gauge_with_registry!(
            "probe_http_duration_seconds",
            "Time taken for the HTTP request.",
            registry
        )
        .expect("metric registration should not fail");

        let remaining = ctx.remaining();
        if remaining.is_zero() {
            return false;
        }
        let client = match reqwest::blocking::Client::builder()
            .timeout(remaining)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                debug!(error = %err, "http prober client setup failed");
                return false;
            }
        };

        let mut request = client.request(self.method(), target);
        if let Some(auth) = &self.settings.basic_auth {
            request = request.basic_auth(&auth.username, Some(auth.password.expose()));
        }
        if !self.settings.bearer_token.is_empty() {
            request = request.bearer_auth(self.settings.bearer_token.expose());
        }
        if !self.settings.body.is_empty() {
            request = request.body(self.settings.body.clone());
        }

        let start = Instant::now();
        match request.send() {
            Ok(response) => {
                request_duration.set(start.elapsed().as_secs_f64());
                let status = response.status().as_u16();
                status_code.set(f64::from(status));
                self.status_accepted(status)
            }
            Err(err) => {
                request_duration.set(start.elapsed().as_secs_f64());
                debug!(target, error = %err, "http probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::checks::model::tests::{http_check, ping_check};
    use crate::event::channel::pub_sub;
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use std::net::TcpListener;

    /// Configurable test prober recording each invocation.
    #[derive(Debug)]
    pub struct StaticProber {
        pub success: bool,
        pub delay: Duration,
        pub invocations: std::sync::Arc<std::sync::Mutex<Vec<Instant>>>,
    }

    impl StaticProber {
        pub fn succeeding() -> Self {
            Self {
                success: true,
                delay: Duration::ZERO,
                invocations: Default::default(),
            }
        }
    }

    impl Prober for StaticProber {
        fn name(&self) -> &'static str {
            "static"
        }

        fn probe(&self, _ctx: &ProbeContext<'_>, _target: &str, _registry: &Registry) -> bool {
            self.invocations.lock().unwrap().push(Instant::now());
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.success
        }
    }

    #[test]
    fn registry_builds_for_registered_types() {
        let registry = ProberRegistry::with_builtins();
        assert!(registry.supports(CheckType::Tcp));
        assert!(registry.supports(CheckType::Http));
        assert!(!registry.supports(CheckType::Dns));

        assert!(registry.build(&http_check(1, 1)).is_ok());
        assert_matches!(
            registry.build(&ping_check(1, 1)),
            Err(ProberError::Unsupported(CheckType::Ping))
        );
    }

    #[test]
    fn tcp_prober_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (_cancel, consumer) = pub_sub();
        let ctx = ProbeContext::new(Instant::now() + Duration::from_secs(2), &consumer);

        let registry = Registry::new();
        assert!(TcpProber.probe(&ctx, &addr.to_string(), &registry));
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn tcp_prober_fails_on_unresolvable_target() {
        let (_cancel, consumer) = pub_sub();
        let ctx = ProbeContext::new(Instant::now() + Duration::from_millis(200), &consumer);
        assert!(!TcpProber.probe(&ctx, "not a target", &Registry::new()));
    }

    #[test]
    fn http_prober_accepts_2xx_by_default() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(204);
        });

        let prober = HttpProber::from_check(&http_check(1, 1)).unwrap();
        let (_cancel, consumer) = pub_sub();
        let ctx = ProbeContext::new(Instant::now() + Duration::from_secs(2), &consumer);
        let registry = Registry::new();
        assert!(prober.probe(&ctx, &server.url("/health"), &registry));
    }

    #[test]
    fn http_prober_honours_valid_status_codes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET);
            then.status(500);
        });

        let mut check = http_check(1, 1);
        check.settings = CheckSettings::Http(HttpSettings {
            valid_status_codes: vec![500],
            ..Default::default()
        });
        let prober = HttpProber::from_check(&check).unwrap();
        let (_cancel, consumer) = pub_sub();
        let ctx = ProbeContext::new(Instant::now() + Duration::from_secs(2), &consumer);
        assert!(prober.probe(&ctx, &server.url("/"), &Registry::new()));
    }

    #[test]
    fn probe_context_remaining_saturates() {
        let (_cancel, consumer) = pub_sub();
        let ctx = ProbeContext::new(Instant::now() - Duration::from_secs(1), &consumer);
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[test]
    fn probe_context_sees_cancellation() {
        let (cancel, consumer) = pub_sub();
        let ctx = ProbeContext::new(Instant::now() + Duration::from_secs(1), &consumer);
        assert!(!ctx.is_cancelled());
        cancel.publish(()).unwrap();
        assert!(ctx.is_cancelled());
    }
}
