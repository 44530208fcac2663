//! One client run inside a simulated network.
//!
//! A [`Scenario`] places one or more [`EchoServer`] hosts and the real
//! client in a Turmoil simulation: the production [`Client`] run path over
//! a [`UdpEngine`] bound to a simulated socket, wrapped in a
//! [`RecordingEngine`] so teardown can be checked afterwards.

use std::{
    error::Error,
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use echoprobe_client::{Client, ClientConfig, ClientError, UdpEngine};
use echoprobe_core::{Environment, SessionReport, ShutdownSignal};

use crate::{
    recording::{EngineStats, RecordingEngine},
    server::{EchoServer, SERVER_PORT, ServerBehavior, ServerStats, ServerStatsHandle},
    sim_env::SimEnv,
    sim_transport::SimTransport,
    token::TestTokenBuilder,
};

/// Link conditions for the whole simulated network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Network {
    /// Per-step chance a link starts dropping datagrams.
    pub fail_rate: f64,
    /// Per-step chance a failed link recovers.
    pub repair_rate: f64,
    /// Lower bound on one-way latency.
    pub min_latency: Duration,
    /// Upper bound on one-way latency.
    pub max_latency: Duration,
    /// Seed for every random choice the simulation makes.
    pub seed: u64,
}

impl Network {
    /// Lossy link with the default latency.
    pub const fn lossy(fail_rate: f64, repair_rate: f64, seed: u64) -> Self {
        Self { fail_rate, repair_rate, ..Self::PERFECT }.with_seed(seed)
    }

    /// Lossless link with a fixed 5 ms latency.
    pub const PERFECT: Self = Self {
        fail_rate: 0.0,
        repair_rate: 1.0,
        min_latency: Duration::from_millis(5),
        max_latency: Duration::from_millis(5),
        seed: 0,
    };

    /// Same link, different seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Same link, latency drawn from `min..=max`.
    #[must_use]
    pub const fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max;
        self
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::PERFECT
    }
}

/// Extra virtual time after the client finishes, on top of the latency.
const SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
enum Stop {
    Never,
    BeforeRun,
    After(Duration),
}

/// Result of a scenario run.
#[derive(Debug)]
pub struct ScenarioOutcome {
    /// What the client run returned.
    pub result: Result<SessionReport, ClientError>,
    /// Calls the session loop made on the engine.
    pub engine: EngineStats,
    /// Per-server counters, in token order.
    pub servers: Vec<ServerStats>,
    /// Virtual time the client run took.
    pub elapsed: Duration,
}

impl ScenarioOutcome {
    /// Counters of the first server.
    pub fn server(&self) -> &ServerStats {
        &self.servers[0]
    }
}

struct ClientRun {
    result: Result<SessionReport, ClientError>,
    engine: EngineStats,
    elapsed: Duration,
}

/// Builder for a simulated client run.
#[derive(Debug, Clone)]
pub struct Scenario {
    servers: Vec<EchoServer>,
    token: TestTokenBuilder,
    raw_token: Option<String>,
    config: ClientConfig,
    network: Network,
    duration: Duration,
    stop: Stop,
    socket_available: bool,
}

impl Scenario {
    /// Client against a single `server`.
    pub fn new(server: EchoServer) -> Self {
        Self {
            servers: vec![server],
            token: TestTokenBuilder::localhost(),
            raw_token: None,
            config: ClientConfig::default(),
            network: Network::PERFECT,
            duration: Duration::from_secs(120),
            stop: Stop::Never,
            socket_available: true,
        }
    }

    /// Client against a single server acting out `behavior`.
    pub fn with_behavior(behavior: ServerBehavior) -> Self {
        Self::new(EchoServer::new(behavior))
    }

    /// Add a server after the existing ones in the token.
    #[must_use]
    pub fn fallback(mut self, server: EchoServer) -> Self {
        self.servers.push(server);
        self
    }

    /// Token settings; the server list is filled in with the simulated hosts.
    #[must_use]
    pub fn token(mut self, token: TestTokenBuilder) -> Self {
        self.token = token;
        self
    }

    /// Hand the client this text instead of a built token.
    #[must_use]
    pub fn raw_token(mut self, text: impl Into<String>) -> Self {
        self.raw_token = Some(text.into());
        self
    }

    /// Stop cleanly after `ticks` ticks.
    #[must_use]
    pub const fn max_ticks(mut self, ticks: u64) -> Self {
        self.config.driver.max_ticks = Some(ticks);
        self
    }

    /// Local address handed to the engine.
    #[must_use]
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.bind_address = address.into();
        self
    }

    /// Link conditions.
    #[must_use]
    pub const fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Request a stop before the first tick.
    #[must_use]
    pub const fn stop_before_run(mut self) -> Self {
        self.stop = Stop::BeforeRun;
        self
    }

    /// Request a stop once `after` of virtual time has passed, between
    /// ticks the way an interrupt lands.
    #[must_use]
    pub const fn stop_after(mut self, after: Duration) -> Self {
        self.stop = Stop::After(after);
        self
    }

    /// Make every session bind fail.
    #[must_use]
    pub const fn without_socket(mut self) -> Self {
        self.socket_available = false;
        self
    }

    /// Run the simulation until the client finishes.
    pub fn run(self) -> Result<ScenarioOutcome, Box<dyn Error>> {
        let Self { servers, token, raw_token, config, network, duration, stop, socket_available } =
            self;

        let mut sim = turmoil::Builder::new()
            .simulation_duration(duration)
            .fail_rate(network.fail_rate)
            .repair_rate(network.repair_rate)
            .min_message_latency(network.min_latency)
            .max_message_latency(network.max_latency)
            .rng_seed(network.seed)
            .build();

        let mut hosts = Vec::with_capacity(servers.len());
        let mut server_stats = Vec::with_capacity(servers.len());
        for (index, server) in servers.into_iter().enumerate() {
            let name = format!("server{index}");
            server_stats.push(server.stats());
            sim.host(name.as_str(), move || server.clone().serve(SERVER_PORT));
            hosts.push(name);
        }

        let slot: Arc<Mutex<Option<ClientRun>>> = Arc::default();
        let finished = Arc::clone(&slot);
        sim.client("client", async move {
            let addresses = hosts
                .iter()
                .map(|host| SocketAddr::new(turmoil::lookup(host.as_str()), SERVER_PORT))
                .collect();
            let token = match raw_token {
                Some(text) => text,
                None => token.servers(addresses).build_base64()?,
            };

            let transport = if socket_available {
                SimTransport::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?
            } else {
                SimTransport::unavailable()
            };
            let engine = RecordingEngine::new(UdpEngine::new(transport));
            let stats = engine.stats();
            let shutdown = ShutdownSignal::new();
            let env = SimEnv::new();

            let result = match stop {
                Stop::Never => {
                    Client::new(env, engine, config).with_shutdown(shutdown).run(&token).await
                },
                Stop::BeforeRun => {
                    shutdown.request();
                    Client::new(env, engine, config).with_shutdown(shutdown).run(&token).await
                },
                Stop::After(at) => {
                    let interrupting = InterruptAfter { env, at, shutdown: shutdown.clone() };
                    Client::new(interrupting, engine, config)
                        .with_shutdown(shutdown)
                        .run(&token)
                        .await
                },
            };

            let run = ClientRun { result, engine: stats.snapshot(), elapsed: env.elapsed() };
            *finished.lock().unwrap_or_else(PoisonError::into_inner) = Some(run);

            // Let the goodbye datagrams land before the simulation stops.
            tokio::time::sleep(network.max_latency + SETTLE).await;
            Ok(())
        });

        sim.run()?;

        let run = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or("client did not finish")?;
        Ok(ScenarioOutcome {
            result: run.result,
            engine: run.engine,
            servers: server_stats.iter().map(ServerStatsHandle::snapshot).collect(),
            elapsed: run.elapsed,
        })
    }
}

/// Raises a stop request after the first sleep that ends at or past `at`.
#[derive(Debug, Clone)]
struct InterruptAfter {
    env: SimEnv,
    at: Duration,
    shutdown: ShutdownSignal,
}

impl Environment for InterruptAfter {
    fn now(&self) -> Instant {
        self.env.now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let slept = self.env.sleep(duration);
        let (env, at, shutdown) = (self.env, self.at, self.shutdown.clone());
        async move {
            slept.await;
            if env.elapsed() >= at {
                shutdown.request();
            }
        }
    }
}
