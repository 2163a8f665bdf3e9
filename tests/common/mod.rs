//! Scriptable name resolver shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    net::IpAddr,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use dyndir::ports::resolver::{
    NameResolver, Resolution, ResolveError, ResolveResult, ResolvedAddr, SrvResolution, SrvTarget,
};

type LookupScript = VecDeque<ResolveResult<Vec<IpAddr>>>;
type SrvScript = VecDeque<ResolveResult<Vec<SrvTarget>>>;

/// A resolver whose answers are scripted per host. Each lookup consumes one
/// step of its host's script; the last step repeats forever. Unknown hosts
/// fail like the system resolver would.
pub struct MockResolver {
    lookups: Mutex<HashMap<String, LookupScript>>,
    srv: Mutex<HashMap<String, SrvScript>>,
    latency: Duration,
    ttl: Option<Duration>,
    srv_capable: bool,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            lookups: Mutex::new(HashMap::new()),
            srv: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            ttl: None,
            srv_capable: false,
        }
    }

    /// Delay every answer, to exercise cold-wait paths.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Attach a DNS TTL to every successful answer (and advertise the
    /// capability).
    pub fn dns_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Script a host that always resolves to `ips`.
    pub fn host(self, name: &str, ips: &[&str]) -> Self {
        let ips: Vec<IpAddr> = ips.iter().map(|ip| ip.parse().unwrap()).collect();
        self.script(name, vec![Ok(ips)])
    }

    /// Script a host with an explicit step sequence.
    pub fn script(self, name: &str, steps: Vec<ResolveResult<Vec<IpAddr>>>) -> Self {
        self.lookups
            .lock()
            .unwrap()
            .insert(name.to_string(), steps.into());
        self
    }

    /// Script a service name; records are (priority, weight, target, port).
    pub fn srv(mut self, name: &str, records: &[(u16, u16, &str, u16)]) -> Self {
        let records: Vec<SrvTarget> = records
            .iter()
            .map(|(priority, weight, target, port)| SrvTarget {
                priority: *priority,
                weight: *weight,
                target: target.to_string(),
                port: *port,
            })
            .collect();
        self.srv
            .lock()
            .unwrap()
            .insert(name.to_string(), vec![Ok(records)].into());
        self.srv_capable = true;
        self
    }

    fn next_step<T: Clone>(script: &mut VecDeque<ResolveResult<T>>) -> Option<ResolveResult<T>> {
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl NameResolver for MockResolver {
    async fn lookup(&self, host: &str, port: u16) -> ResolveResult<Resolution> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let step = {
            let mut lookups = self.lookups.lock().unwrap();
            lookups.get_mut(host).and_then(Self::next_step)
        };
        match step {
            None => Err(ResolveError::System {
                code: -2,
                reason: format!("unknown host {host}"),
            }),
            Some(Err(error)) => Err(error),
            Some(Ok(ips)) => Ok(Resolution {
                addresses: ips
                    .into_iter()
                    .map(|addr| ResolvedAddr {
                        addr,
                        port,
                        hostname: host.to_string(),
                    })
                    .collect(),
                ttl: self.ttl,
            }),
        }
    }

    async fn lookup_srv(&self, service: &str) -> ResolveResult<SrvResolution> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let step = {
            let mut srv = self.srv.lock().unwrap();
            srv.get_mut(service).and_then(Self::next_step)
        };
        match step {
            None => Err(ResolveError::Dns(format!("no records for {service}"))),
            Some(Err(error)) => Err(error),
            Some(Ok(records)) => Ok(SrvResolution {
                records,
                ttl: self.ttl,
            }),
        }
    }

    fn provides_ttl(&self) -> bool {
        self.ttl.is_some()
    }

    fn provides_srv(&self) -> bool {
        self.srv_capable
    }
}
