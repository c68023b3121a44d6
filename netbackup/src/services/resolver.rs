//! Server discovery: picks the one endpoint a transfer runs against.

use crate::models::{MacAddress, ResolutionRequest, ResolvedEndpoint, ServerRegistry};
use crate::services::probe::LivenessProbe;
use crate::services::wake::{WakeOrchestrator, WakeSignal};
use crate::utils::{ResolutionError, Result};

pub struct ServerResolver<'a, P, W> {
    registry: &'a ServerRegistry,
    probe: P,
    waker: WakeOrchestrator<W>,
}

impl<'a, P: LivenessProbe, W: WakeSignal> ServerResolver<'a, P, W> {
    pub fn new(registry: &'a ServerRegistry, probe: P, waker: WakeOrchestrator<W>) -> Self {
        Self {
            registry,
            probe,
            waker,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn waker(&self) -> &WakeOrchestrator<W> {
        &self.waker
    }

    pub async fn resolve(&self, request: &ResolutionRequest) -> Result<ResolvedEndpoint> {
        match request {
            ResolutionRequest::Manual(address) => {
                let mac = self.registry.mac_for_address(address);
                self.resolve_single(address, mac).await
            }
            ResolutionRequest::ById(id) => {
                // Range check happens before any network action
                let entry = self.registry.get(*id)?;
                tracing::debug!(id, host = %entry.address, "Server selected by ID");
                self.resolve_single(&entry.address, self.registry.effective_mac(entry))
                    .await
            }
            ResolutionRequest::AutoDiscover => self.discover().await,
        }
    }

    /// Ping, wake once if a MAC is known, ping again.
    async fn resolve_single(&self, address: &str, mac: Option<MacAddress>) -> Result<ResolvedEndpoint> {
        let endpoint = |verified_reachable| ResolvedEndpoint {
            address: address.to_string(),
            mac,
            verified_reachable,
        };

        if self.probe.is_reachable(address).await {
            tracing::info!(host = %address, "Server is reachable");
            return Ok(endpoint(true));
        }

        let Some(mac) = mac else {
            tracing::warn!(host = %address, "Server unreachable and no MAC address known");
            return Err(ResolutionError::ServerUnreachable(address.to_string()).into());
        };

        self.waker.wake(mac, address).await?;

        if self.probe.is_reachable(address).await {
            tracing::info!(host = %address, "Server is reachable after wake");
            Ok(endpoint(true))
        } else {
            tracing::warn!(host = %address, "Server still unreachable after wake");
            Err(ResolutionError::ServerUnreachable(address.to_string()).into())
        }
    }

    /// First configured server whose remote-command probe succeeds.
    async fn discover(&self) -> Result<ResolvedEndpoint> {
        for (id, entry) in self.registry.iter_with_ids() {
            let address = entry.address.as_str();
            let mac = self.registry.effective_mac(entry);
            tracing::debug!(id, host = %address, "Trying server");

            if !self.probe.is_reachable(address).await {
                match mac {
                    Some(mac) => {
                        if let Err(e) = self.waker.wake(mac, address).await {
                            tracing::warn!(host = %address, error = %e, "Wake attempt failed");
                        }
                    }
                    None => tracing::debug!(host = %address, "No MAC known, skipping wake"),
                }
            }

            // The command probe runs whatever the ping said
            if self.probe.can_accept_command(address).await {
                tracing::info!(id, host = %address, "Selected backup server");
                return Ok(ResolvedEndpoint {
                    address: address.to_string(),
                    mac,
                    verified_reachable: true,
                });
            }

            tracing::debug!(id, host = %address, "Server did not accept commands");
        }

        Err(ResolutionError::NoServerFound.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServerEntry;
    use crate::testing::{FakeProbe, FakeWake, ProbeCall};
    use crate::utils::{ConfigError, Error};
    use std::time::Duration;

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn resolver(
        registry: &ServerRegistry,
        probe: FakeProbe,
        wake: FakeWake,
    ) -> ServerResolver<'_, FakeProbe, FakeWake> {
        ServerResolver::new(registry, probe, WakeOrchestrator::new(wake, Duration::ZERO))
    }

    fn two_servers() -> ServerRegistry {
        ServerRegistry::new(
            vec![
                ServerEntry::new("10.0.0.1", None),
                ServerEntry::new("10.0.0.2", Some(mac("22:22:22:22:22:22"))),
            ],
            Some(mac("cc:cc:cc:cc:cc:cc")),
        )
    }

    #[tokio::test]
    async fn test_out_of_range_id_makes_no_network_calls() {
        let registry = two_servers();
        for id in [0, -1, 3, i64::MAX] {
            let r = resolver(&registry, FakeProbe::default(), FakeWake::default());
            let result = r.resolve(&ResolutionRequest::ById(id)).await;
            assert!(matches!(
                result,
                Err(Error::Config(ConfigError::InvalidServerId { max: 2, .. }))
            ));
            assert!(r.probe().calls().is_empty());
            assert!(r.waker().sender().sent().is_empty());
        }
    }

    #[tokio::test]
    async fn test_by_id_reachable() {
        let registry = two_servers();
        let r = resolver(&registry, FakeProbe::default().reachable("10.0.0.2"), FakeWake::default());
        let endpoint = r.resolve(&ResolutionRequest::ById(2)).await.unwrap();
        assert_eq!(endpoint.address, "10.0.0.2");
        assert_eq!(endpoint.mac, Some(mac("22:22:22:22:22:22")));
        assert!(endpoint.verified_reachable);
        assert!(r.waker().sender().sent().is_empty());
    }

    #[tokio::test]
    async fn test_by_id_wakes_with_common_mac_then_rechecks() {
        let registry = two_servers();
        let r = resolver(&registry, FakeProbe::default().wakes_up("10.0.0.1"), FakeWake::default());
        let endpoint = r.resolve(&ResolutionRequest::ById(1)).await.unwrap();
        assert_eq!(endpoint.address, "10.0.0.1");
        assert_eq!(r.waker().sender().sent(), vec![mac("cc:cc:cc:cc:cc:cc")]);
        assert_eq!(
            r.probe().calls(),
            vec![
                ProbeCall::Reachable("10.0.0.1".into()),
                ProbeCall::Reachable("10.0.0.1".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_manual_unknown_address_without_mac_fails_immediately() {
        let registry = ServerRegistry::new(vec![ServerEntry::new("10.0.0.1", None)], None);
        let r = resolver(&registry, FakeProbe::default(), FakeWake::default());
        let result = r.resolve(&ResolutionRequest::Manual("192.168.1.9".into())).await;
        assert!(matches!(
            result,
            Err(Error::Resolution(ResolutionError::ServerUnreachable(_)))
        ));
        assert_eq!(r.probe().calls().len(), 1);
        assert!(r.waker().sender().sent().is_empty());
    }

    #[tokio::test]
    async fn test_manual_still_down_after_wake() {
        let registry = two_servers();
        let r = resolver(&registry, FakeProbe::default(), FakeWake::default());
        let result = r.resolve(&ResolutionRequest::Manual("10.0.0.2".into())).await;
        assert!(matches!(
            result,
            Err(Error::Resolution(ResolutionError::ServerUnreachable(_)))
        ));
        // Exactly one wake, exactly one recheck
        assert_eq!(r.waker().sender().sent(), vec![mac("22:22:22:22:22:22")]);
        assert_eq!(r.probe().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_manual_without_wake_tool() {
        let registry = two_servers();
        let r = resolver(&registry, FakeProbe::default(), FakeWake::unavailable());
        let result = r.resolve(&ResolutionRequest::Manual("10.0.0.9".into())).await;
        assert!(matches!(
            result,
            Err(Error::Resolution(ResolutionError::NoWakeToolAvailable))
        ));
        assert_eq!(r.probe().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_discover_wakes_first_and_selects_second() {
        let registry = two_servers();
        let probe = FakeProbe::default()
            .reachable("10.0.0.2")
            .accepts_commands("10.0.0.2");
        let r = resolver(&registry, probe, FakeWake::default());

        let endpoint = r.resolve(&ResolutionRequest::AutoDiscover).await.unwrap();
        assert_eq!(endpoint.address, "10.0.0.2");
        assert_eq!(r.waker().sender().sent(), vec![mac("cc:cc:cc:cc:cc:cc")]);
        assert_eq!(
            r.probe().calls(),
            vec![
                ProbeCall::Reachable("10.0.0.1".into()),
                ProbeCall::Command("10.0.0.1".into()),
                ProbeCall::Reachable("10.0.0.2".into()),
                ProbeCall::Command("10.0.0.2".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_auto_discover_stops_at_first_success() {
        let registry = ServerRegistry::new(
            vec![
                ServerEntry::new("a", None),
                ServerEntry::new("b", None),
                ServerEntry::new("c", None),
            ],
            None,
        );
        let probe = FakeProbe::default()
            .reachable("b")
            .accepts_commands("b")
            .accepts_commands("c");
        let r = resolver(&registry, probe, FakeWake::default());

        let endpoint = r.resolve(&ResolutionRequest::AutoDiscover).await.unwrap();
        assert_eq!(endpoint.address, "b");
        assert!(!r
            .probe()
            .calls()
            .iter()
            .any(|c| matches!(c, ProbeCall::Reachable(h) | ProbeCall::Command(h) if h == "c")));
    }

    #[tokio::test]
    async fn test_auto_discover_probes_commands_without_mac() {
        let registry = ServerRegistry::new(vec![ServerEntry::new("a", None)], None);
        let probe = FakeProbe::default().accepts_commands("a");
        let r = resolver(&registry, probe, FakeWake::default());

        let endpoint = r.resolve(&ResolutionRequest::AutoDiscover).await.unwrap();
        assert_eq!(endpoint.address, "a");
        assert_eq!(endpoint.mac, None);
        assert!(r.waker().sender().sent().is_empty());
    }

    #[tokio::test]
    async fn test_auto_discover_wake_failure_is_not_fatal() {
        let registry = two_servers();
        let probe = FakeProbe::default().accepts_commands("10.0.0.2");
        let r = resolver(&registry, probe, FakeWake::unavailable());
        let endpoint = r.resolve(&ResolutionRequest::AutoDiscover).await.unwrap();
        assert_eq!(endpoint.address, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_auto_discover_nothing_found() {
        let registry = two_servers();
        let r = resolver(&registry, FakeProbe::default(), FakeWake::default());
        assert!(matches!(
            r.resolve(&ResolutionRequest::AutoDiscover).await,
            Err(Error::Resolution(ResolutionError::NoServerFound))
        ));

        let empty = ServerRegistry::default();
        let r = resolver(&empty, FakeProbe::default(), FakeWake::default());
        assert!(matches!(
            r.resolve(&ResolutionRequest::AutoDiscover).await,
            Err(Error::Resolution(ResolutionError::NoServerFound))
        ));
    }
}
