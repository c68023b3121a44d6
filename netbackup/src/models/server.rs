//! Configured backup servers.
//!
//! The registry is built once from configuration and never mutated. Its
//! order defines auto-discovery priority and the 1-based server IDs shown
//! by `-l` and accepted by `-i`.

use crate::config::Config;
use crate::utils::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Hardware address used as a Wake-on-LAN target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = ConfigError;

    /// Accepts `aa:bb:cc:dd:ee:ff` and `aa-bb-cc-dd-ee-ff`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(ConfigError::InvalidMac(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(ConfigError::InvalidMac(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| ConfigError::InvalidMac(s.to_string()))?;
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// One configured backup server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub address: String,
    pub mac: Option<MacAddress>,
    pub description: String,
}

impl ServerEntry {
    pub fn new(address: impl Into<String>, mac: Option<MacAddress>) -> Self {
        Self {
            address: address.into(),
            mac,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Ordered server list plus the shared fallback MAC.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    entries: Vec<ServerEntry>,
    common_mac: Option<MacAddress>,
}

impl ServerRegistry {
    pub fn new(entries: Vec<ServerEntry>, common_mac: Option<MacAddress>) -> Self {
        Self {
            entries,
            common_mac,
        }
    }

    /// Build the registry from `[[server_ips]]` and `network.common_mac`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let common_mac = config
            .network
            .common_mac
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(str::parse)
            .transpose()?;

        let mut entries = Vec::with_capacity(config.server_ips.len());
        for (index, server) in config.server_ips.iter().enumerate() {
            let address = server.ip.trim();
            if address.is_empty() {
                return Err(ConfigError::EmptyAddress(index + 1));
            }
            let mac = server
                .mac
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .map(str::parse)
                .transpose()?;
            entries.push(ServerEntry::new(address, mac).with_description(server.desc.clone()));
        }

        Ok(Self::new(entries, common_mac))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ServerEntry] {
        &self.entries
    }

    pub fn common_mac(&self) -> Option<MacAddress> {
        self.common_mac
    }

    /// Look up a server by its 1-based ID.
    pub fn get(&self, id: i64) -> Result<&ServerEntry, ConfigError> {
        let invalid = || ConfigError::InvalidServerId {
            id,
            max: self.entries.len(),
        };
        if id < 1 {
            return Err(invalid());
        }
        let index = usize::try_from(id - 1).map_err(|_| invalid())?;
        self.entries.get(index).ok_or_else(invalid)
    }

    pub fn find_by_address(&self, address: &str) -> Option<&ServerEntry> {
        self.entries.iter().find(|e| e.address == address)
    }

    /// Entry MAC, falling back to the common MAC. Never written back.
    pub fn effective_mac(&self, entry: &ServerEntry) -> Option<MacAddress> {
        entry.mac.or(self.common_mac)
    }

    /// MAC for an arbitrary address: known entry first, common MAC otherwise.
    pub fn mac_for_address(&self, address: &str) -> Option<MacAddress> {
        match self.find_by_address(address) {
            Some(entry) => self.effective_mac(entry),
            None => self.common_mac,
        }
    }

    /// Entries paired with their 1-based IDs.
    pub fn iter_with_ids(&self) -> impl Iterator<Item = (usize, &ServerEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, e))
    }
}
