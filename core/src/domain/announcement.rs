//! Discovery wire messages and announcement address rules.

use std::net::Ipv4Addr;

/// Multicast group used when no valid destination is configured.
pub const DEFAULT_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(230, 185, 192, 108);

/// First address of the range accepted for announcements.
const MULTICAST_RANGE_START: Ipv4Addr = Ipv4Addr::new(224, 0, 2, 0);

/// Last address of the range accepted for announcements.
const MULTICAST_RANGE_END: Ipv4Addr = Ipv4Addr::new(238, 255, 255, 255);

const PRESENCE_TAG: &str = "PONG";
const FAREWELL_TAG: &str = "BONG";

/// A discovery message sent by the heartbeat announcer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    /// `PONG:<port>:<name>`, re-sent every heartbeat interval.
    Presence { port: u16, name: String },
    /// `BONG:<port>`, sent once on shutdown.
    Farewell { port: u16 },
}

impl Announcement {
    /// Encode the message as its ASCII wire form.
    pub fn encode(&self) -> String {
        match self {
            Announcement::Presence { port, name } => {
                format!("{}:{}:{}", PRESENCE_TAG, port, name)
            }
            Announcement::Farewell { port } => format!("{}:{}", FAREWELL_TAG, port),
        }
    }

    /// Decode a datagram payload. Returns `None` for anything that is not an
    /// announcement (for example log data arriving on the same port).
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        let (tag, rest) = text.split_once(':')?;
        match tag {
            PRESENCE_TAG => {
                let (port, name) = rest.split_once(':')?;
                Some(Announcement::Presence {
                    port: port.parse().ok()?,
                    name: name.to_string(),
                })
            }
            FAREWELL_TAG => Some(Announcement::Farewell {
                port: rest.parse().ok()?,
            }),
            _ => None,
        }
    }

    /// Forwarder port carried by the message.
    pub fn port(&self) -> u16 {
        match self {
            Announcement::Presence { port, .. } | Announcement::Farewell { port } => *port,
        }
    }
}

impl std::fmt::Display for Announcement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Check whether an address lies in 224.0.2.0 ..= 238.255.255.255.
pub fn is_announce_multicast(addr: Ipv4Addr) -> bool {
    (MULTICAST_RANGE_START..=MULTICAST_RANGE_END).contains(&addr)
}

/// Resolve the configured multicast destination.
///
/// Anything that is not a syntactically valid IPv4 address inside the
/// accepted range falls back to [`DEFAULT_MULTICAST_ADDR`].
pub fn resolve_multicast(configured: Option<&str>) -> Ipv4Addr {
    configured
        .and_then(|raw| raw.trim().parse::<Ipv4Addr>().ok())
        .filter(|addr| is_announce_multicast(*addr))
        .unwrap_or(DEFAULT_MULTICAST_ADDR)
}
