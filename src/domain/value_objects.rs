//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Health state of a route or backend server.
///
/// Every variant is a distinct bit so that callers test state through the
/// mask predicates (`good`, `bad`, `idling`) rather than matching on the
/// raw value. A status always holds exactly one of the named values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum HealthStatus {
    #[default]
    Unknown = 0,
    Healthy = 1 << 0,
    Napping = 1 << 1,
    Starting = 1 << 2,
    Unhealthy = 1 << 3,
    Error = 1 << 4,
}

const GOOD_MASK: u8 = HealthStatus::Healthy as u8 | HealthStatus::Napping as u8 | HealthStatus::Starting as u8;
const IDLING_MASK: u8 = HealthStatus::Napping as u8 | HealthStatus::Starting as u8;

impl HealthStatus {
    /// All named statuses, in bit order.
    pub const ALL: [HealthStatus; 6] = [
        Self::Unknown,
        Self::Healthy,
        Self::Napping,
        Self::Starting,
        Self::Unhealthy,
        Self::Error,
    ];

    /// Raw bit value.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Healthy, napping or starting.
    pub fn good(self) -> bool {
        self.bits() & GOOD_MASK != 0
    }

    /// Anything that is not good, including `Unknown`.
    pub fn bad(self) -> bool {
        !self.good()
    }

    /// Napping or starting: the backend is asleep or waking up.
    pub fn idling(self) -> bool {
        self.bits() & IDLING_MASK != 0
    }

    /// Parse a status name. Unrecognised input yields `Unknown`.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "healthy" => Self::Healthy,
            "napping" => Self::Napping,
            "starting" => Self::Starting,
            "unhealthy" => Self::Unhealthy,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Napping => "napping",
            Self::Starting => "starting",
            Self::Unhealthy => "unhealthy",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HealthStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str(&s))
    }
}

/// Backend selection algorithm of a load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadBalanceMode {
    /// Not configured yet; behaves as round robin.
    #[default]
    Unset,
    RoundRobin,
    LeastConn,
    IpHash,
}

impl LoadBalanceMode {
    /// Parse a mode string.
    ///
    /// Case, `_`, `-` and spaces are ignored, so `round_robin`, `RoundRobin`
    /// and `roundrobin` are the same. Empty input is `Unset`; anything else
    /// that is not recognised falls back to round robin with a warning.
    ///
    /// # Examples
    /// ```
    /// use route_gateway::domain::value_objects::LoadBalanceMode;
    ///
    /// assert_eq!(LoadBalanceMode::parse("least_conn"), LoadBalanceMode::LeastConn);
    /// assert_eq!(LoadBalanceMode::parse(""), LoadBalanceMode::Unset);
    /// assert_eq!(LoadBalanceMode::parse("random"), LoadBalanceMode::RoundRobin);
    /// ```
    pub fn parse(s: &str) -> Self {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "" => Self::Unset,
            "roundrobin" => Self::RoundRobin,
            "leastconn" => Self::LeastConn,
            "iphash" => Self::IpHash,
            other => {
                tracing::warn!("invalid load balance mode {:?}, falling back to roundrobin", other);
                Self::RoundRobin
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::RoundRobin => "roundrobin",
            Self::LeastConn => "leastconn",
            Self::IpHash => "iphash",
        }
    }

    pub fn is_unset(self) -> bool {
        self == Self::Unset
    }
}

impl std::fmt::Display for LoadBalanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl Serialize for LoadBalanceMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LoadBalanceMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Kind of traffic a route carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    /// HTTP reverse proxy route, served by an HTTP server.
    Http,
    /// Raw TCP/UDP stream route.
    Stream,
}
