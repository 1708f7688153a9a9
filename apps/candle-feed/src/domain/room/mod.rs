//! Rooms and Channel Routing
//!
//! A room is a named real-time topic on the data stream. Every room is bound
//! to exactly one of the two physical channels for its lifetime; the binding
//! is a pure function of the room's kind.
//!
//! # Wire names
//!
//! | Room | Wire name | Channel |
//! |------|-----------|---------|
//! | `Price` | `price:<pool>` | general |
//! | `PriceByToken` | `price-by-token:<token>` | general |
//! | `Transaction` | `transaction:<token>:<pool>[:<wallet>]` | transaction |
//! | `Custom` | anything else | general |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Channel
// =============================================================================

/// One of the two physical stream connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Price updates and every non-transaction topic.
    General,
    /// Trade/transaction topics.
    Transaction,
}

impl Channel {
    /// Both channels, in connection order.
    pub const ALL: [Self; 2] = [Self::General, Self::Transaction];

    /// Name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Transaction => "transaction",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Room
// =============================================================================

/// What a room carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    /// Pool-level price updates.
    Price,
    /// Token-level price updates derived from pool-level ones.
    PriceByToken,
    /// Trades for a token/pool, optionally narrowed to one wallet.
    Transaction,
    /// Unrecognized topic passed through verbatim.
    Custom,
}

/// The identifier a room is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomScope {
    /// Scoped to a liquidity pool.
    Pool,
    /// Scoped to a token.
    Token,
    /// Scoped to a single wallet's trades within a pool.
    Wallet,
    /// No known scope.
    Opaque,
}

/// A typed stream topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    /// `price:<pool>`
    Price {
        /// Pool identifier.
        pool: String,
    },
    /// `price-by-token:<token>`
    PriceByToken {
        /// Token identifier.
        token: String,
    },
    /// `transaction:<token>:<pool>` or `transaction:<token>:<pool>:<wallet>`
    Transaction {
        /// Token identifier.
        token: String,
        /// Pool identifier.
        pool: String,
        /// Wallet filter, when the room tracks a single wallet.
        wallet: Option<String>,
    },
    /// Any other topic name.
    Custom(String),
}

impl Room {
    /// Pool-level price room.
    #[must_use]
    pub fn price(pool: impl Into<String>) -> Self {
        Self::Price { pool: pool.into() }
    }

    /// Token-level price room.
    #[must_use]
    pub fn price_by_token(token: impl Into<String>) -> Self {
        Self::PriceByToken {
            token: token.into(),
        }
    }

    /// All trades for a token within a pool.
    #[must_use]
    pub fn transactions(token: impl Into<String>, pool: impl Into<String>) -> Self {
        Self::Transaction {
            token: token.into(),
            pool: pool.into(),
            wallet: None,
        }
    }

    /// Trades of one wallet for a token within a pool.
    #[must_use]
    pub fn wallet_transactions(
        token: impl Into<String>,
        pool: impl Into<String>,
        wallet: impl Into<String>,
    ) -> Self {
        Self::Transaction {
            token: token.into(),
            pool: pool.into(),
            wallet: Some(wallet.into()),
        }
    }

    /// The room's kind.
    #[must_use]
    pub const fn kind(&self) -> RoomKind {
        match self {
            Self::Price { .. } => RoomKind::Price,
            Self::PriceByToken { .. } => RoomKind::PriceByToken,
            Self::Transaction { .. } => RoomKind::Transaction,
            Self::Custom(_) => RoomKind::Custom,
        }
    }

    /// The identifier the room is scoped to.
    #[must_use]
    pub const fn scope(&self) -> RoomScope {
        match self {
            Self::Price { .. } => RoomScope::Pool,
            Self::PriceByToken { .. } => RoomScope::Token,
            Self::Transaction { wallet: Some(_), .. } => RoomScope::Wallet,
            Self::Transaction { wallet: None, .. } => RoomScope::Pool,
            Self::Custom(_) => RoomScope::Opaque,
        }
    }

    /// The channel this room lives on.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self.kind() {
            RoomKind::Transaction => Channel::Transaction,
            RoomKind::Price | RoomKind::PriceByToken | RoomKind::Custom => Channel::General,
        }
    }

    /// Whether payloads of this room are also published per token.
    #[must_use]
    pub const fn is_pool_price(&self) -> bool {
        matches!(self, Self::Price { .. })
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price { pool } => write!(f, "price:{pool}"),
            Self::PriceByToken { token } => write!(f, "price-by-token:{token}"),
            Self::Transaction {
                token,
                pool,
                wallet: None,
            } => write!(f, "transaction:{token}:{pool}"),
            Self::Transaction {
                token,
                pool,
                wallet: Some(wallet),
            } => write!(f, "transaction:{token}:{pool}:{wallet}"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Error parsing a room name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomParseError {
    /// The room name was empty.
    #[error("room name is empty")]
    Empty,
    /// A recognized prefix with a missing identifier.
    #[error("room {0:?} is missing an identifier")]
    MissingIdentifier(String),
}

impl FromStr for Room {
    type Err = RoomParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RoomParseError::Empty);
        }

        let missing = || RoomParseError::MissingIdentifier(s.to_string());

        if let Some(token) = s.strip_prefix("price-by-token:") {
            return non_empty(token).map(Self::price_by_token).ok_or_else(missing);
        }
        if let Some(pool) = s.strip_prefix("price:") {
            return non_empty(pool).map(Self::price).ok_or_else(missing);
        }
        if let Some(rest) = s.strip_prefix("transaction:") {
            let mut parts = rest.splitn(3, ':');
            let token = parts.next().and_then(non_empty).ok_or_else(missing)?;
            let pool = parts.next().and_then(non_empty).ok_or_else(missing)?;
            return Ok(match parts.next() {
                Some(wallet) => {
                    let wallet = non_empty(wallet).ok_or_else(missing)?;
                    Self::wallet_transactions(token, pool, wallet)
                }
                None => Self::transactions(token, pool),
            });
        }

        Ok(Self::Custom(s.to_string()))
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

impl Serialize for Room {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_prefixes() {
        assert_eq!("price:P1".parse::<Room>().unwrap(), Room::price("P1"));
        assert_eq!(
            "price-by-token:T1".parse::<Room>().unwrap(),
            Room::price_by_token("T1")
        );
        assert_eq!(
            "transaction:T1:P1".parse::<Room>().unwrap(),
            Room::transactions("T1", "P1")
        );
        assert_eq!(
            "transaction:T1:P1:W1".parse::<Room>().unwrap(),
            Room::wallet_transactions("T1", "P1", "W1")
        );
    }

    #[test]
    fn unknown_names_are_custom() {
        let room: Room = "graduating".parse().unwrap();
        assert_eq!(room, Room::Custom("graduating".to_string()));
        assert_eq!(room.channel(), Channel::General);
        assert_eq!(room.scope(), RoomScope::Opaque);
    }

    #[test]
    fn rejects_missing_identifiers() {
        assert_eq!("".parse::<Room>(), Err(RoomParseError::Empty));
        assert!(matches!(
            "price:".parse::<Room>(),
            Err(RoomParseError::MissingIdentifier(_))
        ));
        assert!(matches!(
            "transaction:T1".parse::<Room>(),
            Err(RoomParseError::MissingIdentifier(_))
        ));
        assert!(matches!(
            "transaction:T1:P1:".parse::<Room>(),
            Err(RoomParseError::MissingIdentifier(_))
        ));
    }

    #[test]
    fn display_matches_wire_name() {
        for name in [
            "price:P1",
            "price-by-token:T1",
            "transaction:T1:P1",
            "transaction:T1:P1:W1",
            "latest",
        ] {
            assert_eq!(name.parse::<Room>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn only_transaction_rooms_route_to_transaction_channel() {
        assert_eq!(Room::price("P").channel(), Channel::General);
        assert_eq!(Room::price_by_token("T").channel(), Channel::General);
        assert_eq!(Room::transactions("T", "P").channel(), Channel::Transaction);
        assert_eq!(
            Room::wallet_transactions("T", "P", "W").channel(),
            Channel::Transaction
        );
    }

    #[test]
    fn kinds_and_scopes() {
        assert_eq!(Room::price("P").kind(), RoomKind::Price);
        assert_eq!(Room::price("P").scope(), RoomScope::Pool);
        assert_eq!(Room::price_by_token("T").scope(), RoomScope::Token);
        assert_eq!(Room::transactions("T", "P").scope(), RoomScope::Pool);
        assert_eq!(
            Room::wallet_transactions("T", "P", "W").scope(),
            RoomScope::Wallet
        );
        assert!(Room::price("P").is_pool_price());
        assert!(!Room::price_by_token("T").is_pool_price());
    }

    #[test]
    fn serde_uses_wire_name() {
        let json = serde_json::to_string(&Room::transactions("T", "P")).unwrap();
        assert_eq!(json, "\"transaction:T:P\"");
        let room: Room = serde_json::from_str("\"price:P\"").unwrap();
        assert_eq!(room, Room::price("P"));
    }
}
