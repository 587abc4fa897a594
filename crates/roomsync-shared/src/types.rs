use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

// Peer identity = random alphanumeric token, generated once per session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl PeerId {
    /// Length of a freshly generated peer token.
    pub const LEN: usize = 12;

    pub fn generate() -> Self {
        Self(random_token(Self::LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier, short enough to read out loud to another person.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl RoomId {
    pub const LEN: usize = 6;

    pub fn generate() -> Self {
        Self(random_token(Self::LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer identifier, generated by the sender and echoed by the receiver.
/// Unique within the lifetime of the application, not globally durable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TransferId(pub String);

impl TransferId {
    pub const LEN: usize = 8;

    pub fn generate() -> Self {
        Self(random_token(Self::LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Default display name when the user has not configured one.
pub fn default_username() -> String {
    format!("User{}", rand::thread_rng().gen_range(0..10_000))
}

/// Format a byte count as a human-readable size ("1.5 MB").
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let exp = (bytes as f64).log(1024.0).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);

    // Two decimals, trailing zeros trimmed
    let formatted = format!("{value:.2}");
    let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", formatted, UNITS[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lengths() {
        assert_eq!(PeerId::generate().as_str().len(), 12);
        assert_eq!(RoomId::generate().as_str().len(), 6);
        assert_eq!(TransferId::generate().as_str().len(), 8);
    }

    #[test]
    fn test_tokens_are_alphanumeric() {
        let peer = PeerId::generate();
        assert!(peer.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_peer_short() {
        let peer = PeerId("abcdefghijkl".to_string());
        assert_eq!(peer.short(), "abcdefgh");
    }

    #[test]
    fn test_default_username() {
        let name = default_username();
        assert!(name.starts_with("User"));
        assert!(name[4..].parse::<u32>().unwrap() < 10_000);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(512), "512 Bytes");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10 MB");
    }
}
