use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hub-assigned announcement identifier. Monotonic per hub, starting at 1.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnouncementId(u64);

impl AnnouncementId {
    pub const FIRST: Self = Self(1);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AnnouncementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for AnnouncementId {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#').parse().map(Self)
    }
}

impl From<u64> for AnnouncementId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_ordered() {
        let first = AnnouncementId::FIRST;
        assert!(first < first.next());
        assert_eq!(first.next().get(), 2);
    }

    #[test]
    fn display_and_from_str() {
        let id = AnnouncementId::new(7);
        assert_eq!(id.to_string(), "#7");
        assert_eq!("#7".parse::<AnnouncementId>().unwrap(), id);
        assert_eq!("7".parse::<AnnouncementId>().unwrap(), id);
        assert!("seven".parse::<AnnouncementId>().is_err());
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&AnnouncementId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
