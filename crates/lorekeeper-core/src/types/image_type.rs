use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Category an annotated image falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageType {
    /// Overland, dungeon or battle map.
    Map,
    /// Illustration of a place.
    Location,
    /// Portrait or depiction of a named character.
    Character,
    /// Monster or animal illustration.
    Creature,
    /// Equipment, treasure or artifact.
    Item,
    /// A scene depicting something happening.
    Event,
    /// Material meant to be shown to the players.
    Handout,
    /// Borders, ornaments, logos and other filler art.
    Decoration,
}

impl ImageType {
    /// All categories, in the order the annotation prompt lists them.
    pub const ALL: [ImageType; 8] = [
        Self::Map,
        Self::Location,
        Self::Character,
        Self::Creature,
        Self::Item,
        Self::Event,
        Self::Handout,
        Self::Decoration,
    ];

    /// Lowercase identifier used in JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Location => "location",
            Self::Character => "character",
            Self::Creature => "creature",
            Self::Item => "item",
            Self::Event => "event",
            Self::Handout => "handout",
            Self::Decoration => "decoration",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| CoreError::UnknownImageType(s.to_string()))
    }
}

impl Serialize for ImageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Map".parse::<ImageType>().unwrap(), ImageType::Map);
        assert_eq!(" HANDOUT ".parse::<ImageType>().unwrap(), ImageType::Handout);
        assert!("portrait".parse::<ImageType>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&ImageType::Creature).unwrap();
        assert_eq!(json, "\"creature\"");
        let back: ImageType = serde_json::from_str("\"Creature\"").unwrap();
        assert_eq!(back, ImageType::Creature);
    }

    #[test]
    fn eight_distinct_categories() {
        let mut names: Vec<_> = ImageType::ALL.iter().map(|t| t.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 8);
    }
}
