// Position/category tags and slot eligibility.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Baseball positions that can appear in an item's category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Catcher,
    FirstBase,
    SecondBase,
    ThirdBase,
    ShortStop,
    Outfield,
    DesignatedHitter,
    StartingPitcher,
    ReliefPitcher,
}

impl Position {
    /// Parse a single position token.
    ///
    /// Handles the abbreviations used by the player pool:
    /// - "1B" -> FirstBase, "2B" -> SecondBase, "3B" -> ThirdBase
    /// - "LF"/"CF"/"RF"/"OF" -> Outfield (the league only has generic OF slots)
    /// - "DH" -> DesignatedHitter
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" => Some(Position::Catcher),
            "1B" => Some(Position::FirstBase),
            "2B" => Some(Position::SecondBase),
            "3B" => Some(Position::ThirdBase),
            "SS" => Some(Position::ShortStop),
            "OF" | "LF" | "CF" | "RF" => Some(Position::Outfield),
            "DH" => Some(Position::DesignatedHitter),
            "SP" => Some(Position::StartingPitcher),
            "RP" => Some(Position::ReliefPitcher),
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Catcher => "C",
            Position::FirstBase => "1B",
            Position::SecondBase => "2B",
            Position::ThirdBase => "3B",
            Position::ShortStop => "SS",
            Position::Outfield => "OF",
            Position::DesignatedHitter => "DH",
            Position::StartingPitcher => "SP",
            Position::ReliefPitcher => "RP",
        }
    }

    pub fn is_pitcher(&self) -> bool {
        matches!(self, Position::StartingPitcher | Position::ReliefPitcher)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// Split a composite category tag ("SP,RP", "1B/DH", "2B SS") into the
/// positions it names. Unknown tokens are dropped; duplicates collapse.
pub fn parse_tag(tag: &str) -> Vec<Position> {
    let mut positions: Vec<Position> = tag
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter_map(Position::from_str_pos)
        .collect();
    positions.sort();
    positions.dedup();
    positions
}

/// Whether an item with this tag belongs to the pitching category.
///
/// A tag carrying either SP or RP counts as a pitcher, even when it also
/// lists a hitting position.
pub fn is_pitcher_tag(tag: &str) -> bool {
    parse_tag(tag).iter().any(Position::is_pitcher)
}

/// Eligibility rule attached to a roster slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eligibility {
    /// Any owned item may fill the slot (bench).
    Any,
    /// Items whose tag intersects this set.
    Positions(Vec<Position>),
}

impl Eligibility {
    /// Build a rule from the config form: `["ALL"]` means `Any`, otherwise
    /// the list of position strings. Unknown strings are rejected.
    pub fn from_config(values: &[String]) -> Result<Self, String> {
        if values.iter().any(|v| v.eq_ignore_ascii_case("ALL")) {
            return Ok(Eligibility::Any);
        }
        let mut positions = Vec::with_capacity(values.len());
        for v in values {
            match Position::from_str_pos(v) {
                Some(p) => positions.push(p),
                None => return Err(format!("unknown position `{v}`")),
            }
        }
        if positions.is_empty() {
            return Err("eligibility list is empty".to_string());
        }
        Ok(Eligibility::Positions(positions))
    }

    /// Whether an item carrying `tag` satisfies this rule.
    pub fn accepts(&self, tag: &str) -> bool {
        match self {
            Eligibility::Any => true,
            Eligibility::Positions(allowed) => {
                parse_tag(tag).iter().any(|p| allowed.contains(p))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_pos_standard_positions() {
        assert_eq!(Position::from_str_pos("C"), Some(Position::Catcher));
        assert_eq!(Position::from_str_pos("SS"), Some(Position::ShortStop));
        assert_eq!(Position::from_str_pos("SP"), Some(Position::StartingPitcher));
        assert_eq!(Position::from_str_pos("RP"), Some(Position::ReliefPitcher));
        assert_eq!(Position::from_str_pos("DH"), Some(Position::DesignatedHitter));
    }

    #[test]
    fn from_str_pos_outfield_variants() {
        for s in ["OF", "LF", "CF", "RF", "of"] {
            assert_eq!(Position::from_str_pos(s), Some(Position::Outfield), "{s}");
        }
    }

    #[test]
    fn from_str_pos_invalid() {
        assert_eq!(Position::from_str_pos("XX"), None);
        assert_eq!(Position::from_str_pos(""), None);
        assert_eq!(Position::from_str_pos("4B"), None);
    }

    #[test]
    fn display_str_roundtrip() {
        let positions = [
            Position::Catcher,
            Position::FirstBase,
            Position::SecondBase,
            Position::ThirdBase,
            Position::ShortStop,
            Position::Outfield,
            Position::DesignatedHitter,
            Position::StartingPitcher,
            Position::ReliefPitcher,
        ];
        for pos in positions {
            assert_eq!(Position::from_str_pos(pos.display_str()), Some(pos));
        }
    }

    #[test]
    fn parse_tag_handles_separators() {
        assert_eq!(
            parse_tag("1B,DH"),
            vec![Position::FirstBase, Position::DesignatedHitter]
        );
        assert_eq!(
            parse_tag("SP/RP"),
            vec![Position::StartingPitcher, Position::ReliefPitcher]
        );
        assert_eq!(parse_tag("2B SS"), vec![Position::SecondBase, Position::ShortStop]);
        assert_eq!(parse_tag("LF, CF"), vec![Position::Outfield]);
        assert!(parse_tag("").is_empty());
    }

    #[test]
    fn catcher_token_does_not_match_center_field() {
        // Substring matching would put a "CF" item into a catcher slot.
        let rule = Eligibility::Positions(vec![Position::Catcher]);
        assert!(!rule.accepts("CF"));
        assert!(rule.accepts("C,1B"));
    }

    #[test]
    fn first_base_slot_accepts_composite_tag() {
        let rule = Eligibility::from_config(&["1B".to_string()]).unwrap();
        assert!(rule.accepts("1B,DH"));
        assert!(!rule.accepts("OF"));
    }

    #[test]
    fn all_means_any() {
        let rule = Eligibility::from_config(&["ALL".to_string()]).unwrap();
        assert_eq!(rule, Eligibility::Any);
        assert!(rule.accepts("RP"));
        assert!(rule.accepts(""));
    }

    #[test]
    fn from_config_rejects_unknown() {
        assert!(Eligibility::from_config(&["QB".to_string()]).is_err());
        assert!(Eligibility::from_config(&[]).is_err());
    }

    #[test]
    fn pitcher_tag_detection() {
        assert!(is_pitcher_tag("SP"));
        assert!(is_pitcher_tag("SP,RP"));
        assert!(is_pitcher_tag("RP/OF"));
        assert!(!is_pitcher_tag("1B,DH"));
        assert!(!is_pitcher_tag(""));
    }
}
