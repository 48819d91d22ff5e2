//! Forgiving field decoders: malformed values fall back to defaults instead
//! of failing the whole document.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

use super::leaderboard::LeaderboardEntry;
use super::profile::DEFAULT_DISPLAY_NAME;

/// XP exactly as stored; anything that is not a JSON number reads as `0`.
pub fn xp_from_value(value: &Value) -> Number {
    match value {
        Value::Number(number) => number.clone(),
        _ => zero_xp(),
    }
}

pub fn zero_xp() -> Number {
    Number::from(0)
}

pub fn xp<'de, D>(deserializer: D) -> Result<Number, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(xp_from_value(&Value::deserialize(deserializer)?))
}

pub fn display_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(name) => name,
        _ => DEFAULT_DISPLAY_NAME.to_owned(),
    })
}

/// Entries that are not objects are skipped; object entries decode with
/// `totalXP` defaulting to `0`.
pub fn entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, LeaderboardEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(map) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };

    Ok(map
        .into_iter()
        .filter_map(|(uid, entry)| match entry {
            Value::Object(fields) => Some((
                uid,
                LeaderboardEntry {
                    total_xp: fields
                        .get("totalXP")
                        .map_or_else(zero_xp, xp_from_value),
                },
            )),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::{Number, json};

    use super::xp_from_value;

    #[test]
    fn xp_is_copied_exactly() {
        assert_eq!(xp_from_value(&json!(50)), Number::from(50));
        assert_eq!(xp_from_value(&json!(-3)), Number::from(-3));
        assert_eq!(xp_from_value(&json!(12.5)), Number::from_f64(12.5).unwrap());
        assert_eq!(xp_from_value(&json!(u64::MAX)), Number::from(u64::MAX));
    }

    #[test]
    fn xp_defaults_non_numbers_to_zero() {
        assert_eq!(xp_from_value(&json!(null)), Number::from(0));
        assert_eq!(xp_from_value(&json!("50")), Number::from(0));
        assert_eq!(xp_from_value(&json!({ "value": 1 })), Number::from(0));
    }
}
