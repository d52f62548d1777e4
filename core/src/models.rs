use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Ledger timestamps are stored as server-local wall-clock text in this format,
/// so that lexicographic order matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identity of a chat participant as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub external_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ChatUser {
    #[must_use]
    pub fn new(external_id: i64) -> Self {
        Self {
            external_id,
            username: None,
            first_name: None,
            last_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    /// Per-gender constant of the Mifflin–St Jeor equation.
    #[must_use]
    pub const fn baseline_offset(self) -> f64 {
        match self {
            Self::Male => 5.0,
            Self::Female => -161.0,
            Self::Other => 0.0,
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            _ => bail!("Invalid gender '{s}'. Must be one of: male, female, other"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub gender: Gender,
    pub age: i64,
    pub height_cm: i64,
    pub weight_kg: f64,
    pub recorded_at: String,
}

impl Profile {
    #[must_use]
    pub fn baseline_kcal(&self) -> f64 {
        mifflin_st_jeor(self.gender, self.age, self.height_cm, self.weight_kg)
    }
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub gender: Gender,
    pub age: i64,
    pub height_cm: i64,
    pub weight_kg: f64,
}

/// Resting energy expenditure: `10·kg + 6.25·cm − 5·age` plus the gender offset.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mifflin_st_jeor(gender: Gender, age: i64, height_cm: i64, weight_kg: f64) -> f64 {
    10.0 * weight_kg + 6.25 * height_cm as f64 - 5.0 * age as f64 + gender.baseline_offset()
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub input: String,
    /// `None` means the entry was logged but could not be costed.
    pub calories: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub input: String,
    pub calories: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonalCacheEntry {
    pub id: i64,
    pub user_id: i64,
    pub input: String,
    pub calories: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyTotal {
    pub date: chrono::NaiveDate,
    pub calories: i64,
    pub entries: i64,
}

/// Cache key for a free-text food description: trimmed, whitespace collapsed,
/// Unicode lowercase.
#[must_use]
pub fn normalize_input(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True when the text is a bare calorie count such as `"42"`.
#[must_use]
pub fn is_numeric_input(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit())
}

pub fn parse_calories(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    if !is_numeric_input(trimmed) {
        bail!("Enter the calories as a whole number, e.g. 250.");
    }
    let value: u32 = trimmed
        .parse()
        .with_context(|| format!("'{trimmed}' is too large for a calorie count."))?;
    Ok(i64::from(value))
}

pub const AGE_RANGE: (i64, i64) = (5, 120);
pub const HEIGHT_RANGE_CM: (i64, i64) = (50, 250);
pub const WEIGHT_RANGE_KG: (f64, f64) = (20.0, 300.0);

pub fn parse_age(text: &str) -> Result<i64> {
    let (min, max) = AGE_RANGE;
    match text.trim().parse::<i64>() {
        Ok(age) if (min..=max).contains(&age) => Ok(age),
        _ => bail!("Enter an age between {min} and {max}."),
    }
}

pub fn parse_height(text: &str) -> Result<i64> {
    let (min, max) = HEIGHT_RANGE_CM;
    match text.trim().parse::<i64>() {
        Ok(height) if (min..=max).contains(&height) => Ok(height),
        _ => bail!("Enter a height between {min} and {max} cm."),
    }
}

/// Accepts both `72.5` and `72,5`.
pub fn parse_weight(text: &str) -> Result<f64> {
    let (min, max) = WEIGHT_RANGE_KG;
    match text.trim().replace(',', ".").parse::<f64>() {
        Ok(weight) if weight.is_finite() && (min..=max).contains(&weight) => Ok(weight),
        _ => bail!("Enter a weight between {min:.0} and {max:.0} kg."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_input() {
        assert_eq!(normalize_input("  Apple  "), "apple");
        assert_eq!(normalize_input("Greek   Salad\twith Feta"), "greek salad with feta");
        assert_eq!(normalize_input("БОРЩ"), "борщ");
    }

    #[test]
    fn test_is_numeric_input() {
        assert!(is_numeric_input("42"));
        assert!(is_numeric_input(" 350 "));
        assert!(!is_numeric_input(""));
        assert!(!is_numeric_input("42 kcal"));
        assert!(!is_numeric_input("-5"));
        assert!(!is_numeric_input("1.5"));
    }

    #[test]
    fn test_parse_calories() {
        assert_eq!(parse_calories("42").unwrap(), 42);
        assert_eq!(parse_calories("0").unwrap(), 0);
        assert!(parse_calories("abc").is_err());
        assert!(parse_calories("99999999999").is_err());
    }

    #[test]
    fn test_gender_from_str() {
        assert_eq!("Male".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("OTHER".parse::<Gender>().unwrap(), Gender::Other);
        assert!("robot".parse::<Gender>().is_err());
    }

    #[test]
    fn test_baseline_male() {
        let kcal = mifflin_st_jeor(Gender::Male, 30, 180, 80.0);
        assert!((kcal - 1780.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_baseline_female_and_other() {
        // 10*60 + 6.25*165 - 5*25 = 1506.25
        let female = mifflin_st_jeor(Gender::Female, 25, 165, 60.0);
        assert!((female - 1345.25).abs() < 1e-9);
        let other = mifflin_st_jeor(Gender::Other, 25, 165, 60.0);
        assert!((other - 1506.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_age_bounds() {
        assert_eq!(parse_age("5").unwrap(), 5);
        assert_eq!(parse_age("120").unwrap(), 120);
        assert!(parse_age("4").is_err());
        assert!(parse_age("121").is_err());
        assert!(parse_age("thirty").is_err());
    }

    #[test]
    fn test_parse_height_bounds() {
        assert_eq!(parse_height("180").unwrap(), 180);
        assert!(parse_height("49").is_err());
        assert!(parse_height("251").is_err());
    }

    #[test]
    fn test_parse_weight_accepts_comma() {
        assert!((parse_weight("72,5").unwrap() - 72.5).abs() < f64::EPSILON);
        assert!((parse_weight("80").unwrap() - 80.0).abs() < f64::EPSILON);
        assert!(parse_weight("19.9").is_err());
        assert!(parse_weight("NaN").is_err());
    }
}
