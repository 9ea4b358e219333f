//! Alias → canonical lookup tables used by the attribute extractor.
//!
//! Built once at startup from the built-in defaults, optionally extended from
//! configuration, and never mutated afterwards. Aliases are stored lower-case.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{CoreError, Gender};

const GENDER_ALIASES: &[(&str, Gender)] = &[
    ("male", Gender::Male),
    ("man", Gender::Male),
    ("boy", Gender::Male),
    ("gentleman", Gender::Male),
    ("mr", Gender::Male),
    ("female", Gender::Female),
    ("woman", Gender::Female),
    ("girl", Gender::Female),
    ("lady", Gender::Female),
    ("mrs", Gender::Female),
    ("non-binary", Gender::Other),
    ("nonbinary", Gender::Other),
    ("non binary", Gender::Other),
    ("transgender", Gender::Other),
    ("other gender", Gender::Other),
    ("unspecified gender", Gender::Unknown),
    ("undisclosed gender", Gender::Unknown),
    ("gender unknown", Gender::Unknown),
];

const PROCEDURE_ALIASES: &[(&str, &str)] = &[
    ("knee surgery", "knee surgery"),
    ("knee operation", "knee surgery"),
    ("knee replacement", "knee replacement"),
    ("total knee replacement", "knee replacement"),
    ("tkr", "knee replacement"),
    ("hip replacement", "hip replacement"),
    ("thr", "hip replacement"),
    ("cataract", "cataract surgery"),
    ("cataract surgery", "cataract surgery"),
    ("heart surgery", "heart surgery"),
    ("cardiac surgery", "heart surgery"),
    ("bypass surgery", "bypass surgery"),
    ("cabg", "bypass surgery"),
    ("angioplasty", "angioplasty"),
    ("appendectomy", "appendectomy"),
    ("appendix removal", "appendectomy"),
    ("dental treatment", "dental treatment"),
    ("dental surgery", "dental treatment"),
    ("root canal", "dental treatment"),
    ("cosmetic surgery", "cosmetic surgery"),
    ("plastic surgery", "cosmetic surgery"),
    ("maternity", "maternity"),
    ("childbirth", "maternity"),
    ("c-section", "maternity"),
    ("caesarean", "maternity"),
    ("chemotherapy", "chemotherapy"),
    ("chemo", "chemotherapy"),
    ("dialysis", "dialysis"),
    ("kidney transplant", "kidney transplant"),
    ("liver transplant", "liver transplant"),
    ("bariatric surgery", "bariatric surgery"),
    ("ivf", "infertility treatment"),
    ("infertility treatment", "infertility treatment"),
];

const LOCATION_ALIASES: &[(&str, &str)] = &[
    ("pune", "Pune"),
    ("mumbai", "Mumbai"),
    ("bombay", "Mumbai"),
    ("delhi", "Delhi"),
    ("new delhi", "Delhi"),
    ("bangalore", "Bangalore"),
    ("bengaluru", "Bangalore"),
    ("chennai", "Chennai"),
    ("madras", "Chennai"),
    ("kolkata", "Kolkata"),
    ("calcutta", "Kolkata"),
    ("hyderabad", "Hyderabad"),
    ("ahmedabad", "Ahmedabad"),
    ("surat", "Surat"),
    ("jaipur", "Jaipur"),
    ("lucknow", "Lucknow"),
    ("kanpur", "Kanpur"),
    ("nagpur", "Nagpur"),
    ("indore", "Indore"),
    ("thane", "Thane"),
    ("bhopal", "Bhopal"),
    ("visakhapatnam", "Visakhapatnam"),
    ("vizag", "Visakhapatnam"),
    ("pimpri", "Pimpri"),
    ("patna", "Patna"),
    ("vadodara", "Vadodara"),
    ("baroda", "Vadodara"),
    ("ghaziabad", "Ghaziabad"),
    ("ludhiana", "Ludhiana"),
    ("agra", "Agra"),
    ("nashik", "Nashik"),
    ("faridabad", "Faridabad"),
    ("meerut", "Meerut"),
    ("rajkot", "Rajkot"),
];

/// Extra aliases read from the `[synonyms]` configuration section.
///
/// Gender values must name a canonical gender (`M`, `F`, `other`, `unknown`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynonymOverrides {
    pub gender: BTreeMap<String, String>,
    pub procedure: BTreeMap<String, String>,
    pub location: BTreeMap<String, String>,
}

impl SynonymOverrides {
    pub fn is_empty(&self) -> bool {
        self.gender.is_empty() && self.procedure.is_empty() && self.location.is_empty()
    }
}

/// Alias tables for gender, procedure and location.
#[derive(Debug, Clone)]
pub struct SynonymTables {
    gender: BTreeMap<String, Gender>,
    procedure: BTreeMap<String, String>,
    location: BTreeMap<String, String>,
}

impl Default for SynonymTables {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SynonymTables {
    /// The built-in tables.
    pub fn builtin() -> Self {
        Self {
            gender: GENDER_ALIASES
                .iter()
                .map(|&(alias, g)| (alias.to_string(), g))
                .collect(),
            procedure: PROCEDURE_ALIASES
                .iter()
                .map(|&(alias, canonical)| (alias.to_string(), canonical.to_string()))
                .collect(),
            location: LOCATION_ALIASES
                .iter()
                .map(|&(alias, canonical)| (alias.to_string(), canonical.to_string()))
                .collect(),
        }
    }

    /// Return a copy of these tables extended with configured aliases.
    ///
    /// Configured aliases replace built-in ones with the same spelling.
    pub fn with_overrides(mut self, overrides: &SynonymOverrides) -> Result<Self, CoreError> {
        for (alias, canonical) in &overrides.gender {
            let gender = canonical.parse::<Gender>()?;
            self.gender.insert(normalize_alias(alias)?, gender);
        }
        for (alias, canonical) in &overrides.procedure {
            self.procedure
                .insert(normalize_alias(alias)?, canonical.trim().to_lowercase());
        }
        for (alias, canonical) in &overrides.location {
            self.location
                .insert(normalize_alias(alias)?, canonical.trim().to_string());
        }
        Ok(self)
    }

    pub fn gender(&self, alias: &str) -> Option<Gender> {
        self.gender.get(alias).copied()
    }

    pub fn gender_aliases(&self) -> impl Iterator<Item = (&str, Gender)> {
        self.gender.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn procedure_aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.procedure.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn location_aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.location.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn normalize_alias(alias: &str) -> Result<String, CoreError> {
    let normalized = alias.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err(CoreError::InvalidArgument("empty synonym alias".into()));
    }
    Ok(normalized.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_normalize_common_aliases() {
        let t = SynonymTables::builtin();
        assert_eq!(t.gender("man"), Some(Gender::Male));
        assert_eq!(t.gender("woman"), Some(Gender::Female));
        assert_eq!(t.gender("nonbinary"), Some(Gender::Other));
        assert_eq!(t.gender("robot"), None);

        let locations: BTreeMap<&str, &str> = t.location_aliases().collect();
        assert_eq!(locations["bengaluru"], "Bangalore");
        assert_eq!(locations["new delhi"], "Delhi");
    }

    #[test]
    fn all_aliases_are_lowercase() {
        let t = SynonymTables::builtin();
        assert!(t.gender_aliases().all(|(a, _)| a == a.to_lowercase()));
        assert!(t.procedure_aliases().all(|(a, _)| a == a.to_lowercase()));
        assert!(t.location_aliases().all(|(a, _)| a == a.to_lowercase()));
    }

    #[test]
    fn overrides_extend_and_replace() {
        let mut overrides = SynonymOverrides::default();
        overrides
            .procedure
            .insert("  Lasik  ".into(), "Eye Surgery".into());
        overrides.location.insert("Gurgaon".into(), "Gurugram".into());
        overrides.gender.insert("dude".into(), "M".into());

        let t = SynonymTables::builtin().with_overrides(&overrides).unwrap();
        let procedures: BTreeMap<&str, &str> = t.procedure_aliases().collect();
        assert_eq!(procedures["lasik"], "eye surgery");
        let locations: BTreeMap<&str, &str> = t.location_aliases().collect();
        assert_eq!(locations["gurgaon"], "Gurugram");
        assert_eq!(t.gender("dude"), Some(Gender::Male));
    }

    #[test]
    fn override_with_unknown_gender_fails() {
        let mut overrides = SynonymOverrides::default();
        overrides.gender.insert("x".into(), "martian".into());
        assert!(matches!(
            SynonymTables::builtin().with_overrides(&overrides),
            Err(CoreError::UnknownGender(_))
        ));
    }

    #[test]
    fn override_with_blank_alias_fails() {
        let mut overrides = SynonymOverrides::default();
        overrides.location.insert("   ".into(), "Nowhere".into());
        assert!(matches!(
            SynonymTables::builtin().with_overrides(&overrides),
            Err(CoreError::InvalidArgument(_))
        ));
    }
}
