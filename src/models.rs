use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::ScoreError;

/// One input column of the churn classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Feature {
    #[serde(rename = "gender")]
    Gender,
    #[serde(rename = "Near_Location")]
    NearLocation,
    #[serde(rename = "Partner")]
    Partner,
    #[serde(rename = "Promo_friends")]
    PromoFriends,
    #[serde(rename = "Phone")]
    HasPhone,
    #[serde(rename = "Contract_period")]
    ContractPeriod,
    #[serde(rename = "Group_visits")]
    GroupVisits,
    #[serde(rename = "Age")]
    Age,
    #[serde(rename = "Avg_additional_charges_total")]
    AvgAdditionalChargesTotal,
    #[serde(rename = "Month_to_end_contract")]
    MonthToEndContract,
    #[serde(rename = "Lifetime")]
    Lifetime,
    #[serde(rename = "Avg_class_frequency_total")]
    AvgClassFrequencyTotal,
    #[serde(rename = "Avg_class_frequency_current_month")]
    AvgClassFrequencyCurrentMonth,
}

impl Feature {
    /// Canonical training order of the gym churn data set.
    pub const ALL: [Feature; 13] = [
        Feature::Gender,
        Feature::NearLocation,
        Feature::Partner,
        Feature::PromoFriends,
        Feature::HasPhone,
        Feature::ContractPeriod,
        Feature::GroupVisits,
        Feature::Age,
        Feature::AvgAdditionalChargesTotal,
        Feature::MonthToEndContract,
        Feature::Lifetime,
        Feature::AvgClassFrequencyTotal,
        Feature::AvgClassFrequencyCurrentMonth,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Feature::Gender => "gender",
            Feature::NearLocation => "Near_Location",
            Feature::Partner => "Partner",
            Feature::PromoFriends => "Promo_friends",
            Feature::HasPhone => "Phone",
            Feature::ContractPeriod => "Contract_period",
            Feature::GroupVisits => "Group_visits",
            Feature::Age => "Age",
            Feature::AvgAdditionalChargesTotal => "Avg_additional_charges_total",
            Feature::MonthToEndContract => "Month_to_end_contract",
            Feature::Lifetime => "Lifetime",
            Feature::AvgClassFrequencyTotal => "Avg_class_frequency_total",
            Feature::AvgClassFrequencyCurrentMonth => "Avg_class_frequency_current_month",
        }
    }

    pub fn alias(self) -> &'static str {
        match self {
            Feature::Gender => "gender",
            Feature::NearLocation => "near_location",
            Feature::Partner => "partner",
            Feature::PromoFriends => "promo_friends",
            Feature::HasPhone => "has_phone",
            Feature::ContractPeriod => "contract_period",
            Feature::GroupVisits => "group_visits",
            Feature::Age => "age",
            Feature::AvgAdditionalChargesTotal => "avg_additional_charges_total",
            Feature::MonthToEndContract => "month_to_end_contract",
            Feature::Lifetime => "lifetime",
            Feature::AvgClassFrequencyTotal => "avg_class_frequency_total",
            Feature::AvgClassFrequencyCurrentMonth => "avg_class_frequency_current_month",
        }
    }

    pub fn is_flag(self) -> bool {
        matches!(
            self,
            Feature::Gender
                | Feature::NearLocation
                | Feature::Partner
                | Feature::PromoFriends
                | Feature::HasPhone
                | Feature::GroupVisits
        )
    }

    /// Resolves either the column name or the snake_case alias.
    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.column() == name || feature.alias() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One customer's snapshot as collected by the intake form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerRecord {
    pub gender: bool,
    pub near_location: bool,
    pub partner: bool,
    pub promo_friends: bool,
    pub has_phone: bool,
    pub group_visits: bool,
    pub contract_period: f64,
    pub age: f64,
    pub avg_additional_charges_total: f64,
    pub month_to_end_contract: f64,
    pub lifetime: f64,
    pub avg_class_frequency_total: f64,
    pub avg_class_frequency_current_month: f64,
}

impl CustomerRecord {
    pub fn value(&self, feature: Feature) -> f64 {
        let flag = |set: bool| if set { 1.0 } else { 0.0 };
        match feature {
            Feature::Gender => flag(self.gender),
            Feature::NearLocation => flag(self.near_location),
            Feature::Partner => flag(self.partner),
            Feature::PromoFriends => flag(self.promo_friends),
            Feature::HasPhone => flag(self.has_phone),
            Feature::GroupVisits => flag(self.group_visits),
            Feature::ContractPeriod => self.contract_period,
            Feature::Age => self.age,
            Feature::AvgAdditionalChargesTotal => self.avg_additional_charges_total,
            Feature::MonthToEndContract => self.month_to_end_contract,
            Feature::Lifetime => self.lifetime,
            Feature::AvgClassFrequencyTotal => self.avg_class_frequency_total,
            Feature::AvgClassFrequencyCurrentMonth => self.avg_class_frequency_current_month,
        }
    }

    fn set(&mut self, feature: Feature, value: f64) {
        match feature {
            Feature::Gender => self.gender = value == 1.0,
            Feature::NearLocation => self.near_location = value == 1.0,
            Feature::Partner => self.partner = value == 1.0,
            Feature::PromoFriends => self.promo_friends = value == 1.0,
            Feature::HasPhone => self.has_phone = value == 1.0,
            Feature::GroupVisits => self.group_visits = value == 1.0,
            Feature::ContractPeriod => self.contract_period = value,
            Feature::Age => self.age = value,
            Feature::AvgAdditionalChargesTotal => self.avg_additional_charges_total = value,
            Feature::MonthToEndContract => self.month_to_end_contract = value,
            Feature::Lifetime => self.lifetime = value,
            Feature::AvgClassFrequencyTotal => self.avg_class_frequency_total = value,
            Feature::AvgClassFrequencyCurrentMonth => {
                self.avg_class_frequency_current_month = value
            }
        }
    }

    /// Builds the model input vector in the exact column order a classifier
    /// was fit on.
    pub fn to_vector(&self, columns: &[String]) -> Result<Vec<f64>, ScoreError> {
        let features = resolve_columns(columns)?;
        Ok(features.into_iter().map(|feature| self.value(feature)).collect())
    }
}

/// Maps a classifier's declared columns onto features. The list must name
/// every feature exactly once.
pub fn resolve_columns(columns: &[String]) -> Result<Vec<Feature>, ScoreError> {
    if columns.len() != Feature::ALL.len() {
        return Err(ScoreError::SchemaMismatch(format!(
            "model expects {} columns, record carries {}",
            columns.len(),
            Feature::ALL.len()
        )));
    }

    let mut resolved = Vec::with_capacity(columns.len());
    for column in columns {
        let feature = Feature::from_name(column).ok_or_else(|| {
            ScoreError::SchemaMismatch(format!("model expects unknown column {column}"))
        })?;
        if resolved.contains(&feature) {
            return Err(ScoreError::SchemaMismatch(format!(
                "model lists column {column} twice"
            )));
        }
        resolved.push(feature);
    }

    Ok(resolved)
}

impl TryFrom<BTreeMap<String, f64>> for CustomerRecord {
    type Error = ScoreError;

    fn try_from(fields: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        let mut record = CustomerRecord::default();
        let mut seen: Vec<Feature> = Vec::with_capacity(fields.len());

        for (name, value) in &fields {
            let feature = Feature::from_name(name)
                .ok_or_else(|| ScoreError::SchemaMismatch(format!("unknown field {name}")))?;
            if seen.contains(&feature) {
                return Err(ScoreError::SchemaMismatch(format!(
                    "field {} given more than once",
                    feature.column()
                )));
            }
            if feature.is_flag() {
                if *value != 0.0 && *value != 1.0 {
                    return Err(ScoreError::SchemaMismatch(format!(
                        "flag {} must be 0 or 1, got {value}",
                        feature.column()
                    )));
                }
            } else if !value.is_finite() || *value < 0.0 {
                return Err(ScoreError::SchemaMismatch(format!(
                    "field {} must be a non-negative number, got {value}",
                    feature.column()
                )));
            }
            record.set(feature, *value);
            seen.push(feature);
        }

        if let Some(missing) = Feature::ALL.into_iter().find(|f| !seen.contains(f)) {
            return Err(ScoreError::SchemaMismatch(format!(
                "missing field {}",
                missing.column()
            )));
        }

        Ok(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Stay,
    Churn,
}

impl Verdict {
    /// Inclusive threshold: a tie counts as churn.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Verdict::Churn
        } else {
            Verdict::Stay
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Stay => f.write_str("STAY"),
            Verdict::Churn => f.write_str("CHURN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub feature: Feature,
    pub current_value: f64,
    pub recommended_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub model: String,
    pub threshold: f64,
    pub probability: f64,
    pub verdict: Verdict,
    pub reasons: Vec<&'static str>,
    pub suggestions: Vec<Suggestion>,
}

/// Per-feature contributions for one prediction, in canonical feature order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub base_value: f64,
    pub contributions: Vec<(Feature, f64)>,
}

impl Attribution {
    pub fn output(&self) -> f64 {
        self.base_value + self.contributions.iter().map(|(_, c)| c).sum::<f64>()
    }

    /// Contributions ordered by absolute size, largest first.
    pub fn ranked(&self) -> Vec<(Feature, f64)> {
        let mut ranked = self.contributions.clone();
        ranked.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_fields() -> BTreeMap<String, f64> {
        Feature::ALL
            .into_iter()
            .map(|feature| (feature.column().to_string(), 1.0))
            .collect()
    }

    #[test]
    fn accepts_columns_and_aliases() {
        let mut fields = full_fields();
        fields.remove("Contract_period");
        fields.insert("contract_period".to_string(), 6.0);

        let record = CustomerRecord::try_from(fields).unwrap();
        assert_eq!(record.contract_period, 6.0);
        assert!(record.partner);
    }

    #[test]
    fn rejects_missing_field() {
        let mut fields = full_fields();
        fields.remove("Lifetime");

        let err = CustomerRecord::try_from(fields).unwrap_err();
        assert_eq!(err, ScoreError::SchemaMismatch("missing field Lifetime".into()));
    }

    #[test]
    fn rejects_unknown_and_duplicate_fields() {
        let mut fields = full_fields();
        fields.insert("Churn".to_string(), 0.0);
        assert!(matches!(
            CustomerRecord::try_from(fields),
            Err(ScoreError::SchemaMismatch(_))
        ));

        let mut fields = full_fields();
        fields.insert("age".to_string(), 30.0);
        assert!(matches!(
            CustomerRecord::try_from(fields),
            Err(ScoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn rejects_out_of_domain_values() {
        let mut fields = full_fields();
        fields.insert("Partner".to_string(), 0.5);
        assert!(CustomerRecord::try_from(fields).is_err());

        let mut fields = full_fields();
        fields.insert("Age".to_string(), -1.0);
        assert!(CustomerRecord::try_from(fields).is_err());
    }

    #[test]
    fn vector_follows_model_column_order() {
        let record = CustomerRecord {
            age: 31.0,
            lifetime: 4.0,
            partner: true,
            ..CustomerRecord::default()
        };
        let mut columns: Vec<String> =
            Feature::ALL.iter().map(|f| f.column().to_string()).collect();
        columns.reverse();

        let vector = record.to_vector(&columns).unwrap();
        assert_eq!(vector.len(), 13);
        assert_eq!(vector[12 - 7], 31.0);
        assert_eq!(vector[12 - 10], 4.0);
        assert_eq!(vector[12 - 2], 1.0);
    }

    #[test]
    fn vector_rejects_short_column_list() {
        let columns: Vec<String> = Feature::ALL[..12]
            .iter()
            .map(|f| f.column().to_string())
            .collect();
        assert!(matches!(
            CustomerRecord::default().to_vector(&columns),
            Err(ScoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn tie_resolves_to_churn() {
        assert_eq!(Verdict::from_probability(0.35, 0.35), Verdict::Churn);
        assert_eq!(Verdict::from_probability(0.3499, 0.35), Verdict::Stay);
    }

    #[test]
    fn attribution_ranks_by_magnitude() {
        let attribution = Attribution {
            base_value: 0.2,
            contributions: vec![
                (Feature::Age, 0.05),
                (Feature::Lifetime, -0.3),
                (Feature::Partner, 0.1),
            ],
        };
        let ranked = attribution.ranked();
        assert_eq!(ranked[0].0, Feature::Lifetime);
        assert_eq!(ranked[2].0, Feature::Age);
        assert!((attribution.output() - 0.05).abs() < 1e-12);
    }
}
