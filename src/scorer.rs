use crate::classifier::Classifier;
use crate::error::ScoreError;
use crate::models::{CustomerRecord, Feature, ScoreResult, Suggestion, Verdict};

pub const MAX_REASONS: usize = 3;

type Rule = (fn(&CustomerRecord) -> bool, &'static str);

const RISK_RULES: [Rule; 5] = [
    (|r| r.contract_period <= 3.0, "short contract period"),
    (|r| r.month_to_end_contract <= 1.0, "contract is about to end"),
    (
        |r| r.avg_class_frequency_current_month < 1.0,
        "low recent class attendance",
    ),
    (|r| r.lifetime < 6.0, "short customer lifetime"),
    (|r| r.age < 30.0, "young age segment"),
];

const RETENTION_RULES: [Rule; 4] = [
    (|r| r.contract_period >= 6.0, "long-term contract"),
    (
        |r| r.avg_class_frequency_current_month >= 3.0,
        "high class attendance",
    ),
    (|r| r.partner, "partner membership"),
    (|r| r.promo_friends, "friend promotion"),
];

pub const IDEAL_VALUES: [(Feature, f64); 4] = [
    (Feature::AvgClassFrequencyCurrentMonth, 3.0),
    (Feature::AvgClassFrequencyTotal, 3.0),
    (Feature::Lifetime, 12.0),
    (Feature::ContractPeriod, 6.0),
];

// Avg_class_frequency_total deliberately has no entry.
pub fn action_text(feature: Feature) -> Option<&'static str> {
    match feature {
        Feature::AvgClassFrequencyCurrentMonth => {
            Some("Encourage more visits this month with class reminders or a visit challenge.")
        }
        Feature::Lifetime => {
            Some("Strengthen onboarding and check in regularly during the first year.")
        }
        Feature::ContractPeriod => {
            Some("Offer a discounted upgrade to a six-month or longer contract.")
        }
        _ => None,
    }
}

pub fn validate_threshold(threshold: f64) -> Result<f64, ScoreError> {
    if threshold > 0.0 && threshold < 1.0 {
        Ok(threshold)
    } else {
        Err(ScoreError::InvalidThreshold(threshold))
    }
}

pub fn predict(
    record: &CustomerRecord,
    model: &dyn Classifier,
    threshold: f64,
) -> Result<(f64, Verdict), ScoreError> {
    let threshold = validate_threshold(threshold)?;
    let features = record.to_vector(model.feature_columns())?;
    let probability = model.predict_positive_probability(&features)?;

    if !(0.0..=1.0).contains(&probability) {
        return Err(ScoreError::Classifier(format!(
            "{} returned probability {probability} outside [0, 1]",
            model.name()
        )));
    }

    let verdict = Verdict::from_probability(probability, threshold);
    tracing::debug!(model = model.name(), probability, threshold, %verdict, "scored record");
    Ok((probability, verdict))
}

pub fn explain_reasons(record: &CustomerRecord, verdict: Verdict) -> Vec<&'static str> {
    let risk = matching_labels(&RISK_RULES, record);
    let retention = matching_labels(&RETENTION_RULES, record);

    let mut reasons = match verdict {
        Verdict::Churn => risk,
        Verdict::Stay => retention,
    };
    reasons.truncate(MAX_REASONS);
    reasons
}

fn matching_labels(rules: &[Rule], record: &CustomerRecord) -> Vec<&'static str> {
    rules
        .iter()
        .filter(|(applies, _)| applies(record))
        .map(|(_, label)| *label)
        .collect()
}

pub fn suggest_improvements(record: &CustomerRecord, verdict: Verdict) -> Vec<Suggestion> {
    if verdict == Verdict::Stay {
        return Vec::new();
    }

    IDEAL_VALUES
        .iter()
        .filter_map(|&(feature, ideal)| {
            let current = record.value(feature);
            (current < ideal).then(|| Suggestion {
                feature,
                current_value: current,
                recommended_value: ideal,
                action: action_text(feature),
            })
        })
        .collect()
}

/// Runs prediction, reasons and suggestions for one record.
pub fn score(
    record: &CustomerRecord,
    model: &dyn Classifier,
    threshold: f64,
) -> Result<ScoreResult, ScoreError> {
    let (probability, verdict) = predict(record, model, threshold)?;

    Ok(ScoreResult {
        model: model.name().to_string(),
        threshold,
        probability,
        verdict,
        reasons: explain_reasons(record, verdict),
        suggestions: suggest_improvements(record, verdict),
    })
}
