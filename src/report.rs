use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Attribution, ScoreResult, Verdict};

pub const TOP_CONTRIBUTIONS: usize = 5;

pub fn verdict_banner(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Churn => "Customer WILL CHURN",
        Verdict::Stay => "Customer WILL STAY",
    }
}

pub fn render_markdown(
    result: &ScoreResult,
    attribution: Option<&Attribution>,
    generated_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Gym Churn Prediction");
    let _ = writeln!(
        output,
        "Model {} at threshold {:.2} (generated {})",
        result.model,
        result.threshold,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Prediction Result");
    let _ = writeln!(output, "- Churn probability: {:.2}%", result.probability * 100.0);
    let _ = writeln!(output, "- {}", verdict_banner(result.verdict));

    if !result.reasons.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Key reasons");
        for reason in &result.reasons {
            let _ = writeln!(output, "- {reason}");
        }
    }

    if !result.suggestions.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## How to improve retention");
        let _ = writeln!(output, "| Feature | Current | Recommended |");
        let _ = writeln!(output, "|---|---|---|");
        for suggestion in &result.suggestions {
            let _ = writeln!(
                output,
                "| {} | {:.2} | {:.2} |",
                suggestion.feature, suggestion.current_value, suggestion.recommended_value
            );
        }

        let actions: Vec<&str> = result.suggestions.iter().filter_map(|s| s.action).collect();
        if !actions.is_empty() {
            let _ = writeln!(output);
            for action in actions {
                let _ = writeln!(output, "- {action}");
            }
        }
    }

    if let Some(attribution) = attribution {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Feature attribution");
        let _ = writeln!(output, "Base value {:.4}", attribution.base_value);
        for (feature, contribution) in attribution.ranked().iter().take(TOP_CONTRIBUTIONS) {
            let _ = writeln!(output, "- {feature}: {contribution:+.4}");
        }
    }

    output
}

pub fn render_json(
    result: &ScoreResult,
    attribution: Option<&Attribution>,
) -> serde_json::Result<String> {
    #[derive(serde::Serialize)]
    struct Payload<'a> {
        #[serde(flatten)]
        result: &'a ScoreResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        attribution: Option<&'a Attribution>,
    }

    serde_json::to_string_pretty(&Payload {
        result,
        attribution,
    })
}

/// One-line summary used by batch scoring.
pub fn summary_line(index: usize, result: &ScoreResult) -> String {
    let mut line = format!(
        "#{index} {} {:.2}%",
        result.verdict,
        result.probability * 100.0
    );
    if !result.reasons.is_empty() {
        let _ = write!(line, " ({})", result.reasons.join(", "));
    }
    line
}
