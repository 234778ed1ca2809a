use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::models::CustomerRecord;

pub fn record_from_json(text: &str) -> anyhow::Result<CustomerRecord> {
    let fields: BTreeMap<String, f64> =
        serde_json::from_str(text).context("customer record must be a JSON object of numbers")?;
    Ok(CustomerRecord::try_from(fields)?)
}

pub fn load_record(path: &Path) -> anyhow::Result<CustomerRecord> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    record_from_json(&text).with_context(|| format!("invalid customer record in {}", path.display()))
}

/// Reads one customer per CSV row; the header row names the fields.
pub fn records_from_csv(csv_path: &Path) -> anyhow::Result<Vec<CustomerRecord>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<BTreeMap<String, f64>>().enumerate() {
        let row = index + 1;
        let fields = result.with_context(|| format!("row {row} is not numeric"))?;
        let record = CustomerRecord::try_from(fields).map_err(|err| {
            tracing::warn!(row, error = %err, "rejected customer row");
            anyhow::anyhow!("row {row}: {err}")
        })?;
        records.push(record);
    }

    Ok(records)
}
