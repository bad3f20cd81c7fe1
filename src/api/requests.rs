use crate::level::ConfigUpdate;
use serde_json::Value;

pub const BUCKET_HEIGHT_KEY: &str = "bucketHeight";
pub const THRESHOLD_KEY: &str = "threshold";

/// Parse a `saveConfig` body. Only malformed JSON is an error; a present
/// field holding anything but a number becomes NaN so validation rejects it
/// individually, and a non-object document updates nothing.
pub fn parse_config_update(body: &[u8]) -> Result<ConfigUpdate, serde_json::Error> {
    let document: Value = serde_json::from_slice(body)?;
    Ok(ConfigUpdate {
        bucket_height: numeric_field(&document, BUCKET_HEIGHT_KEY),
        threshold: numeric_field(&document, THRESHOLD_KEY),
    })
}

fn numeric_field(document: &Value, key: &str) -> Option<f64> {
    document
        .get(key)
        .map(|value| value.as_f64().unwrap_or(f64::NAN))
}
