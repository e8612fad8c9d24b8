//! Sample batches pushed by recording devices

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One sample as sent by a device
///
/// Devices send either named records (`{"time": .., "ax": ..}`) or bare
/// positional rows. Key order of a record is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    /// Named values, key order preserved
    Record(Map<String, Value>),
    /// Positional values
    Row(Vec<Value>),
}

/// A batch of samples; one `recordData` call
pub type SampleBatch = Vec<Sample>;
