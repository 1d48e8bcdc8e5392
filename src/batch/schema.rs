use jsonschema::JSONSchema;
use log::{info, warn};
use serde_json::Value;

use crate::batch::BatchError;

/// Check an untyped batch file against the bundled JSON schema
pub fn validate(instance: &Value) -> Result<(), BatchError> {
    /// included batch file schema
    static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/batch.json"));
    let schema: Value = serde_json::from_str(SCHEMA)?;
    let compiled = JSONSchema::compile(&schema).map_err(|err| BatchError::InvalidSchema(err.to_string()))?;

    info!("Validating batch file against JSON schema");
    let messages: Vec<String> = match compiled.validate(instance) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .map(|err| format!("{} at {}", err, err.instance_path))
            .collect(),
    };

    for message in &messages {
        warn!("Batch file fails validation: {message}");
    }
    Err(BatchError::Schema(messages))
}
