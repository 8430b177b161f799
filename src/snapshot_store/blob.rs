// Sample BLOB encoding: [version: u8][wincode payload].

use crate::models::NodeSample;

use super::StoreError;

pub(super) const SAMPLES_BLOB_VERSION: u8 = 1;

pub(super) fn encode_samples(samples: &[NodeSample]) -> Result<Vec<u8>, StoreError> {
    let payload =
        wincode::serialize(&samples.to_vec()).map_err(|e| StoreError::Encode(e.to_string()))?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(SAMPLES_BLOB_VERSION);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Unknown versions and corrupt payloads decode to an empty list (logged at debug).
pub(super) fn decode_samples(bytes: &[u8]) -> Vec<NodeSample> {
    match bytes.split_first() {
        Some((&SAMPLES_BLOB_VERSION, payload)) => {
            wincode::deserialize(payload).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "wincode deserialize samples (corrupt), using empty");
                vec![]
            })
        }
        Some((version, _)) => {
            tracing::debug!(version = *version, "unknown samples blob version, using empty");
            vec![]
        }
        None => vec![],
    }
}
