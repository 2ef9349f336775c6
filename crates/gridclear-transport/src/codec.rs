use gridclear_types::{GridClearError, MarketKind, Result};

/// Encode one value per slot. Day-ahead payloads are JSON arrays, real-time
/// payloads a single decimal number.
pub fn encode(values: &[f64], kind: MarketKind) -> Result<String> {
    match kind {
        MarketKind::DayAhead => Ok(serde_json::to_string(values)?),
        MarketKind::RealTime => match values {
            [value] => Ok(value.to_string()),
            _ => Err(GridClearError::Codec(format!(
                "real-time payload takes one value, got {}",
                values.len()
            ))),
        },
    }
}

/// Decode a payload without checking its length. Non-finite values are
/// rejected.
pub fn decode_any(payload: &str, kind: MarketKind) -> Result<Vec<f64>> {
    let values = match kind {
        MarketKind::DayAhead => serde_json::from_str::<Vec<f64>>(payload)
            .map_err(|e| GridClearError::Codec(format!("bad day-ahead payload: {e}")))?,
        MarketKind::RealTime => payload
            .trim()
            .parse::<f64>()
            .map(|v| vec![v])
            .map_err(|e| GridClearError::Codec(format!("bad real-time payload {payload:?}: {e}")))?,
    };
    if values.iter().any(|v| !v.is_finite()) {
        return Err(GridClearError::Codec(format!("non-finite value in payload {payload:?}")));
    }
    Ok(values)
}

/// Decode a payload that must carry exactly `horizon` values
pub fn decode(payload: &str, kind: MarketKind, horizon: usize) -> Result<Vec<f64>> {
    let values = decode_any(payload, kind)?;
    if values.len() != horizon {
        return Err(GridClearError::Codec(format!(
            "expected {horizon} values, got {}",
            values.len()
        )));
    }
    Ok(values)
}
