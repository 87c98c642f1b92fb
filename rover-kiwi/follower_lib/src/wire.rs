//! ASCII line protocol understood by the motor microcontroller:
//! `<THROTTLE,STEERING>\n` with two decimals, e.g. `<0.50,-1.00>\n`.

use crate::error::WireError;
use crate::types::ControlVector;

pub const STOP_LINE: &str = "<0.00,0.00>\n";

pub fn encode_command(command: &ControlVector) -> String {
    if !(command.throttle.is_finite() && command.steering.is_finite()) {
        return STOP_LINE.to_string();
    }
    format!("<{:.2},{:.2}>\n", centi(command.throttle), centi(command.steering))
}

/// Round to the wire precision; adding 0.0 turns -0.0 into 0.0 so the line
/// never reads "-0.00"
fn centi(value: f32) -> f32 {
    (value * 100.0).round() / 100.0 + 0.0
}

pub fn parse_command(line: &str) -> Result<ControlVector, WireError> {
    let body = line
        .trim()
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or_else(|| WireError::MissingDelimiters(line.to_string()))?;

    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() != 2 {
        return Err(WireError::FieldCount(fields.len()));
    }

    let parse = |field: &'static str, raw: &str| {
        raw.trim()
            .parse::<f32>()
            .map_err(|_| WireError::NotANumber {
                field,
                value: raw.to_string(),
            })
    };

    Ok(ControlVector::new(
        parse("throttle", fields[0])?,
        parse("steering", fields[1])?,
    ))
}
