//! Extents derived from container instances

use super::error::MergeCause;
use serde_json::{json, Value};

/// Normalize a container indicator to an integer
///
/// `"5"` → 5, `"23b"` → 23, `"B"` → 1. A lone letter maps to its 0-based
/// position in the alphabet.
pub fn indicator_to_integer(indicator: &str) -> Result<i64, MergeCause> {
    let trimmed = indicator.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if !digits.is_empty() {
        return digits
            .parse()
            .map_err(|_| MergeCause::InvalidIndicator(indicator.to_string()));
    }

    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => {
            Ok(i64::from(letter.to_ascii_lowercase() as u8 - b'a'))
        }
        _ => Err(MergeCause::InvalidIndicator(indicator.to_string())),
    }
}

/// Distance between two indicators, or 1 when they coincide or only one is given
pub fn extent_span(first: &str, second: Option<&str>) -> Result<i64, MergeCause> {
    let low = indicator_to_integer(first)?;
    let Some(second) = second else {
        return Ok(1);
    };
    let high = indicator_to_integer(second)?;
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    if high == low {
        return Ok(1);
    }
    high.checked_sub(low)
        .ok_or_else(|| MergeCause::InvalidIndicator(format!("{}-{}", first, second)))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Count of one instance: its extent type and size
fn instance_extent(instance: &Value, sub_container: &Value) -> Result<(String, i64), MergeCause> {
    if let (Some(indicator), Some(extent_type)) = (
        str_field(sub_container, "indicator_2"),
        str_field(sub_container, "type_2"),
    ) {
        let parts: Vec<&str> = indicator.split('-').map(str::trim).collect();
        let span = match parts.as_slice() {
            [only] => extent_span(only, None)?,
            [first, .., last] => extent_span(first, Some(last))?,
            [] => 1,
        };
        return Ok((extent_type.trim().to_string(), span));
    }

    let instance_type = str_field(instance, "instance_type")
        .unwrap_or_default()
        .to_lowercase();
    let container_type = sub_container
        .get("top_container")
        .and_then(|t| t.get("_resolved"))
        .and_then(|t| str_field(t, "type"))
        .unwrap_or_default()
        .to_lowercase();

    let extent_type = if container_type == "box" {
        container_type
    } else {
        format!("{} {}", instance_type, container_type)
    };
    Ok((extent_type.trim().to_string(), 1))
}

/// Extents implied by a record's physical instances
///
/// Instances without a sub-container (digital objects) are skipped. Extents
/// of equal type are summed, in first-seen order.
pub fn parse_instances(instances: &[Value]) -> Result<Vec<Value>, MergeCause> {
    let mut totals: Vec<(String, i64)> = Vec::new();

    for instance in instances {
        let Some(sub_container) = instance.get("sub_container").filter(|s| s.is_object()) else {
            continue;
        };
        let (extent_type, number) = instance_extent(instance, sub_container)?;
        match totals.iter_mut().find(|(t, _)| *t == extent_type) {
            Some((_, total)) => *total += number,
            None => totals.push((extent_type, number)),
        }
    }

    Ok(totals
        .into_iter()
        .map(|(extent_type, number)| json!({"extent_type": extent_type, "number": number}))
        .collect())
}
