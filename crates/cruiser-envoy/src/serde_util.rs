//! Protojson decoding helpers.
//!
//! Protojson writes enum fields as their value names and durations as
//! decimal-seconds strings; the helpers here turn those back into the prost
//! representations.

use serde::{Deserialize, Deserializer};

/// An enum field appearing either as a value name or a raw number.
#[derive(Deserialize)]
#[serde(untagged)]
enum NameOrNumber {
    Name(String),
    Number(i32),
}

fn enum_value<'de, D>(deserializer: D, lookup: fn(&str) -> Option<i32>) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NameOrNumber>::deserialize(deserializer)? {
        None => Ok(0),
        Some(NameOrNumber::Number(n)) => Ok(n),
        Some(NameOrNumber::Name(name)) => lookup(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown enum value: {name}"))),
    }
}

pub(crate) fn socket_protocol<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    enum_value(deserializer, |name| match name {
        "TCP" => Some(0),
        "UDP" => Some(1),
        _ => None,
    })
}

pub(crate) fn health_status<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    enum_value(deserializer, |name| match name {
        "UNKNOWN" => Some(0),
        "HEALTHY" => Some(1),
        "UNHEALTHY" => Some(2),
        "DRAINING" => Some(3),
        "TIMEOUT" => Some(4),
        "DEGRADED" => Some(5),
        _ => None,
    })
}

pub(crate) fn discovery_type<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    enum_value(deserializer, |name| match name {
        "STATIC" => Some(0),
        "STRICT_DNS" => Some(1),
        "LOGICAL_DNS" => Some(2),
        "EDS" => Some(3),
        "ORIGINAL_DST" => Some(4),
        _ => None,
    })
}

pub(crate) fn lb_policy<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    enum_value(deserializer, |name| match name {
        "ROUND_ROBIN" => Some(0),
        "LEAST_REQUEST" => Some(1),
        "RING_HASH" => Some(2),
        "RANDOM" => Some(3),
        "MAGLEV" => Some(5),
        "CLUSTER_PROVIDED" => Some(6),
        _ => None,
    })
}

/// Decode a protojson duration (`"5s"`, `"0.250s"`) into a protobuf
/// duration message.
pub(crate) fn duration<'de, D>(
    deserializer: D,
) -> Result<Option<prost_types::Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let seconds_text = text
        .strip_suffix('s')
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {text}")))?;
    let total: f64 = seconds_text
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid duration: {text}")))?;

    let seconds = total.trunc() as i64;
    let nanos = ((total - total.trunc()) * 1_000_000_000.0).round() as i32;
    Ok(Some(prost_types::Duration { seconds, nanos }))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "super::socket_protocol")]
        protocol: i32,
        #[serde(default, deserialize_with = "super::duration")]
        timeout: Option<prost_types::Duration>,
    }

    #[test]
    fn enum_by_name_and_number() {
        let h: Holder = serde_json::from_str(r#"{"protocol": "UDP"}"#).unwrap();
        assert_eq!(h.protocol, 1);
        let h: Holder = serde_json::from_str(r#"{"protocol": 1}"#).unwrap();
        assert_eq!(h.protocol, 1);
        let h: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(h.protocol, 0);
        assert!(serde_json::from_str::<Holder>(r#"{"protocol": "BOGUS"}"#).is_err());
    }

    #[test]
    fn duration_seconds_and_fraction() {
        let h: Holder = serde_json::from_str(r#"{"timeout": "5s"}"#).unwrap();
        let d = h.timeout.unwrap();
        assert_eq!((d.seconds, d.nanos), (5, 0));

        let h: Holder = serde_json::from_str(r#"{"timeout": "0.250s"}"#).unwrap();
        let d = h.timeout.unwrap();
        assert_eq!((d.seconds, d.nanos), (0, 250_000_000));

        assert!(serde_json::from_str::<Holder>(r#"{"timeout": "250ms"}"#).is_err());
    }
}
