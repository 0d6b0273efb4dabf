use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum U64Input {
        String(String),
        Number(u64),
    }

    match U64Input::deserialize(deserializer)? {
        U64Input::String(raw) => raw.parse::<u64>().map_err(D::Error::custom),
        U64Input::Number(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Wrapper {
        #[serde(with = "super")]
        start_tick: u64,
    }

    #[test]
    fn deserialize_accepts_string() {
        let parsed: Wrapper =
            serde_json::from_str(r#"{"start_tick":"287654123"}"#).expect("string tick");
        assert_eq!(parsed.start_tick, 287_654_123);
    }

    #[test]
    fn deserialize_accepts_number() {
        let parsed: Wrapper =
            serde_json::from_str(r#"{"start_tick":287654123}"#).expect("numeric tick");
        assert_eq!(parsed.start_tick, 287_654_123);
    }
}
