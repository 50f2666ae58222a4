use crate::error::{Error, Result};
use std::fs;
use tracing::info;

/// Parses `key=value` client properties, skipping blank lines and `#` comments.
pub fn parse_kafka_properties(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Loads extra client properties from a properties file.
pub fn load_kafka_config_from_file(properties_file_path: &str) -> Result<Vec<(String, String)>> {
    let kafka_properties = fs::read_to_string(properties_file_path).map_err(|source| Error::Io {
        path: properties_file_path.to_string(),
        source,
    })?;

    let properties = parse_kafka_properties(&kafka_properties);
    info!(
        path = properties_file_path,
        count = properties.len(),
        "Loaded Kafka properties"
    );
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kafka_properties() {
        let contents = "
# producer tuning
linger.ms = 10

compression.type=zstd
sasl.oauthbearer.extensions=logicalCluster=lkc-1
not a property
";
        assert_eq!(
            parse_kafka_properties(contents),
            vec![
                ("linger.ms".to_string(), "10".to_string()),
                ("compression.type".to_string(), "zstd".to_string()),
                (
                    "sasl.oauthbearer.extensions".to_string(),
                    "logicalCluster=lkc-1".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_kafka_config_from_file("/nonexistent/courier.properties").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
