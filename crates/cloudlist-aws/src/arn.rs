//! ARN helpers

use crate::client::Endpoint;

/// AWS partition for a region name
pub fn partition_for_region(region: &str) -> &'static str {
    const PREFIXES: [(&str, &str); 6] = [
        ("cn-", "aws-cn"),
        ("us-gov-", "aws-us-gov"),
        ("us-iso-", "aws-iso"),
        ("us-isob-", "aws-iso-b"),
        ("eu-isoe-", "aws-iso-e"),
        ("us-isof-", "aws-iso-f"),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| region.starts_with(prefix))
        .map_or("aws", |(_, partition)| partition)
}

/// `arn:{partition}:s3:::{name}`, the key buckets are tagged under
pub fn bucket_arn(partition: &str, name: &str) -> String {
    format!("arn:{partition}:s3:::{name}")
}

/// `arn:{partition}:logs:{region}:{account}:log-group:{name}`
pub fn log_group_arn(endpoint: &Endpoint, name: &str) -> String {
    format!(
        "arn:{}:logs:{}:{}:log-group:{name}",
        endpoint.partition(),
        endpoint.region,
        endpoint.account_id
    )
}

/// Log group ARN without the `:*` stream wildcard some APIs append
pub fn trim_wildcard(arn: &str) -> &str {
    arn.strip_suffix(":*").unwrap_or(arn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_group_arn_from_endpoint() {
        let endpoint = Endpoint {
            base_url: "http://localhost".into(),
            region: "cn-north-1".into(),
            account_id: "123456789012".into(),
            token: None,
        };
        assert_eq!(
            log_group_arn(&endpoint, "/app/api"),
            "arn:aws-cn:logs:cn-north-1:123456789012:log-group:/app/api"
        );
    }

    #[test]
    fn partitions() {
        assert_eq!(partition_for_region("us-east-1"), "aws");
        assert_eq!(partition_for_region("eu-west-3"), "aws");
        assert_eq!(partition_for_region("cn-north-1"), "aws-cn");
        assert_eq!(partition_for_region("us-gov-west-1"), "aws-us-gov");
        assert_eq!(partition_for_region("us-isob-east-1"), "aws-iso-b");
    }

    #[test]
    fn bucket_arn_format() {
        assert_eq!(bucket_arn("aws", "my-bucket"), "arn:aws:s3:::my-bucket");
        assert_eq!(bucket_arn("aws-cn", "b"), "arn:aws-cn:s3:::b");
    }

    #[test]
    fn wildcard_trimmed() {
        assert_eq!(
            trim_wildcard("arn:aws:logs:us-east-1:123:log-group:/app:*"),
            "arn:aws:logs:us-east-1:123:log-group:/app"
        );
        assert_eq!(trim_wildcard("arn:aws:logs:x"), "arn:aws:logs:x");
    }
}
