//! Cloud SDK call to IAM permission mapping.
//!
//! Turns a call such as `client.describe_instances()` into the permission it
//! needs (`ec2:DescribeInstances`). The service comes from, in order: an
//! explicit client binding (`boto3.client("ec2")`), a receiver named after a
//! service (`s3_client`, `dynamoDb`), or the table of operations that only
//! exist on one service.

use phf::{phf_map, phf_set};

/// An IAM-style permission derived from an SDK call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub service: String,
    pub action: String,
}

impl Permission {
    /// `service:Action` form.
    pub fn name(&self) -> String {
        format!("{}:{}", self.service, self.action)
    }
}

/// Operations that identify their service on their own.
///
/// Generic names (`query`, `scan`, `publish`, `invoke`, `encrypt`) are left
/// out: they only map when the client binding is known.
static OPERATION_SERVICES: phf::Map<&'static str, &'static str> = phf_map! {
    // ec2
    "describe_instances" => "ec2",
    "run_instances" => "ec2",
    "terminate_instances" => "ec2",
    "start_instances" => "ec2",
    "stop_instances" => "ec2",
    "reboot_instances" => "ec2",
    "describe_security_groups" => "ec2",
    "authorize_security_group_ingress" => "ec2",
    "describe_vpcs" => "ec2",
    "describe_subnets" => "ec2",
    "describe_images" => "ec2",
    "describe_volumes" => "ec2",
    "create_snapshot" => "ec2",
    "create_tags" => "ec2",
    // s3
    "get_object" => "s3",
    "put_object" => "s3",
    "delete_object" => "s3",
    "delete_objects" => "s3",
    "head_object" => "s3",
    "copy_object" => "s3",
    "list_objects" => "s3",
    "list_objects_v2" => "s3",
    "list_buckets" => "s3",
    "create_bucket" => "s3",
    "delete_bucket" => "s3",
    "upload_file" => "s3",
    "upload_fileobj" => "s3",
    "download_file" => "s3",
    "download_fileobj" => "s3",
    "put_bucket_policy" => "s3",
    // dynamodb
    "get_item" => "dynamodb",
    "put_item" => "dynamodb",
    "update_item" => "dynamodb",
    "delete_item" => "dynamodb",
    "batch_get_item" => "dynamodb",
    "batch_write_item" => "dynamodb",
    "transact_write_items" => "dynamodb",
    "describe_table" => "dynamodb",
    // sqs
    "send_message" => "sqs",
    "send_message_batch" => "sqs",
    "receive_message" => "sqs",
    "delete_message" => "sqs",
    "get_queue_url" => "sqs",
    "purge_queue" => "sqs",
    "change_message_visibility" => "sqs",
    // sns
    "create_topic" => "sns",
    "list_topics" => "sns",
    "create_platform_endpoint" => "sns",
    // lambda
    "invoke_async" => "lambda",
    "list_functions" => "lambda",
    "create_function" => "lambda",
    "update_function_code" => "lambda",
    "update_function_configuration" => "lambda",
    // secretsmanager
    "get_secret_value" => "secretsmanager",
    "put_secret_value" => "secretsmanager",
    "create_secret" => "secretsmanager",
    "describe_secret" => "secretsmanager",
    "rotate_secret" => "secretsmanager",
    // ssm
    "get_parameter" => "ssm",
    "get_parameters" => "ssm",
    "get_parameters_by_path" => "ssm",
    "put_parameter" => "ssm",
    "send_command" => "ssm",
    // kms
    "generate_data_key" => "kms",
    "create_key" => "kms",
    "describe_key" => "kms",
    // sts
    "assume_role" => "sts",
    "get_caller_identity" => "sts",
    "get_session_token" => "sts",
    // iam
    "create_role" => "iam",
    "attach_role_policy" => "iam",
    "put_role_policy" => "iam",
    "create_access_key" => "iam",
    // cloudwatch and logs
    "put_metric_data" => "cloudwatch",
    "put_metric_alarm" => "cloudwatch",
    "get_metric_statistics" => "cloudwatch",
    "put_log_events" => "logs",
    "create_log_group" => "logs",
    "create_log_stream" => "logs",
    "filter_log_events" => "logs",
    // kinesis
    "put_record" => "kinesis",
    "put_records" => "kinesis",
    "get_records" => "kinesis",
    "get_shard_iterator" => "kinesis",
    // rds
    "describe_db_instances" => "rds",
    "create_db_snapshot" => "rds",
    "reboot_db_instance" => "rds",
    // ecs
    "run_task" => "ecs",
    "describe_services" => "ecs",
    "update_service" => "ecs",
    "describe_tasks" => "ecs",
    // eventbridge and step functions
    "put_events" => "events",
    "start_execution" => "states",
    "describe_execution" => "states",
};

/// SDK convenience methods whose IAM action differs from the method name.
static ACTION_OVERRIDES: phf::Map<&'static str, &'static str> = phf_map! {
    "upload_file" => "PutObject",
    "upload_fileobj" => "PutObject",
    "download_file" => "GetObject",
    "download_fileobj" => "GetObject",
    "head_object" => "GetObject",
    "list_objects" => "ListBucket",
    "list_objects_v2" => "ListBucket",
    "invoke_async" => "InvokeFunction",
    "invoke" => "InvokeFunction",
};

/// Service identifiers that are safe to take from a bare receiver name.
static DISTINCTIVE_SERVICES: phf::Set<&'static str> = phf_set! {
    "ec2", "s3", "dynamodb", "sqs", "sns", "secretsmanager", "ssm", "kms", "sts",
    "iam", "kinesis", "rds", "ecs", "ecr", "cloudwatch", "cloudformation",
    "route53", "elbv2", "autoscaling", "athena", "firehose",
};

/// Receiver spellings that name a service indirectly.
static SERVICE_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "dynamo" => "dynamodb",
    "ddb" => "dynamodb",
    "secrets" => "secretsmanager",
    "sfn" => "states",
    "stepfunctions" => "states",
    "cw" => "cloudwatch",
    "lambda_" => "lambda",
    "lam" => "lambda",
    "eventbridge" => "events",
    "logs" => "logs",
    "lambda" => "lambda",
    "events" => "events",
    "states" => "states",
    "ses" => "ses",
    "glue" => "glue",
};

/// Client methods that are not API operations.
static NON_API_METHODS: phf::Set<&'static str> = phf_set! {
    "close", "get_waiter", "can_paginate", "meta", "exceptions",
    "generate_presigned_url", "generate_presigned_post", "append", "get",
    "items", "keys", "values", "format", "join", "split", "strip", "info",
    "debug", "warning", "error",
};

const CLIENT_SUFFIXES: &[&str] = &["_client", "client", "_resource", "resource", "_conn", "_svc", "svc", "_service"];

/// Map an SDK call to a permission.
///
/// `receiver` is the call target as written (`client`, `self.s3`),
/// `method` is the method name in any casing (`describe_instances`,
/// `describeInstances`, `DescribeInstancesWithContext`), `bound_service`
/// is the service the receiver is known to be a client for.
pub fn permission_for_call(
    receiver: &str,
    method: &str,
    bound_service: Option<&str>,
) -> Option<Permission> {
    let operation = to_snake_case(method);
    let operation = operation
        .strip_suffix("_with_context")
        .unwrap_or(&operation)
        .to_string();

    if operation.is_empty() || operation.starts_with('_') || NON_API_METHODS.contains(operation.as_str()) {
        return None;
    }

    let service = bound_service
        .map(|s| s.to_string())
        .or_else(|| service_from_receiver(receiver))
        .or_else(|| OPERATION_SERVICES.get(operation.as_str()).map(|s| s.to_string()))?;

    Some(Permission {
        service,
        action: action_name(&operation),
    })
}

/// Service a receiver name refers to, if it clearly names one.
pub fn service_from_receiver(receiver: &str) -> Option<String> {
    let last = receiver.rsplit('.').next().unwrap_or(receiver).to_lowercase();
    if last.is_empty() {
        return None;
    }

    let mut stripped = last.as_str();
    let mut had_suffix = false;
    for suffix in CLIENT_SUFFIXES {
        if let Some(s) = stripped.strip_suffix(suffix) {
            stripped = s.trim_end_matches('_');
            had_suffix = true;
            break;
        }
    }
    if stripped.is_empty() {
        return None;
    }

    if DISTINCTIVE_SERVICES.contains(stripped) {
        return Some(stripped.to_string());
    }
    if had_suffix {
        if let Some(alias) = SERVICE_ALIASES.get(stripped) {
            return Some(alias.to_string());
        }
    } else if let Some(alias) = SERVICE_ALIASES.get(stripped) {
        // Bare common words (logs, events) are too ambiguous without a suffix
        if !matches!(stripped, "logs" | "events" | "states" | "lambda" | "glue") {
            return Some(alias.to_string());
        }
    }
    None
}

/// IAM action name for an operation (`describe_instances` -> `DescribeInstances`).
pub fn action_name(operation: &str) -> String {
    if let Some(action) = ACTION_OVERRIDES.get(operation) {
        return action.to_string();
    }
    operation
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Convert camelCase or PascalCase to snake_case; snake_case passes through.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_client_uses_operation_table() {
        let p = permission_for_call("client", "describe_instances", None).unwrap();
        assert_eq!(p.name(), "ec2:DescribeInstances");
    }

    #[test]
    fn test_bound_service_wins() {
        let p = permission_for_call("table", "query", Some("dynamodb")).unwrap();
        assert_eq!(p.name(), "dynamodb:Query");
        // Generic operation with no binding is not a permission
        assert!(permission_for_call("db", "query", None).is_none());
    }

    #[test]
    fn test_receiver_names_service() {
        assert_eq!(service_from_receiver("self.s3_client").as_deref(), Some("s3"));
        assert_eq!(service_from_receiver("dynamoDbClient").as_deref(), Some("dynamodb"));
        assert_eq!(service_from_receiver("sqs").as_deref(), Some("sqs"));
        assert_eq!(service_from_receiver("logs_client").as_deref(), Some("logs"));
        assert_eq!(service_from_receiver("logs"), None);
        assert_eq!(service_from_receiver("client"), None);
    }

    #[test]
    fn test_non_api_methods_are_ignored() {
        assert!(permission_for_call("s3_client", "close", None).is_none());
        assert!(permission_for_call("events", "append", None).is_none());
    }

    #[test]
    fn test_casing_variants() {
        let js = permission_for_call("ec2", "describeInstances", None).unwrap();
        assert_eq!(js.name(), "ec2:DescribeInstances");
        let go = permission_for_call("svc", "GetObjectWithContext", None).unwrap();
        assert_eq!(go.name(), "s3:GetObject");
    }

    #[test]
    fn test_action_overrides() {
        let p = permission_for_call("s3", "upload_file", None).unwrap();
        assert_eq!(p.name(), "s3:PutObject");
        let p = permission_for_call("bucket_client", "list_objects_v2", Some("s3")).unwrap();
        assert_eq!(p.name(), "s3:ListBucket");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("describeInstances"), "describe_instances");
        assert_eq!(to_snake_case("DescribeInstances"), "describe_instances");
        assert_eq!(to_snake_case("describe_instances"), "describe_instances");
        assert_eq!(to_snake_case("ListObjectsV2"), "list_objects_v2");
    }
}
