// SPDX-License-Identifier: Apache-2.0

use crate::{BucketClient, GatewayErrorCode};
use serde::Serialize;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketPermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketReport {
    pub bucket_name: String,
    pub exists: bool,
    pub permissions: BucketPermissions,
    pub message: String,
}

impl BucketReport {
    fn unreachable(bucket: &str, message: String) -> Self {
        Self {
            bucket_name: bucket.to_string(),
            exists: false,
            permissions: BucketPermissions::default(),
            message,
        }
    }
}

/// Live permission probe of one bucket: existence, then read (list), write
/// (marker put) and delete (marker delete). Permission-denied marks the
/// capability false and keeps probing; any other failure ends this bucket's
/// check with a descriptive message.
#[must_use]
pub fn check_bucket(client: &BucketClient) -> BucketReport {
    let mut report = BucketReport {
        bucket_name: client.bucket.clone(),
        exists: false,
        permissions: BucketPermissions::default(),
        message: String::new(),
    };

    if let Err(err) = client.head_bucket() {
        report.message = match err.code {
            GatewayErrorCode::NotFound => "bucket not found".to_string(),
            GatewayErrorCode::PermissionDenied => "access denied; cannot view bucket".to_string(),
            _ => format!("connection error: {}", err.message),
        };
        return report;
    }
    report.exists = true;

    match client.list_probe() {
        Ok(()) => report.permissions.read = true,
        Err(err) if err.code == GatewayErrorCode::PermissionDenied => {}
        Err(err) => {
            report.message = format!("read probe failed: {err}");
            return report;
        }
    }

    let marker = marker_key();
    match client.put_bytes(&marker, b"verify") {
        Ok(()) => {
            report.permissions.write = true;
            match client.delete(&marker) {
                Ok(()) => report.permissions.delete = true,
                Err(err) if err.code == GatewayErrorCode::PermissionDenied => {}
                Err(err) => {
                    let _ = client.delete(&marker);
                    report.message = format!("delete probe failed: {err}");
                    return report;
                }
            }
            // The marker must never outlive the check.
            let _ = client.delete(&marker);
        }
        Err(err) if err.code == GatewayErrorCode::PermissionDenied => {}
        Err(err) => {
            report.message = format!("write probe failed: {err}");
            return report;
        }
    }

    report.message = summarize(&report.permissions);
    report
}

/// Checks both buckets concurrently; one bucket's failure never hides the
/// other's report.
#[must_use]
pub fn verify_access(production: &BucketClient, staging: &BucketClient) -> Vec<BucketReport> {
    thread::scope(|scope| {
        let production_check = scope.spawn(|| check_bucket(production));
        let staging_check = scope.spawn(|| check_bucket(staging));
        vec![
            production_check.join().unwrap_or_else(|_| {
                BucketReport::unreachable(&production.bucket, "verification thread panicked".to_string())
            }),
            staging_check.join().unwrap_or_else(|_| {
                BucketReport::unreachable(&staging.bucket, "verification thread panicked".to_string())
            }),
        ]
    })
}

fn summarize(permissions: &BucketPermissions) -> String {
    if permissions.read && permissions.write && permissions.delete {
        return "full access verified".to_string();
    }
    let granted: Vec<&str> = [
        ("read", permissions.read),
        ("write", permissions.write),
        ("delete", permissions.delete),
    ]
    .iter()
    .filter_map(|(name, ok)| ok.then_some(*name))
    .collect();
    if granted.is_empty() {
        "no object permissions".to_string()
    } else {
        format!("partial access: [{}]", granted.join(", "))
    }
}

fn marker_key() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("dataledger-verify-{}-{nanos}.tmp", std::process::id())
}
