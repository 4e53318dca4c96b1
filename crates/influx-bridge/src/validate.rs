// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration validation.
//!
//! Both checks accumulate every problem instead of stopping at the first,
//! numbering them from 1 so the host can show the list as-is.

use crate::config::{Parameters, SettingResolver, BUCKET, FIELD_MAPPINGS, MEASUREMENT};
use crate::mapping::{GridLayout, MappingTable};
use crate::ports::{PortError, SecretResolver};

/// Check writer parameters: Url, Token, Org, Bucket.
pub fn validate_writer(params: &Parameters, secrets: &dyn SecretResolver) -> Vec<String> {
    let resolver = SettingResolver::new(params, secrets);
    let mut report = Report::default();

    report.require("Url", resolver.url());
    report.require("Token", resolver.token());
    report.require("Org", resolver.org());
    report.require("Bucket", Ok(params.get(BUCKET).to_string()));

    report.finish()
}

/// Check reader parameters: Url, Token, Org, Measurement, then at least one
/// field mapping.
pub fn validate_reader(params: &Parameters, secrets: &dyn SecretResolver) -> Vec<String> {
    let resolver = SettingResolver::new(params, secrets);
    let mut report = Report::default();

    report.require("Url", resolver.url());
    report.require("Token", resolver.token());
    report.require("Org", resolver.org());
    report.require("Measurement", Ok(params.get(MEASUREMENT).to_string()));

    match MappingTable::parse(params.get(FIELD_MAPPINGS), GridLayout::READER_FIELDS) {
        Ok(fields) if !fields.is_empty() => {}
        Ok(_) => report.push("No Fields specified."),
        Err(e) => {
            tracing::debug!(error = %e, "reader field grid rejected");
            report.push("No Fields specified.");
        }
    }

    report.finish()
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
}

impl Report {
    /// A setting that cannot be resolved counts as missing.
    fn require(&mut self, name: &str, value: Result<String, PortError>) {
        let missing = match value {
            Ok(v) => v.trim().is_empty(),
            Err(e) => {
                tracing::debug!(setting = name, error = %e, "setting did not resolve");
                true
            }
        };
        if missing {
            self.push(&format!("{} is not specified.", name));
        }
    }

    fn push(&mut self, message: &str) {
        let n = self.errors.len() + 1;
        self.errors.push(format!("Error {}: {}", n, message));
    }

    fn finish(self) -> Vec<String> {
        self.errors
    }
}
