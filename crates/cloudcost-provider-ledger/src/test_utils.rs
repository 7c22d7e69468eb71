//! Shared test utilities for unit tests
//!
//! Note: Integration tests (in tests/) cannot access this module because it's
//! marked with #[cfg(test)]. Integration tests have their own copy in
//! tests/common/mod.rs.

use crate::ledger::{Ledger, LineItem};
use chrono::NaiveDate;
use std::env;

// Serializes environment variable changes across tests
pub static ENV_MUTEX: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// RAII guard restoring environment variables on drop, even on panic
pub struct EnvVarGuard {
    vars: Vec<(String, Option<String>)>,
}

impl EnvVarGuard {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.push((key.to_string(), env::var(key).ok()));
        // env::set_var is unsafe since Rust 2024 due to thread-safety concerns
        unsafe {
            env::set_var(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.vars.push((key.to_string(), env::var(key).ok()));
        unsafe {
            env::remove_var(key);
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.vars.iter().rev() {
            unsafe {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Two accounts, two services, a week of January 2024 and a couple of tags
pub fn sample_ledger() -> Ledger {
    let mut ledger = Ledger::default();
    ledger.accounts.insert("111".into(), "Production".into());
    ledger.accounts.insert("222".into(), "Staging".into());

    for day in 1..=7 {
        ledger.line_items.push(
            LineItem::new(date(2024, 1, day), 10.0)
                .with_dimension("LINKED_ACCOUNT", "111")
                .with_dimension("SERVICE", "Amazon EC2")
                .with_dimension("REGION", "us-east-1")
                .with_tag("env", "prod")
                .with_tag("team", "core"),
        );
        ledger.line_items.push(
            LineItem::new(date(2024, 1, day), 1.0)
                .with_dimension("LINKED_ACCOUNT", "222")
                .with_dimension("SERVICE", "Amazon S3")
                .with_dimension("REGION", "eu-west-1")
                .with_tag("env", "dev"),
        );
    }
    ledger
}
