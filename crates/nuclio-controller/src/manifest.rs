// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Function manifest: the YAML file listing the functions to manage.
//!
//! ```yaml
//! functions:
//!   - name: echo
//!     runtime: python:3.12
//!     code: |
//!       def handler(context, event):
//!           return event.body
//!     config: |
//!       spec:
//!         minReplicas: 1
//!     env:
//!       - name: LOG_LEVEL
//!         value: debug
//!     invoke:
//!       maxInFlight: 4
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compiler::RawFunctionConfig;
use crate::error::{Error, Result};

/// Parsed manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub functions: Vec<RawFunctionConfig>,
}

impl Manifest {
    /// Load a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let manifest = Self::from_yaml(&text)?;
        info!(
            path = %path.display(),
            functions = manifest.functions.len(),
            "Loaded function manifest"
        );
        Ok(manifest)
    }

    /// Parse manifest text. Function names must be unique.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let manifest: Manifest = serde_yaml::from_str(text)?;

        let mut seen = BTreeSet::new();
        for function in &manifest.functions {
            let name = function.name.trim();
            if !name.is_empty() && !seen.insert(name) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate function name in manifest: {}",
                    name
                )));
            }
        }
        Ok(manifest)
    }
}
