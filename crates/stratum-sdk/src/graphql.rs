// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GraphQL request and response documents.
//!
//! The client treats query text and variables as opaque; these types only
//! frame them the way every GraphQL server expects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SdkError};

/// A GraphQL operation ready to send as a subscribe payload or HTTP body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl GraphqlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
        }
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set one variable, serializing `value` to JSON.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Serialize) -> Result<Self> {
        self.set_variable(name, value)?;
        Ok(self)
    }

    /// Set one variable in place. Used to inject a page cursor into a
    /// prepared request.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Serialize) -> Result<()> {
        self.variables.insert(name.into(), serde_json::to_value(value)?);
        Ok(())
    }
}

/// Position of an error within the query document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlLocation {
    pub line: u32,
    pub column: u32,
}

/// One entry of a response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphqlLocation>,
    /// Field names and list indices leading to the failing field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }

    /// `extensions.code`, when the server sets one.
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

/// A `{data, errors}` response document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct GraphqlResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

impl<T> GraphqlResponse<T> {
    /// Any reported error wins over partial data.
    pub fn into_result(self) -> Result<T> {
        if !self.errors.is_empty() {
            return Err(SdkError::Server {
                errors: self.errors,
            });
        }
        self.data.ok_or_else(|| {
            SdkError::Serialization("response carried neither data nor errors".to_string())
        })
    }
}
