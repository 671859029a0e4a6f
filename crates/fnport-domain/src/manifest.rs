use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::function::FunctionDescriptor;

pub const MANIFEST_FILE_NAME: &str = "template.json";
/// Logical id of the single resource; the build tool names its output
/// subdirectory after it.
pub const MANIFEST_RESOURCE_NAME: &str = "FnportFunction";

const FUNCTION_RESOURCE_TYPE: &str = "AWS::Serverless::Function";

/// Minimal single-function template consumed by the external build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildManifest {
    pub resource_name: String,
    pub handler: String,
    pub runtime: String,
    pub code_uri: PathBuf,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceProperties<'a> {
    handler: &'a str,
    code_uri: String,
    runtime: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Resource<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    properties: ResourceProperties<'a>,
}

impl BuildManifest {
    pub fn for_function(descriptor: &FunctionDescriptor, source_dir: &Path) -> Self {
        Self {
            resource_name: MANIFEST_RESOURCE_NAME.to_string(),
            handler: descriptor.handler.clone(),
            runtime: descriptor.runtime.clone(),
            code_uri: source_dir.to_path_buf(),
        }
    }

    pub fn to_json(&self) -> Result<Value> {
        let resource = Resource {
            kind: FUNCTION_RESOURCE_TYPE,
            properties: ResourceProperties {
                handler: &self.handler,
                code_uri: self.code_uri.display().to_string(),
                runtime: &self.runtime,
            },
        };
        let mut resources = serde_json::Map::new();
        resources.insert(self.resource_name.clone(), serde_json::to_value(resource)?);
        let mut root = serde_json::Map::new();
        root.insert(
            "AWSTemplateFormatVersion".into(),
            Value::String("2010-09-09".into()),
        );
        root.insert(
            "Transform".into(),
            Value::String("AWS::Serverless-2016-10-31".into()),
        );
        root.insert("Resources".into(), Value::Object(resources));
        Ok(Value::Object(root))
    }

    /// Writes the manifest as `template.json` inside `dir` and returns its path.
    pub fn write_into(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let body = serde_json::to_string_pretty(&self.to_json()?)?;
        fs::write(&path, body)
            .with_context(|| format!("failed to write build manifest {}", path.display()))?;
        Ok(path)
    }
}
