use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use fnport_domain::FunctionDescriptor;

use crate::build::{BuildInvoker, SamCliBuilder};
use crate::config::Config;
use crate::fetch::{ArtifactFetcher, HttpFetcher};
use crate::workspace::{CleanupRegistry, SystemTempProvisioner, TempProvisioner};

/// Remote function API used by the pipelines. No call is retried here.
pub trait FunctionService: Send + Sync {
    /// Look up handler, runtime and ARN for a function name or ARN.
    fn describe_function(&self, name_or_arn: &str) -> Result<FunctionDescriptor>;
    /// Short-lived URL serving the deployed code archive.
    fn code_location(&self, arn: &str) -> Result<String>;
    fn update_function_code(&self, function_name: &str, archive: &[u8]) -> Result<()>;
}

/// Asked before building when the expected handler file is absent.
pub trait HandlerConfirm: Send + Sync {
    fn confirm_missing_handler(&self, function: &FunctionDescriptor, expected: &Path) -> bool;
}

/// Always proceeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl HandlerConfirm for AssumeYes {
    fn confirm_missing_handler(&self, _function: &FunctionDescriptor, _expected: &Path) -> bool {
        true
    }
}

/// Convenience step run after a successful import (open an editor, add a
/// debug entry, ...). Failures never undo the import.
pub trait ImportFollowUp: Send + Sync {
    fn name(&self) -> &str;
    fn after_import(
        &self,
        function: &FunctionDescriptor,
        destination: &Path,
        handler_path: &Path,
    ) -> Result<()>;
}

pub trait Effects: Send + Sync {
    fn functions(&self) -> &dyn FunctionService;
    fn fetcher(&self) -> &dyn ArtifactFetcher;
    fn temp(&self) -> &dyn TempProvisioner;
    fn cleanup(&self) -> &CleanupRegistry;
    fn builder(&self) -> &dyn BuildInvoker;
}

/// Effects assembled from explicit collaborators.
pub struct PipelineEffects {
    functions: Arc<dyn FunctionService>,
    fetcher: Arc<dyn ArtifactFetcher>,
    temp: Arc<dyn TempProvisioner>,
    cleanup: Arc<CleanupRegistry>,
    builder: Arc<dyn BuildInvoker>,
}

impl PipelineEffects {
    pub fn new(
        functions: Arc<dyn FunctionService>,
        fetcher: Arc<dyn ArtifactFetcher>,
        temp: Arc<dyn TempProvisioner>,
        cleanup: Arc<CleanupRegistry>,
        builder: Arc<dyn BuildInvoker>,
    ) -> Self {
        Self {
            functions,
            fetcher,
            temp,
            cleanup,
            builder,
        }
    }

    /// System fetcher, temp provisioner and `sam` builder around the given
    /// function service and cleanup registry.
    pub fn system(
        config: &Config,
        functions: Arc<dyn FunctionService>,
        cleanup: Arc<CleanupRegistry>,
    ) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.network)?;
        Ok(Self::new(
            functions,
            Arc::new(fetcher),
            Arc::new(SystemTempProvisioner::new(config.temp.root.clone())),
            cleanup,
            Arc::new(SamCliBuilder::new(config.build.program.clone())),
        ))
    }
}

impl Effects for PipelineEffects {
    fn functions(&self) -> &dyn FunctionService {
        self.functions.as_ref()
    }

    fn fetcher(&self) -> &dyn ArtifactFetcher {
        self.fetcher.as_ref()
    }

    fn temp(&self) -> &dyn TempProvisioner {
        self.temp.as_ref()
    }

    fn cleanup(&self) -> &CleanupRegistry {
        self.cleanup.as_ref()
    }

    fn builder(&self) -> &dyn BuildInvoker {
        self.builder.as_ref()
    }
}
