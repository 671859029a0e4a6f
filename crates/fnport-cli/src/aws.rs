use anyhow::{anyhow, Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use fnport_core::{FunctionDescriptor, FunctionService};
use tokio::runtime::Runtime;
use tracing::debug;

/// `FunctionService` backed by the Lambda API. Async SDK calls are driven
/// to completion on a private runtime so the pipelines stay blocking.
pub(crate) struct LambdaService {
    runtime: Runtime,
    client: aws_sdk_lambda::Client,
    region: String,
}

impl LambdaService {
    pub(crate) fn connect(region: Option<&str>, profile: Option<&str>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let config = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region.to_string()));
            }
            if let Some(profile) = profile {
                loader = loader.profile_name(profile);
            }
            loader.load().await
        });
        let region = config
            .region()
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("no AWS region configured (pass --region or set AWS_REGION)"))?;
        debug!(region = %region, "loaded AWS configuration");
        Ok(Self {
            runtime,
            client: aws_sdk_lambda::Client::new(&config),
            region,
        })
    }
}

impl FunctionService for LambdaService {
    fn describe_function(&self, name_or_arn: &str) -> Result<FunctionDescriptor> {
        let output = self
            .runtime
            .block_on(self.client.get_function().function_name(name_or_arn).send())
            .map_err(|err| anyhow!("GetFunction {name_or_arn}: {}", DisplayErrorContext(&err)))?;
        let configuration = output
            .configuration()
            .ok_or_else(|| anyhow!("GetFunction {name_or_arn} returned no configuration"))?;
        let name = configuration.function_name().unwrap_or(name_or_arn);
        let arn = configuration.function_arn().unwrap_or(name_or_arn);
        let handler = configuration.handler().unwrap_or_default();
        let runtime = configuration
            .runtime()
            .map(|runtime| runtime.as_str().to_string())
            .unwrap_or_default();
        Ok(FunctionDescriptor::new(
            name,
            arn,
            handler,
            runtime,
            self.region.clone(),
        ))
    }

    fn code_location(&self, arn: &str) -> Result<String> {
        let output = self
            .runtime
            .block_on(self.client.get_function().function_name(arn).send())
            .map_err(|err| anyhow!("GetFunction {arn}: {}", DisplayErrorContext(&err)))?;
        output
            .code()
            .and_then(|code| code.location())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{arn} has no downloadable code package"))
    }

    fn update_function_code(&self, function_name: &str, archive: &[u8]) -> Result<()> {
        self.runtime
            .block_on(
                self.client
                    .update_function_code()
                    .function_name(function_name)
                    .zip_file(Blob::new(archive.to_vec()))
                    .send(),
            )
            .map_err(|err| {
                anyhow!(
                    "UpdateFunctionCode {function_name}: {}",
                    DisplayErrorContext(&err)
                )
            })?;
        debug!(function = function_name, bytes = archive.len(), "code update accepted");
        Ok(())
    }
}
