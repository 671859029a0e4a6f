use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use fnport_core::{
    handler_outcome, import_function_with, import_outcome, upload_from_directory,
    upload_from_unbuilt_source, upload_from_zip_file, upload_outcome, AssumeYes, CleanupRegistry,
    Config, ExecutionOutcome, FunctionDescriptor, FunctionService, HandlerConfirm, ImportFollowUp,
    PipelineEffects, UploadOptions,
};
use serde_json::json;
use tracing::debug;

use crate::aws::LambdaService;
use crate::cli::{CommandCli, FnportCli, ImportArgs, UploadCommand, UploadCommonArgs};
use crate::progress::{progress_enabled, TerminalProgress};
use crate::prompt::{LaunchEntry, OpenInEditor, TerminalConfirm};

pub(crate) fn run(cli: &FnportCli, config: &Config) -> Result<ExecutionOutcome> {
    match &cli.command {
        CommandCli::Handler(args) => Ok(handler_outcome(&args.runtime, &args.handler)),
        CommandCli::Import(args) => with_session(cli, config, |session| import(session, args)),
        CommandCli::Upload(upload) => {
            with_session(cli, config, |session| upload_code(session, upload))
        }
    }
}

/// Live collaborators for commands that talk to the function service.
struct Session {
    service: Arc<LambdaService>,
    effects: PipelineEffects,
    show_progress: bool,
}

fn with_session(
    cli: &FnportCli,
    config: &Config,
    command: impl FnOnce(&Session) -> Result<ExecutionOutcome>,
) -> Result<ExecutionOutcome> {
    let service = match LambdaService::connect(cli.region.as_deref(), cli.profile.as_deref()) {
        Ok(service) => Arc::new(service),
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                format!("{err:#}"),
                json!({
                    "reason": "aws_config_unavailable",
                    "hint": "Pass --region/--profile or configure the AWS CLI.",
                }),
            ))
        }
    };
    let cleanup = Arc::new(if config.temp.keep {
        CleanupRegistry::keeping()
    } else {
        CleanupRegistry::new()
    });
    let session = Session {
        effects: PipelineEffects::system(config, service.clone(), Arc::clone(&cleanup))?,
        service,
        show_progress: progress_enabled(config.progress.enabled, cli.quiet, cli.json),
    };
    let outcome = command(&session);
    cleanup.teardown();
    outcome
}

fn import(session: &Session, args: &ImportArgs) -> Result<ExecutionOutcome> {
    let function = match describe(session.service.as_ref(), &args.function) {
        Ok(function) => function,
        Err(outcome) => return Ok(outcome),
    };
    let destination = import_destination(args, &function)?;
    let mut follow_ups: Vec<&dyn ImportFollowUp> = Vec::new();
    if args.launch_entry {
        follow_ups.push(&LaunchEntry);
    }
    if args.open {
        follow_ups.push(&OpenInEditor);
    }
    let progress = TerminalProgress::start("Importing", session.show_progress);
    let result = import_function_with(
        &session.effects,
        &function,
        &destination,
        &progress,
        &follow_ups,
    );
    drop(progress);
    Ok(import_outcome(&result))
}

fn upload_code(session: &Session, upload: &UploadCommand) -> Result<ExecutionOutcome> {
    let (name, common) = match upload {
        UploadCommand::Zip(args) => (&args.function, &args.common),
        UploadCommand::Dir(args) => (&args.function, &args.common),
        UploadCommand::Build(args) => (&args.function, &args.common),
    };
    let function = match describe(session.service.as_ref(), name) {
        Ok(function) => function,
        Err(outcome) => return Ok(outcome),
    };
    let options = upload_options(common);
    let effects = &session.effects;
    let progress = TerminalProgress::start("Packaging", session.show_progress);
    let result = match upload {
        UploadCommand::Zip(args) => {
            upload_from_zip_file(effects, &function, &args.archive, &options, &progress)
        }
        UploadCommand::Dir(args) => {
            upload_from_directory(effects, &function, &args.directory, &options, &progress)
        }
        UploadCommand::Build(args) => {
            let terminal = TerminalConfirm {
                progress: &progress,
            };
            let confirm: &dyn HandlerConfirm = if args.yes { &AssumeYes } else { &terminal };
            upload_from_unbuilt_source(
                effects,
                confirm,
                &function,
                &args.source,
                &options,
                &progress,
            )
        }
    };
    drop(progress);
    Ok(upload_outcome(&result))
}

fn describe(
    service: &dyn FunctionService,
    name_or_arn: &str,
) -> Result<FunctionDescriptor, ExecutionOutcome> {
    match service.describe_function(name_or_arn) {
        Ok(function) => {
            debug!(
                function = %function.name,
                runtime = %function.runtime,
                handler = %function.handler,
                "resolved function"
            );
            Ok(function)
        }
        Err(err) => Err(ExecutionOutcome::failure(
            format!("failed to look up {name_or_arn}"),
            json!({
                "reason": "function_lookup_failed",
                "function": name_or_arn,
                "error": format!("{err:#}"),
                "hint": "Check the function name, region, and credentials.",
            }),
        )),
    }
}

fn import_destination(args: &ImportArgs, function: &FunctionDescriptor) -> Result<PathBuf> {
    if let Some(dest) = &args.dest {
        return Ok(dest.clone());
    }
    Ok(env::current_dir()?.join(default_dir_name(&function.name)))
}

fn default_dir_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("function")
}

fn upload_options(common: &UploadCommonArgs) -> UploadOptions {
    UploadOptions {
        dry_run: common.dry_run,
        archive_out: common.out.clone(),
    }
}
