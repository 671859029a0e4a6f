use std::path::PathBuf;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand};

pub const FNPORT_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const FNPORT_BEFORE_HELP: &str = concat!(
    "fnport ",
    env!("CARGO_PKG_VERSION"),
    " – Move serverless function code between AWS and a local workspace\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  import           Download a function's deployed code into a directory.\n",
    "  upload zip       Deploy a prebuilt zip as the function's code.\n",
    "  upload dir       Zip a built directory and deploy it.\n",
    "  upload build     Run `sam build` on source, zip the output, and deploy it.\n",
    "  handler          Show which file defines a runtime/handler pair.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = FNPORT_BEFORE_HELP,
    help_template = FNPORT_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct FnportCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(long, env = "AWS_REGION", help = "AWS region of the function", global = true)]
    pub region: Option<String>,
    #[arg(long, env = "AWS_PROFILE", help = "Named AWS profile to load credentials from", global = true)]
    pub profile: Option<String>,
    #[arg(
        long,
        value_name = "DIR",
        help = "Root for temporary workspaces (overrides FNPORT_TEMP_ROOT)",
        global = true
    )]
    pub temp_root: Option<PathBuf>,
    #[arg(
        long,
        value_name = "SECS",
        value_parser = value_parser!(u64).range(1..),
        help = "Download timeout in seconds (overrides FNPORT_HTTP_TIMEOUT)",
        global = true
    )]
    pub timeout: Option<u64>,
    #[arg(
        long,
        value_name = "PROGRAM",
        help = "SAM CLI executable used by `upload build` (overrides FNPORT_SAM_CLI)",
        global = true
    )]
    pub sam_cli: Option<String>,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(
        about = "Download a deployed function's code and extract it into a directory.",
        override_usage = "fnport import <FUNCTION> [--dest DIR] [--open] [--launch-entry]"
    )]
    Import(ImportArgs),
    #[command(subcommand, about = "Package local code and replace the function's code with it.")]
    Upload(UploadCommand),
    #[command(
        about = "Print the source file that defines a handler for a runtime.",
        override_usage = "fnport handler <RUNTIME> <HANDLER>"
    )]
    Handler(HandlerArgs),
}

impl CommandCli {
    /// Name used as the prefix of status lines and JSON messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Import(_) => "import",
            Self::Upload(UploadCommand::Zip(_)) => "upload zip",
            Self::Upload(UploadCommand::Dir(_)) => "upload dir",
            Self::Upload(UploadCommand::Build(_)) => "upload build",
            Self::Handler(_) => "handler",
        }
    }
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    #[arg(value_name = "FUNCTION", help = "Function name or ARN")]
    pub function: String,
    #[arg(
        long,
        value_name = "DIR",
        help = "Directory to extract into (defaults to ./<function>)"
    )]
    pub dest: Option<PathBuf>,
    #[arg(long, help = "Open the handler file in $VISUAL/$EDITOR afterwards")]
    pub open: bool,
    #[arg(long, help = "Record a local debug entry under <dest>/.fnport/launch.json")]
    pub launch_entry: bool,
}

#[derive(Subcommand, Debug)]
pub enum UploadCommand {
    #[command(about = "Deploy an existing zip archive unchanged.")]
    Zip(UploadZipArgs),
    #[command(about = "Zip a directory as-is and deploy it.")]
    Dir(UploadDirArgs),
    #[command(about = "Build source with `sam build`, zip the function output, and deploy it.")]
    Build(UploadBuildArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UploadCommonArgs {
    #[arg(long, help = "Package without calling the update API")]
    pub dry_run: bool,
    #[arg(long, value_name = "FILE", help = "Also write the archive to FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UploadZipArgs {
    #[arg(value_name = "FUNCTION", help = "Function name or ARN")]
    pub function: String,
    #[arg(value_name = "ZIP")]
    pub archive: PathBuf,
    #[command(flatten)]
    pub common: UploadCommonArgs,
}

#[derive(Args, Debug)]
pub struct UploadDirArgs {
    #[arg(value_name = "FUNCTION", help = "Function name or ARN")]
    pub function: String,
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,
    #[command(flatten)]
    pub common: UploadCommonArgs,
}

#[derive(Args, Debug)]
pub struct UploadBuildArgs {
    #[arg(value_name = "FUNCTION", help = "Function name or ARN")]
    pub function: String,
    #[arg(value_name = "SOURCE_DIR")]
    pub source: PathBuf,
    #[arg(short, long, help = "Build even when the handler file is missing")]
    pub yes: bool,
    #[command(flatten)]
    pub common: UploadCommonArgs,
}

#[derive(Args, Debug)]
pub struct HandlerArgs {
    #[arg(value_name = "RUNTIME", help = "Runtime identifier, e.g. python3.12 or nodejs20.x")]
    pub runtime: String,
    #[arg(value_name = "HANDLER", help = "Configured handler, e.g. src.app.handler")]
    pub handler: String,
}
