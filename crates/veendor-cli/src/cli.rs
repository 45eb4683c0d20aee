use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const VEENDOR_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const VEENDOR_BEFORE_HELP: &str = concat!(
    "veendor ",
    env!("CARGO_PKG_VERSION"),
    " – prebuilt node_modules bundles keyed by dependency fingerprint\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  install          Pull a matching bundle, or build one with npm and publish it.\n",
    "  calc             Print the dependency fingerprint of the current project.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "veendor",
    author,
    version,
    disable_help_subcommand = true,
    before_help = VEENDOR_BEFORE_HELP,
    help_template = VEENDOR_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct VeendorCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
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
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Install node_modules from a bundle, falling back to npm and publishing the result"
    )]
    Install(InstallArgs),
    #[command(about = "Print the dependency fingerprint of the project")]
    Calc(ConfigArgs),
}

impl CommandGroupCli {
    pub fn name(&self) -> &'static str {
        match self {
            CommandGroupCli::Install(_) => "install",
            CommandGroupCli::Calc(_) => "calc",
        }
    }
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[arg(
        short,
        long,
        help = "Remove an existing node_modules instead of refusing to run"
    )]
    pub force: bool,
    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Config file to use instead of .veendor.json"
    )]
    pub config: Option<PathBuf>,
}
