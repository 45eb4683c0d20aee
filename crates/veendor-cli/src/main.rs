use std::io::{self, IsTerminal};
use std::path::Path;

use clap::Parser;
use color_eyre::Result;
use serde_json::{json, Value};
use veendor_core::{
    calc_fingerprint, error_outcome, format_status_message, install_project, system_context,
    CommandStatus, ExecutionOutcome, GlobalOptions, InstallRequest, Progress,
};

mod cli;
mod style;

use cli::{CommandGroupCli, VeendorCli};
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = VeendorCli::parse();
    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        no_color: cli.no_color,
    };
    init_tracing(&global);

    let project_dir = std::env::current_dir()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(execute(&global, &project_dir, &cli.command));
    let code = emit_output(&global, &cli.command, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(global: &GlobalOptions) {
    let level = if global.trace {
        "trace"
    } else if global.quiet {
        "warn"
    } else {
        match global.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("veendor={level},veendor_core={level},veendor_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn execute(
    global: &GlobalOptions,
    project_dir: &Path,
    command: &CommandGroupCli,
) -> ExecutionOutcome {
    match command {
        CommandGroupCli::Install(args) => {
            let progress = if global.quiet || global.json {
                Progress::silent()
            } else {
                Progress::from_env()
            };
            let config = args.config.config.as_deref();
            match system_context(project_dir, config, progress) {
                Ok(ctx) => install_project(&ctx, InstallRequest { force: args.force }).await,
                Err(err) => error_outcome(&err),
            }
        }
        CommandGroupCli::Calc(args) => match calc_fingerprint(project_dir, args.config.as_deref()) {
            Ok(hash) => ExecutionOutcome::success(hash.clone(), json!({ "hash": hash })),
            Err(err) => error_outcome(&err),
        },
    }
}

fn emit_output(
    global: &GlobalOptions,
    command: &CommandGroupCli,
    outcome: &ExecutionOutcome,
) -> Result<i32> {
    let code = outcome.exit_code();
    let name = command.name();

    if global.json {
        let payload = outcome.to_json(name);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if outcome.status != CommandStatus::Ok {
        let style = Style::new(global.no_color, io::stderr().is_terminal());
        let message = format_status_message(name, &outcome.message);
        eprintln!("{}", style.status(&outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!("{}", style.hint(hint));
        }
        return Ok(code);
    }

    match command {
        // Scripts consume this output; keep it to the bare fingerprint.
        CommandGroupCli::Calc(_) => println!("{}", outcome.message),
        CommandGroupCli::Install(_) if !global.quiet => {
            let style = Style::new(global.no_color, io::stdout().is_terminal());
            let message = format_status_message(name, &outcome.message);
            println!("{}", style.status(&outcome.status, &message));
            if let Some(pushed) = pushed_from_details(&outcome.details) {
                println!("veendor ▸ published to {}", pushed.join(", "));
            }
        }
        CommandGroupCli::Install(_) => {}
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn pushed_from_details(details: &Value) -> Option<Vec<&str>> {
    let pushed: Vec<&str> = details
        .get("pushed")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    (!pushed.is_empty()).then_some(pushed)
}
