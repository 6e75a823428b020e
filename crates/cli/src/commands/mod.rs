//! Subcommand implementations.

pub mod ci;
pub mod fixtures;
pub mod jobs;
pub mod media;

use tokio_util::sync::CancellationToken;

use crate::args::Command;
use crate::config::Config;
use crate::diagnose;
use crate::exit::Exit;
use crate::output::Output;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: Config,
    pub out: Output,
    pub cancel: CancellationToken,
}

pub async fn run(command: Command, ctx: &Context) -> anyhow::Result<Exit> {
    match command {
        Command::Submit(input) => jobs::submit(ctx, &input).await,
        Command::Status { job } => jobs::status(ctx, &job).await,
        Command::Watch(args) => jobs::watch(ctx, &args.job, &args.options, None).await,
        Command::Run { input, watch } => jobs::run(ctx, &input, &watch).await,
        Command::Download { job, out } => jobs::download(ctx, &job, &out).await,
        Command::Probe(args) => jobs::probe(ctx, &args).await,
        Command::Media { command } => media::media(ctx, command).await,
        Command::Store { command } => media::store(ctx, command).await,
        Command::Ci { command } => ci::run(ctx, command).await,
        Command::Fixtures { command } => fixtures::run(ctx, command).await,
        Command::Diagnose => {
            let report = diagnose::run(&ctx.config).await;
            ctx.out.emit(&report, || report.lines())?;
            Ok(if report.all_passed() {
                Exit::Success
            } else {
                Exit::Error
            })
        }
    }
}
