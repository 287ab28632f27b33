//! chartstash CLI

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use chartstash_cli::{Cli, Commands, Context, Settings, cmd, logging};
use chartstash_core::{ErrorKind, PushOptions, Stage, SyncError};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli);
    logging::init(settings.debug);

    let ctx = Context::new(settings);
    match run(&ctx, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Init { repo } => cmd::init::init(ctx, &repo).await,
        Commands::Push {
            chart,
            repo,
            force,
            retry,
            public,
            public_url,
            upload_only,
        } => {
            if upload_only {
                return cmd::push::upload(ctx, &chart, &repo).await;
            }
            let options = PushOptions {
                force,
                retry,
                public,
                public_url,
            };
            cmd::push::push(ctx, &chart, &repo, &options).await
        }
        Commands::Delete {
            name,
            repo,
            version,
            retry,
            archive_only,
        } => match version {
            Some(version) if archive_only => {
                cmd::delete::delete_archive(ctx, &name, &repo, &version).await
            }
            version => cmd::delete::delete(ctx, &name, &repo, version.as_deref(), retry).await,
        },
        Commands::Pull { args } => {
            let url = args.last().map_or("", String::as_str);
            cmd::pull::pull(ctx, url).await
        }
    }
}

fn report(err: &anyhow::Error) {
    // Library errors already embed their sources in their message.
    let mut message = err.to_string();
    for cause in err.chain().skip(1) {
        let cause = cause.to_string();
        if !message.contains(&cause) {
            message.push_str(": ");
            message.push_str(&cause);
        }
    }
    eprintln!("Error: {message}");

    let hint = err
        .chain()
        .find_map(|e| e.downcast_ref::<SyncError>())
        .and_then(hint);
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
}

fn hint(err: &SyncError) -> Option<&'static str> {
    if let SyncError::ArchiveTransfer { stage, .. } = err {
        return Some(match stage {
            Stage::Delete => {
                "index updated, archive operation failed; run delete again with --archive-only --version <version> to remove the archive"
            }
            _ => {
                "index updated, archive operation failed; run push again with --upload-only to upload the archive"
            }
        });
    }
    match err.kind() {
        ErrorKind::AlreadyIndexed => Some("chart is already indexed, use --force to replace it"),
        ErrorKind::IndexOutOfDate => {
            Some("index is out-of-date, use --retry to reload it and try again")
        }
        ErrorKind::DigestMismatch => {
            Some("the indexed entry belongs to a different build, push it with --force instead")
        }
        ErrorKind::StillIndexed => Some("remove the version from the index with delete --version"),
        ErrorKind::RepoNotFound => {
            Some("add the repository with `helm repo add` or pass its URL instead")
        }
        ErrorKind::Contention => Some("the index is under heavy concurrent writes, try again later"),
        _ => None,
    }
}
