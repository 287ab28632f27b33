//! Push command

use std::path::Path;

use anyhow::Result;
use chartstash_core::{ChartArchive, PushOptions};

use crate::Context;

/// Index the chart archive at `chart` in `repo` and upload it.
pub async fn push(ctx: &Context, chart: &Path, repo: &str, options: &PushOptions) -> Result<()> {
    let mut repo = ctx.repository(repo)?;
    let entry = ctx.sync().push_chart(&mut repo, chart, options).await?;

    println!(
        "Pushed {}-{} to {}",
        entry.name(),
        entry.version(),
        repo.name().unwrap_or(repo.base_url())
    );
    for url in &entry.urls {
        tracing::debug!(url = %url, "indexed download url");
    }
    Ok(())
}

/// Upload the archive at `chart` for a version `repo` already indexes.
pub async fn upload(ctx: &Context, chart: &Path, repo: &str) -> Result<()> {
    let mut repo = ctx.repository(repo)?;
    let archive = ChartArchive::load(chart).await?;
    let path = ctx.sync().upload_archive(&mut repo, archive).await?;

    println!("Uploaded {path}");
    Ok(())
}
