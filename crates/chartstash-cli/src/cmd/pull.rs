//! Pull command

use std::io::Write;

use anyhow::{Context as _, Result};
use chartstash_core::fetch;

use crate::Context;

/// Write the blob at `url` to stdout.
pub async fn pull(ctx: &Context, url: &str) -> Result<()> {
    let data = fetch(ctx.sync().store(), url).await?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&data)
        .and_then(|()| stdout.flush())
        .context("Failed to write to stdout")?;
    Ok(())
}
