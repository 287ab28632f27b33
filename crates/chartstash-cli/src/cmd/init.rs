//! Init command

use anyhow::Result;

use crate::Context;

/// Create an empty index at `repo` unless one already exists.
pub async fn init(ctx: &Context, repo: &str) -> Result<()> {
    let mut repo = ctx.repository(repo)?;
    if ctx.sync().create(&mut repo).await? {
        println!("Initialized repository {}", repo.base_url());
    } else {
        println!("Repository {} is already initialized", repo.base_url());
    }
    Ok(())
}
