//! Delete command

use anyhow::Result;

use crate::Context;

/// Remove `name` (one `version`, or every version) from `repo`.
pub async fn delete(
    ctx: &Context,
    name: &str,
    repo: &str,
    version: Option<&str>,
    retry: bool,
) -> Result<()> {
    let mut repo = ctx.repository(repo)?;
    let deleted = ctx.sync().remove_chart(&mut repo, name, version, retry).await?;

    let target = repo.name().unwrap_or(repo.base_url());
    match version {
        Some(version) => println!("Removed {name}-{version} from {target}"),
        None => println!("Removed all versions of {name} from {target}"),
    }
    for path in &deleted {
        println!("  deleted {path}");
    }
    Ok(())
}

/// Delete the archive of `name`-`version`, which `repo` no longer indexes.
pub async fn delete_archive(ctx: &Context, name: &str, repo: &str, version: &str) -> Result<()> {
    let mut repo = ctx.repository(repo)?;
    let path = ctx.sync().delete_archive(&mut repo, name, version).await?;

    println!("  deleted {path}");
    Ok(())
}
