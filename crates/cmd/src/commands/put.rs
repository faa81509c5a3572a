use std::io::Write;
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::common::StoreContext;

/// Copy a host file into a new file at `dest`.
pub async fn put_command(
    ctx: &StoreContext,
    source: &Path,
    dest: &str,
    out: &mut impl Write,
) -> Result<()> {
    let content = tokio::fs::read(source)
        .await
        .map_err(|e| anyhow!("Failed to read source file '{}': {}", source.display(), e))?;

    let fs = ctx.open_fs().await?;
    let (parent, name) = fs.resolve_parent(dest).await?;
    let file = parent.create(&name).await?;
    file.write_all(0, &content).await?;
    file.flush().await?;

    writeln!(out, "Copied {} bytes to {}", content.len(), dest)?;
    Ok(())
}
