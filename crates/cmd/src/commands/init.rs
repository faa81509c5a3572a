use std::io::Write;

use anyhow::Result;

use crate::common::StoreContext;

/// Resolve the root, creating it on first use, and report its id.
pub async fn init_command(ctx: &StoreContext, out: &mut impl Write) -> Result<()> {
    let store_path = ctx.store_path()?;
    let fs = ctx.open_fs().await?;
    let root = fs.root().await?;

    writeln!(out, "Root directory {} in {}", root.id(), store_path.display())?;
    Ok(())
}
