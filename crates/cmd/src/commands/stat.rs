use std::io::Write;

use anyhow::Result;

use crate::common::{StoreContext, format_mode};

pub async fn stat_command(ctx: &StoreContext, path: &str, out: &mut impl Write) -> Result<()> {
    let fs = ctx.open_fs().await?;
    let attr = fs.resolve(path).await?.attr().await;

    writeln!(out, "  Path: {path}")?;
    writeln!(out, "    Id: {}", attr.id)?;
    writeln!(out, "  Kind: {}", attr.kind)?;
    writeln!(out, "  Size: {}", attr.size)?;
    writeln!(out, "Blocks: {}", attr.blocks)?;
    writeln!(out, "  Mode: {} ({:o})", format_mode(attr.mode), attr.mode)?;
    Ok(())
}
