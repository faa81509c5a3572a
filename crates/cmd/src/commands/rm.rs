use anyhow::Result;

use crate::common::StoreContext;
use diagnostics::log_info;

pub async fn rm_command(ctx: &StoreContext, path: &str) -> Result<()> {
    let fs = ctx.open_fs().await?;
    let (parent, name) = fs.resolve_parent(path).await?;
    parent.remove(&name).await?;

    log_info!("Removed {path}", path: path);
    Ok(())
}
