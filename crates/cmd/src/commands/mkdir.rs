use anyhow::Result;

use crate::common::StoreContext;
use diagnostics::log_info;

pub async fn mkdir_command(ctx: &StoreContext, path: &str) -> Result<()> {
    let fs = ctx.open_fs().await?;
    let (parent, name) = fs.resolve_parent(path).await?;
    let dir = parent.mkdir(&name).await?;

    log_info!("Directory created: {path} ({id})", path: path, id: dir.id().as_i64());
    Ok(())
}
