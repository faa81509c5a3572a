use std::io::Write;

use anyhow::Result;
use kvfs::Error;

use crate::common::StoreContext;

pub async fn cat_command(ctx: &StoreContext, path: &str, out: &mut impl Write) -> Result<()> {
    let fs = ctx.open_fs().await?;
    let node = fs.resolve(path).await?;
    let file = node.as_file().ok_or_else(|| Error::not_a_file(path))?;

    let content = file.read_to_end().await?;
    diagnostics::log_debug!("Read {len} bytes from {path}", len: content.len(), path: path);

    out.write_all(&content)?;
    out.flush()?;
    Ok(())
}
