use std::io::Write;

use anyhow::Result;
use kvfs::{Error, NodeKind};

use crate::common::{StoreContext, kind_marker};

/// List one directory: kind, size for files, name.
pub async fn list_command(ctx: &StoreContext, path: &str, out: &mut impl Write) -> Result<()> {
    let fs = ctx.open_fs().await?;
    let node = fs.resolve(path).await?;
    let dir = node.as_dir().ok_or_else(|| Error::not_a_directory(path))?;

    for entry in dir.list().await {
        let size = match entry.kind {
            NodeKind::Directory => "-".to_string(),
            NodeKind::File => dir.lookup(&entry.name).await?.attr().await.size.to_string(),
        };
        writeln!(out, "{} {:>10} {}", kind_marker(entry.kind), size, entry.name)?;
    }
    Ok(())
}
