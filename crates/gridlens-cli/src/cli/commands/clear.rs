use super::{exit_codes, stores};
use crate::cli::args::ClearArgs;
use gridlens_core::config::GridlensConfig;
use gridlens_core::errors::StoreError;

pub fn run(args: ClearArgs, cfg: &GridlensConfig) -> anyhow::Result<i32> {
    let store = stores(cfg).build();
    let root = store.cache_root().to_path_buf();

    if !root.exists() {
        println!("nothing to clear at {}", root.display());
        return Ok(exit_codes::OK);
    }

    if args.purge {
        store.purge()?;
        println!("purged {}", root.display());
        return Ok(exit_codes::OK);
    }

    match store.clear() {
        Ok(()) => {
            println!("removed {}", root.display());
            Ok(exit_codes::OK)
        }
        Err(e @ StoreError::Io { .. }) => {
            eprintln!("error: {e}");
            eprintln!("the cache still holds artifacts; pass --purge to delete them");
            Ok(exit_codes::TASK_FAILED)
        }
        Err(e) => Err(e.into()),
    }
}
