//! Process-wide guard enforcing "at most one `DbConnection` open per path".

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::EngineError;

static OPEN_PATHS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

pub(crate) fn register(path: &Path) -> Result<(), EngineError> {
    let mut open = OPEN_PATHS.lock().expect("open-path registry poisoned");
    if !open.insert(path.to_path_buf()) {
        return Err(EngineError::AlreadyOpen(path.to_path_buf()));
    }
    Ok(())
}

pub(crate) fn unregister(path: &Path) {
    let mut open = OPEN_PATHS.lock().expect("open-path registry poisoned");
    open.remove(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_register_of_same_path_fails() {
        let path = PathBuf::from("/tmp/akumulid-engine-registry-test-unique-a");
        register(&path).unwrap();
        assert!(matches!(register(&path), Err(EngineError::AlreadyOpen(_))));
        unregister(&path);
    }

    #[test]
    fn unregister_frees_the_path_for_reuse() {
        let path = PathBuf::from("/tmp/akumulid-engine-registry-test-unique-b");
        register(&path).unwrap();
        unregister(&path);
        assert!(register(&path).is_ok());
        unregister(&path);
    }
}
