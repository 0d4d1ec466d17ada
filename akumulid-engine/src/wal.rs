//! Write-ahead log configuration. The WAL itself is maintained by the engine;
//! this crate only validates the settings that reach it.

use std::path::PathBuf;

use crate::error::WalConfigError;

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Bundle describing the engine's write-ahead log. Zero/empty values mean
/// WAL is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalSettings {
    /// Directory the WAL volumes live in.
    pub path: PathBuf,
    /// Number of WAL volumes, or 0 to disable the WAL.
    pub nvolumes: u32,
    /// Size in bytes of each volume.
    pub volume_size: u64,
}

impl WalSettings {
    /// WAL disabled.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            nvolumes: 0,
            volume_size: 0,
        }
    }

    /// `true` if these settings amount to "WAL disabled".
    pub fn is_disabled(&self) -> bool {
        self.nvolumes == 0
    }

    /// Validates the bounds documented in the config file section: `path`
    /// must exist, `nvolumes` in `{0} ∪ [2, 1000]`, `volume_size` in
    /// `[1 MiB, 1 GiB]`.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.is_disabled() {
            return Ok(());
        }

        if self.nvolumes < 2 || self.nvolumes > 1000 {
            return Err(WalConfigError::NVolumes(self.nvolumes));
        }

        if self.volume_size < MIB || self.volume_size > GIB {
            return Err(WalConfigError::VolumeSize(self.volume_size));
        }

        if !self.path.exists() {
            return Err(WalConfigError::PathMissing(self.path.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_is_always_valid() {
        assert!(WalSettings::disabled().validate().is_ok());
    }

    #[test]
    fn nvolumes_below_two_is_rejected() {
        let wal = WalSettings {
            path: std::env::temp_dir(),
            nvolumes: 1,
            volume_size: MIB,
        };
        assert!(matches!(
            wal.validate(),
            Err(WalConfigError::NVolumes(1))
        ));
    }

    #[test]
    fn volume_size_out_of_bounds_is_rejected() {
        let wal = WalSettings {
            path: std::env::temp_dir(),
            nvolumes: 4,
            volume_size: MIB / 2,
        };
        assert!(matches!(
            wal.validate(),
            Err(WalConfigError::VolumeSize(_))
        ));
    }

    #[test]
    fn missing_path_is_rejected() {
        let wal = WalSettings {
            path: PathBuf::from("/nonexistent/path/for/test"),
            nvolumes: 4,
            volume_size: MIB,
        };
        assert!(matches!(
            wal.validate(),
            Err(WalConfigError::PathMissing(_))
        ));
    }

    #[test]
    fn in_bounds_settings_are_accepted() {
        let wal = WalSettings {
            path: std::env::temp_dir(),
            nvolumes: 4,
            volume_size: GIB,
        };
        assert!(wal.validate().is_ok());
    }
}
