//! INI config file: loading, defaults, and the size-suffix grammar used
//! by `volume_size` and friends.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use akumulid_engine::WalSettings;
use akumulid_server::{Endpoint, ServerSettings};

/// Default `volume_size`, 4 GiB.
pub const DEFAULT_VOLUME_SIZE: u64 = 4 * 1024 * 1024 * 1024;
/// Default `nvolumes`.
pub const DEFAULT_NVOLUMES: u32 = 4;
/// Volume size `--CI` substitutes in, 2 MiB.
pub const CI_VOLUME_SIZE: u64 = 2 * 1024 * 1024;

const DEFAULT_HTTP_PORT: u16 = 8181;
const DEFAULT_TCP_PORT: u16 = 8282;
const DEFAULT_UDP_PORT: u16 = 8383;
const DEFAULT_OPENTSDB_PORT: u16 = 4242;

/// Config-level failures, all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file parsed as INI, but contained a syntax error.
    #[error("malformed config: {0}")]
    Malformed(String),

    /// A required key was absent.
    #[error("missing required key {0:?}")]
    MissingKey(&'static str),

    /// A size field's value didn't match the accepted grammar.
    #[error("invalid size {0:?}: expected an integer, optionally suffixed with MB or GB")]
    InvalidSize(String),
}

/// Parses a size field: a bare integer (bytes), or an integer suffixed
/// with `MB`/`GB` (case-insensitive). `"4GB"` → `4 * 2^30`, `"256MB"` →
/// `256 * 2^20`, `"1024"` → `1024`. Anything else is an error.
pub fn parse_size(text: &str) -> Result<u64, ConfigError> {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();

    let (digits, multiplier) = if let Some(d) = lower.strip_suffix("gb") {
        (d, 1024u64 * 1024 * 1024)
    } else if let Some(d) = lower.strip_suffix("mb") {
        (d, 1024u64 * 1024)
    } else {
        (lower.as_str(), 1)
    };

    let digits = digits.trim();
    if digits.is_empty() {
        return Err(ConfigError::InvalidSize(text.to_string()));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidSize(text.to_string()))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::InvalidSize(text.to_string()))
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database data directory.
    pub path: PathBuf,
    /// Volume count the database is created with (0 = auto-expanding).
    pub nvolumes: u32,
    /// Volume size in bytes the database is created with.
    pub volume_size: u64,
    /// The separate `[WAL]` section's settings, disabled if absent.
    pub wal: WalSettings,
    /// Resolved per-protocol server settings.
    pub servers: Vec<ServerSettings>,
}

impl AppConfig {
    /// Validates `[WAL]`, disabling it (rather than aborting) on
    /// violation, per the spec's "disable with an error message"
    /// contract. Returns the disabled-with-reason message, if any.
    pub fn validate_wal(&mut self) -> Option<String> {
        match self.wal.validate() {
            Ok(()) => None,
            Err(e) => {
                self.wal.nvolumes = 0;
                let key = match e {
                    akumulid_engine::WalConfigError::NVolumes(_) => "WAL.nvolumes",
                    akumulid_engine::WalConfigError::VolumeSize(_) => "WAL.volume_size",
                    akumulid_engine::WalConfigError::PathMissing(_) => "WAL.path",
                };
                Some(format!("{key}: {e}"))
            }
        }
    }
}

fn section_get<'a>(ini: &'a ini::Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section)).and_then(|s| s.get(key))
}

fn server_settings(
    ini: &ini::Ini,
    protocol: &str,
    section: &str,
    default_port: u16,
) -> Option<ServerSettings> {
    let sect = ini.section(Some(section))?;
    let port: u16 = sect
        .get("port")
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_port);
    let bind_addr: IpAddr = sect
        .get("bind_addr")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| "0.0.0.0".parse().unwrap());
    let pool_size: i32 = sect
        .get("pool_size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    Some(ServerSettings {
        name: protocol.to_string(),
        bind_addr,
        endpoints: vec![Endpoint {
            protocol: protocol.to_string(),
            port,
        }],
        pool_size,
    })
}

/// Loads and resolves the config file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let ini = ini::Ini::load_from_file(path).map_err(|e| match e {
        ini::Error::Io(source) => ConfigError::Read {
            path: path.to_path_buf(),
            source,
        },
        ini::Error::Parse(p) => ConfigError::Malformed(p.to_string()),
    })?;

    let root = ini.general_section();
    let db_path = root
        .get("path")
        .ok_or(ConfigError::MissingKey("path"))?
        .into();

    let nvolumes: u32 = root
        .get("nvolumes")
        .map(|v| v.parse().map_err(|_| ConfigError::InvalidSize(v.to_string())))
        .transpose()?
        .unwrap_or(DEFAULT_NVOLUMES);

    let volume_size = root
        .get("volume_size")
        .map(parse_size)
        .transpose()?
        .unwrap_or(DEFAULT_VOLUME_SIZE);

    let wal = match ini.section(Some("WAL")) {
        Some(sect) => {
            let wal_path: PathBuf = sect.get("path").unwrap_or_default().into();
            let wal_nvolumes: u32 = sect
                .get("nvolumes")
                .map(|v| v.parse().map_err(|_| ConfigError::InvalidSize(v.to_string())))
                .transpose()?
                .unwrap_or(0);
            let wal_volume_size = sect
                .get("volume_size")
                .map(parse_size)
                .transpose()?
                .unwrap_or(DEFAULT_VOLUME_SIZE);
            WalSettings {
                path: wal_path,
                nvolumes: wal_nvolumes,
                volume_size: wal_volume_size,
            }
        }
        None => WalSettings::disabled(),
    };

    let mut servers = Vec::new();
    servers.extend(server_settings(&ini, "HTTP", "HTTP", DEFAULT_HTTP_PORT));
    servers.extend(server_settings(&ini, "TCP", "TCP", DEFAULT_TCP_PORT));
    servers.extend(server_settings(&ini, "UDP", "UDP", DEFAULT_UDP_PORT));
    servers.extend(server_settings(
        &ini,
        "OpenTSDB",
        "OpenTSDB",
        DEFAULT_OPENTSDB_PORT,
    ));

    Ok(AppConfig {
        path: db_path,
        nvolumes,
        volume_size,
        wal,
        servers,
    })
}

/// Renders the default config file text. `expandable` forces
/// `nvolumes=0`; `disable_wal` omits the `[WAL]` section entirely.
pub fn default_config_text(expandable: bool, disable_wal: bool) -> String {
    let mut out = String::new();
    out.push_str("path=/var/lib/akumuli\n");
    out.push_str(&format!(
        "nvolumes={}\n",
        if expandable { 0 } else { DEFAULT_NVOLUMES }
    ));
    out.push_str("volume_size=4GB\n\n");

    if !disable_wal {
        out.push_str("[WAL]\n");
        out.push_str("path=/var/lib/akumuli/wal\n");
        out.push_str(&format!(
            "nvolumes={}\n",
            if expandable { 0 } else { DEFAULT_NVOLUMES }
        ));
        out.push_str("volume_size=4GB\n\n");
    }

    out.push_str("[HTTP]\nport=8181\nbind_addr=0.0.0.0\npool_size=0\n\n");
    out.push_str("[TCP]\nport=8282\nbind_addr=0.0.0.0\npool_size=0\n\n");
    out.push_str("[UDP]\nport=8383\nbind_addr=0.0.0.0\npool_size=0\n\n");
    out.push_str("[OpenTSDB]\nport=4242\nbind_addr=0.0.0.0\npool_size=0\n");
    out
}

/// The default config file location, `~/.akumulid`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".akumulid"))
}
